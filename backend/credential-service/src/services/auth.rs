/// Account and session lifecycle
///
/// Owns the account state machine: Unverified → Verified (+/- active
/// session), with Blocked terminal for authentication.
use super::email::EmailService;
use super::sessions::SessionStore;
use crate::config::TokenSettings;
use crate::db::UserAccountStore;
use crate::error::{CredentialError, Result};
use crate::models::{NewUserAccount, PublicUser, Session, UserAccount};
use crate::security::{mask_token, PasswordGuard, TokenIssuer};
use crate::validators;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SignupOutcome {
    pub user_id: Uuid,
    pub username: String,
    pub email_sent: bool,
    pub verification_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: PublicUser,
    pub session: Session,
    /// An already active session was returned instead of a new one
    pub reused: bool,
}

#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub username: String,
    pub already_verified: bool,
}

#[derive(Debug, Clone)]
pub struct TokenDispatch {
    pub email_sent: bool,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ResetOutcome {
    pub user_id: Uuid,
    pub sessions_invalidated: u64,
}

/// Bearer token resolved to its owner
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub session: Session,
    pub user: UserAccount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginStatus {
    LoggedIn {
        user_id: Uuid,
        username: String,
        email: String,
    },
    NotLoggedIn {
        reason: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserLookup {
    One(PublicUser),
    /// Phone lookups may match several accounts
    Many(Vec<PublicUser>),
}

/// Which field a `lookup_user` call searches by
#[derive(Debug, Clone, Default)]
pub struct LookupQuery {
    pub username: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserAccountStore>,
    sessions: SessionStore,
    passwords: PasswordGuard,
    email: EmailService,
    issuer: TokenIssuer,
    tokens: TokenSettings,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserAccountStore>,
        sessions: SessionStore,
        passwords: PasswordGuard,
        email: EmailService,
        tokens: TokenSettings,
    ) -> Self {
        Self {
            users,
            sessions,
            passwords,
            email,
            issuer: TokenIssuer::new(),
            tokens,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Register an unverified account and mail its verification link
    ///
    /// Email delivery is best-effort and reported through `email_sent`.
    pub async fn signup(
        &self,
        username: &str,
        password: &str,
        email: &str,
        phone: &str,
    ) -> Result<SignupOutcome> {
        validators::validate_signup(username, password, email, phone)?;

        let password_hash = self.passwords.hash(password)?;
        let verification_token = self.issuer.opaque_token();
        let verification_token_expires_at =
            self.issuer.expiry_timestamp(self.tokens.verification_ttl_secs);

        let user = self
            .users
            .create(NewUserAccount {
                username: username.to_string(),
                email: email.to_string(),
                phone: phone.to_string(),
                password_hash,
                verification_token: verification_token.clone(),
                verification_token_expires_at,
            })
            .await?;

        let email_sent = self
            .email
            .send_verification_email(
                &user.email,
                &user.username,
                &verification_token,
                self.tokens.verification_ttl_secs,
            )
            .await;

        info!(user_id = %user.id, email_sent, "User registered");

        Ok(SignupOutcome {
            user_id: user.id,
            username: user.username,
            email_sent,
            verification_expires_at: verification_token_expires_at,
        })
    }

    /// Mark the account owning `token` as verified
    ///
    /// Replaying the token of an already verified account succeeds with
    /// `already_verified` set.
    pub async fn verify_email(&self, token: &str) -> Result<VerifyOutcome> {
        validators::validate_token(token)?;

        let user = self
            .users
            .find_by_verification_token(token)
            .await?
            .ok_or(CredentialError::VerificationTokenNotFound)?;

        if user.verified {
            return Ok(VerifyOutcome {
                username: user.username,
                already_verified: true,
            });
        }

        if self.issuer.is_expired(user.verification_token_expires_at) {
            return Err(CredentialError::VerificationTokenExpired);
        }

        self.users.mark_verified(user.id).await?;
        info!(user_id = %user.id, "Email verified");

        Ok(VerifyOutcome {
            username: user.username,
            already_verified: false,
        })
    }

    /// Issue a new verification token, replacing the old one
    pub async fn resend_verification(&self, email: &str) -> Result<TokenDispatch> {
        validators::validate_email(email)?;

        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(CredentialError::UserNotFound)?;

        if user.verified {
            return Err(CredentialError::AlreadyVerified);
        }

        let token = self.issuer.opaque_token();
        let expires_at = self.issuer.expiry_timestamp(self.tokens.verification_ttl_secs);
        self.users
            .update_verification_token(user.id, &token, expires_at)
            .await?;

        let email_sent = self
            .email
            .send_verification_email(
                &user.email,
                &user.username,
                &token,
                self.tokens.verification_ttl_secs,
            )
            .await;

        info!(user_id = %user.id, email_sent, "Verification token reissued");
        Ok(TokenDispatch {
            email_sent,
            expires_at,
        })
    }

    /// Authenticate by username or email and return the session
    ///
    /// An account that already holds an active session gets that session
    /// back rather than a second one.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<LoginOutcome> {
        validators::validate_login(identifier, password)?;

        let user = self
            .users
            .find_by_username_or_email(identifier)
            .await?
            .ok_or(CredentialError::UnknownIdentifier)?;

        if !user.can_authenticate() {
            warn!(user_id = %user.id, "Login attempt on blocked account");
            return Err(CredentialError::AccountBlocked);
        }

        if !self.passwords.verify(password, &user.password_hash) {
            info!(user_id = %user.id, "Login rejected: wrong password");
            return Err(CredentialError::InvalidCredentials);
        }

        if !user.verified {
            return Err(CredentialError::VerificationRequired);
        }

        self.upgrade_password_hash(&user, password).await;

        let public = PublicUser::from(&user);

        if let Some(session) = self.sessions.find_active_session(user.id).await? {
            info!(
                user_id = %user.id,
                token = %mask_token(&session.access_token),
                "Login reused active session"
            );
            return Ok(LoginOutcome {
                user: public,
                session,
                reused: true,
            });
        }

        let session = self.sessions.create(user.id).await?;
        Ok(LoginOutcome {
            user: public,
            session,
            reused: false,
        })
    }

    /// Post-login digest upgrade; failures are logged and swallowed
    async fn upgrade_password_hash(&self, user: &UserAccount, password: &str) {
        if !self.passwords.needs_rehash(&user.password_hash) {
            return;
        }

        let digest = match self.passwords.hash(password) {
            Ok(digest) => digest,
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "Password rehash failed");
                return;
            }
        };

        match self.users.update_password_hash(user.id, &digest).await {
            Ok(()) => info!(user_id = %user.id, "Password hash upgraded"),
            Err(e) => warn!(user_id = %user.id, error = %e, "Failed to store upgraded hash"),
        }
    }

    /// Issue a reset token and mail it
    pub async fn request_password_reset(&self, email: &str) -> Result<TokenDispatch> {
        validators::validate_email(email)?;

        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(CredentialError::UserNotFound)?;

        let token = self.issuer.opaque_token();
        let expires_at = self.issuer.expiry_timestamp(self.tokens.reset_ttl_secs);
        self.users.update_reset_token(user.id, &token, expires_at).await?;

        let email_sent = self
            .email
            .send_password_reset_email(
                &user.email,
                &user.username,
                &token,
                self.tokens.reset_ttl_secs,
            )
            .await;

        info!(user_id = %user.id, email_sent, "Password reset requested");
        Ok(TokenDispatch {
            email_sent,
            expires_at,
        })
    }

    /// Replace the password and invalidate every session of the account
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<ResetOutcome> {
        validators::validate_token(token)?;
        validators::validate_password(new_password)?;

        let user = self
            .users
            .find_by_reset_token(token)
            .await?
            .ok_or(CredentialError::ResetTokenNotFound)?;

        if self.issuer.is_expired(user.reset_token_expires_at) {
            return Err(CredentialError::ResetTokenExpired);
        }

        let digest = self.passwords.hash(new_password)?;
        // Sessions go first: a failure here leaves the password and reset token untouched
        let sessions_invalidated = self.sessions.invalidate_all_for_user(user.id).await?;
        self.users.update_password(user.id, &digest).await?;

        info!(user_id = %user.id, sessions_invalidated, "Password reset completed");
        Ok(ResetOutcome {
            user_id: user.id,
            sessions_invalidated,
        })
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<Session> {
        validators::validate_token(refresh_token)?;
        self.sessions.refresh(refresh_token).await
    }

    pub async fn logout(&self, access_token: &str) -> Result<()> {
        validators::validate_token(access_token)?;
        self.sessions.invalidate(access_token).await
    }

    /// Guard for protected operations
    ///
    /// ## Errors
    ///
    /// - `MissingBearerToken` when no token was presented
    /// - `WrongTokenType` / `InvalidToken` for unusable tokens
    /// - `EmailNotVerified` when the owner has not verified their email
    pub async fn authenticate(&self, bearer: Option<&str>) -> Result<Authenticated> {
        let token = bearer
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(CredentialError::MissingBearerToken)?;

        let session = self.sessions.validate(token).await?;

        let user = self
            .users
            .find_by_id(session.user_id)
            .await?
            .ok_or(CredentialError::InvalidToken)?;

        if !user.can_authenticate() {
            return Err(CredentialError::AccountBlocked);
        }
        if !user.verified {
            return Err(CredentialError::EmailNotVerified);
        }

        Ok(Authenticated { session, user })
    }

    /// Like `authenticate`, but auth failures become `NotLoggedIn`
    pub async fn is_logged_in(&self, bearer: Option<&str>) -> Result<LoginStatus> {
        match self.authenticate(bearer).await {
            Ok(auth) => Ok(LoginStatus::LoggedIn {
                user_id: auth.user.id,
                username: auth.user.username,
                email: auth.user.email,
            }),
            Err(CredentialError::MissingBearerToken) => {
                Ok(LoginStatus::NotLoggedIn { reason: None })
            }
            Err(e) if !e.is_internal() => Ok(LoginStatus::NotLoggedIn {
                reason: Some(e.to_string()),
            }),
            Err(e) => Err(e),
        }
    }

    /// Public account lookup: username, then email, then phone
    ///
    /// Never returns session tokens.
    pub async fn lookup_user(&self, query: &LookupQuery) -> Result<UserLookup> {
        let user = if let Some(username) = non_empty(&query.username) {
            self.users.find_by_username(username).await?
        } else if let Some(email) = non_empty(&query.email) {
            self.users.find_by_email(email).await?
        } else if let Some(phone) = non_empty(&query.phone) {
            let mut users = self.users.find_by_phone(phone).await?;
            if users.len() > 1 {
                return Ok(UserLookup::Many(users.iter().map(PublicUser::from).collect()));
            }
            users.pop()
        } else {
            return Err(CredentialError::Validation(
                "POST parameter required: username, email, or phone".to_string(),
            ));
        };

        user.map(|u| UserLookup::One(PublicUser::from(&u)))
            .ok_or(CredentialError::UserNotFound)
    }
}
