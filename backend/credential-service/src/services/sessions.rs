/// Session policy over the row-level `SessionRepository`
///
/// Access tokens expire after the configured TTL; refresh tokens are bounded
/// only by invalidation and are never reissued.
use crate::db::SessionRepository;
use crate::error::{CredentialError, Result};
use crate::models::Session;
use crate::security::{mask_token, TokenIssuer, TokenKind};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct SessionStore {
    repo: Arc<dyn SessionRepository>,
    issuer: TokenIssuer,
    access_ttl_secs: i64,
}

impl SessionStore {
    pub fn new(repo: Arc<dyn SessionRepository>, access_ttl_secs: i64) -> Self {
        Self {
            repo,
            issuer: TokenIssuer::new(),
            access_ttl_secs,
        }
    }

    /// Mint a fresh access/refresh pair for `user_id`
    ///
    /// Does not check for an existing session; see `find_active_session`.
    pub async fn create(&self, user_id: Uuid) -> Result<Session> {
        let access_token = self.issuer.access_token();
        let refresh_token = self.issuer.refresh_token();
        let expires_at = self.issuer.expiry_timestamp(self.access_ttl_secs);

        let session = self
            .repo
            .insert(user_id, &access_token, &refresh_token, expires_at)
            .await?;

        info!(
            user_id = %user_id,
            session_id = %session.id,
            token = %mask_token(&session.access_token),
            "Session created"
        );
        Ok(session)
    }

    pub async fn find_active_session(&self, user_id: Uuid) -> Result<Option<Session>> {
        self.repo.find_active_by_user(user_id).await
    }

    /// Resolve an access token to its live session
    pub async fn validate(&self, access_token: &str) -> Result<Session> {
        if TokenKind::of(access_token) != TokenKind::Access {
            debug!(token = %mask_token(access_token), "Rejected non-access token");
            return Err(CredentialError::WrongTokenType {
                expected: TokenKind::Access,
            });
        }

        self.repo
            .find_active_by_access_token(access_token)
            .await?
            .ok_or(CredentialError::InvalidToken)
    }

    /// Replace the access token of the session holding `refresh_token`
    ///
    /// The refresh token itself is unchanged; expiry is not checked on it.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Session> {
        if TokenKind::of(refresh_token) != TokenKind::Refresh {
            debug!(token = %mask_token(refresh_token), "Rejected non-refresh token");
            return Err(CredentialError::WrongTokenType {
                expected: TokenKind::Refresh,
            });
        }

        let access_token = self.issuer.access_token();
        let expires_at = self.issuer.expiry_timestamp(self.access_ttl_secs);

        let session = self
            .repo
            .replace_access_token(refresh_token, &access_token, expires_at)
            .await?
            .ok_or(CredentialError::InvalidRefreshToken)?;

        info!(
            session_id = %session.id,
            token = %mask_token(refresh_token),
            "Access token refreshed"
        );
        Ok(session)
    }

    /// Invalidate one session; a second call with the same token fails
    pub async fn invalidate(&self, access_token: &str) -> Result<()> {
        let affected = self.repo.invalidate_by_access_token(access_token).await?;
        if affected == 0 {
            warn!(token = %mask_token(access_token), "Logout for unknown or invalidated session");
            return Err(CredentialError::SessionNotFound);
        }

        info!(token = %mask_token(access_token), "Session invalidated");
        Ok(())
    }

    pub async fn invalidate_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let affected = self.repo.invalidate_all_for_user(user_id).await?;
        info!(user_id = %user_id, sessions = affected, "All sessions invalidated");
        Ok(affected)
    }
}
