//! Shared in-memory stores and fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use credential_service::config::{PasswordSettings, TokenSettings};
use credential_service::db::{SessionRepository, UserAccountStore};
use credential_service::error::{CredentialError, Result};
use credential_service::models::{NewUserAccount, Session, SessionState, UserAccount};
use credential_service::security::PasswordGuard;
use credential_service::services::{AuthService, EmailService, EmailTransport, SessionStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const TEST_USERNAME: &str = "alice";
pub const TEST_PASSWORD: &str = "secret1";
pub const TEST_EMAIL: &str = "a@x.com";
pub const TEST_PHONE: &str = "1234567890";

/// Cheap Argon2 parameters so tests stay fast
pub fn fast_password_settings(time_cost: u32) -> PasswordSettings {
    PasswordSettings {
        time_cost,
        memory_kib: 1024,
        parallelism: 1,
    }
}

// ============================================================================
// Users
// ============================================================================

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<UserAccount>>,
    pub fail_hash_updates: AtomicBool,
}

impl MemoryUserStore {
    fn find<F>(&self, pred: F) -> Option<UserAccount>
    where
        F: Fn(&UserAccount) -> bool,
    {
        self.users.lock().unwrap().iter().find(|u| pred(u)).cloned()
    }

    fn update<F>(&self, id: Uuid, f: F)
    where
        F: FnOnce(&mut UserAccount),
    {
        if let Some(user) = self.users.lock().unwrap().iter_mut().find(|u| u.id == id) {
            f(user);
            user.updated_at = Utc::now();
        }
    }

    pub fn count(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    pub fn by_username(&self, username: &str) -> UserAccount {
        self.find(|u| u.username == username)
            .expect("user should exist")
    }

    pub fn set_blocked(&self, username: &str, blocked: bool) {
        let id = self.by_username(username).id;
        self.update(id, |u| u.blocked = blocked);
    }

    pub fn set_verification_expiry(&self, username: &str, at: DateTime<Utc>) {
        let id = self.by_username(username).id;
        self.update(id, |u| u.verification_token_expires_at = Some(at));
    }

    pub fn set_reset_expiry(&self, username: &str, at: DateTime<Utc>) {
        let id = self.by_username(username).id;
        self.update(id, |u| u.reset_token_expires_at = Some(at));
    }

    /// Insert a raw account, bypassing the uniqueness pre-check
    pub fn insert_raw(&self, username: &str, email: &str, phone: &str) {
        let now = Utc::now();
        self.users.lock().unwrap().push(UserAccount {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
            phone: phone.to_string(),
            password_hash: String::new(),
            blocked: false,
            verified: true,
            verification_token: None,
            verification_token_expires_at: None,
            reset_token: None,
            reset_token_expires_at: None,
            created_at: now,
            updated_at: now,
        });
    }
}

#[async_trait]
impl UserAccountStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserAccount>> {
        Ok(self.find(|u| u.id == id))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserAccount>> {
        Ok(self.find(|u| u.username == username))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>> {
        Ok(self.find(|u| u.email == email))
    }

    async fn find_by_username_or_email(&self, identifier: &str) -> Result<Option<UserAccount>> {
        Ok(self.find(|u| u.username == identifier || u.email == identifier))
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Vec<UserAccount>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.phone == phone)
            .cloned()
            .collect())
    }

    async fn find_by_verification_token(&self, token: &str) -> Result<Option<UserAccount>> {
        Ok(self.find(|u| u.verification_token.as_deref() == Some(token)))
    }

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<UserAccount>> {
        Ok(self.find(|u| u.reset_token.as_deref() == Some(token)))
    }

    async fn create(&self, account: NewUserAccount) -> Result<UserAccount> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.username == account.username) {
            return Err(CredentialError::UsernameAlreadyExists);
        }
        if users.iter().any(|u| u.email == account.email) {
            return Err(CredentialError::EmailAlreadyExists);
        }

        let now = Utc::now();
        let user = UserAccount {
            id: Uuid::new_v4(),
            username: account.username,
            email: account.email,
            phone: account.phone,
            password_hash: account.password_hash,
            blocked: false,
            verified: false,
            verification_token: Some(account.verification_token),
            verification_token_expires_at: Some(account.verification_token_expires_at),
            reset_token: None,
            reset_token_expires_at: None,
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn mark_verified(&self, id: Uuid) -> Result<()> {
        self.update(id, |u| {
            u.verified = true;
            u.verification_token_expires_at = None;
        });
        Ok(())
    }

    async fn update_verification_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.update(id, |u| {
            u.verification_token = Some(token.to_string());
            u.verification_token_expires_at = Some(expires_at);
        });
        Ok(())
    }

    async fn update_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.update(id, |u| {
            u.reset_token = Some(token.to_string());
            u.reset_token_expires_at = Some(expires_at);
        });
        Ok(())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<()> {
        self.update(id, |u| {
            u.password_hash = password_hash.to_string();
            u.reset_token = None;
            u.reset_token_expires_at = None;
        });
        Ok(())
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<()> {
        if self.fail_hash_updates.load(Ordering::SeqCst) {
            return Err(CredentialError::Database("write timeout".to_string()));
        }
        self.update(id, |u| u.password_hash = password_hash.to_string());
        Ok(())
    }
}

// ============================================================================
// Sessions
// ============================================================================

#[derive(Default)]
pub struct MemorySessionRepository {
    sessions: Mutex<Vec<Session>>,
    /// Makes `invalidate_all_for_user` fail like a dropped connection
    pub fail_bulk_invalidation: AtomicBool,
}

impl MemorySessionRepository {
    pub fn count_for(&self, user_id: Uuid) -> usize {
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.user_id == user_id)
            .count()
    }

    pub fn all(&self) -> Vec<Session> {
        self.sessions.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn insert(
        &self,
        user_id: Uuid,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Session> {
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            expires_at,
            state: SessionState::Active,
            created_at: Utc::now(),
        };
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }

    async fn find_active_by_user(&self, user_id: Uuid) -> Result<Option<Session>> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.user_id == user_id && s.is_active())
            .cloned())
    }

    async fn find_active_by_access_token(&self, access_token: &str) -> Result<Option<Session>> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.access_token == access_token && s.is_active())
            .cloned())
    }

    async fn replace_access_token(
        &self,
        refresh_token: &str,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Session>> {
        let mut sessions = self.sessions.lock().unwrap();
        let Some(session) = sessions
            .iter_mut()
            .find(|s| s.refresh_token == refresh_token && s.state.is_valid())
        else {
            return Ok(None);
        };
        session.access_token = access_token.to_string();
        session.expires_at = expires_at;
        Ok(Some(session.clone()))
    }

    async fn invalidate_by_access_token(&self, access_token: &str) -> Result<u64> {
        let mut affected = 0;
        for session in self.sessions.lock().unwrap().iter_mut() {
            if session.access_token == access_token && session.state.is_valid() {
                session.state = SessionState::Invalidated;
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn invalidate_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        if self.fail_bulk_invalidation.load(Ordering::SeqCst) {
            return Err(CredentialError::Database("connection reset".to_string()));
        }
        let mut affected = 0;
        for session in self.sessions.lock().unwrap().iter_mut() {
            if session.user_id == user_id && session.state.is_valid() {
                session.state = SessionState::Invalidated;
                affected += 1;
            }
        }
        Ok(affected)
    }
}

// ============================================================================
// Email
// ============================================================================

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Records every message; refuses to send when `offline` is set
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentEmail>>,
    pub offline: AtomicBool,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailTransport for RecordingTransport {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CredentialError::Email("Email not configured".to_string()));
        }
        self.sent.lock().unwrap().push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct TestHarness {
    pub auth: AuthService,
    pub users: Arc<MemoryUserStore>,
    pub sessions: Arc<MemorySessionRepository>,
    pub mail: Arc<RecordingTransport>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_settings(TokenSettings::default(), fast_password_settings(1))
    }

    pub fn with_settings(tokens: TokenSettings, password: PasswordSettings) -> Self {
        let users = Arc::new(MemoryUserStore::default());
        let sessions = Arc::new(MemorySessionRepository::default());
        let mail = Arc::new(RecordingTransport::default());
        let auth = build_auth(&users, &sessions, &mail, tokens, password);

        Self {
            auth,
            users,
            sessions,
            mail,
        }
    }

    /// Another service instance over the same stores, with different settings
    pub fn rebuild(&self, tokens: TokenSettings, password: PasswordSettings) -> AuthService {
        build_auth(&self.users, &self.sessions, &self.mail, tokens, password)
    }

    pub async fn signup_default(&self) {
        self.auth
            .signup(TEST_USERNAME, TEST_PASSWORD, TEST_EMAIL, TEST_PHONE)
            .await
            .expect("signup should succeed");
    }

    pub fn verification_token(&self, username: &str) -> String {
        self.users
            .by_username(username)
            .verification_token
            .expect("verification token should be set")
    }

    pub fn reset_token(&self, username: &str) -> String {
        self.users
            .by_username(username)
            .reset_token
            .expect("reset token should be set")
    }

    /// Signed up and verified
    pub async fn verified_user(&self) {
        self.signup_default().await;
        let token = self.verification_token(TEST_USERNAME);
        self.auth
            .verify_email(&token)
            .await
            .expect("verification should succeed");
    }
}

fn build_auth(
    users: &Arc<MemoryUserStore>,
    sessions: &Arc<MemorySessionRepository>,
    mail: &Arc<RecordingTransport>,
    tokens: TokenSettings,
    password: PasswordSettings,
) -> AuthService {
    let session_store = SessionStore::new(sessions.clone(), tokens.access_ttl_secs);
    let passwords = PasswordGuard::new(&password).expect("valid test parameters");
    let email = EmailService::new(mail.clone(), "http://localhost:8080");

    AuthService::new(users.clone(), session_store, passwords, email, tokens)
}
