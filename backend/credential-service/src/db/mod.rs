/// Database operations for credential-service
///
/// Row access sits behind the `UserAccountStore` and `SessionRepository`
/// traits; the PostgreSQL implementations take an explicit `PgPool`.
pub mod sessions;
pub mod users;

use crate::config::DatabaseSettings;
use crate::error::Result;
use crate::models::{NewUserAccount, Session, UserAccount};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

pub use sessions::PgSessionRepository;
pub use users::PgUserAccountStore;

/// Lookup and mutation of user accounts
///
/// Soft-deleted accounts are invisible to every lookup.
#[async_trait]
pub trait UserAccountStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserAccount>>;

    async fn find_by_username(&self, username: &str) -> Result<Option<UserAccount>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>>;

    /// Login lookup; blocked accounts are returned so the caller can report them
    async fn find_by_username_or_email(&self, identifier: &str) -> Result<Option<UserAccount>>;

    /// The only lookup that may match more than one account
    async fn find_by_phone(&self, phone: &str) -> Result<Vec<UserAccount>>;

    async fn find_by_verification_token(&self, token: &str) -> Result<Option<UserAccount>>;

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<UserAccount>>;

    /// Insert an unverified, unblocked account
    ///
    /// ## Errors
    ///
    /// `UsernameAlreadyExists` / `EmailAlreadyExists` when either value is
    /// taken, whether detected by the pre-check or by the unique constraint.
    async fn create(&self, account: NewUserAccount) -> Result<UserAccount>;

    /// Set `verified` and clear the verification expiry in one write
    ///
    /// The token value is kept so a replayed link can be recognised as
    /// already used.
    async fn mark_verified(&self, id: Uuid) -> Result<()>;

    async fn update_verification_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn update_reset_token(&self, id: Uuid, token: &str, expires_at: DateTime<Utc>)
        -> Result<()>;

    /// Replace the digest and clear the reset token in one write
    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<()>;

    /// Digest upgrade only; reset token untouched
    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<()>;
}

/// Row-level session persistence
///
/// Policy (token types, TTLs, dedupe) lives in `services::SessionStore`.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert(
        &self,
        user_id: Uuid,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Session>;

    /// Most recent valid session whose access token has not expired
    async fn find_active_by_user(&self, user_id: Uuid) -> Result<Option<Session>>;

    /// Valid and unexpired row holding this access token
    async fn find_active_by_access_token(&self, access_token: &str) -> Result<Option<Session>>;

    /// Overwrite the access token of the valid row holding `refresh_token`
    ///
    /// Returns the updated row, or `None` if no valid row matched.
    async fn replace_access_token(
        &self,
        refresh_token: &str,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Session>>;

    /// Flip a valid row to invalidated; returns affected rows
    async fn invalidate_by_access_token(&self, access_token: &str) -> Result<u64>;

    async fn invalidate_all_for_user(&self, user_id: Uuid) -> Result<u64>;
}

/// Build the PostgreSQL pool and verify it with a round-trip
pub async fn create_pool(settings: &DatabaseSettings) -> anyhow::Result<PgPool> {
    info!(
        max_connections = settings.max_connections,
        min_connections = settings.min_connections,
        "Creating database pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout))
        .idle_timeout(Duration::from_secs(settings.idle_timeout))
        .max_lifetime(Duration::from_secs(settings.max_lifetime))
        .test_before_acquire(true)
        .connect(&settings.url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .context("Database health check failed")?;

    Ok(pool)
}
