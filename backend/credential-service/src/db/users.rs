/// User database operations for credential-service
use super::UserAccountStore;
use crate::error::{CredentialError, Result};
use crate::models::{NewUserAccount, UserAccount};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, username, email, phone, password_hash, blocked, verified, \
     verification_token, verification_token_expires_at, reset_token, reset_token_expires_at, \
     created_at, updated_at";

/// PostgreSQL-backed account store
#[derive(Clone)]
pub struct PgUserAccountStore {
    pool: PgPool,
}

impl PgUserAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, filter: &str, value: &str) -> Result<Option<UserAccount>> {
        let sql = format!(
            "SELECT {} FROM users WHERE {} AND deleted_at IS NULL",
            USER_COLUMNS, filter
        );
        let user = sqlx::query_as::<_, UserAccount>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Check if username exists (excluding soft-deleted users)
    async fn username_exists(&self, username: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1 AND deleted_at IS NULL)",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Check if email exists (excluding soft-deleted users)
    async fn email_exists(&self, email: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1 AND deleted_at IS NULL)",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}

/// Translate a lost insert race into the same error the pre-check reports
fn map_insert_error(err: sqlx::Error) -> CredentialError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            match db_err.constraint() {
                Some("users_username_key") => return CredentialError::UsernameAlreadyExists,
                Some("users_email_key") => return CredentialError::EmailAlreadyExists,
                _ => {}
            }
        }
    }
    err.into()
}

#[async_trait]
impl UserAccountStore for PgUserAccountStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserAccount>> {
        let sql = format!(
            "SELECT {} FROM users WHERE id = $1 AND deleted_at IS NULL",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, UserAccount>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserAccount>> {
        self.find_one("username = $1", username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>> {
        self.find_one("email = $1", email).await
    }

    async fn find_by_username_or_email(&self, identifier: &str) -> Result<Option<UserAccount>> {
        self.find_one("(username = $1 OR email = $1)", identifier)
            .await
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Vec<UserAccount>> {
        let sql = format!(
            "SELECT {} FROM users WHERE phone = $1 AND deleted_at IS NULL ORDER BY created_at",
            USER_COLUMNS
        );
        let users = sqlx::query_as::<_, UserAccount>(&sql)
            .bind(phone)
            .fetch_all(&self.pool)
            .await?;

        Ok(users)
    }

    async fn find_by_verification_token(&self, token: &str) -> Result<Option<UserAccount>> {
        self.find_one("verification_token = $1", token).await
    }

    async fn find_by_reset_token(&self, token: &str) -> Result<Option<UserAccount>> {
        self.find_one("reset_token = $1", token).await
    }

    async fn create(&self, account: NewUserAccount) -> Result<UserAccount> {
        if self.username_exists(&account.username).await? {
            return Err(CredentialError::UsernameAlreadyExists);
        }
        if self.email_exists(&account.email).await? {
            return Err(CredentialError::EmailAlreadyExists);
        }

        let sql = format!(
            r#"
            INSERT INTO users (
                username, email, phone, password_hash, blocked, verified,
                verification_token, verification_token_expires_at
            )
            VALUES ($1, $2, $3, $4, false, false, $5, $6)
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        let user = sqlx::query_as::<_, UserAccount>(&sql)
            .bind(&account.username)
            .bind(&account.email)
            .bind(&account.phone)
            .bind(&account.password_hash)
            .bind(&account.verification_token)
            .bind(account.verification_token_expires_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_insert_error)?;

        Ok(user)
    }

    async fn mark_verified(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET verified = true, verification_token_expires_at = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_verification_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET verification_token = $1, verification_token_expires_at = $2, updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(token)
        .bind(expires_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET reset_token = $1, reset_token_expires_at = $2, updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(token)
        .bind(expires_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $1, reset_token = NULL, reset_token_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(password_hash)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> Result<()> {
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
