/// Session database operations
use super::SessionRepository;
use crate::error::Result;
use crate::models::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// PostgreSQL-backed session rows
#[derive(Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn insert(
        &self,
        user_id: Uuid,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Session> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (user_id, access_token, refresh_token, expires_at, valid)
            VALUES ($1, $2, $3, $4, true)
            RETURNING id, user_id, access_token, refresh_token, expires_at, valid, created_at
            "#,
        )
        .bind(user_id)
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    async fn find_active_by_user(&self, user_id: Uuid) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, user_id, access_token, refresh_token, expires_at, valid, created_at
            FROM sessions
            WHERE user_id = $1 AND valid = true AND expires_at > NOW()
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    async fn find_active_by_access_token(&self, access_token: &str) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, user_id, access_token, refresh_token, expires_at, valid, created_at
            FROM sessions
            WHERE access_token = $1 AND valid = true AND expires_at > NOW()
            "#,
        )
        .bind(access_token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    async fn replace_access_token(
        &self,
        refresh_token: &str,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Session>> {
        // Single statement: the row is located and rewritten atomically
        let session = sqlx::query_as::<_, Session>(
            r#"
            UPDATE sessions
            SET access_token = $1, expires_at = $2
            WHERE refresh_token = $3 AND valid = true
            RETURNING id, user_id, access_token, refresh_token, expires_at, valid, created_at
            "#,
        )
        .bind(access_token)
        .bind(expires_at)
        .bind(refresh_token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    async fn invalidate_by_access_token(&self, access_token: &str) -> Result<u64> {
        let result =
            sqlx::query("UPDATE sessions SET valid = false WHERE access_token = $1 AND valid = true")
                .bind(access_token)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }

    async fn invalidate_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let result =
            sqlx::query("UPDATE sessions SET valid = false WHERE user_id = $1 AND valid = true")
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }
}
