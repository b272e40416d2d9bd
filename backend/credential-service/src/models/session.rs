use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use uuid::Uuid;

/// Lifecycle state of a session row, stored as the `valid` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    /// Terminal: an invalidated session is never reactivated
    Invalidated,
}

impl SessionState {
    pub fn from_valid(valid: bool) -> Self {
        if valid {
            SessionState::Active
        } else {
            SessionState::Invalidated
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, SessionState::Active)
    }
}

/// Session model - one access/refresh token pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry of the access token only
    pub expires_at: DateTime<Utc>,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Active and access token not yet expired
    pub fn is_active(&self) -> bool {
        self.state.is_valid() && self.expires_at > Utc::now()
    }
}

impl<'r> FromRow<'r, PgRow> for Session {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            access_token: row.try_get("access_token")?,
            refresh_token: row.try_get("refresh_token")?,
            expires_at: row.try_get("expires_at")?,
            state: SessionState::from_valid(row.try_get("valid")?),
            created_at: row.try_get("created_at")?,
        })
    }
}
