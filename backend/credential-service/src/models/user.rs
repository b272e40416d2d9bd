use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User model - the account an authentication lifecycle runs against
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserAccount {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub blocked: bool,
    pub verified: bool,
    #[serde(skip_serializing)]
    pub verification_token: Option<String>,
    pub verification_token_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing)]
    pub reset_token: Option<String>,
    pub reset_token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    /// Blocked accounts can never authenticate
    pub fn can_authenticate(&self) -> bool {
        !self.blocked
    }
}

/// Fields supplied at signup
#[derive(Debug, Clone)]
pub struct NewUserAccount {
    pub username: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
    pub verification_token: String,
    pub verification_token_expires_at: DateTime<Utc>,
}

/// Account fields that are safe to return to any caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub phone: String,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&UserAccount> for PublicUser {
    fn from(user: &UserAccount) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            verified: user.verified,
            created_at: user.created_at,
        }
    }
}
