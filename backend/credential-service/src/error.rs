use crate::security::tokens::TokenKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CredentialError>;

/// Error taxonomy used to pick an envelope and a status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Auth,
    Storage,
    Migration,
    Internal,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("{0}")]
    Validation(String),

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid verification token")]
    VerificationTokenNotFound,

    #[error("Invalid or expired reset token")]
    ResetTokenNotFound,

    #[error("Invalid username or email")]
    UnknownIdentifier,

    #[error("Session not found or already invalidated")]
    SessionNotFound,

    #[error("Username already exists")]
    UsernameAlreadyExists,

    #[error("Email already registered")]
    EmailAlreadyExists,

    #[error("Email already verified")]
    AlreadyVerified,

    #[error("Invalid password")]
    InvalidCredentials,

    #[error("Account is blocked")]
    AccountBlocked,

    #[error("Email verification needed. Please verify your email before logging in.")]
    VerificationRequired,

    #[error("Invalid token type. Expected {} token ({}*)", .expected.as_str(), .expected.prefix())]
    WrongTokenType { expected: TokenKind },

    #[error("Please verify your email first")]
    EmailNotVerified,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Invalid or expired refresh token")]
    InvalidRefreshToken,

    #[error("Verification token expired")]
    VerificationTokenExpired,

    #[error("Reset token expired")]
    ResetTokenExpired,

    #[error("Authorization header required: Bearer <access_token>")]
    MissingBearerToken,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Email delivery failed: {0}")]
    Email(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl CredentialError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CredentialError::Validation(_) => ErrorKind::Validation,
            CredentialError::UserNotFound
            | CredentialError::UnknownIdentifier
            | CredentialError::VerificationTokenNotFound
            | CredentialError::ResetTokenNotFound
            | CredentialError::SessionNotFound => ErrorKind::NotFound,
            CredentialError::UsernameAlreadyExists
            | CredentialError::EmailAlreadyExists
            | CredentialError::AlreadyVerified => ErrorKind::Conflict,
            CredentialError::InvalidCredentials
            | CredentialError::AccountBlocked
            | CredentialError::VerificationRequired
            | CredentialError::EmailNotVerified
            | CredentialError::WrongTokenType { .. }
            | CredentialError::InvalidToken
            | CredentialError::InvalidRefreshToken
            | CredentialError::VerificationTokenExpired
            | CredentialError::ResetTokenExpired
            | CredentialError::MissingBearerToken => ErrorKind::Auth,
            CredentialError::Database(_) => ErrorKind::Storage,
            CredentialError::Migration(_) => ErrorKind::Migration,
            CredentialError::Email(_) | CredentialError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to hand back to a caller
    pub fn public_message(&self) -> String {
        match self.kind() {
            // Don't leak internal details
            ErrorKind::Storage | ErrorKind::Migration | ErrorKind::Internal => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Storage | ErrorKind::Migration | ErrorKind::Internal
        )
    }
}

impl From<sqlx::Error> for CredentialError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = %err, "Database error");
        CredentialError::Database(err.to_string())
    }
}
