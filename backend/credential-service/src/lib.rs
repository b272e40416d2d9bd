/// Credential Service Library
///
/// Account registration, email verification, password reset and the
/// access/refresh session lifecycle over PostgreSQL.
///
/// ## Modules
///
/// - `config`: Service configuration
/// - `db`: Storage traits and PostgreSQL repositories (users, sessions)
/// - `error`: Error types
/// - `http`: axum router and handlers
/// - `migration`: Tracked `*.up.sql` / `*.down.sql` runner
/// - `models`: Data models
/// - `security`: Argon2id password hashing, opaque token generation
/// - `services`: Auth lifecycle, session policy, email, result envelope
/// - `validators`: Input validation
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod migration;
pub mod models;
pub mod security;
pub mod services;
pub mod validators;

// Re-export commonly used types
pub use error::{CredentialError, ErrorKind, Result};
pub use services::AuthService;
