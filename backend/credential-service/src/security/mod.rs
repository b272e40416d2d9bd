/// Security primitives for credential-service
///
/// - **password**: Argon2id hashing with rehash detection
/// - **tokens**: opaque, type-prefixed session tokens and expiry checks
pub mod password;
pub mod tokens;

pub use password::PasswordGuard;
pub use tokens::{
    mask_token, TokenIssuer, TokenKind, ACCESS_PREFIX, MAX_TTL_SECS, REFRESH_PREFIX,
};
