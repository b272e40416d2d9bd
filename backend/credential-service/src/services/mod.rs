/// Service layer for credential-service
///
/// - Auth lifecycle (signup, verification, login, password reset)
/// - Session policy (token types, refresh, invalidation)
/// - Email composition over a pluggable transport
/// - Result envelope returned to callers
pub mod auth;
pub mod email;
pub mod response;
pub mod sessions;

pub use auth::{
    AuthService, Authenticated, LoginOutcome, LoginStatus, LookupQuery, ResetOutcome,
    SignupOutcome, TokenDispatch, UserLookup, VerifyOutcome,
};
pub use email::{EmailService, EmailTransport, SmtpEmailTransport};
pub use response::{Envelope, Status};
pub use sessions::SessionStore;
