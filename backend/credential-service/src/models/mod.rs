/// Data models for accounts and sessions
pub mod session;
pub mod user;

pub use session::{Session, SessionState};
pub use user::{NewUserAccount, PublicUser, UserAccount};
