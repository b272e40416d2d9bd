/// Uniform result envelope: `{status, msg|error, ...fields}`
use super::auth::{
    LoginOutcome, LoginStatus, ResetOutcome, SignupOutcome, TokenDispatch, UserLookup,
    VerifyOutcome,
};
use crate::error::CredentialError;
use crate::models::Session;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Success,
    Failed,
    LoggedIn,
    NotLoggedIn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Envelope {
    pub fn success(msg: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            msg: Some(msg.into()),
            error: None,
            fields: Map::new(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Status::Failed,
            msg: None,
            error: Some(error.into()),
            fields: Map::new(),
        }
    }

    fn bare(status: Status) -> Self {
        Self {
            status,
            msg: None,
            error: None,
            fields: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        // Serializing plain data into a Value cannot fail
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, Status::Success | Status::LoggedIn)
    }
}

impl From<&CredentialError> for Envelope {
    fn from(err: &CredentialError) -> Self {
        let envelope = Envelope::failed(err.public_message());
        match err {
            CredentialError::VerificationRequired | CredentialError::EmailNotVerified => {
                envelope.with("verified", false)
            }
            _ => envelope,
        }
    }
}

fn session_fields(envelope: Envelope, session: &Session) -> Envelope {
    envelope
        .with("access_token", &session.access_token)
        .with("refresh_token", &session.refresh_token)
        .with("token_type", "Bearer")
        .with("expires_at", session.expires_at)
}

impl From<SignupOutcome> for Envelope {
    fn from(outcome: SignupOutcome) -> Self {
        Envelope::success(
            "User registered successfully. Please check your email to verify your account.",
        )
        .with("user_id", outcome.user_id)
        .with("username", outcome.username)
        .with("verified", false)
        .with("email_sent", outcome.email_sent)
        .with("verification_expires_at", outcome.verification_expires_at)
    }
}

impl From<LoginOutcome> for Envelope {
    fn from(outcome: LoginOutcome) -> Self {
        let msg = if outcome.reused {
            "Already logged in"
        } else {
            "Login successful"
        };
        let user = json!({
            "id": outcome.user.id,
            "username": outcome.user.username,
            "email": outcome.user.email,
            "phone": outcome.user.phone,
            "created_at": outcome.user.created_at,
        });
        session_fields(Envelope::success(msg).with("user", user), &outcome.session)
    }
}

impl From<VerifyOutcome> for Envelope {
    fn from(outcome: VerifyOutcome) -> Self {
        let msg = if outcome.already_verified {
            "Email already verified"
        } else {
            "Email verified successfully. You can now log in."
        };
        Envelope::success(msg)
            .with("username", outcome.username)
            .with("already_verified", outcome.already_verified)
    }
}

impl Envelope {
    pub fn verification_resent(dispatch: TokenDispatch) -> Self {
        Envelope::success("Verification email sent. Please check your inbox.")
            .with("email_sent", dispatch.email_sent)
            .with("verification_expires_at", dispatch.expires_at)
    }

    pub fn reset_requested(dispatch: TokenDispatch) -> Self {
        Envelope::success("Password reset link sent to your email")
            .with("email_sent", dispatch.email_sent)
            .with("reset_expires_at", dispatch.expires_at)
    }

    pub fn refreshed(session: &Session) -> Self {
        Envelope::success("Token refreshed")
            .with("access_token", &session.access_token)
            .with("token_type", "Bearer")
            .with("expires_at", session.expires_at)
    }

    pub fn logged_out() -> Self {
        Envelope::success("Logged out successfully")
    }
}

impl From<ResetOutcome> for Envelope {
    fn from(outcome: ResetOutcome) -> Self {
        Envelope::success("Password reset successfully. Please log in with your new password.")
            .with("sessions_invalidated", outcome.sessions_invalidated)
    }
}

impl From<LoginStatus> for Envelope {
    fn from(status: LoginStatus) -> Self {
        match status {
            LoginStatus::LoggedIn {
                user_id,
                username,
                email,
            } => Envelope::bare(Status::LoggedIn)
                .with("logged_in", true)
                .with("user_id", user_id)
                .with("username", username)
                .with("email", email),
            LoginStatus::NotLoggedIn { reason } => {
                let mut envelope = Envelope::bare(Status::NotLoggedIn).with("logged_in", false);
                envelope.msg = reason;
                envelope
            }
        }
    }
}

impl From<UserLookup> for Envelope {
    fn from(lookup: UserLookup) -> Self {
        match lookup {
            UserLookup::One(user) => Envelope::bare(Status::Success).with("user", user),
            UserLookup::Many(users) => Envelope::bare(Status::Success)
                .with("count", users.len())
                .with("users", users),
        }
    }
}
