/// Email delivery for verification and password reset messages
use crate::config::EmailSettings;
use crate::error::{CredentialError, Result};
use crate::validators::is_valid_email;
use async_trait::async_trait;
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::sync::Arc;
use tracing::{info, warn};

/// Outbound mail capability
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// SMTP transport, or a disabled one when no host is configured
pub struct SmtpEmailTransport {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
}

impl SmtpEmailTransport {
    /// If SMTP host is empty, every send fails with "Email not configured".
    pub fn new(config: &EmailSettings) -> Result<Self> {
        let from = config
            .smtp_from
            .parse::<Mailbox>()
            .map_err(|e| CredentialError::Internal(format!("Invalid SMTP_FROM address: {}", e)))?;

        let transport = if config.smtp_host.trim().is_empty() {
            warn!("SMTP host not configured; outbound email is disabled");
            None
        } else {
            let builder = if config.use_starttls {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            }
            .map_err(|e| {
                CredentialError::Internal(format!("Failed to configure SMTP transport: {}", e))
            })?
            .port(config.smtp_port);

            let builder = if let (Some(username), Some(password)) =
                (&config.smtp_username, &config.smtp_password)
            {
                builder.credentials(Credentials::new(username.to_string(), password.to_string()))
            } else {
                builder
            };

            Some(builder.build())
        };

        Ok(Self { transport, from })
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }
}

#[async_trait]
impl EmailTransport for SmtpEmailTransport {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let Some(transport) = &self.transport else {
            return Err(CredentialError::Email("Email not configured".to_string()));
        };

        if !is_valid_email(to) {
            return Err(CredentialError::Email("Invalid email".to_string()));
        }

        let recipient = to
            .parse::<Mailbox>()
            .map_err(|e| CredentialError::Email(format!("Invalid recipient address: {}", e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| CredentialError::Email(format!("Failed to build email message: {}", e)))?;

        transport
            .send(message)
            .await
            .map_err(|e| CredentialError::Email(format!("Failed to send email: {}", e)))?;

        info!(subject, "Email sent");
        Ok(())
    }
}

/// Composes account emails and reports delivery as a plain flag
#[derive(Clone)]
pub struct EmailService {
    transport: Arc<dyn EmailTransport>,
    app_url: String,
}

impl EmailService {
    pub fn new(transport: Arc<dyn EmailTransport>, app_url: impl Into<String>) -> Self {
        let app_url = app_url.into().trim_end_matches('/').to_string();
        Self { transport, app_url }
    }

    pub fn verification_link(&self, token: &str) -> String {
        format!("{}/verify?token={}", self.app_url, token)
    }

    pub fn reset_link(&self, token: &str) -> String {
        format!("{}/resetpassword?token={}", self.app_url, token)
    }

    /// Returns whether the message was handed to the transport
    pub async fn send_verification_email(
        &self,
        to: &str,
        username: &str,
        token: &str,
        ttl_secs: i64,
    ) -> bool {
        let body = format!(
            "Hi {username},\n\n\
             Click this link to verify your email:\n\n\
             {link}\n\n\
             Or use this token: {token}\n\n\
             This link expires in {lifetime}.",
            link = self.verification_link(token),
            lifetime = describe_ttl(ttl_secs),
        );

        self.deliver(to, "Verify Your Email", &body).await
    }

    pub async fn send_password_reset_email(
        &self,
        to: &str,
        username: &str,
        token: &str,
        ttl_secs: i64,
    ) -> bool {
        let body = format!(
            "Hi {username},\n\n\
             We received a request to reset your password. Use this link:\n\n\
             {link}\n\n\
             Or use this token: {token}\n\n\
             This link expires in {lifetime}. If you did not request this, ignore this email.",
            link = self.reset_link(token),
            lifetime = describe_ttl(ttl_secs),
        );

        self.deliver(to, "Reset Your Password", &body).await
    }

    async fn deliver(&self, to: &str, subject: &str, body: &str) -> bool {
        match self.transport.send(to, subject, body).await {
            Ok(()) => true,
            Err(e) => {
                warn!(subject, error = %e, "Email not sent");
                false
            }
        }
    }
}

/// "24 hours", "1 hour", "30 minutes", "45 seconds"
fn describe_ttl(ttl_secs: i64) -> String {
    let (amount, unit) = match ttl_secs {
        s if s >= 3600 && s % 3600 == 0 => (s / 3600, "hour"),
        s if s >= 60 && s % 60 == 0 => (s / 60, "minute"),
        s => (s, "second"),
    };
    let plural = if amount == 1 { "" } else { "s" };
    format!("{} {}{}", amount, unit, plural)
}
