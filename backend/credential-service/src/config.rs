//! Configuration management for Credential Service
//!
//! Loads settings from:
//! 1. Environment variables
//! 2. .env file (local development)
//!
//! # Example
//!
//! ```no_run
//! use credential_service::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     println!("Access tokens live for {}s", settings.tokens.access_ttl_secs);
//!     Ok(())
//! }
//! ```

use crate::security::MAX_TTL_SECS;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use tracing::info;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub server: ServerSettings,
    pub tokens: TokenSettings,
    pub password: PasswordSettings,
    pub email: EmailSettings,
    pub migrations: MigrationSettings,
}

impl Settings {
    /// Load settings from environment variables (and `.env` in debug builds)
    pub fn load() -> Result<Self> {
        if cfg!(debug_assertions) {
            dotenvy::dotenv().ok();
            info!("Loaded .env file for development");
        }

        Ok(Settings {
            database: DatabaseSettings::from_env()?,
            server: ServerSettings::from_env()?,
            tokens: TokenSettings::from_env()?,
            password: PasswordSettings::from_env()?,
            email: EmailSettings::from_env()?,
            migrations: MigrationSettings::from_env(),
        })
    }
}

fn parse_or<T>(key: &str, default: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("Invalid {}", key))
}

/// A token lifetime in seconds, within `1..=MAX_TTL_SECS`
fn parse_ttl(key: &str, default: &str) -> Result<i64> {
    let ttl: i64 = parse_or(key, default)?;
    anyhow::ensure!(
        (1..=MAX_TTL_SECS).contains(&ttl),
        "Invalid {}: must be between 1 and {} seconds, got {}",
        key,
        MAX_TTL_SECS,
        ttl
    );
    Ok(ttl)
}

/// Database connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: u64,
    pub idle_timeout: u64,
    pub max_lifetime: u64,
}

impl fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_lifetime", &self.max_lifetime)
            .finish()
    }
}

impl DatabaseSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: parse_or("DATABASE_MAX_CONNECTIONS", "10")?,
            min_connections: parse_or("DATABASE_MIN_CONNECTIONS", "1")?,
            acquire_timeout: parse_or("DATABASE_ACQUIRE_TIMEOUT", "5")?,
            idle_timeout: parse_or("DATABASE_IDLE_TIMEOUT", "300")?,
            max_lifetime: parse_or("DATABASE_MAX_LIFETIME", "1800")?,
        })
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_or("SERVER_PORT", "8080")?,
        })
    }
}

/// Lifetimes of issued tokens, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSettings {
    /// Access token TTL; refresh tokens have no expiry of their own
    pub access_ttl_secs: i64,
    pub verification_ttl_secs: i64,
    pub reset_ttl_secs: i64,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            access_ttl_secs: 3600,
            verification_ttl_secs: 86_400,
            reset_ttl_secs: 3600,
        }
    }
}

impl TokenSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            access_ttl_secs: parse_ttl("SESSION_TOKEN_EXPIRE", "3600")?,
            verification_ttl_secs: parse_ttl("VERIFICATION_TOKEN_EXPIRE", "86400")?,
            reset_ttl_secs: parse_ttl("RESET_TOKEN_EXPIRE", "3600")?,
        })
    }
}

/// Argon2id work factor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordSettings {
    pub time_cost: u32,
    pub memory_kib: u32,
    pub parallelism: u32,
}

impl Default for PasswordSettings {
    fn default() -> Self {
        // OWASP baseline for Argon2id
        Self {
            time_cost: 3,
            memory_kib: 19_456,
            parallelism: 1,
        }
    }
}

impl PasswordSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            time_cost: parse_or("PASSWORD_HASH_TIME_COST", "3")?,
            memory_kib: parse_or("PASSWORD_HASH_MEMORY_KIB", "19456")?,
            parallelism: parse_or("PASSWORD_HASH_PARALLELISM", "1")?,
        })
    }
}

/// Email service configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct EmailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: String,
    pub use_starttls: bool,
    /// Base URL for verification and reset links
    pub app_url: String,
}

impl fmt::Debug for EmailSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailSettings")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &self.smtp_password.as_ref().map(|_| "[REDACTED]"))
            .field("smtp_from", &self.smtp_from)
            .field("use_starttls", &self.use_starttls)
            .field("app_url", &self.app_url)
            .finish()
    }
}

impl EmailSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            smtp_host: env::var("SMTP_HOST").unwrap_or_default(),
            smtp_port: parse_or("SMTP_PORT", "587")?,
            smtp_username: env::var("SMTP_USERNAME").ok(),
            smtp_password: env::var("SMTP_PASSWORD").ok(),
            smtp_from: env::var("SMTP_FROM")
                .unwrap_or_else(|_| "API <noreply@localhost>".to_string()),
            use_starttls: env::var("SMTP_USE_STARTTLS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            app_url: env::var("APP_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()),
        })
    }
}

/// Location of `*.up.sql` / `*.down.sql` files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationSettings {
    pub path: Option<PathBuf>,
}

impl MigrationSettings {
    fn from_env() -> Self {
        Self {
            path: env::var("MIGRATIONS_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        }
    }
}
