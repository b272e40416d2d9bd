/// Opaque token generation and expiry arithmetic
///
/// Session tokens carry a type prefix (`a.` access, `r.` refresh) followed by
/// 64 lowercase hex characters (32 bytes from the OS CSPRNG). The prefix is a
/// checked part of the contract: presenting one type where the other is
/// expected is rejected before any lookup.
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};

/// Number of random bytes behind every token
const TOKEN_BYTES: usize = 32;

/// Longest TTL accepted anywhere (10 years)
pub const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

pub const ACCESS_PREFIX: &str = "a.";
pub const REFRESH_PREFIX: &str = "r.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
    Unknown,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
            TokenKind::Unknown => "unknown",
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            TokenKind::Access => ACCESS_PREFIX,
            TokenKind::Refresh => REFRESH_PREFIX,
            TokenKind::Unknown => "",
        }
    }

    /// Detect token type from its prefix
    pub fn of(token: &str) -> Self {
        if token.starts_with(ACCESS_PREFIX) {
            TokenKind::Access
        } else if token.starts_with(REFRESH_PREFIX) {
            TokenKind::Refresh
        } else {
            TokenKind::Unknown
        }
    }
}

/// Shorten a token for log lines (never log a full token)
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 10 {
        return "***".to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// Stateless token primitives
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenIssuer;

impl TokenIssuer {
    pub fn new() -> Self {
        Self
    }

    /// `prefix` + hex(32 random bytes)
    pub fn generate(&self, prefix: &str) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        format!("{}{}", prefix, hex::encode(bytes))
    }

    pub fn access_token(&self) -> String {
        self.generate(ACCESS_PREFIX)
    }

    pub fn refresh_token(&self) -> String {
        self.generate(REFRESH_PREFIX)
    }

    /// Unprefixed token for verification and reset links
    pub fn opaque_token(&self) -> String {
        self.generate("")
    }

    /// `now + ttl_seconds`, with the TTL clamped to `±MAX_TTL_SECS`
    pub fn expiry_timestamp(&self, ttl_seconds: i64) -> DateTime<Utc> {
        let ttl = ttl_seconds.clamp(-MAX_TTL_SECS, MAX_TTL_SECS);
        Utc::now() + Duration::seconds(ttl)
    }

    /// Missing timestamps count as expired
    pub fn is_expired(&self, expires_at: Option<DateTime<Utc>>) -> bool {
        match expires_at {
            Some(at) => at <= Utc::now(),
            None => true,
        }
    }
}
