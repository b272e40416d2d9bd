use crate::error::{CredentialError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// Input validation rules for credential-service
///
/// Each check returns the first failing rule as `CredentialError::Validation`,
/// so callers can surface its message unchanged.

// Hardcoded patterns, compiled once
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("hardcoded email regex is invalid - fix source code")
});

static USERNAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9_]+$").expect("hardcoded username regex is invalid - fix source code")
});

static PHONE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]{10}$").expect("hardcoded phone regex is invalid - fix source code")
});

pub const MIN_PASSWORD_LEN: usize = 6;

fn invalid(msg: &str) -> CredentialError {
    CredentialError::Validation(msg.to_string())
}

/// Validate email format (RFC 5322 simplified)
pub fn is_valid_email(email: &str) -> bool {
    !email.is_empty() && email.len() <= 254 && EMAIL_REGEX.is_match(email)
}

/// Username: 3-50 characters, letters, digits and underscore
pub fn is_valid_username(username: &str) -> bool {
    (3..=50).contains(&username.len()) && USERNAME_REGEX.is_match(username)
}

pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_REGEX.is_match(phone)
}

pub fn validate_signup(username: &str, password: &str, email: &str, phone: &str) -> Result<()> {
    if username.is_empty() || password.is_empty() || email.is_empty() || phone.is_empty() {
        return Err(invalid("All fields are required"));
    }

    if !(3..=50).contains(&username.len()) {
        return Err(invalid("Username must be 3-50 characters"));
    }

    if !USERNAME_REGEX.is_match(username) {
        return Err(invalid(
            "Username can only contain letters, numbers, and underscores",
        ));
    }

    if !is_valid_email(email) {
        return Err(invalid("Invalid email format"));
    }

    validate_password(password)?;

    if !is_valid_phone(phone) {
        return Err(invalid("Phone must be 10 digits"));
    }

    Ok(())
}

pub fn validate_login(identifier: &str, password: &str) -> Result<()> {
    if identifier.is_empty() || password.is_empty() {
        return Err(invalid("Username and password are required"));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<()> {
    if !is_valid_email(email) {
        return Err(invalid("Valid email is required"));
    }
    Ok(())
}

/// Minimum length only; character classes are not enforced
pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(invalid("Password must be at least 6 characters"));
    }
    Ok(())
}

pub fn validate_token(token: &str) -> Result<()> {
    if token.trim().is_empty() {
        return Err(invalid("Token is required"));
    }
    Ok(())
}
