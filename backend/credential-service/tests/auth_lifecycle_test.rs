//! Account lifecycle tests over in-memory stores
//!
//! Covers signup → verification → login → logout, the password reset path
//! and the silent rehash on login.

mod common;

use chrono::{Duration, Utc};
use common::*;
use credential_service::config::TokenSettings;
use credential_service::error::{CredentialError, ErrorKind};
use credential_service::services::{Envelope, LoginStatus, LookupQuery, UserLookup};
use std::sync::atomic::Ordering;

// ============================================================================
// Signup
// ============================================================================

#[tokio::test]
async fn test_full_lifecycle_scenario() {
    let h = TestHarness::new();

    // GIVEN: a fresh signup
    let signup = h
        .auth
        .signup("alice", "secret1", "a@x.com", "1234567890")
        .await
        .expect("signup should succeed");
    let envelope = serde_json::to_value(Envelope::from(signup)).unwrap();
    assert_eq!(envelope["status"], "SUCCESS");
    assert_eq!(envelope["verified"], false);

    // WHEN: logging in before verification
    let err = h.auth.login("alice", "secret1").await.unwrap_err();

    // THEN: verification is reported distinctly
    assert!(matches!(err, CredentialError::VerificationRequired));
    assert!(err.public_message().contains("verification needed"));

    // WHEN: verifying and logging in
    let token = h.verification_token("alice");
    h.auth.verify_email(&token).await.expect("verify should succeed");
    let login = h.auth.login("alice", "secret1").await.expect("login should succeed");

    // THEN: the session carries typed tokens
    assert!(login.session.access_token.starts_with("a."));
    assert!(login.session.refresh_token.starts_with("r."));
    assert!(!login.reused);

    // AND: logout kills the access token
    h.auth
        .logout(&login.session.access_token)
        .await
        .expect("logout should succeed");
    let err = h
        .auth
        .sessions()
        .validate(&login.session.access_token)
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::InvalidToken));
}

#[tokio::test]
async fn test_signup_sends_verification_email() {
    let h = TestHarness::new();

    let outcome = h
        .auth
        .signup(TEST_USERNAME, TEST_PASSWORD, TEST_EMAIL, TEST_PHONE)
        .await
        .unwrap();

    assert!(outcome.email_sent);
    let sent = h.mail.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, TEST_EMAIL);
    assert_eq!(sent[0].subject, "Verify Your Email");
    assert!(sent[0].body.contains(&h.verification_token(TEST_USERNAME)));

    let ttl = (outcome.verification_expires_at - Utc::now()).num_seconds();
    assert!((86_398..=86_400).contains(&ttl));
}

#[tokio::test]
async fn test_emails_state_configured_lifetimes() {
    let tokens = TokenSettings {
        verification_ttl_secs: 7200,
        reset_ttl_secs: 1800,
        ..TokenSettings::default()
    };
    let h = TestHarness::with_settings(tokens, fast_password_settings(1));

    h.signup_default().await;
    h.auth.request_password_reset(TEST_EMAIL).await.unwrap();

    let sent = h.mail.sent();
    assert!(sent[0].body.contains("expires in 2 hours"));
    assert!(sent[1].body.contains("expires in 30 minutes"));
}

#[tokio::test]
async fn test_signup_succeeds_when_email_is_down() {
    let h = TestHarness::new();
    h.mail.offline.store(true, Ordering::SeqCst);

    let outcome = h
        .auth
        .signup(TEST_USERNAME, TEST_PASSWORD, TEST_EMAIL, TEST_PHONE)
        .await
        .expect("signup should not depend on email delivery");

    assert!(!outcome.email_sent);
    assert_eq!(h.users.count(), 1);
}

#[tokio::test]
async fn test_duplicate_signup_is_conflict() {
    let h = TestHarness::new();
    h.signup_default().await;

    let err = h
        .auth
        .signup(TEST_USERNAME, TEST_PASSWORD, "other@x.com", TEST_PHONE)
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::UsernameAlreadyExists));

    let err = h
        .auth
        .signup("bob", TEST_PASSWORD, TEST_EMAIL, TEST_PHONE)
        .await
        .unwrap_err();
    assert!(matches!(err, CredentialError::EmailAlreadyExists));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    assert_eq!(h.users.count(), 1);
}

#[tokio::test]
async fn test_invalid_signup_never_touches_storage() {
    let h = TestHarness::new();

    let err = h
        .auth
        .signup("alice", "123", "a@x.com", "1234567890")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.to_string(), "Password must be at least 6 characters");
    assert_eq!(h.users.count(), 0);
    assert!(h.mail.sent().is_empty());
}

// ============================================================================
// Verification
// ============================================================================

#[tokio::test]
async fn test_verify_is_idempotent() {
    let h = TestHarness::new();
    h.signup_default().await;
    let token = h.verification_token(TEST_USERNAME);

    let first = h.auth.verify_email(&token).await.unwrap();
    assert!(!first.already_verified);

    // Replaying the same token reports success without reissuing anything
    let second = h.auth.verify_email(&token).await.unwrap();
    assert!(second.already_verified);
    assert_eq!(h.verification_token(TEST_USERNAME), token);

    let envelope = serde_json::to_value(Envelope::from(second)).unwrap();
    assert_eq!(envelope["status"], "SUCCESS");
    assert_eq!(envelope["already_verified"], true);
}

#[tokio::test]
async fn test_verify_rejects_unknown_and_expired_tokens() {
    let h = TestHarness::new();
    h.signup_default().await;

    let err = h.auth.verify_email("deadbeef").await.unwrap_err();
    assert!(matches!(err, CredentialError::VerificationTokenNotFound));

    h.users
        .set_verification_expiry(TEST_USERNAME, Utc::now() - Duration::seconds(1));
    let token = h.verification_token(TEST_USERNAME);
    let err = h.auth.verify_email(&token).await.unwrap_err();
    assert!(matches!(err, CredentialError::VerificationTokenExpired));
    assert!(!h.users.by_username(TEST_USERNAME).verified);
}

#[tokio::test]
async fn test_resend_verification_replaces_token() {
    let h = TestHarness::new();
    h.signup_default().await;
    let old = h.verification_token(TEST_USERNAME);

    let dispatch = h.auth.resend_verification(TEST_EMAIL).await.unwrap();

    assert!(dispatch.email_sent);
    let new = h.verification_token(TEST_USERNAME);
    assert_ne!(old, new);
    assert!(matches!(
        h.auth.verify_email(&old).await,
        Err(CredentialError::VerificationTokenNotFound)
    ));
    assert!(h.auth.verify_email(&new).await.is_ok());
}

#[tokio::test]
async fn test_resend_verification_failures() {
    let h = TestHarness::new();

    assert!(matches!(
        h.auth.resend_verification("nobody@x.com").await,
        Err(CredentialError::UserNotFound)
    ));

    h.verified_user().await;
    assert!(matches!(
        h.auth.resend_verification(TEST_EMAIL).await,
        Err(CredentialError::AlreadyVerified)
    ));
}

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
async fn test_login_twice_reuses_session() {
    let h = TestHarness::new();
    h.verified_user().await;

    let first = h.auth.login(TEST_USERNAME, TEST_PASSWORD).await.unwrap();
    let second = h.auth.login(TEST_EMAIL, TEST_PASSWORD).await.unwrap();

    assert!(second.reused);
    assert_eq!(first.session.access_token, second.session.access_token);
    assert_eq!(first.session.refresh_token, second.session.refresh_token);
    assert_eq!(h.sessions.count_for(first.user.id), 1);

    let envelope = serde_json::to_value(Envelope::from(second)).unwrap();
    assert_eq!(envelope["msg"], "Already logged in");
}

#[tokio::test]
async fn test_login_failures_are_distinct() {
    let h = TestHarness::new();
    h.verified_user().await;

    assert!(matches!(
        h.auth.login("nobody", TEST_PASSWORD).await,
        Err(CredentialError::UnknownIdentifier)
    ));
    assert!(matches!(
        h.auth.login(TEST_USERNAME, "wrong-password").await,
        Err(CredentialError::InvalidCredentials)
    ));

    h.users.set_blocked(TEST_USERNAME, true);
    assert!(matches!(
        h.auth.login(TEST_USERNAME, TEST_PASSWORD).await,
        Err(CredentialError::AccountBlocked)
    ));
}

#[tokio::test]
async fn test_login_upgrades_weak_hash() {
    let h = TestHarness::new();
    h.verified_user().await;
    let old_hash = h.users.by_username(TEST_USERNAME).password_hash;

    // GIVEN: the configured work factor was raised
    let stronger = h.rebuild(TokenSettings::default(), fast_password_settings(2));

    // WHEN: the user logs in
    stronger.login(TEST_USERNAME, TEST_PASSWORD).await.unwrap();

    // THEN: the stored digest is replaced and still matches
    let new_hash = h.users.by_username(TEST_USERNAME).password_hash;
    assert_ne!(old_hash, new_hash);
    assert!(new_hash.contains("t=2"));
    assert!(stronger.login(TEST_USERNAME, TEST_PASSWORD).await.is_ok());
}

#[tokio::test]
async fn test_failed_rehash_does_not_fail_login() {
    let h = TestHarness::new();
    h.verified_user().await;
    h.users.fail_hash_updates.store(true, Ordering::SeqCst);
    let old_hash = h.users.by_username(TEST_USERNAME).password_hash;

    let stronger = h.rebuild(TokenSettings::default(), fast_password_settings(2));
    let login = stronger.login(TEST_USERNAME, TEST_PASSWORD).await;

    assert!(login.is_ok());
    assert_eq!(h.users.by_username(TEST_USERNAME).password_hash, old_hash);
}

// ============================================================================
// Password reset
// ============================================================================

#[tokio::test]
async fn test_reset_password_invalidates_all_sessions() {
    let h = TestHarness::new();
    h.verified_user().await;
    let login = h.auth.login(TEST_USERNAME, TEST_PASSWORD).await.unwrap();

    let dispatch = h.auth.request_password_reset(TEST_EMAIL).await.unwrap();
    assert!(dispatch.email_sent);
    let ttl = (dispatch.expires_at - Utc::now()).num_seconds();
    assert!((3598..=3600).contains(&ttl));

    let token = h.reset_token(TEST_USERNAME);
    let outcome = h.auth.reset_password(&token, "newsecret").await.unwrap();
    assert_eq!(outcome.sessions_invalidated, 1);

    // Old access token is dead and the old password no longer works
    assert!(h
        .auth
        .sessions()
        .validate(&login.session.access_token)
        .await
        .is_err());
    assert!(matches!(
        h.auth.login(TEST_USERNAME, TEST_PASSWORD).await,
        Err(CredentialError::InvalidCredentials)
    ));

    let relogin = h.auth.login(TEST_USERNAME, "newsecret").await.unwrap();
    assert!(!relogin.reused);
    assert_ne!(relogin.session.access_token, login.session.access_token);

    // Reset token is single use
    assert!(matches!(
        h.auth.reset_password(&token, "another1").await,
        Err(CredentialError::ResetTokenNotFound)
    ));
}

#[tokio::test]
async fn test_reset_failure_keeps_password_and_token() {
    let h = TestHarness::new();
    h.verified_user().await;
    let login = h.auth.login(TEST_USERNAME, TEST_PASSWORD).await.unwrap();
    h.auth.request_password_reset(TEST_EMAIL).await.unwrap();
    let token = h.reset_token(TEST_USERNAME);

    // GIVEN: session invalidation fails mid-reset
    h.sessions.fail_bulk_invalidation.store(true, Ordering::SeqCst);
    let err = h.auth.reset_password(&token, "newsecret").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);

    // THEN: nothing was changed
    assert!(matches!(
        h.auth.login(TEST_USERNAME, "newsecret").await,
        Err(CredentialError::InvalidCredentials)
    ));
    assert_eq!(h.reset_token(TEST_USERNAME), token);

    // AND: the same token completes the reset once storage recovers
    h.sessions.fail_bulk_invalidation.store(false, Ordering::SeqCst);
    let outcome = h.auth.reset_password(&token, "newsecret").await.unwrap();
    assert_eq!(outcome.sessions_invalidated, 1);
    assert!(h
        .auth
        .sessions()
        .validate(&login.session.access_token)
        .await
        .is_err());
}

#[tokio::test]
async fn test_reset_password_rejections() {
    let h = TestHarness::new();
    h.verified_user().await;
    h.auth.request_password_reset(TEST_EMAIL).await.unwrap();
    let token = h.reset_token(TEST_USERNAME);

    let err = h.auth.reset_password(&token, "123").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    h.users
        .set_reset_expiry(TEST_USERNAME, Utc::now() - Duration::seconds(1));
    assert!(matches!(
        h.auth.reset_password(&token, "newsecret").await,
        Err(CredentialError::ResetTokenExpired)
    ));

    assert!(matches!(
        h.auth.request_password_reset("nobody@x.com").await,
        Err(CredentialError::UserNotFound)
    ));
}

// ============================================================================
// Bearer guard and lookup
// ============================================================================

#[tokio::test]
async fn test_authenticate_and_is_logged_in() {
    let h = TestHarness::new();
    h.verified_user().await;
    let login = h.auth.login(TEST_USERNAME, TEST_PASSWORD).await.unwrap();

    let auth = h
        .auth
        .authenticate(Some(&login.session.access_token))
        .await
        .unwrap();
    assert_eq!(auth.user.username, TEST_USERNAME);

    assert!(matches!(
        h.auth.authenticate(None).await,
        Err(CredentialError::MissingBearerToken)
    ));
    assert!(matches!(
        h.auth.authenticate(Some(&login.session.refresh_token)).await,
        Err(CredentialError::WrongTokenType { .. })
    ));

    match h.auth.is_logged_in(Some(&login.session.access_token)).await.unwrap() {
        LoginStatus::LoggedIn { username, .. } => assert_eq!(username, TEST_USERNAME),
        other => panic!("expected logged in, got {:?}", other),
    }
    assert_eq!(
        h.auth.is_logged_in(None).await.unwrap(),
        LoginStatus::NotLoggedIn { reason: None }
    );
}

#[tokio::test]
async fn test_lookup_user_precedence_and_phone_fanout() {
    let h = TestHarness::new();
    h.signup_default().await;
    h.users.insert_raw("bob", "b@x.com", TEST_PHONE);

    // Username wins over phone
    let query = LookupQuery {
        username: Some(TEST_USERNAME.to_string()),
        phone: Some(TEST_PHONE.to_string()),
        ..Default::default()
    };
    match h.auth.lookup_user(&query).await.unwrap() {
        UserLookup::One(user) => assert_eq!(user.username, TEST_USERNAME),
        other => panic!("expected one user, got {:?}", other),
    }

    let query = LookupQuery {
        phone: Some(TEST_PHONE.to_string()),
        ..Default::default()
    };
    match h.auth.lookup_user(&query).await.unwrap() {
        UserLookup::Many(users) => assert_eq!(users.len(), 2),
        other => panic!("expected many users, got {:?}", other),
    }

    let query = LookupQuery {
        email: Some("nobody@x.com".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        h.auth.lookup_user(&query).await,
        Err(CredentialError::UserNotFound)
    ));

    assert_eq!(
        h.auth
            .lookup_user(&LookupQuery::default())
            .await
            .unwrap_err()
            .kind(),
        ErrorKind::Validation
    );
}
