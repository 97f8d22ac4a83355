/// Environment-driven configuration tests
///
/// Mutates process environment, so every test is serialized.
use serial_test::serial;
use session_tokens::test_utils::{test_identity, TEST_PRIVATE_KEY, TEST_PUBLIC_KEY, TEST_SECRET};
use session_tokens::{MemoryRevocationLedger, SessionTokenManager, TokenError, TokenSettings};
use std::env;
use std::sync::Arc;
use std::time::Duration;

const VARS: &[&str] = &[
    "SESSION_TOKEN_ALGORITHM",
    "SESSION_TOKEN_SECRET",
    "SESSION_TOKEN_PRIVATE_KEY",
    "SESSION_TOKEN_PUBLIC_KEY",
    "SESSION_TOKEN_LIFETIME_SECS",
    "SESSION_TOKEN_REFRESH_GRACE_SECS",
    "SESSION_TOKEN_CLOCK_SKEW_SECS",
    "SESSION_TOKEN_LEDGER_TIMEOUT_MS",
    "SESSION_TOKEN_CARRY_FORWARD_CLAIMS",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_from_env_defaults() {
    clear_env();
    env::set_var("SESSION_TOKEN_SECRET", TEST_SECRET);

    let settings = TokenSettings::from_env().unwrap();
    assert_eq!(settings.algorithm, "HS256");
    assert_eq!(settings.lifetime(), Duration::from_secs(3600));
    assert_eq!(settings.refresh_grace(), Duration::ZERO);
    assert_eq!(settings.clock_skew(), Duration::ZERO);
    assert_eq!(settings.ledger_timeout(), Duration::from_millis(2000));
    assert!(settings.carry_forward_claims);

    clear_env();
}

#[test]
#[serial]
fn test_from_env_overrides() {
    clear_env();
    env::set_var("SESSION_TOKEN_ALGORITHM", "RS256");
    env::set_var("SESSION_TOKEN_PRIVATE_KEY", TEST_PRIVATE_KEY);
    env::set_var("SESSION_TOKEN_PUBLIC_KEY", TEST_PUBLIC_KEY);
    env::set_var("SESSION_TOKEN_LIFETIME_SECS", "900");
    env::set_var("SESSION_TOKEN_REFRESH_GRACE_SECS", "120");
    env::set_var("SESSION_TOKEN_CLOCK_SKEW_SECS", "15");
    env::set_var("SESSION_TOKEN_LEDGER_TIMEOUT_MS", "250");
    env::set_var("SESSION_TOKEN_CARRY_FORWARD_CLAIMS", "false");

    let settings = TokenSettings::from_env().unwrap();
    assert_eq!(settings.lifetime_secs, 900);
    assert_eq!(settings.refresh_grace_secs, 120);
    assert_eq!(settings.clock_skew_secs, 15);
    assert_eq!(settings.ledger_timeout_ms, 250);
    assert!(!settings.carry_forward_claims);

    let manager =
        SessionTokenManager::new(&settings, Arc::new(MemoryRevocationLedger::new())).unwrap();
    let token = manager
        .issue(&test_identity("env-user"), None)
        .unwrap();
    let claims = tokio_test::block_on(manager.validate(token.as_str())).unwrap();
    assert_eq!(claims.expires_at() - claims.issued_at(), 900);

    clear_env();
}

#[test]
#[serial]
fn test_from_env_invalid_number() {
    clear_env();
    env::set_var("SESSION_TOKEN_LIFETIME_SECS", "one hour");

    let err = TokenSettings::from_env().unwrap_err();
    assert!(err.to_string().contains("SESSION_TOKEN_LIFETIME_SECS"));

    clear_env();
}

#[test]
#[serial]
fn test_manager_rejects_missing_secret() {
    clear_env();

    let settings = TokenSettings::from_env().unwrap();
    let result = SessionTokenManager::new(&settings, Arc::new(MemoryRevocationLedger::new()));
    assert!(matches!(result, Err(TokenError::Configuration(_))));
}

#[test]
#[serial]
fn test_manager_rejects_weak_secret() {
    clear_env();
    env::set_var("SESSION_TOKEN_SECRET", "password");

    let settings = TokenSettings::from_env().unwrap();
    let result = SessionTokenManager::new(&settings, Arc::new(MemoryRevocationLedger::new()));
    assert!(matches!(result, Err(TokenError::Configuration(_))));

    clear_env();
}
