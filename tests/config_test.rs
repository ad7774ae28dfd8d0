//! Environment-driven configuration loading

use rusty_guard::config::AuthConfig;
use std::env;
use std::sync::Mutex;

// Tests in this file mutate process-wide environment variables
static ENV_LOCK: Mutex<()> = Mutex::new(());

const VARS: &[&str] = &[
    "RUSTY_GUARD_JWT_SECRET",
    "JWT_SECRET",
    "RUSTY_GUARD_JWT_KEY_ID",
    "RUSTY_GUARD_JWT_PREVIOUS_SECRET",
    "RUSTY_GUARD_JWT_PREVIOUS_KEY_ID",
    "RUSTY_GUARD_ACCESS_TOKEN_TTL_SECS",
    "RUSTY_GUARD_REFRESH_TOKEN_TTL_SECS",
    "RUSTY_GUARD_RATE_LIMIT_MAX_ATTEMPTS",
    "RUSTY_GUARD_TRUSTED_PROXIES",
    "RUSTY_GUARD_ENABLE_TLS",
    "RUSTY_GUARD_TLS_CERT_PATH",
    "RUSTY_GUARD_TLS_KEY_PATH",
    "RUSTY_GUARD_COOKIE_SECURE",
    "RUSTY_GUARD_DEVELOPMENT_MODE",
];

const GOOD_KEY: &str = "q7R2-vXk9_Lm3pZ8wT4yB6nC1dF5gH0jK";
const OTHER_KEY: &str = "a9B8-cD7e_F6gH5iJ4kL3mN2oP1qR0sTu";

fn with_env<F: FnOnce()>(vars: &[(&str, &str)], test: F) {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let saved: Vec<(&str, Option<String>)> = VARS.iter().map(|name| (*name, env::var(name).ok())).collect();
    for name in VARS {
        env::remove_var(name);
    }
    for (name, value) in vars {
        env::set_var(name, value);
    }

    test();

    for (name, value) in saved {
        match value {
            Some(value) => env::set_var(name, value),
            None => env::remove_var(name),
        }
    }
}

#[test]
fn test_secret_is_required() {
    with_env(&[], || {
        let error = AuthConfig::from_env().unwrap_err();
        assert!(error.to_string().contains("JWT_SECRET"));
    });
}

#[test]
fn test_defaults_with_valid_secret() {
    with_env(&[("RUSTY_GUARD_JWT_SECRET", GOOD_KEY)], || {
        let config = AuthConfig::from_env().unwrap();
        assert_eq!(config.access_token_ttl.as_secs(), 15 * 60);
        assert_eq!(config.rate_limit_max_attempts, 5);
        assert_eq!(config.signing_key.key_id, "k1");
        assert!(config.previous_signing_key.is_none());
        assert!(config.cookie_secure);
        assert!(!config.development_mode);
    });
}

#[test]
fn test_overrides_are_applied() {
    with_env(
        &[
            ("JWT_SECRET", GOOD_KEY),
            ("RUSTY_GUARD_ACCESS_TOKEN_TTL_SECS", "600"),
            ("RUSTY_GUARD_RATE_LIMIT_MAX_ATTEMPTS", "3"),
            ("RUSTY_GUARD_TRUSTED_PROXIES", "10.0.0.1, 10.0.0.2,not-an-ip"),
        ],
        || {
            let config = AuthConfig::from_env().unwrap();
            assert_eq!(config.access_token_ttl.as_secs(), 600);
            assert_eq!(config.rate_limit_max_attempts, 3);
            assert_eq!(config.trusted_proxies.len(), 2);
        },
    );
}

#[test]
fn test_insecure_secrets_rejected() {
    for secret in [
        "short",
        "your-secret-key_padding_to_32_characters",
        "changeme_changeme_changeme_changeme",
        "abcdefghijklmnopqrstuvwxyzabcdefghij",
    ] {
        with_env(&[("RUSTY_GUARD_JWT_SECRET", secret)], || {
            assert!(AuthConfig::from_env().is_err(), "accepted {}", secret);
        });
    }
}

#[test]
fn test_previous_key_must_differ_and_be_named() {
    with_env(
        &[
            ("RUSTY_GUARD_JWT_SECRET", GOOD_KEY),
            ("RUSTY_GUARD_JWT_PREVIOUS_SECRET", GOOD_KEY),
            ("RUSTY_GUARD_JWT_PREVIOUS_KEY_ID", "k0"),
        ],
        || {
            let error = AuthConfig::from_env().unwrap_err();
            assert!(error.to_string().contains("must be different"));
        },
    );

    with_env(
        &[
            ("RUSTY_GUARD_JWT_SECRET", GOOD_KEY),
            ("RUSTY_GUARD_JWT_PREVIOUS_SECRET", OTHER_KEY),
        ],
        || assert!(AuthConfig::from_env().is_err()),
    );

    with_env(
        &[
            ("RUSTY_GUARD_JWT_SECRET", GOOD_KEY),
            ("RUSTY_GUARD_JWT_KEY_ID", "k2"),
            ("RUSTY_GUARD_JWT_PREVIOUS_SECRET", OTHER_KEY),
            ("RUSTY_GUARD_JWT_PREVIOUS_KEY_ID", "k1"),
        ],
        || {
            let config = AuthConfig::from_env().unwrap();
            assert_eq!(config.previous_signing_key.map(|k| k.key_id), Some("k1".to_string()));
        },
    );
}

#[test]
fn test_inconsistent_ttls_rejected() {
    with_env(
        &[
            ("RUSTY_GUARD_JWT_SECRET", GOOD_KEY),
            ("RUSTY_GUARD_ACCESS_TOKEN_TTL_SECS", "7200"),
            ("RUSTY_GUARD_REFRESH_TOKEN_TTL_SECS", "3600"),
        ],
        || assert!(AuthConfig::from_env().is_err()),
    );
}

#[test]
fn test_tls_requires_existing_files() {
    with_env(
        &[
            ("RUSTY_GUARD_JWT_SECRET", GOOD_KEY),
            ("RUSTY_GUARD_ENABLE_TLS", "true"),
            ("RUSTY_GUARD_TLS_CERT_PATH", "/nonexistent/cert.pem"),
            ("RUSTY_GUARD_TLS_KEY_PATH", "/nonexistent/key.pem"),
        ],
        || {
            let error = AuthConfig::from_env().unwrap_err();
            assert!(error.to_string().contains("does not exist"));
        },
    );
}

#[test]
fn test_production_warnings() {
    with_env(
        &[
            ("RUSTY_GUARD_JWT_SECRET", GOOD_KEY),
            ("RUSTY_GUARD_COOKIE_SECURE", "false"),
        ],
        || {
            let config = AuthConfig::from_env().unwrap();
            let warnings = config.warn_insecure_settings();
            assert!(warnings.iter().any(|w| w.contains("Secure")));
            assert!(warnings.iter().any(|w| w.contains("TLS")));
        },
    );
}
