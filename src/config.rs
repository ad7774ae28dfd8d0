//! Service configuration module
//! Handles the tunable parameters of the authentication service

use crate::constants::*;
use crate::error::{Result, RustyGuardError};
use std::env;
use std::net::IpAddr;
use std::time::Duration;

/// A named HMAC signing key
#[derive(Clone)]
pub struct SigningKeyConfig {
    pub key_id: String,
    pub secret: String,
}

impl std::fmt::Debug for SigningKeyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyConfig")
            .field("key_id", &self.key_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Authentication service configuration parameters
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub host: String,
    pub port: u16,
    /// Lifetime of stateless access tokens; also the staleness bound for role changes
    pub access_token_ttl: Duration,
    /// Upper bound for one refresh token. Refresh also needs the session, so
    /// a token family never outlives `session_ttl`.
    pub refresh_token_ttl: Duration,
    pub session_ttl: Duration,
    /// Tolerance applied to `nbf`/`iat` checks
    pub clock_leeway: Duration,
    /// Key used to sign new tokens
    pub signing_key: SigningKeyConfig,
    /// Key still accepted for verification during the rotation overlap
    pub previous_signing_key: Option<SigningKeyConfig>,
    pub key_rotation_overlap: Duration,
    /// Argon2id memory cost in KiB
    pub hash_memory_kib: u32,
    pub hash_iterations: u32,
    pub hash_parallelism: u32,
    pub rate_limit_window: Duration,
    pub rate_limit_max_attempts: u32,
    /// Upper bound on distinct identities tracked by the rate limiter
    pub rate_limit_tracked_keys: usize,
    /// Reject a login while another attempt for the same identity is in flight
    pub serialize_login_attempts: bool,
    pub session_cookie_name: String,
    pub cookie_secure: bool,
    pub storage_timeout: Duration,
    /// Number of concurrent password hash computations
    pub hashing_pool_size: usize,
    /// Maximum number of hash jobs waiting or running
    pub max_queued_hashes: usize,
    pub sweep_interval: Duration,
    /// Minimum duration of a failed login
    pub min_failure_duration: Duration,
    /// Development mode (relaxes production warnings)
    pub development_mode: bool,
    pub trusted_proxies: Vec<IpAddr>,
    /// TLS configuration
    pub enable_tls: bool,
    pub tls_cert_path: Option<String>,
    pub tls_key_path: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        panic!("AuthConfig::default() is not allowed for security reasons. Use AuthConfig::from_env() instead.");
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| v.to_lowercase() == "true" || v == "1")
        .unwrap_or(default)
}

impl AuthConfig {
    /// Configuration for tests - DANGEROUS: low hashing cost, fixed keys
    pub fn for_testing() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            access_token_ttl: Duration::from_secs(DEFAULT_ACCESS_TOKEN_TTL_SECS),
            refresh_token_ttl: Duration::from_secs(DEFAULT_REFRESH_TOKEN_TTL_SECS),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            clock_leeway: Duration::from_secs(DEFAULT_CLOCK_LEEWAY_SECS),
            signing_key: SigningKeyConfig {
                key_id: "test-k1".to_string(),
                secret: "test-jwt-key-only-for-unit-tests-never-use-in-production-1".to_string(),
            },
            previous_signing_key: None,
            key_rotation_overlap: Duration::from_secs(DEFAULT_KEY_ROTATION_OVERLAP_SECS),
            hash_memory_kib: 1024,
            hash_iterations: 1,
            hash_parallelism: 1,
            rate_limit_window: Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECS),
            rate_limit_max_attempts: DEFAULT_RATE_LIMIT_MAX_ATTEMPTS,
            rate_limit_tracked_keys: 1000,
            serialize_login_attempts: false,
            session_cookie_name: DEFAULT_SESSION_COOKIE.to_string(),
            cookie_secure: false,
            storage_timeout: Duration::from_millis(DEFAULT_STORAGE_TIMEOUT_MS),
            hashing_pool_size: 2,
            max_queued_hashes: 64,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            min_failure_duration: Duration::from_millis(0),
            development_mode: true,
            trusted_proxies: Vec::new(),
            enable_tls: false,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }

    /// Validate that a secret meets security requirements
    fn validate_secret(secret: &str, secret_type: &str) -> Result<()> {
        if secret.len() < 32 {
            return Err(RustyGuardError::ConfigError(format!(
                "{} secret must be at least 32 characters long",
                secret_type
            )));
        }

        // Check for insecure default or example values
        let insecure_patterns = [
            "your-secret-key",
            "change-this",
            "changeme",
            "test-secret",
            "default",
            "secret",
            "password",
            "12345",
        ];

        for pattern in &insecure_patterns {
            if secret.to_lowercase().contains(pattern) {
                return Err(RustyGuardError::ConfigError(format!(
                    "{} secret contains insecure pattern '{}'. Please use a secure random secret generated with: openssl rand -base64 32",
                    secret_type, pattern
                )));
            }
        }

        // Ensure some complexity
        if secret.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(RustyGuardError::ConfigError(format!(
                "{} secret should contain mixed characters (letters, numbers, symbols) for security",
                secret_type
            )));
        }

        Ok(())
    }

    /// The current and previous signing keys must not be interchangeable
    fn validate_rotation_keys(current: &SigningKeyConfig, previous: &SigningKeyConfig) -> Result<()> {
        if current.secret == previous.secret {
            return Err(RustyGuardError::ConfigError(
                "Previous JWT secret must be different from the current one. Rotating to the same key has no effect.".to_string(),
            ));
        }
        if current.key_id == previous.key_id {
            return Err(RustyGuardError::ConfigError(
                "Previous JWT key id must be different from the current key id".to_string(),
            ));
        }
        Ok(())
    }

    /// Check lifetimes and cost parameters for consistency
    pub fn validate(&self) -> Result<()> {
        if self.access_token_ttl.is_zero() || self.refresh_token_ttl.is_zero() || self.session_ttl.is_zero() {
            return Err(RustyGuardError::ConfigError(
                "Token and session TTLs must be greater than zero".to_string(),
            ));
        }
        if self.access_token_ttl >= self.refresh_token_ttl {
            return Err(RustyGuardError::ConfigError(
                "Access token TTL must be shorter than refresh token TTL".to_string(),
            ));
        }
        if self.rate_limit_max_attempts == 0 || self.rate_limit_window.is_zero() {
            return Err(RustyGuardError::ConfigError(
                "Rate limit window and max attempts must be greater than zero".to_string(),
            ));
        }
        if self.rate_limit_tracked_keys == 0 || self.hashing_pool_size == 0 || self.max_queued_hashes == 0 {
            return Err(RustyGuardError::ConfigError(
                "Rate limiter capacity and hashing pool sizes must be greater than zero".to_string(),
            ));
        }
        argon2::Params::new(self.hash_memory_kib, self.hash_iterations, self.hash_parallelism, None)
            .map_err(|e| RustyGuardError::ConfigError(format!("Invalid argon2 cost parameters: {}", e)))?;
        Ok(())
    }

    /// Load configuration from environment variables if available
    pub fn from_env() -> Result<Self> {
        let host = env::var("RUSTY_GUARD_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = env_parse("RUSTY_GUARD_PORT", DEFAULT_PORT);

        let secret = env::var("RUSTY_GUARD_JWT_SECRET")
            .or_else(|_| env::var("JWT_SECRET"))
            .map_err(|_| {
                RustyGuardError::ConfigError(
                    "JWT_SECRET environment variable is required for security. \
                     Generate one with: openssl rand -base64 32"
                        .to_string(),
                )
            })?;
        Self::validate_secret(&secret, "JWT")?;
        let signing_key = SigningKeyConfig {
            key_id: env::var("RUSTY_GUARD_JWT_KEY_ID").unwrap_or(DEFAULT_KEY_ID.to_string()),
            secret,
        };

        let previous_signing_key = match env::var("RUSTY_GUARD_JWT_PREVIOUS_SECRET") {
            Ok(previous) => {
                Self::validate_secret(&previous, "Previous JWT")?;
                let key_id = env::var("RUSTY_GUARD_JWT_PREVIOUS_KEY_ID").map_err(|_| {
                    RustyGuardError::ConfigError(
                        "RUSTY_GUARD_JWT_PREVIOUS_KEY_ID is required when a previous JWT secret is set"
                            .to_string(),
                    )
                })?;
                let previous = SigningKeyConfig { key_id, secret: previous };
                Self::validate_rotation_keys(&signing_key, &previous)?;
                Some(previous)
            }
            Err(_) => None,
        };

        let trusted_proxies = env::var("RUSTY_GUARD_TRUSTED_PROXIES")
            .map(|list| {
                list.split(',')
                    .filter_map(|ip| ip.trim().parse::<IpAddr>().ok())
                    .collect()
            })
            .unwrap_or_default();

        // TLS configuration
        let enable_tls = env_flag("RUSTY_GUARD_ENABLE_TLS", false);
        let tls_cert_path = env::var("RUSTY_GUARD_TLS_CERT_PATH").ok();
        let tls_key_path = env::var("RUSTY_GUARD_TLS_KEY_PATH").ok();

        if enable_tls {
            match (&tls_cert_path, &tls_key_path) {
                (Some(cert_path), Some(key_path)) => {
                    if !std::path::Path::new(cert_path).exists() {
                        return Err(RustyGuardError::ConfigError(format!(
                            "TLS certificate file does not exist: {}",
                            cert_path
                        )));
                    }
                    if !std::path::Path::new(key_path).exists() {
                        return Err(RustyGuardError::ConfigError(format!(
                            "TLS private key file does not exist: {}",
                            key_path
                        )));
                    }
                }
                _ => {
                    return Err(RustyGuardError::ConfigError(
                        "TLS is enabled but RUSTY_GUARD_TLS_CERT_PATH or RUSTY_GUARD_TLS_KEY_PATH is not set"
                            .to_string(),
                    ))
                }
            }
        }

        let config = Self {
            host,
            port,
            access_token_ttl: Duration::from_secs(env_parse(
                "RUSTY_GUARD_ACCESS_TOKEN_TTL_SECS",
                DEFAULT_ACCESS_TOKEN_TTL_SECS,
            )),
            refresh_token_ttl: Duration::from_secs(env_parse(
                "RUSTY_GUARD_REFRESH_TOKEN_TTL_SECS",
                DEFAULT_REFRESH_TOKEN_TTL_SECS,
            )),
            session_ttl: Duration::from_secs(env_parse("RUSTY_GUARD_SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS)),
            clock_leeway: Duration::from_secs(env_parse("RUSTY_GUARD_CLOCK_LEEWAY_SECS", DEFAULT_CLOCK_LEEWAY_SECS)),
            signing_key,
            previous_signing_key,
            key_rotation_overlap: Duration::from_secs(env_parse(
                "RUSTY_GUARD_KEY_ROTATION_OVERLAP_SECS",
                DEFAULT_KEY_ROTATION_OVERLAP_SECS,
            )),
            hash_memory_kib: env_parse("RUSTY_GUARD_HASH_MEMORY_KIB", DEFAULT_HASH_MEMORY_KIB),
            hash_iterations: env_parse("RUSTY_GUARD_HASH_ITERATIONS", DEFAULT_HASH_ITERATIONS),
            hash_parallelism: env_parse("RUSTY_GUARD_HASH_PARALLELISM", DEFAULT_HASH_PARALLELISM),
            rate_limit_window: Duration::from_secs(env_parse(
                "RUSTY_GUARD_RATE_LIMIT_WINDOW_SECS",
                DEFAULT_RATE_LIMIT_WINDOW_SECS,
            )),
            rate_limit_max_attempts: env_parse("RUSTY_GUARD_RATE_LIMIT_MAX_ATTEMPTS", DEFAULT_RATE_LIMIT_MAX_ATTEMPTS),
            rate_limit_tracked_keys: env_parse("RUSTY_GUARD_RATE_LIMIT_TRACKED_KEYS", DEFAULT_RATE_LIMIT_TRACKED_KEYS),
            serialize_login_attempts: env_flag("RUSTY_GUARD_SERIALIZE_LOGIN_ATTEMPTS", false),
            session_cookie_name: env::var("RUSTY_GUARD_SESSION_COOKIE")
                .unwrap_or(DEFAULT_SESSION_COOKIE.to_string()),
            cookie_secure: env_flag("RUSTY_GUARD_COOKIE_SECURE", true), // SECURITY: Default to true
            storage_timeout: Duration::from_millis(env_parse(
                "RUSTY_GUARD_STORAGE_TIMEOUT_MS",
                DEFAULT_STORAGE_TIMEOUT_MS,
            )),
            hashing_pool_size: env_parse("RUSTY_GUARD_HASHING_POOL_SIZE", DEFAULT_HASHING_POOL_SIZE),
            max_queued_hashes: env_parse("RUSTY_GUARD_MAX_QUEUED_HASHES", DEFAULT_MAX_QUEUED_HASHES),
            sweep_interval: Duration::from_secs(env_parse("RUSTY_GUARD_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS)),
            min_failure_duration: Duration::from_millis(env_parse(
                "RUSTY_GUARD_MIN_FAILURE_MS",
                DEFAULT_MIN_FAILURE_DURATION_MS,
            )),
            development_mode: env_flag("RUSTY_GUARD_DEVELOPMENT_MODE", false), // SECURITY: Default to production
            trusted_proxies,
            enable_tls,
            tls_cert_path,
            tls_key_path,
        };

        config.validate()?;
        Ok(config)
    }

    /// Log warnings for settings that should not reach production
    pub fn warn_insecure_settings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.development_mode {
            return warnings;
        }
        if !self.cookie_secure {
            warnings.push("Session cookie is sent without the Secure flag".to_string());
        }
        if !self.enable_tls {
            warnings.push("TLS is disabled; credentials travel in clear text unless a proxy terminates TLS".to_string());
        }
        if self.access_token_ttl > Duration::from_secs(3600) {
            warnings.push(format!(
                "Access token TTL of {}s exceeds one hour; revocation lag grows with it",
                self.access_token_ttl.as_secs()
            ));
        }
        if self.refresh_token_ttl > self.session_ttl {
            warnings.push(format!(
                "Refresh token TTL of {}s exceeds session TTL of {}s; refresh stops working when the session expires",
                self.refresh_token_ttl.as_secs(),
                self.session_ttl.as_secs()
            ));
        }
        for warning in &warnings {
            log::warn!("SECURITY: Production mode warning - {}", warning);
        }
        warnings
    }
}
