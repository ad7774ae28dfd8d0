//! Password hashing with Argon2id
//!
//! Every hash carries its own random salt and cost parameters in PHC string
//! form. Verification fails closed: a record that does not parse is treated
//! exactly like a wrong password.

use argon2::password_hash::rand_core::{OsRng, RngCore};
use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;

use crate::auth::user::PasswordHashRecord;
use crate::config::AuthConfig;
use crate::error::{Result, RustyGuardError};

/// One-way, salted, deliberately slow password hasher
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
    params: Params,
    /// Hash of a random throwaway password, verified when no user matches
    dummy_hash: PasswordHashRecord,
}

impl PasswordHasher {
    /// Create a hasher with explicit Argon2id cost parameters
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| RustyGuardError::ConfigError(format!("Invalid argon2 parameters: {}", e)))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone());

        let mut throwaway = [0u8; 32];
        OsRng.fill_bytes(&mut throwaway);
        let throwaway = base64::engine::general_purpose::STANDARD_NO_PAD.encode(throwaway);
        let dummy_hash = Self::hash_with(&argon2, &throwaway)?;

        Ok(Self {
            argon2,
            params,
            dummy_hash,
        })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        Self::new(config.hash_memory_kib, config.hash_iterations, config.hash_parallelism)
    }

    fn hash_with(argon2: &Argon2<'static>, plaintext: &str) -> Result<PasswordHashRecord> {
        let salt = SaltString::generate(&mut OsRng);
        argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|h| PasswordHashRecord::new(h.to_string()))
            .map_err(|e| RustyGuardError::SystemError(format!("Password hashing failed: {}", e)))
    }

    /// Hash a plaintext password with a fresh salt
    pub fn hash(&self, plaintext: &str) -> Result<PasswordHashRecord> {
        Self::hash_with(&self.argon2, plaintext)
    }

    /// Verify a plaintext against a stored record.
    /// Returns false for a wrong password and for a malformed record alike.
    pub fn verify(&self, plaintext: &str, record: &PasswordHashRecord) -> bool {
        match PasswordHash::new(record.as_phc()) {
            Ok(parsed) => self.argon2.verify_password(plaintext.as_bytes(), &parsed).is_ok(),
            Err(_) => {
                log::debug!("Stored password hash could not be parsed; failing closed");
                false
            }
        }
    }

    /// Spend the same work as a real verification against a throwaway hash.
    /// Always returns false.
    pub fn verify_dummy(&self, plaintext: &str) -> bool {
        let _ = self.verify(plaintext, &self.dummy_hash);
        false
    }

    /// True when a record was produced with different cost parameters than
    /// the ones currently configured
    pub fn needs_rehash(&self, record: &PasswordHashRecord) -> bool {
        let Ok(parsed) = PasswordHash::new(record.as_phc()) else {
            return true;
        };
        match Params::try_from(&parsed) {
            Ok(stored) => {
                stored.m_cost() != self.params.m_cost()
                    || stored.t_cost() != self.params.t_cost()
                    || stored.p_cost() != self.params.p_cost()
            }
            Err(_) => true,
        }
    }
}
