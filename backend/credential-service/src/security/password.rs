/// Password hashing and verification using Argon2id
use crate::config::PasswordSettings;
use crate::error::{CredentialError, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

/// Hashes credentials with the configured work factor and flags stale digests
#[derive(Clone)]
pub struct PasswordGuard {
    params: Params,
}

impl PasswordGuard {
    /// Build a guard from the configured Argon2id cost parameters
    ///
    /// ## Errors
    ///
    /// Returns `CredentialError::Internal` when the parameters are out of
    /// range for Argon2 (e.g. memory below 8 KiB per lane).
    pub fn new(settings: &PasswordSettings) -> Result<Self> {
        let params = Params::new(
            settings.memory_kib,
            settings.time_cost,
            settings.parallelism,
            None,
        )
        .map_err(|e| CredentialError::Internal(format!("Invalid Argon2 parameters: {}", e)))?;

        Ok(Self { params })
    }

    fn hasher(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password with a fresh random salt
    ///
    /// Returns a PHC-formatted string that embeds the algorithm, version and
    /// cost parameters next to the salt and digest.
    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);

        let digest = self
            .hasher()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| CredentialError::Internal(format!("Password hashing failed: {}", e)))?
            .to_string();

        Ok(digest)
    }

    /// Constant-time check of `password` against a stored digest
    ///
    /// A digest that cannot be parsed never matches.
    pub fn verify(&self, password: &str, digest: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            tracing::warn!("Stored password digest is not a valid PHC string");
            return false;
        };

        // Verification reads the cost parameters out of the digest itself
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    /// True when the digest was produced with weaker settings than configured
    pub fn needs_rehash(&self, digest: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            return true;
        };

        if parsed.algorithm != Algorithm::Argon2id.ident() {
            return true;
        }

        match Params::try_from(&parsed) {
            Ok(embedded) => {
                embedded.m_cost() < self.params.m_cost()
                    || embedded.t_cost() < self.params.t_cost()
                    || embedded.p_cost() < self.params.p_cost()
            }
            Err(_) => true,
        }
    }
}
