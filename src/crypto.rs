//! Cryptogragic logics.

use std::sync::Arc;

use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Argon2, Params, Version};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::config::Argon2 as ArgonConfig;
use crate::error::ServerError;

type Result<T> = std::result::Result<T, CryptoError>;

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("argon2 error: {0}")]
    Argon2(String),
    #[error("hashing task panicked")]
    Join(#[from] tokio::task::JoinError),
}

/// Password manager that uses Argon2id and PHC string format for hashing and
/// verification.
#[derive(Debug, Clone)]
pub struct PasswordManager {
    params: Params,
}

impl PasswordManager {
    /// Create a new [`PasswordManager`].
    pub fn new(config: Option<ArgonConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();

        let params = Params::new(
            config.memory_cost,
            config.iterations,
            config.parallelism,
            Some(config.hash_length),
        )
        .map_err(|err| CryptoError::Argon2(err.to_string()))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'_> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
    }

    /// Hash password using Argon2id.
    pub fn hash_password(&self, password: impl AsRef<[u8]>) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_ref(), &salt)
            .map_err(|e| CryptoError::Argon2(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Verify password against a PHC.
    ///
    /// A malformed digest is reported exactly like a mismatch.
    pub fn verify_password(
        &self,
        password: impl AsRef<[u8]>,
        phc_hash: &str,
    ) -> std::result::Result<(), ServerError> {
        let parsed =
            PasswordHash::new(phc_hash).map_err(|_| ServerError::InvalidPassword)?;

        self.argon2()
            .verify_password(password.as_ref(), &parsed)
            .map_err(|_| ServerError::InvalidPassword)
    }

    /// Hash on the blocking pool.
    pub async fn hash_async(self: &Arc<Self>, password: String) -> Result<String> {
        let pwd = Arc::clone(self);
        tokio::task::spawn_blocking(move || pwd.hash_password(password)).await?
    }

    /// Verify on the blocking pool.
    pub async fn verify_async(
        self: &Arc<Self>,
        password: String,
        phc_hash: String,
    ) -> std::result::Result<(), ServerError> {
        let pwd = Arc::clone(self);
        tokio::task::spawn_blocking(move || pwd.verify_password(password, &phc_hash))
            .await
            .map_err(CryptoError::from)?
    }
}

/// Short SHA-256 digest used to bind a link to the state it acts on.
pub fn fingerprint(data: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_ref());
    let hash = hasher.finalize();

    hex::encode(&hash[..16])
}

#[cfg(test)]
pub(crate) fn test_password_manager() -> Arc<PasswordManager> {
    let config = ArgonConfig {
        memory_cost: 1024,
        iterations: 1,
        parallelism: 1,
        hash_length: 32,
    };
    Arc::new(PasswordManager::new(Some(config)).unwrap())
}
