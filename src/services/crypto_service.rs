use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use std::num::NonZeroU32;
use zeroize::Zeroizing;

use crate::types::errors::StoreError;

/// PBKDF2 iteration count for password hashing.
const PBKDF2_ITERATIONS: u32 = 100_000;

/// Salt length in bytes for PBKDF2.
const SALT_LENGTH: usize = 16;

/// Password hash length in bytes.
const HASH_LENGTH: usize = 32;

/// Password hashing and random token generation for the local backend and
/// the share token issuer.
pub trait CryptoServiceTrait {
    /// Hashes a password with PBKDF2-HMAC-SHA256.
    fn hash_password(&self, password: &str, salt: &[u8]) -> Vec<u8>;

    /// Verifies a password against a stored hash in constant time.
    fn verify_password(&self, password: &str, salt: &[u8], hash: &[u8]) -> bool;

    /// Generates a cryptographically secure random salt.
    fn generate_salt(&self) -> Result<Vec<u8>, StoreError>;

    /// Generates cryptographically secure random bytes of the specified length.
    fn generate_random_bytes(&self, length: usize) -> Result<Vec<u8>, StoreError>;

    /// Generates an opaque URL-safe token from `byte_len` random bytes.
    fn generate_token(&self, byte_len: usize) -> Result<String, StoreError>;
}

/// Implementation backed by the `ring` crate.
pub struct CryptoService {
    rng: SystemRandom,
}

impl CryptoService {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }

    fn iterations() -> NonZeroU32 {
        NonZeroU32::new(PBKDF2_ITERATIONS).unwrap_or(NonZeroU32::MIN)
    }
}

impl Default for CryptoService {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoServiceTrait for CryptoService {
    fn hash_password(&self, password: &str, salt: &[u8]) -> Vec<u8> {
        let mut hash = vec![0u8; HASH_LENGTH];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            Self::iterations(),
            salt,
            password.as_bytes(),
            &mut hash,
        );
        hash
    }

    fn verify_password(&self, password: &str, salt: &[u8], hash: &[u8]) -> bool {
        let password = Zeroizing::new(password.as_bytes().to_vec());
        pbkdf2::verify(
            pbkdf2::PBKDF2_HMAC_SHA256,
            Self::iterations(),
            salt,
            &password,
            hash,
        )
        .is_ok()
    }

    fn generate_salt(&self) -> Result<Vec<u8>, StoreError> {
        self.generate_random_bytes(SALT_LENGTH)
    }

    fn generate_random_bytes(&self, length: usize) -> Result<Vec<u8>, StoreError> {
        let mut bytes = vec![0u8; length];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| StoreError::Database("system random source unavailable".to_string()))?;
        Ok(bytes)
    }

    fn generate_token(&self, byte_len: usize) -> Result<String, StoreError> {
        let bytes = Zeroizing::new(self.generate_random_bytes(byte_len)?);
        Ok(URL_SAFE_NO_PAD.encode(bytes.as_slice()))
    }
}
