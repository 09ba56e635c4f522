//! Key derivation: PBKDF2-HMAC-SHA256 password → wrapping key

use pbkdf2::pbkdf2_hmac;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::Zeroize;

use seal_core::{SealError, SealResult, CONTENT_KEY_SIZE, MIN_KDF_ITERATIONS, MIN_SALT_SIZE};

/// Iteration count used for new key blobs unless configured otherwise.
pub const RECOMMENDED_KDF_ITERATIONS: u32 = 600_000;

/// A 256-bit AES key derived from a password.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct WrappingKey {
    bytes: [u8; CONTENT_KEY_SIZE],
}

impl WrappingKey {
    pub fn as_bytes(&self) -> &[u8; CONTENT_KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for WrappingKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for WrappingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrappingKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive a 256-bit wrapping key from a password and salt.
///
/// Deterministic for identical inputs. The salt must be at least 16 bytes
/// and is stored next to the ciphertext; it does not need to be secret.
pub fn derive_wrapping_key(
    password: &SecretString,
    salt: &[u8],
    iterations: u32,
) -> SealResult<WrappingKey> {
    if iterations < MIN_KDF_ITERATIONS {
        return Err(SealError::InvalidParameter(format!(
            "PBKDF2 iterations must be at least {MIN_KDF_ITERATIONS}, got {iterations}"
        )));
    }
    if salt.len() < MIN_SALT_SIZE {
        return Err(SealError::InvalidParameter(format!(
            "salt must be at least {MIN_SALT_SIZE} bytes, got {}",
            salt.len()
        )));
    }

    let mut bytes = [0u8; CONTENT_KEY_SIZE];
    pbkdf2_hmac::<Sha256>(
        password.expose_secret().as_bytes(),
        salt,
        iterations,
        &mut bytes,
    );
    Ok(WrappingKey { bytes })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: u32 = MIN_KDF_ITERATIONS;

    #[test]
    fn test_kdf_deterministic() {
        let password = SecretString::from("correct horse battery staple");
        let salt = [1u8; 16];

        let key1 = derive_wrapping_key(&password, &salt, FAST).unwrap();
        let key2 = derive_wrapping_key(&password, &salt, FAST).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes(), "KDF must be deterministic");
    }

    #[test]
    fn test_kdf_different_passwords() {
        let salt = [1u8; 16];
        let key1 = derive_wrapping_key(&SecretString::from("password-a"), &salt, FAST).unwrap();
        let key2 = derive_wrapping_key(&SecretString::from("password-b"), &salt, FAST).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_kdf_different_salts() {
        let password = SecretString::from("same-password");
        let key1 = derive_wrapping_key(&password, &[1u8; 16], FAST).unwrap();
        let key2 = derive_wrapping_key(&password, &[2u8; 16], FAST).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes(), "salt must change the key");
    }

    #[test]
    fn test_kdf_different_iterations() {
        let password = SecretString::from("same-password");
        let salt = [7u8; 16];
        let key1 = derive_wrapping_key(&password, &salt, FAST).unwrap();
        let key2 = derive_wrapping_key(&password, &salt, FAST + 1).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes(), "iteration count must change the key");
    }

    #[test]
    fn test_kdf_rejects_low_iterations() {
        let result = derive_wrapping_key(&SecretString::from("pw"), &[0u8; 16], 1_000);
        assert!(matches!(result, Err(SealError::InvalidParameter(_))));
    }

    #[test]
    fn test_kdf_rejects_short_salt() {
        let result = derive_wrapping_key(&SecretString::from("pw"), &[0u8; 8], FAST);
        assert!(matches!(result, Err(SealError::InvalidParameter(_))));
    }

    #[test]
    fn test_debug_redacts() {
        let key = derive_wrapping_key(&SecretString::from("pw"), &[0u8; 16], FAST).unwrap();
        assert!(format!("{key:?}").contains("REDACTED"));
    }
}
