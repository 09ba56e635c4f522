//! Password custody of private keys
//!
//! ```text
//! password ──PBKDF2-HMAC-SHA256(salt, iterations)──▶ wrapping key
//! PKCS#8(private key) ──AES-256-GCM(wrapping key, iv)──▶ blob.ciphertext
//! ```
//!
//! The resulting blob is safe to hand to remote storage: without the
//! password it reveals nothing about the key. A wrong password and a damaged
//! blob fail identically with `WrongPasswordOrCorrupt`.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use secrecy::SecretString;
use zeroize::Zeroizing;

use seal_core::{
    EncryptedPrivateKeyBlob, SealError, SealResult, CONTENT_IV_SIZE, MIN_KDF_ITERATIONS,
};

use crate::kdf::{derive_wrapping_key, WrappingKey, RECOMMENDED_KDF_ITERATIONS};
use crate::keypair::{self, KeyPair, PrivateKey};
use crate::provider::{random_array, CryptoProvider, SystemProvider};

/// Salt length for new blobs.
pub const SALT_SIZE: usize = 16;

/// Generates key pairs and moves private keys in and out of password custody.
#[derive(Debug, Clone)]
pub struct KeyCustody<P = SystemProvider> {
    provider: P,
    iterations: u32,
}

impl Default for KeyCustody<SystemProvider> {
    fn default() -> Self {
        Self::new(SystemProvider)
    }
}

impl<P: CryptoProvider> KeyCustody<P> {
    /// Custody with the recommended iteration count.
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            iterations: RECOMMENDED_KDF_ITERATIONS,
        }
    }

    /// Custody with an explicit iteration count for new blobs.
    pub fn with_iterations(provider: P, iterations: u32) -> SealResult<Self> {
        if iterations < MIN_KDF_ITERATIONS {
            return Err(SealError::InvalidParameter(format!(
                "PBKDF2 iterations must be at least {MIN_KDF_ITERATIONS}, got {iterations}"
            )));
        }
        Ok(Self {
            provider,
            iterations,
        })
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn generate_key_pair(&self, bits: usize) -> SealResult<KeyPair> {
        keypair::generate_key_pair(&self.provider, bits)
    }

    pub fn derive_wrapping_key(
        &self,
        password: &SecretString,
        salt: &[u8],
        iterations: u32,
    ) -> SealResult<WrappingKey> {
        derive_wrapping_key(password, salt, iterations)
    }

    /// Encrypt a private key under a password, with fresh salt and IV.
    pub fn encrypt_private_key(
        &self,
        private: &PrivateKey,
        password: &SecretString,
    ) -> SealResult<EncryptedPrivateKeyBlob> {
        let salt: [u8; SALT_SIZE] = random_array(&self.provider);
        let iv: [u8; CONTENT_IV_SIZE] = random_array(&self.provider);
        let wrapping = derive_wrapping_key(password, &salt, self.iterations)?;

        let pkcs8 = private.to_pkcs8_der()?;
        let cipher = Aes256Gcm::new(wrapping.as_bytes().into());
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&iv), pkcs8.as_slice())
            .map_err(|e| SealError::InvalidParameter(format!("key encryption failed: {e}")))?;

        tracing::debug!(iterations = self.iterations, "encrypted private key under password");

        Ok(EncryptedPrivateKeyBlob {
            ciphertext,
            salt: salt.to_vec(),
            iv,
            kdf_iterations: self.iterations,
        })
    }

    /// Recover a private key from its blob.
    pub fn decrypt_private_key(
        &self,
        blob: &EncryptedPrivateKeyBlob,
        password: &SecretString,
    ) -> SealResult<PrivateKey> {
        decrypt_private_key(blob, password)
    }

    /// Re-encrypt a private key under a new password.
    ///
    /// Produces an entirely new blob (fresh salt and IV) at this custody's
    /// iteration count; the old blob is left untouched.
    pub fn change_password(
        &self,
        blob: &EncryptedPrivateKeyBlob,
        old_password: &SecretString,
        new_password: &SecretString,
    ) -> SealResult<EncryptedPrivateKeyBlob> {
        let private = decrypt_private_key(blob, old_password)?;
        self.encrypt_private_key(&private, new_password)
    }
}

/// Recover a private key from its blob. Needs no randomness.
pub fn decrypt_private_key(
    blob: &EncryptedPrivateKeyBlob,
    password: &SecretString,
) -> SealResult<PrivateKey> {
    let wrapping = derive_wrapping_key(password, &blob.salt, blob.kdf_iterations).map_err(|_| {
        if blob.kdf_iterations < MIN_KDF_ITERATIONS {
            SealError::malformed_key_blob("kdfIterations")
        } else {
            SealError::malformed_key_blob("salt")
        }
    })?;

    let cipher = Aes256Gcm::new(wrapping.as_bytes().into());
    let pkcs8 = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(&blob.iv), blob.ciphertext.as_slice())
            .map_err(|_| SealError::WrongPasswordOrCorrupt)?,
    );

    PrivateKey::from_pkcs8_der(&pkcs8).map_err(|_| SealError::WrongPasswordOrCorrupt)
}
