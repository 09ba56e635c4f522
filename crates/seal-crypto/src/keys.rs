//! Content keys and their per-recipient RSA-OAEP wrapping

use rsa::Oaep;
use sha2::Sha256;
use zeroize::Zeroize;

use seal_core::{SealError, SealResult, CONTENT_KEY_SIZE};

use crate::keypair::{PrivateKey, PublicKey};
use crate::provider::{random_array, CryptoProvider, ProviderRng};

/// A per-envelope 256-bit AES key. Zeroized on drop.
#[derive(Clone)]
pub struct ContentKey {
    bytes: [u8; CONTENT_KEY_SIZE],
}

impl ContentKey {
    pub fn from_bytes(bytes: [u8; CONTENT_KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; CONTENT_KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for ContentKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit content key.
pub fn generate_content_key<P: CryptoProvider + ?Sized>(provider: &P) -> ContentKey {
    ContentKey::from_bytes(random_array(provider))
}

/// Wrap (encrypt) a content key to a recipient's public key with
/// RSA-OAEP/SHA-256. Output length equals the recipient's modulus size.
pub fn wrap_key<P: CryptoProvider + ?Sized>(
    provider: &P,
    recipient: &PublicKey,
    content_key: &ContentKey,
) -> SealResult<Vec<u8>> {
    let mut rng = ProviderRng(provider);
    recipient
        .rsa()
        .encrypt(&mut rng, Oaep::new::<Sha256>(), content_key.as_bytes())
        .map_err(|e| SealError::KeyEncoding(format!("key wrapping failed: {e}")))
}

/// Unwrap (decrypt) a content key with the caller's private key.
///
/// Every failure, including a well-formed plaintext of the wrong length,
/// reports `DecryptionFailed` without detail.
pub fn unwrap_key(private: &PrivateKey, wrapped: &[u8]) -> SealResult<ContentKey> {
    let mut plaintext = private
        .rsa()
        .decrypt(Oaep::new::<Sha256>(), wrapped)
        .map_err(|_| SealError::DecryptionFailed)?;

    if plaintext.len() != CONTENT_KEY_SIZE {
        plaintext.zeroize();
        return Err(SealError::DecryptionFailed);
    }

    let mut key_bytes = [0u8; CONTENT_KEY_SIZE];
    key_bytes.copy_from_slice(&plaintext);
    plaintext.zeroize();

    Ok(ContentKey::from_bytes(key_bytes))
}
