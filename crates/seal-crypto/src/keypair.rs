//! RSA-OAEP key pairs, their encodings, and public key fingerprints
//!
//! Public keys travel as SubjectPublicKeyInfo DER (base64 for text
//! transport); private keys serialize to PKCS#8 DER held in zeroizing
//! buffers. Both use the fixed public exponent 65537.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use seal_core::{SealError, SealResult};

use crate::provider::{CryptoProvider, ProviderRng};

/// Key sizes accepted for new key pairs.
pub const SUPPORTED_KEY_BITS: [usize; 2] = [2048, 4096];

/// Smallest recipient key accepted when sealing.
pub const MIN_KEY_BITS: usize = 2048;

/// Number of hash bytes shown in a fingerprint.
pub const FINGERPRINT_BYTES: usize = 16;

const PUBLIC_EXPONENT: u64 = 65537;

/// A recipient's public key. Shared freely.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    inner: RsaPublicKey,
}

impl PublicKey {
    /// Parse SubjectPublicKeyInfo DER.
    pub fn from_der(der: &[u8]) -> SealResult<Self> {
        let inner = RsaPublicKey::from_public_key_der(der)
            .map_err(|e| SealError::KeyEncoding(format!("public key DER: {e}")))?;
        Ok(Self { inner })
    }

    pub fn from_base64(s: &str) -> SealResult<Self> {
        let der = B64
            .decode(s.trim())
            .map_err(|e| SealError::KeyEncoding(format!("public key base64: {e}")))?;
        Self::from_der(&der)
    }

    pub fn from_pem(pem: &str) -> SealResult<Self> {
        let inner = RsaPublicKey::from_public_key_pem(pem)
            .map_err(|e| SealError::KeyEncoding(format!("public key PEM: {e}")))?;
        Ok(Self { inner })
    }

    pub fn to_der(&self) -> SealResult<Vec<u8>> {
        let doc = self
            .inner
            .to_public_key_der()
            .map_err(|e| SealError::KeyEncoding(format!("public key DER: {e}")))?;
        Ok(doc.as_bytes().to_vec())
    }

    pub fn to_base64(&self) -> SealResult<String> {
        Ok(B64.encode(self.to_der()?))
    }

    pub fn to_pem(&self) -> SealResult<String> {
        self.inner
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| SealError::KeyEncoding(format!("public key PEM: {e}")))
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.inner.size() * 8
    }

    pub fn fingerprint(&self) -> SealResult<String> {
        Ok(fingerprint(&self.to_der()?))
    }

    pub(crate) fn rsa(&self) -> &RsaPublicKey {
        &self.inner
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey")
            .field("bits", &self.bits())
            .finish()
    }
}

/// A plaintext private key. Never serialized except through key custody.
///
/// The RSA components are zeroized when the key is dropped.
#[derive(Clone)]
pub struct PrivateKey {
    inner: RsaPrivateKey,
}

impl PrivateKey {
    /// Parse PKCS#8 DER.
    pub fn from_pkcs8_der(der: &[u8]) -> SealResult<Self> {
        let inner = RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| SealError::KeyEncoding(format!("private key DER: {e}")))?;
        Ok(Self { inner })
    }

    pub fn to_pkcs8_der(&self) -> SealResult<Zeroizing<Vec<u8>>> {
        let doc = self
            .inner
            .to_pkcs8_der()
            .map_err(|e| SealError::KeyEncoding(format!("private key DER: {e}")))?;
        Ok(Zeroizing::new(doc.as_bytes().to_vec()))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: self.inner.to_public_key(),
        }
    }

    pub(crate) fn rsa(&self) -> &RsaPrivateKey {
        &self.inner
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// An account's key pair.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public: PublicKey,
    pub private: PrivateKey,
}

/// Generate an RSA key pair for OAEP/SHA-256 with exponent 65537.
pub fn generate_key_pair<P: CryptoProvider + ?Sized>(
    provider: &P,
    bits: usize,
) -> SealResult<KeyPair> {
    if !SUPPORTED_KEY_BITS.contains(&bits) {
        return Err(SealError::InvalidParameter(format!(
            "key size must be 2048 or 4096 bits, got {bits}"
        )));
    }

    let mut rng = ProviderRng(provider);
    let exponent = BigUint::from(PUBLIC_EXPONENT);
    let private = RsaPrivateKey::new_with_exp(&mut rng, bits, &exponent)
        .map_err(|e| SealError::KeyEncoding(format!("RSA key generation failed: {e}")))?;
    let public = private.to_public_key();

    tracing::debug!(bits, "generated RSA key pair");

    Ok(KeyPair {
        public: PublicKey { inner: public },
        private: PrivateKey { inner: private },
    })
}

/// SSH-style fingerprint: SHA-256 of the public key bytes, first 16 bytes
/// as colon-separated lowercase hex pairs.
pub fn fingerprint(public_key_bytes: &[u8]) -> String {
    let digest = Sha256::digest(public_key_bytes);
    digest[..FINGERPRINT_BYTES]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}
