use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::{SealError, SealResult};

/// Envelope format version written by this implementation.
pub const CURRENT_VERSION: &str = "2";

/// Size of an envelope file identifier (128-bit)
pub const FILE_ID_SIZE: usize = 16;

/// Size of the per-envelope content key (256-bit)
pub const CONTENT_KEY_SIZE: usize = 32;

/// Size of an AES-GCM IV (96-bit)
pub const CONTENT_IV_SIZE: usize = 12;

/// Size of an AES-GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Smallest accepted PBKDF2 salt
pub const MIN_SALT_SIZE: usize = 16;

/// Lowest accepted PBKDF2 iteration count
pub const MIN_KDF_ITERATIONS: u32 = 100_000;

/// A recipient identity (an email address), trimmed and lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    pub fn new(raw: &str) -> SealResult<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty()
            || normalized
                .chars()
                .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(SealError::InvalidIdentity(raw.to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against an unnormalized string.
    pub fn matches(&self, other: &str) -> bool {
        self.0 == other.trim().to_lowercase()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Identity {
    type Err = SealError;

    fn from_str(s: &str) -> SealResult<Self> {
        Self::new(s)
    }
}

/// Random 128-bit envelope identifier, rendered as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId([u8; FILE_ID_SIZE]);

impl FileId {
    pub fn from_bytes(bytes: [u8; FILE_ID_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FILE_ID_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let mut bytes = [0u8; FILE_ID_SIZE];
        hex::decode_to_slice(s, &mut bytes).ok()?;
        Some(Self(bytes))
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Descriptive metadata carried in the clear alongside the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub filename: String,
    pub mime_type: String,
    /// Plaintext size in bytes
    pub size: u64,
    pub created_at: DateTime<Utc>,
    /// `None` means the envelope never expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl Metadata {
    /// True once `now` is strictly past `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if now > at)
    }
}

/// One recipient's copy of the content key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientEntry {
    pub identity: Identity,
    /// RSA-OAEP ciphertext of the 256-bit content key
    pub wrapped_key: Vec<u8>,
}

/// A sealed multi-recipient file. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedEnvelope {
    pub version: String,
    pub file_id: FileId,
    pub metadata: Metadata,
    pub content_iv: [u8; CONTENT_IV_SIZE],
    pub recipients: Vec<RecipientEntry>,
    /// AES-256-GCM output, tag included
    pub ciphertext: Vec<u8>,
}

impl SealedEnvelope {
    pub fn recipient(&self, identity: &str) -> Option<&RecipientEntry> {
        self.recipients.iter().find(|r| r.identity.matches(identity))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.metadata.is_expired(now)
    }
}

/// A private key encrypted under a password-derived key.
///
/// Replaced wholesale on password change.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedPrivateKeyBlob {
    pub ciphertext: Vec<u8>,
    pub salt: Vec<u8>,
    pub iv: [u8; CONTENT_IV_SIZE],
    pub kdf_iterations: u32,
}

impl fmt::Debug for EncryptedPrivateKeyBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedPrivateKeyBlob")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("salt_len", &self.salt.len())
            .field("kdf_iterations", &self.kdf_iterations)
            .finish()
    }
}
