use thiserror::Error;

pub type SealResult<T> = Result<T, SealError>;

/// Message shown for every failure whose cause must not be revealed.
pub const OPAQUE_FAILURE_MESSAGE: &str =
    "unable to decrypt: wrong key or password, or the data is damaged";

#[derive(Debug, Error)]
pub enum SealError {
    #[error("no recipients given")]
    NoRecipients,

    #[error("invalid public key for recipient {0}")]
    InvalidRecipientKey(String),

    #[error("malformed envelope: field `{field}`")]
    MalformedEnvelope { field: String },

    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(String),

    #[error("not a recipient of this file")]
    NotARecipient,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("content failed integrity check")]
    TamperedContent,

    #[error("file expired at {expired_at}")]
    Expired { expired_at: String },

    #[error("wrong password or corrupted key blob")]
    WrongPasswordOrCorrupt,

    #[error("malformed key blob: field `{field}`")]
    MalformedKeyBlob { field: String },

    #[error("invalid identity: {0:?}")]
    InvalidIdentity(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("no public key found for {0}")]
    RecipientNotFound(String),

    #[error("key encoding error: {0}")]
    KeyEncoding(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("directory error: {0}")]
    Directory(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SealError {
    pub fn malformed_envelope(field: impl Into<String>) -> Self {
        SealError::MalformedEnvelope {
            field: field.into(),
        }
    }

    pub fn malformed_key_blob(field: impl Into<String>) -> Self {
        SealError::MalformedKeyBlob {
            field: field.into(),
        }
    }

    /// Whether the failure came out of a cryptographic check whose exact cause
    /// must stay hidden from the user.
    pub fn is_crypto_opaque(&self) -> bool {
        matches!(
            self,
            SealError::DecryptionFailed
                | SealError::TamperedContent
                | SealError::WrongPasswordOrCorrupt
        )
    }

    /// Text suitable for showing to an end user.
    ///
    /// Wrong key, wrong password and corrupted data all collapse into a single
    /// sentence. Policy failures carry no cryptographic information and are
    /// reported precisely.
    pub fn user_message(&self) -> String {
        if self.is_crypto_opaque() {
            OPAQUE_FAILURE_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opaque_variants_share_one_message() {
        let msgs: Vec<String> = [
            SealError::DecryptionFailed,
            SealError::TamperedContent,
            SealError::WrongPasswordOrCorrupt,
        ]
        .iter()
        .map(|e| e.user_message())
        .collect();

        assert!(msgs.iter().all(|m| m == OPAQUE_FAILURE_MESSAGE));
    }

    #[test]
    fn test_policy_variants_are_precise() {
        assert_eq!(
            SealError::NotARecipient.user_message(),
            "not a recipient of this file"
        );
        assert_eq!(SealError::NoRecipients.user_message(), "no recipients given");
        let expired = SealError::Expired {
            expired_at: "2024-01-01T00:00:00.000Z".into(),
        };
        assert!(expired.user_message().contains("2024-01-01"));
    }

    #[test]
    fn test_malformed_names_field() {
        let err = SealError::malformed_envelope("recipients[1].wrappedKey");
        assert_eq!(
            err.to_string(),
            "malformed envelope: field `recipients[1].wrappedKey`"
        );
    }
}
