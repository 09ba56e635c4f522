pub mod config;
pub mod error;
pub mod types;

pub use error::{SealError, SealResult};
pub use types::{
    EncryptedPrivateKeyBlob, FileId, Identity, Metadata, RecipientEntry, SealedEnvelope,
    CONTENT_IV_SIZE, CONTENT_KEY_SIZE, CURRENT_VERSION, FILE_ID_SIZE, MIN_KDF_ITERATIONS,
    MIN_SALT_SIZE, TAG_SIZE,
};
