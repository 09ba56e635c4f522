//! AES-256-GCM encryption of the envelope payload
//!
//! ```text
//! ciphertext = AES-256-GCM(key = content key, iv = contentIv, aad = header)
//!            = [N bytes: encrypted payload][16 bytes: GCM tag]
//! ```
//!
//! The AAD binds the payload to its envelope header (see `codec::header_aad`),
//! so a ciphertext cannot be moved into another envelope and header fields
//! cannot be edited without failing authentication.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};

use seal_core::{SealError, SealResult, CONTENT_IV_SIZE, TAG_SIZE};

use crate::keys::ContentKey;

/// Encrypt a payload under the content key.
///
/// Returns `[ciphertext][16-byte tag]`.
pub fn encrypt_content(
    key: &ContentKey,
    iv: &[u8; CONTENT_IV_SIZE],
    aad: &[u8],
    plaintext: &[u8],
) -> SealResult<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .encrypt(
            Nonce::from_slice(iv),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| SealError::InvalidParameter(format!("content encryption failed: {e}")))
}

/// Decrypt and authenticate a payload. Any tag mismatch is `TamperedContent`.
pub fn decrypt_content(
    key: &ContentKey,
    iv: &[u8; CONTENT_IV_SIZE],
    aad: &[u8],
    ciphertext: &[u8],
) -> SealResult<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(SealError::TamperedContent);
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .decrypt(
            Nonce::from_slice(iv),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| SealError::TamperedContent)
}
