//! Envelope opening
//!
//! Checks run in a fixed order, cheapest and least revealing first:
//! structure, expiry, membership, key unwrap, content authentication.
//! Expiry is checked before membership so an expired file looks the same
//! to everyone.

use seal_core::{Metadata, SealError, SealResult, SealedEnvelope};

use crate::codec::{self, format_timestamp, header_aad};
use crate::content::decrypt_content;
use crate::keypair::PrivateKey;
use crate::keys::unwrap_key;
use crate::provider::{CryptoProvider, SystemProvider};

/// Recovered plaintext and the envelope's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedFile {
    pub plaintext: Vec<u8>,
    pub metadata: Metadata,
}

/// Opens envelopes. The provider supplies the clock for expiry checks.
#[derive(Debug, Clone)]
pub struct EnvelopeOpener<P = SystemProvider> {
    provider: P,
}

impl Default for EnvelopeOpener<SystemProvider> {
    fn default() -> Self {
        Self::new(SystemProvider)
    }
}

impl<P: CryptoProvider> EnvelopeOpener<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Decode envelope bytes and open them.
    pub fn open(
        &self,
        bytes: &[u8],
        caller: &str,
        private_key: &PrivateKey,
    ) -> SealResult<OpenedFile> {
        let envelope = codec::decode(bytes)?;
        self.open_envelope(&envelope, caller, private_key)
    }

    /// Open an already-decoded envelope.
    pub fn open_envelope(
        &self,
        envelope: &SealedEnvelope,
        caller: &str,
        private_key: &PrivateKey,
    ) -> SealResult<OpenedFile> {
        codec::validate(envelope)?;

        if let Some(expires_at) = envelope.metadata.expires_at {
            if self.provider.now() > expires_at {
                tracing::info!(file_id = %envelope.file_id, "refusing to open expired envelope");
                return Err(SealError::Expired {
                    expired_at: format_timestamp(&expires_at),
                });
            }
        }

        let entry = envelope
            .recipient(caller)
            .ok_or(SealError::NotARecipient)?;

        let content_key = unwrap_key(private_key, &entry.wrapped_key)?;

        let aad = header_aad(&envelope.version, &envelope.file_id, &envelope.metadata)?;
        let plaintext = decrypt_content(
            &content_key,
            &envelope.content_iv,
            &aad,
            &envelope.ciphertext,
        )?;

        tracing::debug!(
            file_id = %envelope.file_id,
            identity = %entry.identity,
            "opened envelope"
        );

        Ok(OpenedFile {
            plaintext,
            metadata: envelope.metadata.clone(),
        })
    }
}
