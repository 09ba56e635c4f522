//! Envelope assembly
//!
//! ```text
//! plaintext ──AES-256-GCM(CK, iv, aad = header)──▶ ciphertext
//! CK ──RSA-OAEP(recipient_1)──▶ wrappedKey_1
//! CK ──RSA-OAEP(recipient_n)──▶ wrappedKey_n
//! ```
//!
//! Sealing is all-or-nothing: every recipient key is parsed and checked
//! before anything is encrypted, and a failure to wrap for any recipient
//! discards the whole envelope.

use std::collections::HashSet;

use chrono::{SubsecRound, TimeDelta};
use rayon::prelude::*;

use seal_core::{
    FileId, Identity, Metadata, RecipientEntry, SealError, SealResult, SealedEnvelope,
    CONTENT_IV_SIZE, CURRENT_VERSION,
};

use crate::codec::header_aad;
use crate::content::encrypt_content;
use crate::directory::DirectoryLookup;
use crate::keypair::{PublicKey, MIN_KEY_BITS};
use crate::keys::{generate_content_key, wrap_key, ContentKey};
use crate::provider::{random_array, CryptoProvider, SystemProvider};

/// One requested recipient: an identity and its SPKI DER public key.
#[derive(Debug, Clone)]
pub struct Recipient {
    pub identity: String,
    pub public_key: Vec<u8>,
}

impl Recipient {
    pub fn new(identity: impl Into<String>, public_key_der: impl Into<Vec<u8>>) -> Self {
        Self {
            identity: identity.into(),
            public_key: public_key_der.into(),
        }
    }

    pub fn from_key(identity: impl Into<String>, key: &PublicKey) -> SealResult<Self> {
        Ok(Self::new(identity, key.to_der()?))
    }
}

/// Caller-supplied metadata for a new envelope.
#[derive(Debug, Clone, Default)]
pub struct SealOptions {
    pub filename: String,
    pub mime_type: String,
    /// Lifetime from now; `None` never expires. Negative values produce an
    /// envelope that is already expired. The resulting instant is truncated
    /// to whole milliseconds.
    pub expires_in: Option<TimeDelta>,
}

impl SealOptions {
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            expires_in: None,
        }
    }

    pub fn expires_in(mut self, lifetime: TimeDelta) -> Self {
        self.expires_in = Some(lifetime);
        self
    }
}

/// Builds sealed envelopes. Randomness and time come from the provider.
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder<P = SystemProvider> {
    provider: P,
    parallel: bool,
}

impl Default for EnvelopeBuilder<SystemProvider> {
    fn default() -> Self {
        Self::new(SystemProvider)
    }
}

impl<P: CryptoProvider> EnvelopeBuilder<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            parallel: true,
        }
    }

    /// Wrap the content key for each recipient on the rayon pool.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn seal(
        &self,
        plaintext: &[u8],
        recipients: &[Recipient],
        options: &SealOptions,
    ) -> SealResult<SealedEnvelope> {
        if recipients.is_empty() {
            return Err(SealError::NoRecipients);
        }

        let targets = prepare_recipients(recipients)?;

        let file_id = FileId::from_bytes(random_array(&self.provider));
        let content_key = generate_content_key(&self.provider);
        let content_iv: [u8; CONTENT_IV_SIZE] = random_array(&self.provider);

        // Millisecond precision so the header re-encodes identically after decode.
        let created_at = self.provider.now().trunc_subsecs(3);
        let expires_at = match options.expires_in {
            Some(lifetime) => Some(
                created_at
                    .checked_add_signed(lifetime)
                    .ok_or_else(|| SealError::InvalidParameter("expiry is out of range".into()))?
                    .trunc_subsecs(3),
            ),
            None => None,
        };

        let metadata = Metadata {
            filename: options.filename.clone(),
            mime_type: options.mime_type.clone(),
            size: plaintext.len() as u64,
            created_at,
            expires_at,
        };

        let aad = header_aad(CURRENT_VERSION, &file_id, &metadata)?;
        let ciphertext = encrypt_content(&content_key, &content_iv, &aad, plaintext)?;
        let recipients = self.wrap_all(&content_key, targets)?;

        tracing::debug!(
            file_id = %file_id,
            recipients = recipients.len(),
            size = metadata.size,
            "sealed envelope"
        );

        Ok(SealedEnvelope {
            version: CURRENT_VERSION.to_string(),
            file_id,
            metadata,
            content_iv,
            recipients,
            ciphertext,
        })
    }

    /// Resolve each identity through the directory, then seal.
    pub fn seal_for<S: AsRef<str>>(
        &self,
        plaintext: &[u8],
        identities: &[S],
        directory: &dyn DirectoryLookup,
        options: &SealOptions,
    ) -> SealResult<SealedEnvelope> {
        if identities.is_empty() {
            return Err(SealError::NoRecipients);
        }

        let mut recipients = Vec::with_capacity(identities.len());
        for raw in identities {
            let identity = Identity::new(raw.as_ref())?;
            let der = directory
                .resolve(&identity)?
                .ok_or_else(|| SealError::RecipientNotFound(identity.to_string()))?;
            recipients.push(Recipient::new(identity.as_str(), der));
        }

        self.seal(plaintext, &recipients, options)
    }

    fn wrap_all(
        &self,
        content_key: &ContentKey,
        targets: Vec<(Identity, PublicKey)>,
    ) -> SealResult<Vec<RecipientEntry>> {
        let wrap_one = |(identity, key): (Identity, PublicKey)| -> SealResult<RecipientEntry> {
            let wrapped_key = wrap_key(&self.provider, &key, content_key)
                .map_err(|_| SealError::InvalidRecipientKey(identity.to_string()))?;
            Ok(RecipientEntry {
                identity,
                wrapped_key,
            })
        };

        if self.parallel && targets.len() > 1 {
            // Indexed parallel collect keeps request order.
            targets.into_par_iter().map(wrap_one).collect()
        } else {
            targets.into_iter().map(wrap_one).collect()
        }
    }
}

/// Normalize, dedupe in request order, and parse every recipient key.
fn prepare_recipients(recipients: &[Recipient]) -> SealResult<Vec<(Identity, PublicKey)>> {
    let mut seen = HashSet::new();
    let mut targets = Vec::with_capacity(recipients.len());

    for recipient in recipients {
        let identity = Identity::new(&recipient.identity)?;
        if !seen.insert(identity.clone()) {
            tracing::debug!(identity = %identity, "dropping duplicate recipient");
            continue;
        }

        let key = PublicKey::from_der(&recipient.public_key)
            .map_err(|_| SealError::InvalidRecipientKey(identity.to_string()))?;
        if key.bits() < MIN_KEY_BITS {
            return Err(SealError::InvalidRecipientKey(identity.to_string()));
        }

        targets.push((identity, key));
    }

    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MemoryDirectory;
    use crate::test_keys::{alice, bob};

    fn recipients() -> Vec<Recipient> {
        vec![
            Recipient::from_key("Alice@Example.com", &alice().public).unwrap(),
            Recipient::from_key("bob@example.com", &bob().public).unwrap(),
        ]
    }

    #[test]
    fn test_no_recipients() {
        let result = EnvelopeBuilder::default().seal(b"x", &[], &SealOptions::default());
        assert!(matches!(result, Err(SealError::NoRecipients)));
    }

    #[test]
    fn test_seal_shape() {
        let plaintext = b"hello-seal";
        let env = EnvelopeBuilder::default()
            .seal(plaintext, &recipients(), &SealOptions::new("a.txt", "text/plain"))
            .unwrap();

        assert_eq!(env.version, CURRENT_VERSION);
        assert_eq!(env.recipients.len(), 2);
        assert_eq!(env.recipients[0].identity.as_str(), "alice@example.com");
        assert_eq!(env.recipients[1].identity.as_str(), "bob@example.com");
        assert_eq!(env.metadata.size, plaintext.len() as u64);
        assert_eq!(env.metadata.filename, "a.txt");
        assert!(env.metadata.expires_at.is_none());
        assert_eq!(env.ciphertext.len(), plaintext.len() + seal_core::TAG_SIZE);
        assert_eq!(env.metadata.created_at.timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[test]
    fn test_fresh_randomness_per_envelope() {
        let builder = EnvelopeBuilder::default();
        let opts = SealOptions::default();
        let a = builder.seal(b"same", &recipients(), &opts).unwrap();
        let b = builder.seal(b"same", &recipients(), &opts).unwrap();

        assert_ne!(a.file_id, b.file_id);
        assert_ne!(a.content_iv, b.content_iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_duplicates_collapse_in_order() {
        let mut list = recipients();
        list.push(Recipient::from_key("ALICE@example.com ", &alice().public).unwrap());
        list.push(Recipient::from_key("bob@example.com", &bob().public).unwrap());

        let env = EnvelopeBuilder::default()
            .seal(b"x", &list, &SealOptions::default())
            .unwrap();

        let ids: Vec<&str> = env.recipients.iter().map(|r| r.identity.as_str()).collect();
        assert_eq!(ids, ["alice@example.com", "bob@example.com"]);
    }

    #[test]
    fn test_malformed_recipient_key_aborts() {
        let mut list = recipients();
        list.push(Recipient::new("mallory@example.com", vec![0x30, 0x03, 0x02, 0x01]));

        let result = EnvelopeBuilder::default().seal(b"x", &list, &SealOptions::default());
        assert!(matches!(
            result,
            Err(SealError::InvalidRecipientKey(id)) if id == "mallory@example.com"
        ));
    }

    #[test]
    fn test_undersized_recipient_key_rejected() {
        let weak = rsa::RsaPrivateKey::new(&mut rand::rngs::OsRng, 1024).unwrap();
        let der = rsa::pkcs8::EncodePublicKey::to_public_key_der(&weak.to_public_key())
            .unwrap()
            .as_bytes()
            .to_vec();

        let mut list = recipients();
        list.push(Recipient::new("weak@example.com", der));

        let result = EnvelopeBuilder::default().seal(b"x", &list, &SealOptions::default());
        assert!(matches!(
            result,
            Err(SealError::InvalidRecipientKey(id)) if id == "weak@example.com"
        ));
    }

    #[test]
    fn test_invalid_identity_rejected() {
        let list = vec![Recipient::from_key("   ", &alice().public).unwrap()];
        let result = EnvelopeBuilder::default().seal(b"x", &list, &SealOptions::default());
        assert!(matches!(result, Err(SealError::InvalidIdentity(_))));
    }

    #[test]
    fn test_sequential_matches_parallel_order() {
        let env = EnvelopeBuilder::default()
            .with_parallel(false)
            .seal(b"x", &recipients(), &SealOptions::default())
            .unwrap();
        assert_eq!(env.recipients[0].identity.as_str(), "alice@example.com");
        assert_eq!(env.recipients[1].identity.as_str(), "bob@example.com");
    }

    #[test]
    fn test_expiry_from_options() {
        let env = EnvelopeBuilder::default()
            .seal(
                b"x",
                &recipients(),
                &SealOptions::default().expires_in(TimeDelta::days(7)),
            )
            .unwrap();

        assert_eq!(
            env.metadata.expires_at,
            Some(env.metadata.created_at + TimeDelta::days(7))
        );
    }

    #[test]
    fn test_sub_millisecond_lifetime_is_truncated() {
        let env = EnvelopeBuilder::default()
            .seal(
                b"x",
                &recipients(),
                &SealOptions::default().expires_in(TimeDelta::microseconds(1_500_250)),
            )
            .unwrap();

        let expires_at = env.metadata.expires_at.unwrap();
        assert_eq!(expires_at - env.metadata.created_at, TimeDelta::milliseconds(1_500));
        assert_eq!(crate::codec::decode(&crate::codec::encode(&env).unwrap()).unwrap(), env);
    }

    #[test]
    fn test_out_of_range_lifetime_rejected() {
        let result = EnvelopeBuilder::default().seal(
            b"x",
            &recipients(),
            &SealOptions::default().expires_in(TimeDelta::days(365 * 400_000)),
        );
        assert!(matches!(result, Err(SealError::InvalidParameter(_))));
    }

    #[test]
    fn test_seal_for_resolves_directory() {
        let mut dir = MemoryDirectory::new();
        dir.insert_key(Identity::new("alice@example.com").unwrap(), &alice().public)
            .unwrap();

        let env = EnvelopeBuilder::default()
            .seal_for(b"x", &["ALICE@example.com"], &dir, &SealOptions::default())
            .unwrap();
        assert_eq!(env.recipients.len(), 1);

        let missing = EnvelopeBuilder::default().seal_for(
            b"x",
            &["alice@example.com", "nobody@example.com"],
            &dir,
            &SealOptions::default(),
        );
        assert!(matches!(
            missing,
            Err(SealError::RecipientNotFound(id)) if id == "nobody@example.com"
        ));
    }
}
