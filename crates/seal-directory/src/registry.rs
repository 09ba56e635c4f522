//! Public-key registry for recipients.
//!
//! Each identity has at most one enrolled key. Enrolling again replaces the
//! previous entry; there is no revocation history.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use seal_core::{Identity, SealError, SealResult};
use seal_crypto::{DirectoryLookup, PublicKey};

/// An enrolled public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyEntry {
    /// Normalized identity (lowercase email)
    pub identity: String,
    /// SubjectPublicKeyInfo DER, base64
    pub public_key: String,
    /// SHA-256 fingerprint of the DER bytes
    pub fingerprint: String,
    pub enrolled_at: DateTime<Utc>,
}

impl KeyEntry {
    pub fn public_key(&self) -> SealResult<PublicKey> {
        PublicKey::from_base64(&self.public_key)
    }
}

/// Key directory: tracks every enrolled recipient key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyDirectory {
    pub entries: Vec<KeyEntry>,
}

impl KeyDirectory {
    /// Load the directory from a JSON file. A missing file is an empty directory.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading key directory: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing key directory: {}", path.display()))
    }

    /// Save the directory to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating dir: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("serializing key directory")?;
        std::fs::write(path, json)
            .with_context(|| format!("writing key directory: {}", path.display()))
    }

    /// Enroll a key for an identity, replacing any existing entry.
    ///
    /// Returns the fingerprint of the enrolled key.
    pub fn enroll(&mut self, identity: &str, public_key: &PublicKey) -> SealResult<String> {
        let identity = Identity::new(identity)?;
        let entry = KeyEntry {
            identity: identity.to_string(),
            public_key: public_key.to_base64()?,
            fingerprint: public_key.fingerprint()?,
            enrolled_at: Utc::now(),
        };
        let fingerprint = entry.fingerprint.clone();

        match self.entries.iter_mut().find(|e| e.identity == entry.identity) {
            Some(existing) => {
                tracing::info!(
                    identity = %identity,
                    fingerprint = %fingerprint,
                    "replacing enrolled key"
                );
                *existing = entry;
            }
            None => {
                tracing::info!(identity = %identity, fingerprint = %fingerprint, "enrolled key");
                self.entries.push(entry);
            }
        }

        Ok(fingerprint)
    }

    /// Enroll from a base64 SPKI string, as exchanged between users.
    pub fn import(&mut self, identity: &str, public_key_b64: &str) -> SealResult<String> {
        let key = PublicKey::from_base64(public_key_b64.trim())?;
        self.enroll(identity, &key)
    }

    /// Remove an identity's key
    pub fn remove(&mut self, identity: &str) -> bool {
        let wanted = identity.trim().to_lowercase();
        let before = self.entries.len();
        self.entries.retain(|e| e.identity != wanted);
        self.entries.len() != before
    }

    /// Find an entry by identity (case-insensitive)
    pub fn find(&self, identity: &str) -> Option<&KeyEntry> {
        let wanted = identity.trim().to_lowercase();
        self.entries.iter().find(|e| e.identity == wanted)
    }

    /// Load the directory from remote storage.
    pub async fn load_remote(op: &opendal::Operator, prefix: &str) -> Result<Self> {
        let key = remote_key(prefix);

        match op.read(&key).await {
            Ok(data) => {
                let content = String::from_utf8(data.to_bytes().to_vec())
                    .context("remote key directory is not UTF-8")?;
                serde_json::from_str(&content).context("parsing remote key directory")
            }
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(anyhow::anyhow!("reading remote key directory: {e}")),
        }
    }

    /// Upload the directory to remote storage.
    pub async fn sync_to_remote(&self, op: &opendal::Operator, prefix: &str) -> Result<()> {
        let key = remote_key(prefix);
        let json = serde_json::to_string_pretty(self).context("serializing key directory")?;
        op.write(&key, json.into_bytes())
            .await
            .map_err(|e| anyhow::anyhow!("writing remote key directory: {e}"))?;
        Ok(())
    }
}

impl DirectoryLookup for KeyDirectory {
    fn resolve(&self, identity: &Identity) -> SealResult<Option<Vec<u8>>> {
        let Some(entry) = self.find(identity.as_str()) else {
            return Ok(None);
        };
        let key = entry.public_key().map_err(|e| {
            SealError::Directory(format!("stored key for {} is unreadable: {e}", entry.identity))
        })?;
        key.to_der().map(Some)
    }
}

fn remote_key(prefix: &str) -> String {
    format!("{}/directory.json", prefix.trim_end_matches('/'))
}

/// Get the default key directory path
pub fn default_registry_path() -> PathBuf {
    config_dir().join("directory.json")
}

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
            PathBuf::from(home).join(".config")
        })
        .join("seal")
}
