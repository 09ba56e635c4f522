//! Envelope and key-blob persistence
//!
//! Layout under the configured prefix:
//! ```text
//! {prefix}/envelopes/{fileId}.seal   canonical envelope bytes
//! {prefix}/keys/{identity}.json      encrypted private key blob
//! ```

use chrono::{DateTime, Utc};
use opendal::{ErrorKind, Operator};

use seal_core::{EncryptedPrivateKeyBlob, FileId, Identity, SealError, SealResult, SealedEnvelope};
use seal_crypto::codec;

const ENVELOPE_EXT: &str = ".seal";

/// What `purge_expired` did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PurgeReport {
    pub removed: Vec<FileId>,
    pub kept: usize,
    /// Objects under the envelope prefix that failed to decode
    pub unreadable: usize,
}

/// Opaque-bytes store for envelopes and encrypted key blobs.
#[derive(Clone)]
pub struct SealStore {
    op: Operator,
    prefix: String,
}

impl SealStore {
    pub fn new(op: Operator, prefix: &str) -> Self {
        Self {
            op,
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    fn dir(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            format!("{name}/")
        } else {
            format!("{}/{name}/", self.prefix)
        }
    }

    fn envelope_path(&self, file_id: &FileId) -> String {
        format!("{}{}{ENVELOPE_EXT}", self.dir("envelopes"), file_id.to_hex())
    }

    fn key_blob_path(&self, identity: &Identity) -> String {
        format!("{}{}.json", self.dir("keys"), identity.as_str())
    }

    /// Store an envelope under its fileId.
    pub async fn put_envelope(&self, envelope: &SealedEnvelope) -> SealResult<FileId> {
        let bytes = codec::encode(envelope)?;
        self.write(&self.envelope_path(&envelope.file_id), bytes).await?;
        tracing::info!(file_id = %envelope.file_id, "stored envelope");
        Ok(envelope.file_id)
    }

    /// Store raw envelope bytes after checking that they decode.
    pub async fn put_envelope_bytes(&self, bytes: Vec<u8>) -> SealResult<FileId> {
        let file_id = codec::decode(&bytes)?.file_id;
        self.write(&self.envelope_path(&file_id), bytes).await?;
        tracing::info!(file_id = %file_id, "stored envelope");
        Ok(file_id)
    }

    pub async fn get_envelope_bytes(&self, file_id: &FileId) -> SealResult<Option<Vec<u8>>> {
        self.read(&self.envelope_path(file_id)).await
    }

    pub async fn get_envelope(&self, file_id: &FileId) -> SealResult<Option<SealedEnvelope>> {
        match self.get_envelope_bytes(file_id).await? {
            Some(bytes) => Ok(Some(codec::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_envelope(&self, file_id: &FileId) -> SealResult<()> {
        let path = self.envelope_path(file_id);
        self.op
            .delete(&path)
            .await
            .map_err(|e| SealError::Storage(format!("deleting {path}: {e}")))?;
        tracing::info!(file_id = %file_id, "deleted envelope");
        Ok(())
    }

    /// FileIds of every stored envelope, sorted.
    pub async fn list_envelopes(&self) -> SealResult<Vec<FileId>> {
        let dir = self.dir("envelopes");
        let entries = match self.op.list(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SealError::Storage(format!("listing {dir}: {e}"))),
        };

        let mut ids: Vec<FileId> = entries
            .iter()
            .filter_map(|entry| entry.name().strip_suffix(ENVELOPE_EXT))
            .filter_map(FileId::from_hex)
            .collect();
        ids.sort_by_key(|id| *id.as_bytes());
        Ok(ids)
    }

    pub async fn put_key_blob(
        &self,
        identity: &Identity,
        blob: &EncryptedPrivateKeyBlob,
    ) -> SealResult<()> {
        let bytes = codec::encode_key_blob(blob)?;
        self.write(&self.key_blob_path(identity), bytes).await?;
        tracing::info!(identity = %identity, "stored encrypted key blob");
        Ok(())
    }

    pub async fn get_key_blob(
        &self,
        identity: &Identity,
    ) -> SealResult<Option<EncryptedPrivateKeyBlob>> {
        match self.read(&self.key_blob_path(identity)).await? {
            Some(bytes) => Ok(Some(codec::decode_key_blob(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Delete every envelope whose expiry is strictly before `now`.
    ///
    /// Objects that do not decode are left in place and counted.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> SealResult<PurgeReport> {
        let mut report = PurgeReport::default();

        for file_id in self.list_envelopes().await? {
            let envelope = match self.get_envelope(&file_id).await {
                Ok(Some(env)) => env,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(file_id = %file_id, error = %e, "skipping unreadable envelope");
                    report.unreadable += 1;
                    continue;
                }
            };

            if envelope.is_expired(now) {
                self.delete_envelope(&file_id).await?;
                report.removed.push(file_id);
            } else {
                report.kept += 1;
            }
        }

        tracing::info!(
            removed = report.removed.len(),
            kept = report.kept,
            unreadable = report.unreadable,
            "purge complete"
        );
        Ok(report)
    }

    async fn write(&self, path: &str, bytes: Vec<u8>) -> SealResult<()> {
        self.op
            .write(path, bytes)
            .await
            .map(|_| ())
            .map_err(|e| SealError::Storage(format!("writing {path}: {e}")))
    }

    async fn read(&self, path: &str) -> SealResult<Option<Vec<u8>>> {
        match self.op.read(path).await {
            Ok(data) => Ok(Some(data.to_bytes().to_vec())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SealError::Storage(format!("reading {path}: {e}"))),
        }
    }
}

impl std::fmt::Debug for SealStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use seal_core::{Metadata, RecipientEntry, CURRENT_VERSION};

    fn memory_operator() -> Operator {
        Operator::new(opendal::services::Memory::default())
            .expect("memory operator")
            .finish()
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, day, 0, 0, 0).unwrap()
    }

    // Structurally valid envelope; the stored bytes are never decrypted here.
    fn envelope(id: u8, expires_at: Option<DateTime<Utc>>) -> SealedEnvelope {
        SealedEnvelope {
            version: CURRENT_VERSION.to_string(),
            file_id: FileId::from_bytes([id; 16]),
            metadata: Metadata {
                filename: format!("file-{id}.bin"),
                mime_type: "application/octet-stream".into(),
                size: 3,
                created_at: at(1),
                expires_at,
            },
            content_iv: [id; 12],
            recipients: vec![RecipientEntry {
                identity: Identity::new("alice@example.com").unwrap(),
                wrapped_key: vec![id; 256],
            }],
            ciphertext: vec![id; 19],
        }
    }

    #[tokio::test]
    async fn test_envelope_put_get_delete() {
        let store = SealStore::new(memory_operator(), "team");
        let env = envelope(1, None);

        let id = store.put_envelope(&env).await.unwrap();
        assert_eq!(id, env.file_id);
        assert_eq!(store.get_envelope(&id).await.unwrap(), Some(env.clone()));

        store.delete_envelope(&id).await.unwrap();
        assert_eq!(store.get_envelope(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_envelope_layout() {
        let op = memory_operator();
        let store = SealStore::new(op.clone(), "/team/");
        let env = envelope(0xab, None);
        store.put_envelope(&env).await.unwrap();

        let path = format!("team/envelopes/{}.seal", "ab".repeat(16));
        assert!(op.read(&path).await.is_ok());
    }

    #[tokio::test]
    async fn test_put_bytes_rejects_malformed() {
        let store = SealStore::new(memory_operator(), "");
        let result = store.put_envelope_bytes(b"{\"version\":\"2\"}".to_vec()).await;
        assert!(matches!(result, Err(SealError::MalformedEnvelope { .. })));
        assert!(store.list_envelopes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_envelopes() {
        let store = SealStore::new(memory_operator(), "team");
        assert!(store.list_envelopes().await.unwrap().is_empty());

        store.put_envelope(&envelope(2, None)).await.unwrap();
        store.put_envelope(&envelope(1, None)).await.unwrap();

        let ids = store.list_envelopes().await.unwrap();
        assert_eq!(
            ids,
            vec![FileId::from_bytes([1; 16]), FileId::from_bytes([2; 16])]
        );
    }

    #[tokio::test]
    async fn test_key_blob_roundtrip() {
        let store = SealStore::new(memory_operator(), "team");
        let alice = Identity::new("alice@example.com").unwrap();
        assert_eq!(store.get_key_blob(&alice).await.unwrap(), None);

        let blob = EncryptedPrivateKeyBlob {
            ciphertext: vec![7; 48],
            salt: vec![1; 16],
            iv: [2; 12],
            kdf_iterations: 600_000,
        };
        store.put_key_blob(&alice, &blob).await.unwrap();
        assert_eq!(store.get_key_blob(&alice).await.unwrap(), Some(blob));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let op = memory_operator();
        let store = SealStore::new(op.clone(), "team");
        store.put_envelope(&envelope(1, Some(at(5)))).await.unwrap();
        store.put_envelope(&envelope(2, Some(at(20)))).await.unwrap();
        store.put_envelope(&envelope(3, None)).await.unwrap();
        op.write(
            &format!("team/envelopes/{}.seal", "04".repeat(16)),
            b"garbage".to_vec(),
        )
        .await
        .unwrap();

        let report = store.purge_expired(at(10)).await.unwrap();
        assert_eq!(report.removed, vec![FileId::from_bytes([1; 16])]);
        assert_eq!(report.kept, 2);
        assert_eq!(report.unreadable, 1);

        let remaining = store.list_envelopes().await.unwrap();
        assert_eq!(remaining.len(), 3);
        assert!(!remaining.contains(&FileId::from_bytes([1; 16])));
    }

    #[tokio::test]
    async fn test_fs_backend() {
        let tmp = tempfile::tempdir().unwrap();
        let op = Operator::new(
            opendal::services::Fs::default().root(&tmp.path().to_string_lossy()),
        )
        .unwrap()
        .finish();
        let store = SealStore::new(op, "seal");
        let env = envelope(9, None);
        store.put_envelope(&env).await.unwrap();

        assert!(tmp
            .path()
            .join(format!("seal/envelopes/{}.seal", env.file_id.to_hex()))
            .exists());
        assert_eq!(store.list_envelopes().await.unwrap(), vec![env.file_id]);
    }
}
