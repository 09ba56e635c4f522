//! Canonical wire format for envelopes and encrypted key blobs
//!
//! Envelopes serialize to JSON:
//! ```text
//! {
//!   "version": "2",
//!   "fileId": "<32 hex chars>",
//!   "metadata": {
//!     "filename": "...", "mimeType": "...", "size": 123,
//!     "createdAt": "2026-01-01T00:00:00.000Z", "expiresAt": null
//!   },
//!   "contentIv": "<base64, 12 bytes>",
//!   "recipients": [ { "identity": "alice@example.com", "wrappedKey": "<base64>" } ],
//!   "ciphertext": "<base64, payload || 16-byte tag>"
//! }
//! ```
//!
//! Decoding validates every field before any key material is touched and
//! names the first offending field in `MalformedEnvelope`.

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use seal_core::{
    EncryptedPrivateKeyBlob, FileId, Identity, Metadata, RecipientEntry, SealError, SealResult,
    SealedEnvelope, CONTENT_IV_SIZE, CURRENT_VERSION, MIN_KDF_ITERATIONS, MIN_SALT_SIZE, TAG_SIZE,
};

/// Versions this codec can decode.
pub const SUPPORTED_VERSIONS: [&str; 1] = [CURRENT_VERSION];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope<'a> {
    version: &'a str,
    file_id: String,
    metadata: WireMetadata<'a>,
    content_iv: String,
    recipients: Vec<WireRecipient<'a>>,
    ciphertext: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireMetadata<'a> {
    filename: &'a str,
    mime_type: &'a str,
    size: u64,
    created_at: String,
    expires_at: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRecipient<'a> {
    identity: &'a str,
    wrapped_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireKeyBlob {
    ciphertext: String,
    salt: String,
    iv: String,
    kdf_iterations: u32,
}

/// Render a timestamp the way the wire format stores it.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl<'a> From<&'a Metadata> for WireMetadata<'a> {
    fn from(m: &'a Metadata) -> Self {
        WireMetadata {
            filename: &m.filename,
            mime_type: &m.mime_type,
            size: m.size,
            created_at: format_timestamp(&m.created_at),
            expires_at: m.expires_at.as_ref().map(format_timestamp),
        }
    }
}

/// Serialize an envelope to its canonical JSON bytes.
///
/// Runs `validate` first, so an envelope that would not decode back to
/// itself is never written.
pub fn encode(envelope: &SealedEnvelope) -> SealResult<Vec<u8>> {
    validate(envelope)?;
    let wire = WireEnvelope {
        version: &envelope.version,
        file_id: envelope.file_id.to_hex(),
        metadata: WireMetadata::from(&envelope.metadata),
        content_iv: B64.encode(envelope.content_iv),
        recipients: envelope
            .recipients
            .iter()
            .map(|r| WireRecipient {
                identity: r.identity.as_str(),
                wrapped_key: B64.encode(&r.wrapped_key),
            })
            .collect(),
        ciphertext: B64.encode(&envelope.ciphertext),
    };
    Ok(serde_json::to_vec(&wire)?)
}

/// Parse and validate envelope bytes.
pub fn decode(bytes: &[u8]) -> SealResult<SealedEnvelope> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|_| SealError::malformed_envelope("envelope"))?;
    let root = value
        .as_object()
        .ok_or_else(|| SealError::malformed_envelope("envelope"))?;

    let version = str_field(root, "version", "version")?;
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(SealError::UnsupportedVersion(version.to_string()));
    }

    let file_id = FileId::from_hex(str_field(root, "fileId", "fileId")?)
        .ok_or_else(|| SealError::malformed_envelope("fileId"))?;

    let metadata = decode_metadata(
        root.get("metadata")
            .and_then(Value::as_object)
            .ok_or_else(|| SealError::malformed_envelope("metadata"))?,
    )?;

    let content_iv: [u8; CONTENT_IV_SIZE] = b64_field(root, "contentIv", "contentIv")?
        .try_into()
        .map_err(|_| SealError::malformed_envelope("contentIv"))?;

    let recipients = decode_recipients(
        root.get("recipients")
            .and_then(Value::as_array)
            .ok_or_else(|| SealError::malformed_envelope("recipients"))?,
    )?;

    let ciphertext = b64_field(root, "ciphertext", "ciphertext")?;
    if ciphertext.len() < TAG_SIZE {
        return Err(SealError::malformed_envelope("ciphertext"));
    }

    Ok(SealedEnvelope {
        version: version.to_string(),
        file_id,
        metadata,
        content_iv,
        recipients,
        ciphertext,
    })
}

/// Structural checks for an envelope that did not come through `decode`.
pub fn validate(envelope: &SealedEnvelope) -> SealResult<()> {
    if !SUPPORTED_VERSIONS.contains(&envelope.version.as_str()) {
        return Err(SealError::UnsupportedVersion(envelope.version.clone()));
    }
    if !is_millisecond_precise(&envelope.metadata.created_at) {
        return Err(SealError::malformed_envelope("metadata.createdAt"));
    }
    if let Some(expires_at) = &envelope.metadata.expires_at {
        if !is_millisecond_precise(expires_at) {
            return Err(SealError::malformed_envelope("metadata.expiresAt"));
        }
    }
    if envelope.recipients.is_empty() {
        return Err(SealError::malformed_envelope("recipients"));
    }
    let mut seen = HashSet::new();
    for (i, r) in envelope.recipients.iter().enumerate() {
        if !seen.insert(r.identity.as_str()) {
            return Err(SealError::malformed_envelope(format!(
                "recipients[{i}].identity"
            )));
        }
        if r.wrapped_key.is_empty() {
            return Err(SealError::malformed_envelope(format!(
                "recipients[{i}].wrappedKey"
            )));
        }
    }
    if envelope.ciphertext.len() < TAG_SIZE {
        return Err(SealError::malformed_envelope("ciphertext"));
    }
    Ok(())
}

/// Associated data bound into the content AEAD: version, fileId and the
/// canonical metadata JSON, NUL-separated.
pub fn header_aad(version: &str, file_id: &FileId, metadata: &Metadata) -> SealResult<Vec<u8>> {
    let meta = serde_json::to_vec(&WireMetadata::from(metadata))?;
    let mut aad = Vec::with_capacity(version.len() + 1 + file_id.as_bytes().len() + 1 + meta.len());
    aad.extend_from_slice(version.as_bytes());
    aad.push(0);
    aad.extend_from_slice(file_id.as_bytes());
    aad.push(0);
    aad.extend_from_slice(&meta);
    Ok(aad)
}

/// Human-readable summary of an envelope. Touches no key material.
pub fn inspect(envelope: &SealedEnvelope) -> Value {
    serde_json::json!({
        "version": envelope.version,
        "fileId": envelope.file_id.to_hex(),
        "metadata": WireMetadata::from(&envelope.metadata),
        "recipients": envelope
            .recipients
            .iter()
            .map(|r| r.identity.as_str())
            .collect::<Vec<_>>(),
        "ciphertextBytes": envelope.ciphertext.len(),
    })
}

/// Serialize a key blob to JSON.
pub fn encode_key_blob(blob: &EncryptedPrivateKeyBlob) -> SealResult<Vec<u8>> {
    let wire = WireKeyBlob {
        ciphertext: B64.encode(&blob.ciphertext),
        salt: B64.encode(&blob.salt),
        iv: B64.encode(blob.iv),
        kdf_iterations: blob.kdf_iterations,
    };
    Ok(serde_json::to_vec_pretty(&wire)?)
}

/// Parse and validate a key blob.
pub fn decode_key_blob(bytes: &[u8]) -> SealResult<EncryptedPrivateKeyBlob> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|_| SealError::malformed_key_blob("blob"))?;
    let root = value
        .as_object()
        .ok_or_else(|| SealError::malformed_key_blob("blob"))?;

    let blob_b64 = |key: &str| -> SealResult<Vec<u8>> {
        root.get(key)
            .and_then(Value::as_str)
            .and_then(|s| B64.decode(s).ok())
            .ok_or_else(|| SealError::malformed_key_blob(key))
    };

    let ciphertext = blob_b64("ciphertext")?;
    if ciphertext.len() < TAG_SIZE {
        return Err(SealError::malformed_key_blob("ciphertext"));
    }

    let salt = blob_b64("salt")?;
    if salt.len() < MIN_SALT_SIZE {
        return Err(SealError::malformed_key_blob("salt"));
    }

    let iv: [u8; CONTENT_IV_SIZE] = blob_b64("iv")?
        .try_into()
        .map_err(|_| SealError::malformed_key_blob("iv"))?;

    let kdf_iterations = root
        .get("kdfIterations")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n >= MIN_KDF_ITERATIONS)
        .ok_or_else(|| SealError::malformed_key_blob("kdfIterations"))?;

    Ok(EncryptedPrivateKeyBlob {
        ciphertext,
        salt,
        iv,
        kdf_iterations,
    })
}

fn str_field<'v>(obj: &'v Map<String, Value>, key: &str, path: &str) -> SealResult<&'v str> {
    obj.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| SealError::malformed_envelope(path))
}

fn b64_field(obj: &Map<String, Value>, key: &str, path: &str) -> SealResult<Vec<u8>> {
    B64.decode(str_field(obj, key, path)?)
        .map_err(|_| SealError::malformed_envelope(path))
}

/// Only the canonical form is accepted: UTC, `Z` suffix, exactly millisecond
/// precision. Anything else would not re-encode to the same bytes.
fn timestamp_field(obj: &Map<String, Value>, key: &str, path: &str) -> SealResult<DateTime<Utc>> {
    let raw = str_field(obj, key, path)?;
    let at = DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| SealError::malformed_envelope(path))?;
    if format_timestamp(&at) != raw {
        return Err(SealError::malformed_envelope(path));
    }
    Ok(at)
}

fn is_millisecond_precise(at: &DateTime<Utc>) -> bool {
    at.timestamp_subsec_nanos() % 1_000_000 == 0
}

fn decode_metadata(obj: &Map<String, Value>) -> SealResult<Metadata> {
    let filename = str_field(obj, "filename", "metadata.filename")?.to_string();
    let mime_type = str_field(obj, "mimeType", "metadata.mimeType")?.to_string();
    let size = obj
        .get("size")
        .and_then(Value::as_u64)
        .ok_or_else(|| SealError::malformed_envelope("metadata.size"))?;
    let created_at = timestamp_field(obj, "createdAt", "metadata.createdAt")?;
    let expires_at = match obj.get("expiresAt") {
        Some(Value::Null) => None,
        Some(Value::String(_)) => Some(timestamp_field(obj, "expiresAt", "metadata.expiresAt")?),
        _ => return Err(SealError::malformed_envelope("metadata.expiresAt")),
    };

    Ok(Metadata {
        filename,
        mime_type,
        size,
        created_at,
        expires_at,
    })
}

fn decode_recipients(entries: &[Value]) -> SealResult<Vec<RecipientEntry>> {
    if entries.is_empty() {
        return Err(SealError::malformed_envelope("recipients"));
    }

    let mut seen = HashSet::new();
    let mut recipients = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let obj = entry
            .as_object()
            .ok_or_else(|| SealError::malformed_envelope(format!("recipients[{i}]")))?;

        let id_path = format!("recipients[{i}].identity");
        let raw = str_field(obj, "identity", &id_path)?;
        let identity =
            Identity::new(raw).map_err(|_| SealError::malformed_envelope(id_path.clone()))?;
        if identity.as_str() != raw || !seen.insert(identity.clone()) {
            return Err(SealError::malformed_envelope(id_path));
        }

        let key_path = format!("recipients[{i}].wrappedKey");
        let wrapped_key = b64_field(obj, "wrappedKey", &key_path)?;
        if wrapped_key.is_empty() {
            return Err(SealError::malformed_envelope(key_path));
        }

        recipients.push(RecipientEntry {
            identity,
            wrapped_key,
        });
    }
    Ok(recipients)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> SealedEnvelope {
        let created = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        SealedEnvelope {
            version: CURRENT_VERSION.to_string(),
            file_id: FileId::from_bytes([0x11; 16]),
            metadata: Metadata {
                filename: "report.pdf".into(),
                mime_type: "application/pdf".into(),
                size: 4,
                created_at: created,
                expires_at: Some(created + chrono::TimeDelta::days(7)),
            },
            content_iv: [9u8; CONTENT_IV_SIZE],
            recipients: vec![
                RecipientEntry {
                    identity: Identity::new("alice@example.com").unwrap(),
                    wrapped_key: vec![1, 2, 3],
                },
                RecipientEntry {
                    identity: Identity::new("bob@example.com").unwrap(),
                    wrapped_key: vec![4, 5, 6],
                },
            ],
            ciphertext: vec![0xCC; 20],
        }
    }

    fn sample_json() -> Value {
        serde_json::from_slice(&encode(&sample()).unwrap()).unwrap()
    }

    fn decode_value(v: &Value) -> SealResult<SealedEnvelope> {
        decode(&serde_json::to_vec(v).unwrap())
    }

    fn malformed_field(result: SealResult<SealedEnvelope>) -> String {
        match result {
            Err(SealError::MalformedEnvelope { field }) => field,
            other => panic!("expected MalformedEnvelope, got {other:?}"),
        }
    }

    #[test]
    fn test_encode_decode_exact() {
        let env = sample();
        let bytes = encode(&env).unwrap();
        let decoded = decode(&bytes).unwrap();

        assert_eq!(decoded, env);
        assert_eq!(encode(&decoded).unwrap(), bytes, "re-encoding must be byte-identical");
    }

    #[test]
    fn test_wire_field_names() {
        let v = sample_json();
        assert_eq!(v["version"], "2");
        assert_eq!(v["fileId"], "11".repeat(16));
        assert_eq!(v["metadata"]["mimeType"], "application/pdf");
        assert_eq!(v["metadata"]["createdAt"], "2026-03-01T12:00:00.000Z");
        assert_eq!(v["metadata"]["expiresAt"], "2026-03-08T12:00:00.000Z");
        assert_eq!(v["recipients"][1]["identity"], "bob@example.com");
        assert!(v["recipients"][0]["wrappedKey"].is_string());
        assert!(v["contentIv"].is_string());
    }

    #[test]
    fn test_null_expiry_roundtrip() {
        let mut env = sample();
        env.metadata.expires_at = None;
        let bytes = encode(&env).unwrap();
        let v: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(v["metadata"]["expiresAt"].is_null());
        assert_eq!(decode(&bytes).unwrap().metadata.expires_at, None);
    }

    #[test]
    fn test_unsupported_version() {
        let mut v = sample_json();
        v["version"] = "1.0".into();
        assert!(matches!(
            decode_value(&v),
            Err(SealError::UnsupportedVersion(ver)) if ver == "1.0"
        ));
    }

    #[test]
    fn test_missing_version_is_malformed() {
        let mut v = sample_json();
        v.as_object_mut().unwrap().remove("version");
        assert_eq!(malformed_field(decode_value(&v)), "version");
    }

    #[test]
    fn test_not_json() {
        assert_eq!(malformed_field(decode(b"\x00\x01garbage")), "envelope");
        assert_eq!(malformed_field(decode(b"[1,2,3]")), "envelope");
    }

    #[test]
    fn test_missing_fields_are_named() {
        for (path, expected) in [
            (vec!["fileId"], "fileId"),
            (vec!["metadata"], "metadata"),
            (vec!["metadata", "filename"], "metadata.filename"),
            (vec!["metadata", "mimeType"], "metadata.mimeType"),
            (vec!["metadata", "size"], "metadata.size"),
            (vec!["metadata", "createdAt"], "metadata.createdAt"),
            (vec!["metadata", "expiresAt"], "metadata.expiresAt"),
            (vec!["contentIv"], "contentIv"),
            (vec!["recipients"], "recipients"),
            (vec!["ciphertext"], "ciphertext"),
        ] {
            let mut v = sample_json();
            let (last, parents) = path.split_last().unwrap();
            let mut target = &mut v;
            for p in parents {
                target = &mut target[*p];
            }
            target.as_object_mut().unwrap().remove(*last);
            assert_eq!(malformed_field(decode_value(&v)), expected, "removing {path:?}");
        }
    }

    #[test]
    fn test_malformed_values_are_named() {
        let mut v = sample_json();
        v["fileId"] = "not-hex".into();
        assert_eq!(malformed_field(decode_value(&v)), "fileId");

        let mut v = sample_json();
        v["contentIv"] = B64.encode([0u8; 16]).into();
        assert_eq!(malformed_field(decode_value(&v)), "contentIv");

        let mut v = sample_json();
        v["metadata"]["size"] = (-5).into();
        assert_eq!(malformed_field(decode_value(&v)), "metadata.size");

        let mut v = sample_json();
        v["metadata"]["createdAt"] = "yesterday".into();
        assert_eq!(malformed_field(decode_value(&v)), "metadata.createdAt");

        let mut v = sample_json();
        v["recipients"][1]["wrappedKey"] = "***".into();
        assert_eq!(
            malformed_field(decode_value(&v)),
            "recipients[1].wrappedKey"
        );

        let mut v = sample_json();
        v["ciphertext"] = B64.encode([0u8; 4]).into();
        assert_eq!(malformed_field(decode_value(&v)), "ciphertext");
    }

    #[test]
    fn test_non_canonical_timestamps_rejected() {
        for (key, raw) in [
            ("createdAt", "2026-03-01T12:00:00.000250Z"),
            ("createdAt", "2026-03-01T12:00:00Z"),
            ("expiresAt", "2026-03-08T12:00:00.000+00:00"),
            ("expiresAt", "2026-03-08T13:00:00.000+01:00"),
        ] {
            let mut v = sample_json();
            v["metadata"][key] = raw.into();
            assert_eq!(
                malformed_field(decode_value(&v)),
                format!("metadata.{key}"),
                "accepted {raw}"
            );
        }
    }

    #[test]
    fn test_validate_rejects_sub_millisecond_timestamps() {
        let mut env = sample();
        env.metadata.expires_at =
            Some(env.metadata.created_at + chrono::TimeDelta::microseconds(1_500_250));
        assert_eq!(malformed_field(validate(&env).map(|_| env.clone())), "metadata.expiresAt");
        assert!(encode(&env).is_err());

        let mut env = sample();
        env.metadata.created_at += chrono::TimeDelta::nanoseconds(1);
        assert_eq!(malformed_field(validate(&env).map(|_| env.clone())), "metadata.createdAt");
    }

    #[test]
    fn test_empty_recipients_rejected() {
        let mut v = sample_json();
        v["recipients"] = Value::Array(vec![]);
        assert_eq!(malformed_field(decode_value(&v)), "recipients");
    }

    #[test]
    fn test_duplicate_recipient_rejected() {
        let mut v = sample_json();
        v["recipients"][1]["identity"] = "alice@example.com".into();
        assert_eq!(
            malformed_field(decode_value(&v)),
            "recipients[1].identity"
        );
    }

    #[test]
    fn test_non_normalized_identity_rejected() {
        let mut v = sample_json();
        v["recipients"][0]["identity"] = "Alice@Example.com".into();
        assert_eq!(
            malformed_field(decode_value(&v)),
            "recipients[0].identity"
        );
    }

    #[test]
    fn test_validate_typed_envelope() {
        let env = sample();
        validate(&env).unwrap();

        let mut dup = sample();
        dup.recipients[1].identity = dup.recipients[0].identity.clone();
        assert!(matches!(
            validate(&dup),
            Err(SealError::MalformedEnvelope { .. })
        ));

        let mut old = sample();
        old.version = "0".into();
        assert!(matches!(validate(&old), Err(SealError::UnsupportedVersion(_))));
    }

    #[test]
    fn test_header_aad_covers_metadata() {
        let env = sample();
        let aad = header_aad(&env.version, &env.file_id, &env.metadata).unwrap();

        let mut edited = env.metadata.clone();
        edited.expires_at = None;
        assert_ne!(aad, header_aad(&env.version, &env.file_id, &edited).unwrap());

        let other_id = FileId::from_bytes([0x22; 16]);
        assert_ne!(aad, header_aad(&env.version, &other_id, &env.metadata).unwrap());
    }

    #[test]
    fn test_inspect_has_no_key_material() {
        let summary = inspect(&sample());
        assert_eq!(summary["recipients"][0], "alice@example.com");
        assert_eq!(summary["ciphertextBytes"], 20);
        assert!(summary.get("ciphertext").is_none());
        assert!(!summary.to_string().contains("wrappedKey"));
    }

    fn sample_blob() -> EncryptedPrivateKeyBlob {
        EncryptedPrivateKeyBlob {
            ciphertext: vec![0xAA; 64],
            salt: vec![0x55; 16],
            iv: [3u8; CONTENT_IV_SIZE],
            kdf_iterations: 600_000,
        }
    }

    #[test]
    fn test_key_blob_roundtrip() {
        let blob = sample_blob();
        let bytes = encode_key_blob(&blob).unwrap();
        let v: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["kdfIterations"], 600_000);

        assert_eq!(decode_key_blob(&bytes).unwrap(), blob);
    }

    #[test]
    fn test_key_blob_validation() {
        let blob_field = |result: SealResult<EncryptedPrivateKeyBlob>| match result {
            Err(SealError::MalformedKeyBlob { field }) => field,
            other => panic!("expected MalformedKeyBlob, got {other:?}"),
        };
        let encoded = encode_key_blob(&sample_blob()).unwrap();
        let base: Value = serde_json::from_slice(&encoded).unwrap();
        let run = |v: &Value| decode_key_blob(&serde_json::to_vec(v).unwrap());

        let mut v = base.clone();
        v["salt"] = B64.encode([0u8; 8]).into();
        assert_eq!(blob_field(run(&v)), "salt");

        let mut v = base.clone();
        v["iv"] = B64.encode([0u8; 16]).into();
        assert_eq!(blob_field(run(&v)), "iv");

        let mut v = base.clone();
        v["kdfIterations"] = 1000.into();
        assert_eq!(blob_field(run(&v)), "kdfIterations");

        let mut v = base.clone();
        v.as_object_mut().unwrap().remove("ciphertext");
        assert_eq!(blob_field(run(&v)), "ciphertext");

        assert_eq!(blob_field(decode_key_blob(b"nope")), "blob");
    }
}
