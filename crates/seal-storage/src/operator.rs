//! OpenDAL Operator factory for seal storage backends

use anyhow::{Context, Result};
use opendal::Operator;

use seal_core::config::{expand_tilde, StorageConfig};

/// Everything needed to reach an S3-compatible bucket
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Build an OpenDAL Operator for any S3-compatible endpoint.
///
/// Path-style addressing (the opendal 0.55 default) works with MinIO and
/// SeaweedFS as well as AWS.
pub fn build_s3_operator(cfg: &S3Settings) -> Result<Operator> {
    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .access_key_id(&cfg.access_key_id)
        .secret_access_key(&cfg.secret_access_key);

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

/// Build the operator selected by `storage.backend`.
///
/// For S3, credentials come from `AWS_ACCESS_KEY_ID`/`AWS_SECRET_ACCESS_KEY`.
/// If `enforce_tls` is set and the endpoint is plain HTTP this fails;
/// otherwise plain HTTP only logs a warning.
pub fn build_from_config(storage: &StorageConfig) -> Result<Operator> {
    match storage.backend.as_str() {
        "memory" => Ok(Operator::new(opendal::services::Memory::default())
            .context("creating OpenDAL memory operator")?
            .finish()),
        "fs" => {
            let root = expand_tilde(&storage.root);
            let op = Operator::new(opendal::services::Fs::default().root(&root.to_string_lossy()))
                .with_context(|| format!("creating OpenDAL fs operator at {}", root.display()))?
                .layer(opendal::layers::LoggingLayer::default())
                .finish();
            Ok(op)
        }
        "s3" => {
            check_endpoint_tls(storage)?;
            let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default();
            let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default();
            if access_key_id.is_empty() {
                tracing::warn!("AWS_ACCESS_KEY_ID is not set; S3 requests will be unsigned");
            }
            build_s3_operator(&S3Settings {
                endpoint: storage.endpoint.clone(),
                region: storage.region.clone(),
                bucket: storage.bucket.clone(),
                access_key_id,
                secret_access_key,
            })
        }
        other => anyhow::bail!("unknown storage backend {other:?} (expected fs, s3 or memory)"),
    }
}

fn check_endpoint_tls(storage: &StorageConfig) -> Result<()> {
    if storage.endpoint.starts_with("http://") {
        if storage.enforce_tls {
            anyhow::bail!(
                "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                storage.endpoint
            );
        }
        tracing::warn!(
            endpoint = %storage.endpoint,
            "S3 endpoint uses plaintext HTTP; credentials are transmitted unencrypted. \
             Set storage.enforce_tls = true and use HTTPS in production."
        );
    }
    Ok(())
}
