use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SealError, SealResult};
use crate::types::MIN_KDF_ITERATIONS;

/// Top-level configuration (loaded from seal.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SealConfig {
    pub log: LogConfig,
    pub crypto: CryptoConfig,
    pub directory: DirectoryConfig,
    pub storage: StorageConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

/// Key generation and password custody parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// RSA modulus size for new key pairs: 2048 or 4096 (default: 4096)
    pub key_bits: usize,
    /// PBKDF2-HMAC-SHA256 iterations for new key blobs (default: 600000)
    pub kdf_iterations: u32,
    /// Wrap the content key for each recipient on the rayon pool
    pub parallel_wrap: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// JSON registry mapping identities to public keys
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend: "fs", "s3", or "memory"
    pub backend: String,
    /// Root directory for the fs backend
    pub root: PathBuf,
    /// S3 endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// S3 bucket name
    pub bucket: String,
    /// Key prefix under which envelopes and key blobs are stored
    pub prefix: String,
    /// Refuse plaintext HTTP S3 endpoints
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Drop the unlocked private key after this many idle seconds
    pub idle_timeout_secs: Option<u64>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            key_bits: 4096,
            kdf_iterations: 600_000,
            parallel_wrap: true,
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("~/.config/seal/directory.json"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "fs".into(),
            root: PathBuf::from("~/.local/share/seal"),
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "seal".into(),
            prefix: "seal".into(),
            enforce_tls: false,
        }
    }
}

impl SealConfig {
    /// Read and validate a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> SealResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: SealConfig = toml::from_str(&content)
            .map_err(|e| SealError::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SealResult<()> {
        if !matches!(self.crypto.key_bits, 2048 | 4096) {
            return Err(SealError::Config(format!(
                "crypto.key_bits must be 2048 or 4096, got {}",
                self.crypto.key_bits
            )));
        }
        if self.crypto.kdf_iterations < MIN_KDF_ITERATIONS {
            return Err(SealError::Config(format!(
                "crypto.kdf_iterations must be at least {MIN_KDF_ITERATIONS}, got {}",
                self.crypto.kdf_iterations
            )));
        }
        if !matches!(self.storage.backend.as_str(), "fs" | "s3" | "memory") {
            return Err(SealError::Config(format!(
                "storage.backend must be fs, s3 or memory, got {:?}",
                self.storage.backend
            )));
        }
        if !matches!(self.log.format.as_str(), "text" | "json") {
            return Err(SealError::Config(format!(
                "log.format must be text or json, got {:?}",
                self.log.format
            )));
        }
        Ok(())
    }
}

/// Expand a leading `~/` to `$HOME`.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        return PathBuf::from(home).join(rest);
    }
    path.to_path_buf()
}
