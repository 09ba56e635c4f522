//! seal-storage: OpenDAL persistence for sealed envelopes and key blobs
//!
//! Only opaque, already-encrypted bytes pass through here. Plaintext and
//! unlocked private keys never reach a storage backend.

pub mod operator;
pub mod store;

pub use operator::{build_from_config, build_s3_operator, S3Settings};
pub use store::{PurgeReport, SealStore};
