//! seal-directory: identity → public key registry
//!
//! The registry is a JSON file (local, or mirrored to object storage) of
//! enrolled public keys. It implements `DirectoryLookup`, so the envelope
//! builder can seal to identities instead of raw keys.

pub mod registry;

pub use registry::{default_registry_path, KeyDirectory, KeyEntry};
