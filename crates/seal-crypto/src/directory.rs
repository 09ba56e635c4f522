//! Identity → public key resolution consumed by the builder.

use std::collections::HashMap;

use seal_core::{Identity, SealResult};

use crate::keypair::PublicKey;

/// Maps a normalized identity to its SubjectPublicKeyInfo DER bytes.
///
/// `Ok(None)` means the identity is unknown; `Err` is reserved for failures
/// of the directory itself.
pub trait DirectoryLookup: Send + Sync {
    fn resolve(&self, identity: &Identity) -> SealResult<Option<Vec<u8>>>;
}

impl<D: DirectoryLookup + ?Sized> DirectoryLookup for &D {
    fn resolve(&self, identity: &Identity) -> SealResult<Option<Vec<u8>>> {
        (**self).resolve(identity)
    }
}

/// In-process directory, mostly for tests and one-shot tools.
#[derive(Debug, Default, Clone)]
pub struct MemoryDirectory {
    keys: HashMap<Identity, Vec<u8>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identity: Identity, public_key_der: Vec<u8>) {
        self.keys.insert(identity, public_key_der);
    }

    pub fn insert_key(&mut self, identity: Identity, public_key: &PublicKey) -> SealResult<()> {
        self.insert(identity, public_key.to_der()?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl DirectoryLookup for MemoryDirectory {
    fn resolve(&self, identity: &Identity) -> SealResult<Option<Vec<u8>>> {
        Ok(self.keys.get(identity).cloned())
    }
}
