//! Session-scoped cache for an unlocked private key
//!
//! The only place a plaintext private key may outlive a single call. It is
//! held in process memory, never serialized, and dropped (and zeroized by
//! `rsa`) on `lock`/`clear`, on idle timeout, or when the cache goes away.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use seal_core::{Identity, SealResult};

use crate::keypair::PrivateKey;

/// A decrypted private key together with the identity that unlocked it.
pub struct SessionKey {
    private_key: PrivateKey,
    owner: Identity,
}

impl SessionKey {
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    pub fn owner(&self) -> &Identity {
        &self.owner
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey")
            .field("owner", &self.owner)
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

struct Slot {
    key: Arc<SessionKey>,
    last_used: Instant,
}

/// Holds at most one unlocked key for the lifetime of a session.
///
/// `get` hands out an `Arc`; a clone held by a caller keeps the key alive
/// past `clear`, so callers should prefer `with_key` for short uses.
#[derive(Default)]
pub struct SessionKeyCache {
    slot: Mutex<Option<Slot>>,
    idle_timeout: Option<Duration>,
}

impl SessionKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A key left unused for longer than `timeout` is destroyed on the next
    /// access and reported absent.
    pub fn with_idle_timeout(timeout: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            idle_timeout: Some(timeout),
        }
    }

    /// Store an unlocked key, replacing any previous one.
    pub fn unlock(&self, private_key: PrivateKey, identity: &str) -> SealResult<()> {
        let owner = Identity::new(identity)?;
        tracing::debug!(identity = %owner, "session unlocked");
        *self.slot() = Some(Slot {
            key: Arc::new(SessionKey { private_key, owner }),
            last_used: Instant::now(),
        });
        Ok(())
    }

    /// The cached key, or `None` if never unlocked, cleared, or idle too long.
    pub fn get(&self) -> Option<Arc<SessionKey>> {
        let mut slot = self.slot();
        self.expire_idle(&mut slot);
        slot.as_mut().map(|s| {
            s.last_used = Instant::now();
            Arc::clone(&s.key)
        })
    }

    /// The cached key only if it belongs to `identity`.
    pub fn get_for(&self, identity: &str) -> Option<Arc<SessionKey>> {
        self.get().filter(|k| k.owner.matches(identity))
    }

    /// Run `f` against the cached key without letting it escape.
    pub fn with_key<R>(&self, f: impl FnOnce(&SessionKey) -> R) -> Option<R> {
        self.get().map(|k| f(&k))
    }

    pub fn is_unlocked(&self) -> bool {
        let mut slot = self.slot();
        self.expire_idle(&mut slot);
        slot.is_some()
    }

    pub fn owner(&self) -> Option<Identity> {
        let mut slot = self.slot();
        self.expire_idle(&mut slot);
        slot.as_ref().map(|s| s.key.owner.clone())
    }

    /// Destroy the cached key immediately.
    pub fn lock(&self) {
        if self.slot().take().is_some() {
            tracing::debug!("session locked");
        }
    }

    /// Alias of `lock`, for logout paths.
    pub fn clear(&self) {
        self.lock();
    }

    fn slot(&self) -> MutexGuard<'_, Option<Slot>> {
        // A panic while holding the lock cannot leave the slot half-written.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn expire_idle(&self, slot: &mut Option<Slot>) {
        if let (Some(timeout), Some(s)) = (self.idle_timeout, slot.as_ref()) {
            if s.last_used.elapsed() > timeout {
                tracing::debug!(identity = %s.key.owner, "session idle timeout");
                *slot = None;
            }
        }
    }
}

impl std::fmt::Debug for SessionKeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeyCache")
            .field("unlocked", &self.slot().is_some())
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}
