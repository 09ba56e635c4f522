//! Randomness and time as an injectable capability.
//!
//! Every component that draws random bytes or reads the clock takes a
//! `CryptoProvider` at construction, so tests can pin the clock without
//! touching global state.

use chrono::{DateTime, Utc};
use rand::{CryptoRng, RngCore};

/// Source of cryptographic randomness and of the current time.
pub trait CryptoProvider: Send + Sync {
    /// Fill `dest` with cryptographically secure random bytes.
    fn fill_random(&self, dest: &mut [u8]);

    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

impl<P: CryptoProvider + ?Sized> CryptoProvider for &P {
    fn fill_random(&self, dest: &mut [u8]) {
        (**self).fill_random(dest)
    }

    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

impl<P: CryptoProvider + ?Sized> CryptoProvider for std::sync::Arc<P> {
    fn fill_random(&self, dest: &mut [u8]) {
        (**self).fill_random(dest)
    }

    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Thread-local CSPRNG and the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProvider;

impl CryptoProvider for SystemProvider {
    fn fill_random(&self, dest: &mut [u8]) {
        rand::thread_rng().fill_bytes(dest);
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Adapts a provider to the `RngCore + CryptoRng` interface RSA expects.
pub struct ProviderRng<'a, P: CryptoProvider + ?Sized>(pub &'a P);

impl<P: CryptoProvider + ?Sized> RngCore for ProviderRng<'_, P> {
    fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.0.fill_random(&mut buf);
        u32::from_le_bytes(buf)
    }

    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.0.fill_random(&mut buf);
        u64::from_le_bytes(buf)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_random(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.0.fill_random(dest);
        Ok(())
    }
}

impl<P: CryptoProvider + ?Sized> CryptoRng for ProviderRng<'_, P> {}

/// Fill a fixed-size array from the provider.
pub(crate) fn random_array<const N: usize, P: CryptoProvider + ?Sized>(provider: &P) -> [u8; N] {
    let mut out = [0u8; N];
    provider.fill_random(&mut out);
    out
}
