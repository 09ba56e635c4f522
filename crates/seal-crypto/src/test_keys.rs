//! Shared 2048-bit key pairs for unit tests. Generated once per test binary.

use std::sync::OnceLock;

use crate::keypair::{generate_key_pair, KeyPair};
use crate::provider::SystemProvider;

fn cached(cell: &'static OnceLock<KeyPair>) -> &'static KeyPair {
    cell.get_or_init(|| generate_key_pair(&SystemProvider, 2048).unwrap())
}

pub fn alice() -> &'static KeyPair {
    static KEY: OnceLock<KeyPair> = OnceLock::new();
    cached(&KEY)
}

pub fn bob() -> &'static KeyPair {
    static KEY: OnceLock<KeyPair> = OnceLock::new();
    cached(&KEY)
}

pub fn carol() -> &'static KeyPair {
    static KEY: OnceLock<KeyPair> = OnceLock::new();
    cached(&KEY)
}
