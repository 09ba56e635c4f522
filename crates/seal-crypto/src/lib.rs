//! seal-crypto: client-side multi-recipient file encryption
//!
//! Architecture: hybrid envelope, one content key wrapped per recipient
//!
//! Pipeline: plaintext → AES-256-GCM (random content key) → wrap key per recipient (RSA-OAEP) → encode
//!
//! Key hierarchy:
//! ```text
//! Password ──PBKDF2-HMAC-SHA256──▶ Wrapping Key
//!   └── Private Key (RSA, PKCS#8, stored as an AES-256-GCM blob)
//!         └── unwraps Content Key (per-envelope, 256-bit random)
//!               └── Payload AEAD: AES-256-GCM (key=content key, nonce=random 96-bit,
//!                                              AAD=version||fileId||metadata)
//! ```
//!
//! Randomness and the clock are injected through [`CryptoProvider`]; nothing
//! here performs I/O.

pub mod builder;
pub mod codec;
pub mod content;
pub mod custody;
pub mod directory;
pub mod kdf;
pub mod keypair;
pub mod keys;
pub mod opener;
pub mod provider;
pub mod session;

#[cfg(test)]
mod test_keys;

pub use builder::{EnvelopeBuilder, Recipient, SealOptions};
pub use codec::{decode, decode_key_blob, encode, encode_key_blob, inspect};
pub use custody::{decrypt_private_key, KeyCustody};
pub use directory::{DirectoryLookup, MemoryDirectory};
pub use kdf::{derive_wrapping_key, WrappingKey, RECOMMENDED_KDF_ITERATIONS};
pub use keypair::{fingerprint, generate_key_pair, KeyPair, PrivateKey, PublicKey};
pub use keys::{generate_content_key, unwrap_key, wrap_key, ContentKey};
pub use opener::{EnvelopeOpener, OpenedFile};
pub use provider::{CryptoProvider, ProviderRng, SystemProvider};
pub use session::{SessionKey, SessionKeyCache};
