//! # tuschel-crypto
//!
//! Kryptografie-Provider fuer Tuschel.
//!
//! ## Module
//! - `e2e` - Schluesselvereinbarung (X25519 + HKDF) und AEAD pro Peer-Paar
//! - `provider` - `CryptoProvider`-Trait und Standard-Implementierung
//! - `types` - Gemeinsame Typen (PublicKey, SharedKey, Nonce, etc.)
//! - `error` - Fehlertypen

pub mod e2e;
pub mod error;
pub mod provider;
pub mod types;

// Bequeme Re-Exports
pub use error::{CryptoError, CryptoResult};
pub use provider::{CryptoProvider, StandardCrypto};
pub use types::{AeadAlgorithmus, EncryptedPayload, LocalKeyPair, Nonce, PublicKey, SecretBytes, SharedKey};

pub use e2e::{decrypt, decrypt_bytes, derive_shared_key, encrypt, hkdf_derive};
