//! E2E Verschluesselung (Peer <-> Peer)
//!
//! Jedes Peer-Paar vereinbart ueber den bereits offenen Datenkanal einen
//! eigenen symmetrischen Schluessel. Der Rendezvous-Server sieht nur
//! Verhandlungs-Metadaten, nie Schluessel oder Inhalte.
//!
//! ## Ablauf
//! 1. Jeder Peer hat ein `LocalKeyPair` (X25519), einmal pro Sitzung erzeugt
//! 2. Bei Kanal-Oeffnung: eigener oeffentlicher Schluessel im Kontroll-Frame
//! 3. Beide Seiten leiten unabhaengig denselben Schluessel ab (DH + HKDF)
//! 4. Nachrichten werden mit AES-256-GCM bzw. ChaCha20-Poly1305 verschluesselt

pub mod decrypt;
pub mod encrypt;
pub mod key_exchange;

pub use decrypt::{decrypt, decrypt_bytes};
pub use encrypt::encrypt;
pub use key_exchange::{derive_shared_key, hkdf_derive};
