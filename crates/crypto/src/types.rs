//! Gemeinsame Typen fuer das Kryptografie-Subsystem

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::error::{CryptoError, CryptoResult};

/// Laenge eines X25519-Schluessels in Bytes
pub const SCHLUESSEL_LAENGE: usize = 32;

/// Laenge einer AEAD-Nonce in Bytes
pub const NONCE_LAENGE: usize = 12;

// ---------------------------------------------------------------------------
// Schluessel
// ---------------------------------------------------------------------------

/// Oeffentlicher X25519-Schluessel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PublicKey {
    pub bytes: [u8; SCHLUESSEL_LAENGE],
}

impl PublicKey {
    pub fn new(bytes: [u8; SCHLUESSEL_LAENGE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; SCHLUESSEL_LAENGE] {
        &self.bytes
    }

    /// Portable Kodierung fuer den Kontroll-Frame
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }

    /// Dekodiert einen Schluessel aus dem Kontroll-Frame
    pub fn from_base64(kodiert: &str) -> CryptoResult<Self> {
        let roh = STANDARD.decode(kodiert.trim())?;
        let bytes: [u8; SCHLUESSEL_LAENGE] =
            roh.as_slice()
                .try_into()
                .map_err(|_| CryptoError::UngueltigeSchluesselLaenge {
                    erwartet: SCHLUESSEL_LAENGE,
                    erhalten: roh.len(),
                })?;
        Ok(Self { bytes })
    }
}

/// Eigenes Schluessel-Paar, einmal pro Mesh-Kontext erzeugt
///
/// Der private Teil verlaesst diese Struktur nie.
pub struct LocalKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl LocalKeyPair {
    /// Erzeugt ein frisches Schluessel-Paar aus dem OS-Zufallsgenerator
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::new(X25519PublicKey::from(&secret).to_bytes());
        Self { secret, public }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub(crate) fn secret(&self) -> &StaticSecret {
        &self.secret
    }
}

impl std::fmt::Debug for LocalKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeyPair")
            .field("public", &self.public.to_base64())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Sicherer Schluessel-Container (wird beim Drop genullt)
#[derive(Clone)]
pub struct SecretBytes(pub Vec<u8>);

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes([REDACTED] {} bytes)", self.0.len())
    }
}

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Algorithmus fuer die Verschluesselung der Anwendungsnachrichten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AeadAlgorithmus {
    #[default]
    Aes256Gcm,
    ChaCha20Poly1305,
}

/// Symmetrischer Schluessel eines Peer-Paars
#[derive(Debug, Clone)]
pub struct SharedKey {
    pub key_bytes: SecretBytes,
    pub algorithmus: AeadAlgorithmus,
}

impl SharedKey {
    /// Kurzer Fingerabdruck (SHA-256, erste 8 Bytes hex) zum Vergleich
    /// ausserhalb des Kanals
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.key_bytes.as_bytes());
        digest[..8].iter().map(|b| format!("{b:02x}")).collect()
    }
}

// ---------------------------------------------------------------------------
// Nonce + Payload
// ---------------------------------------------------------------------------

/// Eine kryptografische Nonce (Number used once)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nonce {
    pub bytes: [u8; NONCE_LAENGE],
}

impl Nonce {
    /// Frische Zufalls-Nonce (96 Bit)
    pub fn zufaellig() -> Self {
        let mut bytes = [0u8; NONCE_LAENGE];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_LAENGE] {
        &self.bytes
    }
}

/// Verschluesselter Payload (Nonce + Ciphertext inkl. Auth-Tag)
#[derive(Debug, Clone)]
pub struct EncryptedPayload {
    /// 12 Bytes Nonce
    pub nonce: Nonce,
    /// Verschluesselter Inhalt inkl. 16 Bytes Auth-Tag (angehaengt)
    pub ciphertext: Vec<u8>,
}

impl EncryptedPayload {
    /// Serialisiert zu Bytes: [nonce(12)] + [ciphertext]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LAENGE + self.ciphertext.len());
        out.extend_from_slice(&self.nonce.bytes);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Deserialisiert aus Bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < NONCE_LAENGE {
            return None;
        }
        let mut nonce_bytes = [0u8; NONCE_LAENGE];
        nonce_bytes.copy_from_slice(&bytes[..NONCE_LAENGE]);
        Some(Self {
            nonce: Nonce { bytes: nonce_bytes },
            ciphertext: bytes[NONCE_LAENGE..].to_vec(),
        })
    }
}
