//! X25519 Diffie-Hellman Schluesselvereinbarung
//!
//! Kein Handshake mit Bestaetigung: jede Seite kennt nach Empfang des
//! Kontroll-Frames beide oeffentlichen Schluessel und leitet daraus
//! denselben Paar-Schluessel ab.
//!
//! ```text
//! dh   = X25519(eigener_privater, peer_oeffentlicher)
//! salt = min(pk_a, pk_b) || max(pk_a, pk_b)
//! key  = HKDF-SHA256(salt, dh).expand("tuschel-pair-key-v1", 32)
//! ```
//!
//! Die Sortierung der oeffentlichen Schluessel macht den Salt auf beiden
//! Seiten identisch, ohne dass eine Rolle (Initiator/Responder) eingeht.

use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::PublicKey as X25519PublicKey;

use crate::error::{CryptoError, CryptoResult};
use crate::types::{AeadAlgorithmus, LocalKeyPair, PublicKey, SecretBytes, SharedKey, SCHLUESSEL_LAENGE};

/// HKDF-Info fuer den Paar-Schluessel
const PAAR_SCHLUESSEL_INFO: &[u8] = b"tuschel-pair-key-v1";

/// Leitet den symmetrischen Schluessel fuer ein Peer-Paar ab
///
/// Lehnt Schluessel kleiner Ordnung ab (DH-Ergebnis ohne Beitrag des
/// eigenen Geheimnisses).
pub fn derive_shared_key(
    eigen: &LocalKeyPair,
    peer: &PublicKey,
    algorithmus: AeadAlgorithmus,
) -> CryptoResult<SharedKey> {
    let peer_pk = X25519PublicKey::from(*peer.as_bytes());
    let dh_output = eigen.secret().diffie_hellman(&peer_pk);

    if !dh_output.was_contributory() {
        return Err(CryptoError::KeyExchange(
            "Oeffentlicher Schluessel hat kleine Ordnung".to_string(),
        ));
    }

    let (klein, gross) = if eigen.public_key() <= peer {
        (eigen.public_key(), peer)
    } else {
        (peer, eigen.public_key())
    };
    let mut salt = [0u8; 2 * SCHLUESSEL_LAENGE];
    salt[..SCHLUESSEL_LAENGE].copy_from_slice(klein.as_bytes());
    salt[SCHLUESSEL_LAENGE..].copy_from_slice(gross.as_bytes());

    let key = hkdf_derive(dh_output.as_bytes(), &salt, PAAR_SCHLUESSEL_INFO, 32)?;

    Ok(SharedKey {
        key_bytes: SecretBytes::new(key),
        algorithmus,
    })
}

/// HKDF-basierte Key Derivation (allgemein verwendbar)
pub fn hkdf_derive(ikm: &[u8], salt: &[u8], info: &[u8], len: usize) -> CryptoResult<Vec<u8>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = vec![0u8; len];
    hk.expand(info, &mut okm)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(okm)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beide_seiten_leiten_gleichen_schluessel_ab() {
        let alice = LocalKeyPair::generate();
        let bob = LocalKeyPair::generate();

        let k_alice =
            derive_shared_key(&alice, bob.public_key(), AeadAlgorithmus::Aes256Gcm).unwrap();
        let k_bob =
            derive_shared_key(&bob, alice.public_key(), AeadAlgorithmus::Aes256Gcm).unwrap();

        assert_eq!(k_alice.key_bytes.as_bytes(), k_bob.key_bytes.as_bytes());
        assert_eq!(k_alice.fingerprint(), k_bob.fingerprint());
        assert_eq!(k_alice.key_bytes.len(), 32);
    }

    #[test]
    fn verschiedene_paare_verschiedene_schluessel() {
        let alice = LocalKeyPair::generate();
        let bob = LocalKeyPair::generate();
        let carol = LocalKeyPair::generate();

        let ab = derive_shared_key(&alice, bob.public_key(), AeadAlgorithmus::Aes256Gcm).unwrap();
        let ac =
            derive_shared_key(&alice, carol.public_key(), AeadAlgorithmus::Aes256Gcm).unwrap();

        assert_ne!(ab.key_bytes.as_bytes(), ac.key_bytes.as_bytes());
    }

    #[test]
    fn null_schluessel_wird_abgelehnt() {
        let alice = LocalKeyPair::generate();
        let null = PublicKey::new([0u8; 32]);
        let result = derive_shared_key(&alice, &null, AeadAlgorithmus::Aes256Gcm);
        assert!(matches!(result, Err(CryptoError::KeyExchange(_))));
    }

    #[test]
    fn hkdf_derive_deterministisch() {
        let key1 = hkdf_derive(b"ikm", b"salt", b"info", 32).unwrap();
        let key2 = hkdf_derive(b"ikm", b"salt", b"info", 32).unwrap();
        assert_eq!(key1, key2);
        assert_eq!(key1.len(), 32);
    }

    #[test]
    fn hkdf_verschiedene_infos_geben_verschiedene_keys() {
        let key1 = hkdf_derive(b"gleicher-ikm", b"salt", b"info-1", 32).unwrap();
        let key2 = hkdf_derive(b"gleicher-ikm", b"salt", b"info-2", 32).unwrap();
        assert_ne!(key1, key2);
    }
}
