//! Verschluesselung von Anwendungsnachrichten
//!
//! ## Format
//! ```text
//! [nonce(12)] [ciphertext + auth_tag(16)]
//! ```
//!
//! Jede Nachricht bekommt eine frische Zufalls-Nonce. Bei 96 Bit ist die
//! Kollisionswahrscheinlichkeit fuer Chat-Volumen vernachlaessigbar.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce as AesNonce,
};
use chacha20poly1305::{ChaCha20Poly1305, Key as ChaChaKey, Nonce as ChaChaNonce};

use crate::error::{CryptoError, CryptoResult};
use crate::types::{AeadAlgorithmus, EncryptedPayload, Nonce, SharedKey};

/// Verschluesselt einen Klartext mit dem Paar-Schluessel
pub fn encrypt(plaintext: &[u8], key: &SharedKey) -> CryptoResult<EncryptedPayload> {
    let nonce = Nonce::zufaellig();

    let ciphertext = match key.algorithmus {
        AeadAlgorithmus::Aes256Gcm => {
            encrypt_aes256gcm(plaintext, key.key_bytes.as_bytes(), nonce.as_bytes())?
        }
        AeadAlgorithmus::ChaCha20Poly1305 => {
            encrypt_chacha20(plaintext, key.key_bytes.as_bytes(), nonce.as_bytes())?
        }
    };

    Ok(EncryptedPayload { nonce, ciphertext })
}

fn encrypt_aes256gcm(
    plaintext: &[u8],
    key_bytes: &[u8],
    nonce_bytes: &[u8; 12],
) -> CryptoResult<Vec<u8>> {
    if key_bytes.len() != 32 {
        return Err(CryptoError::UngueltigeSchluesselLaenge {
            erwartet: 32,
            erhalten: key_bytes.len(),
        });
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes));
    cipher
        .encrypt(AesNonce::from_slice(nonce_bytes), plaintext)
        .map_err(|e| CryptoError::Verschluesselung(e.to_string()))
}

fn encrypt_chacha20(
    plaintext: &[u8],
    key_bytes: &[u8],
    nonce_bytes: &[u8; 12],
) -> CryptoResult<Vec<u8>> {
    if key_bytes.len() != 32 {
        return Err(CryptoError::UngueltigeSchluesselLaenge {
            erwartet: 32,
            erhalten: key_bytes.len(),
        });
    }

    let cipher = ChaCha20Poly1305::new(ChaChaKey::from_slice(key_bytes));
    cipher
        .encrypt(ChaChaNonce::from_slice(nonce_bytes), plaintext)
        .map_err(|e| CryptoError::Verschluesselung(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SecretBytes;

    fn test_key(alg: AeadAlgorithmus) -> SharedKey {
        SharedKey {
            key_bytes: SecretBytes::new(vec![0x42; 32]),
            algorithmus: alg,
        }
    }

    #[test]
    fn ciphertext_hat_auth_tag() {
        let key = test_key(AeadAlgorithmus::Aes256Gcm);
        let plaintext = b"Hallo Welt";
        let payload = encrypt(plaintext, &key).unwrap();
        assert_eq!(payload.ciphertext.len(), plaintext.len() + 16);
    }

    #[test]
    fn chacha20_verschluesselt() {
        let key = test_key(AeadAlgorithmus::ChaCha20Poly1305);
        let payload = encrypt(b"Nachricht", &key).unwrap();
        assert!(payload.ciphertext.len() >= 9 + 16);
    }

    #[test]
    fn gleicher_klartext_verschiedene_ciphertexte() {
        let key = test_key(AeadAlgorithmus::Aes256Gcm);
        let a = encrypt(b"gleich", &key).unwrap();
        let b = encrypt(b"gleich", &key).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn falsche_schluessellaenge() {
        let key = SharedKey {
            key_bytes: SecretBytes::new(vec![1; 16]),
            algorithmus: AeadAlgorithmus::Aes256Gcm,
        };
        assert!(matches!(
            encrypt(b"x", &key),
            Err(CryptoError::UngueltigeSchluesselLaenge { .. })
        ));
    }
}
