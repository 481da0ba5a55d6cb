//! Entschluesselung von Anwendungsnachrichten
//!
//! Verifiziert dabei den Auth-Tag. Ein falscher Schluessel oder ein
//! manipulierter Frame liefert immer einen Fehler, nie einen Panic.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce as AesNonce,
};
use chacha20poly1305::{ChaCha20Poly1305, Key as ChaChaKey, Nonce as ChaChaNonce};

use crate::error::{CryptoError, CryptoResult};
use crate::types::{AeadAlgorithmus, EncryptedPayload, SharedKey};

/// Entschluesselt einen Payload mit dem Paar-Schluessel
pub fn decrypt(payload: &EncryptedPayload, key: &SharedKey) -> CryptoResult<Vec<u8>> {
    match key.algorithmus {
        AeadAlgorithmus::Aes256Gcm => decrypt_aes256gcm(
            &payload.ciphertext,
            key.key_bytes.as_bytes(),
            payload.nonce.as_bytes(),
        ),
        AeadAlgorithmus::ChaCha20Poly1305 => decrypt_chacha20(
            &payload.ciphertext,
            key.key_bytes.as_bytes(),
            payload.nonce.as_bytes(),
        ),
    }
}

/// Entschluesselt rohe Bytes (Nonce + Ciphertext)
///
/// Nuetzlich wenn Bytes direkt aus dem Datenkanal kommen.
pub fn decrypt_bytes(data: &[u8], key: &SharedKey) -> CryptoResult<Vec<u8>> {
    let payload = EncryptedPayload::from_bytes(data)
        .ok_or_else(|| CryptoError::UngueltigeDaten("Ungueltige Payload-Struktur".to_string()))?;
    decrypt(&payload, key)
}

fn decrypt_aes256gcm(
    ciphertext: &[u8],
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
        .decrypt(AesNonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| CryptoError::Entschluesselung(e.to_string()))
}

fn decrypt_chacha20(
    ciphertext: &[u8],
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
        .decrypt(ChaChaNonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| CryptoError::Entschluesselung(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::e2e::encrypt::encrypt;
    use crate::types::SecretBytes;

    fn key(byte: u8, alg: AeadAlgorithmus) -> SharedKey {
        SharedKey {
            key_bytes: SecretBytes::new(vec![byte; 32]),
            algorithmus: alg,
        }
    }

    #[test]
    fn roundtrip_aes256gcm() {
        let k = key(1, AeadAlgorithmus::Aes256Gcm);
        let payload = encrypt(b"Hallo Mesh", &k).unwrap();
        assert_eq!(decrypt(&payload, &k).unwrap(), b"Hallo Mesh");
    }

    #[test]
    fn roundtrip_chacha20_ueber_bytes() {
        let k = key(2, AeadAlgorithmus::ChaCha20Poly1305);
        let bytes = encrypt(b"ChaCha-Test", &k).unwrap().to_bytes();
        assert_eq!(decrypt_bytes(&bytes, &k).unwrap(), b"ChaCha-Test");
    }

    #[test]
    fn falscher_schluessel_schlaegt_fehl() {
        let k1 = key(1, AeadAlgorithmus::Aes256Gcm);
        let k2 = key(2, AeadAlgorithmus::Aes256Gcm);
        let payload = encrypt(b"Geheim", &k1).unwrap();
        assert!(matches!(
            decrypt(&payload, &k2),
            Err(CryptoError::Entschluesselung(_))
        ));
    }

    #[test]
    fn manipulierter_ciphertext_schlaegt_fehl() {
        let k = key(1, AeadAlgorithmus::Aes256Gcm);
        let mut payload = encrypt(b"Original", &k).unwrap();
        if let Some(byte) = payload.ciphertext.first_mut() {
            *byte ^= 0xFF;
        }
        assert!(decrypt(&payload, &k).is_err());
    }

    #[test]
    fn ungueltige_bytes_schlagen_fehl() {
        let k = key(1, AeadAlgorithmus::Aes256Gcm);
        assert!(matches!(
            decrypt_bytes(&[0u8; 5], &k),
            Err(CryptoError::UngueltigeDaten(_))
        ));
    }

    #[test]
    fn leere_nachricht() {
        let k = key(3, AeadAlgorithmus::Aes256Gcm);
        let payload = encrypt(b"", &k).unwrap();
        assert!(decrypt(&payload, &k).unwrap().is_empty());
    }
}
