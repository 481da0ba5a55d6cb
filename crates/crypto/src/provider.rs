//! Kryptografie-Provider
//!
//! Der Mesh-Kern kennt nur diesen Trait. Schluessel-Erzeugung,
//! Vereinbarung und AEAD sind damit austauschbar (z.B. fuer Tests oder
//! eine Hardware-gestuetzte Implementierung).

use crate::e2e::{decrypt_bytes, derive_shared_key, encrypt};
use crate::error::CryptoResult;
use crate::types::{AeadAlgorithmus, LocalKeyPair, PublicKey, SharedKey};

/// Schnittstelle zu den kryptografischen Primitiven
pub trait CryptoProvider: Send + Sync + 'static {
    /// Erzeugt ein asymmetrisches Schluessel-Paar
    fn generate_key_pair(&self) -> LocalKeyPair;

    /// Exportiert den oeffentlichen Schluessel in portabler Kodierung
    fn export_public_key(&self, key_pair: &LocalKeyPair) -> String;

    /// Importiert einen oeffentlichen Schluessel aus portabler Kodierung
    fn import_public_key(&self, kodiert: &str) -> CryptoResult<PublicKey>;

    /// Leitet den symmetrischen Schluessel aus eigenem Paar und Peer-Schluessel ab
    fn derive_shared_key(&self, eigen: &LocalKeyPair, peer: &PublicKey) -> CryptoResult<SharedKey>;

    /// Authentifizierte Verschluesselung, Ergebnis ist `nonce || ciphertext`
    fn encrypt(&self, key: &SharedKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Authentifizierte Entschluesselung von `nonce || ciphertext`
    fn decrypt(&self, key: &SharedKey, data: &[u8]) -> CryptoResult<Vec<u8>>;
}

/// Standard-Provider: X25519 + HKDF-SHA256 + AES-256-GCM/ChaCha20-Poly1305
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardCrypto {
    algorithmus: AeadAlgorithmus,
}

impl StandardCrypto {
    /// Erstellt einen Provider mit dem gewaehlten AEAD-Algorithmus
    pub fn neu(algorithmus: AeadAlgorithmus) -> Self {
        Self { algorithmus }
    }

    pub fn algorithmus(&self) -> AeadAlgorithmus {
        self.algorithmus
    }
}

impl CryptoProvider for StandardCrypto {
    fn generate_key_pair(&self) -> LocalKeyPair {
        LocalKeyPair::generate()
    }

    fn export_public_key(&self, key_pair: &LocalKeyPair) -> String {
        key_pair.public_key().to_base64()
    }

    fn import_public_key(&self, kodiert: &str) -> CryptoResult<PublicKey> {
        PublicKey::from_base64(kodiert)
    }

    fn derive_shared_key(&self, eigen: &LocalKeyPair, peer: &PublicKey) -> CryptoResult<SharedKey> {
        derive_shared_key(eigen, peer, self.algorithmus)
    }

    fn encrypt(&self, key: &SharedKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        Ok(encrypt(plaintext, key)?.to_bytes())
    }

    fn decrypt(&self, key: &SharedKey, data: &[u8]) -> CryptoResult<Vec<u8>> {
        decrypt_bytes(data, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_ende_zu_ende() {
        let provider = StandardCrypto::default();
        let alice = provider.generate_key_pair();
        let bob = provider.generate_key_pair();

        // Austausch ueber die portable Kodierung wie im Kontroll-Frame
        let bob_pk = provider
            .import_public_key(&provider.export_public_key(&bob))
            .unwrap();
        let alice_pk = provider
            .import_public_key(&provider.export_public_key(&alice))
            .unwrap();

        let k_alice = provider.derive_shared_key(&alice, &bob_pk).unwrap();
        let k_bob = provider.derive_shared_key(&bob, &alice_pk).unwrap();

        let frame = provider.encrypt(&k_alice, b"Hallo Bob").unwrap();
        assert_eq!(provider.decrypt(&k_bob, &frame).unwrap(), b"Hallo Bob");
    }

    #[test]
    fn falscher_schluessel_ergibt_fehler_statt_panic() {
        let provider = StandardCrypto::neu(AeadAlgorithmus::ChaCha20Poly1305);
        let alice = provider.generate_key_pair();
        let bob = provider.generate_key_pair();
        let eve = provider.generate_key_pair();

        let k_ab = provider.derive_shared_key(&alice, bob.public_key()).unwrap();
        let k_eb = provider.derive_shared_key(&eve, bob.public_key()).unwrap();

        let frame = provider.encrypt(&k_ab, b"nur fuer Bob").unwrap();
        assert!(provider.decrypt(&k_eb, &frame).is_err());
    }

    #[test]
    fn import_ungueltiger_schluessel() {
        let provider = StandardCrypto::default();
        assert!(provider.import_public_key("kurz").is_err());
    }
}
