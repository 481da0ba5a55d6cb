//! Mesh-Kontext: eigene Identitaet, Schluessel-Paar, Konfiguration

use std::sync::Arc;

use tuschel_core::PeerId;
use tuschel_crypto::{CryptoProvider, LocalKeyPair};

use crate::config::MeshConfig;

/// Wird einmal beim Start erzeugt und gehoert dem Mesh-Task
pub struct MeshKontext {
    eigene_id: PeerId,
    config: MeshConfig,
    key_pair: LocalKeyPair,
    crypto: Arc<dyn CryptoProvider>,
}

impl MeshKontext {
    /// Erzeugt den Kontext und ein frisches Schluessel-Paar
    pub fn neu(eigene_id: PeerId, config: MeshConfig, crypto: Arc<dyn CryptoProvider>) -> Self {
        let key_pair = crypto.generate_key_pair();
        Self {
            eigene_id,
            config,
            key_pair,
            crypto,
        }
    }

    pub fn eigene_id(&self) -> PeerId {
        self.eigene_id
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    pub fn key_pair(&self) -> &LocalKeyPair {
        &self.key_pair
    }

    pub fn crypto(&self) -> &dyn CryptoProvider {
        self.crypto.as_ref()
    }

    /// Eigener oeffentlicher Schluessel in portabler Kodierung
    pub fn oeffentlicher_schluessel(&self) -> String {
        self.crypto.export_public_key(&self.key_pair)
    }
}

impl std::fmt::Debug for MeshKontext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshKontext")
            .field("eigene_id", &self.eigene_id)
            .field("config", &self.config)
            .field("key_pair", &self.key_pair)
            .finish()
    }
}
