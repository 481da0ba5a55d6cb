//! Gemeinsame Hilfen fuer die Mesh-Integrationstests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tuschel_core::PeerId;
use tuschel_crypto::{
    CryptoProvider, CryptoResult, LocalKeyPair, PublicKey, SharedKey, StandardCrypto,
};
use tuschel_mesh::{
    EventKind, Mesh, MeshConfig, MeshEvent, MeshHandle, MeshKontext, MemoryNetwork,
    MemorySignalNetz, MemoryTransport, SignalSink,
};

pub const ALLE_EREIGNISSE: [EventKind; 5] = [
    EventKind::ChannelOpened,
    EventKind::EncryptionEstablished,
    EventKind::Disconnected,
    EventKind::MessageReceived,
    EventKind::StatusChanged,
];

/// Ein laufender Mesh mit Transport-Endpunkt und Ereignis-Kanal
pub struct Teilnehmer {
    pub name: String,
    pub handle: MeshHandle,
    pub transport: MemoryTransport,
    pub ereignisse: mpsc::UnboundedReceiver<MeshEvent>,
}

impl Teilnehmer {
    pub fn id(&self) -> PeerId {
        self.handle.eigene_id()
    }

    /// Wartet auf das erste Ereignis, das `passt` erfuellt
    pub async fn warte_auf(&mut self, mut passt: impl FnMut(&MeshEvent) -> bool) -> MeshEvent {
        let ereignisse = &mut self.ereignisse;
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match ereignisse.recv().await {
                    Some(e) if passt(&e) => return e,
                    Some(_) => continue,
                    None => panic!("Ereigniskanal geschlossen"),
                }
            }
        })
        .await
        .expect("Ereignis kam nicht rechtzeitig")
    }

    pub async fn warte_verschluesselt(&mut self, peer: PeerId) -> String {
        match self
            .warte_auf(|e| matches!(e, MeshEvent::EncryptionEstablished { peer: p, .. } if *p == peer))
            .await
        {
            MeshEvent::EncryptionEstablished { fingerprint, .. } => fingerprint,
            _ => unreachable!(),
        }
    }

    pub async fn warte_kanal_offen(&mut self, peer: PeerId) {
        self.warte_auf(|e| matches!(e, MeshEvent::ChannelOpened { peer: p, .. } if *p == peer))
            .await;
    }

    pub async fn warte_nachricht(&mut self) -> (PeerId, String) {
        match self
            .warte_auf(|e| matches!(e, MeshEvent::MessageReceived { .. }))
            .await
        {
            MeshEvent::MessageReceived { peer, message, .. } => (peer, message.text),
            _ => unreachable!(),
        }
    }

    /// Alle bisher zugestellten Ereignisse ohne zu warten
    pub fn bisherige(&mut self) -> Vec<MeshEvent> {
        let mut alle = Vec::new();
        while let Ok(e) = self.ereignisse.try_recv() {
            alle.push(e);
        }
        alle
    }
}

pub struct Aufbau {
    pub netz: MemoryNetwork,
    pub signale: MemorySignalNetz,
}

impl Aufbau {
    pub fn neu() -> Self {
        Self {
            netz: MemoryNetwork::neu(),
            signale: MemorySignalNetz::neu(),
        }
    }

    pub async fn teilnehmer(&self, name: &str) -> Teilnehmer {
        self.teilnehmer_mit(name, MeshConfig::mit_name(name), Arc::new(StandardCrypto::default()))
            .await
    }

    pub async fn teilnehmer_mit(
        &self,
        name: &str,
        config: MeshConfig,
        crypto: Arc<dyn CryptoProvider>,
    ) -> Teilnehmer {
        let signale = self.signale.clone();
        self.teilnehmer_mit_signalen(name, config, crypto, move |id| signale.sink(id))
            .await
    }

    pub async fn teilnehmer_mit_signalen(
        &self,
        name: &str,
        config: MeshConfig,
        crypto: Arc<dyn CryptoProvider>,
        signale: impl FnOnce(PeerId) -> Arc<dyn SignalSink>,
    ) -> Teilnehmer {
        let kontext = MeshKontext::neu(PeerId::new(), config, crypto);
        let id = kontext.eigene_id();
        let transport = self.netz.transport();
        let (handle, _task) = Mesh::starten(kontext, Arc::new(transport.clone()), signale(id));
        let ereignisse = handle.ereignis_kanal(&ALLE_EREIGNISSE).await.unwrap();
        self.signale.registrieren(handle.clone(), name);
        Teilnehmer {
            name: name.to_string(),
            handle,
            transport,
            ereignisse,
        }
    }
}

/// Baut eine verschluesselte Verbindung a -> b auf
pub async fn verbinden(a: &mut Teilnehmer, b: &mut Teilnehmer) -> String {
    a.handle.initiate(b.id(), b.name.clone()).await.unwrap();
    let fp_a = a.warte_verschluesselt(b.id()).await;
    let fp_b = b.warte_verschluesselt(a.id()).await;
    assert_eq!(fp_a, fp_b, "Beide Seiten muessen denselben Schluessel ableiten");
    fp_a
}

/// Crypto-Provider der den eigenen Schluessel zurueckhaelt
///
/// Der Kontroll-Frame traegt einen unbrauchbaren Schluessel, die
/// Gegenseite bleibt also bei `ChannelOpen`. Der echte Export liegt in
/// `echt` und kann spaeter per `frame_einspeisen` nachgereicht werden.
#[derive(Default)]
pub struct ZurueckgehaltenerSchluessel {
    innen: StandardCrypto,
    pub echt: Arc<Mutex<Option<String>>>,
}

impl CryptoProvider for ZurueckgehaltenerSchluessel {
    fn generate_key_pair(&self) -> LocalKeyPair {
        self.innen.generate_key_pair()
    }

    fn export_public_key(&self, key_pair: &LocalKeyPair) -> String {
        *self.echt.lock() = Some(self.innen.export_public_key(key_pair));
        "zurueckgehalten".to_string()
    }

    fn import_public_key(&self, kodiert: &str) -> CryptoResult<PublicKey> {
        self.innen.import_public_key(kodiert)
    }

    fn derive_shared_key(&self, eigen: &LocalKeyPair, peer: &PublicKey) -> CryptoResult<SharedKey> {
        self.innen.derive_shared_key(eigen, peer)
    }

    fn encrypt(&self, key: &SharedKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        self.innen.encrypt(key, plaintext)
    }

    fn decrypt(&self, key: &SharedKey, data: &[u8]) -> CryptoResult<Vec<u8>> {
        self.innen.decrypt(key, data)
    }
}
