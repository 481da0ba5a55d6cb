//! Integrationstests: zwei Meshes ueber echte TCP-Datenkanaele

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tuschel_core::PeerId;
use tuschel_crypto::StandardCrypto;
use tuschel_mesh::{
    EventKind, MemorySignalNetz, Mesh, MeshConfig, MeshEvent, MeshHandle, MeshKontext,
    SessionState, Trennungsgrund,
};
use tuschel_transport::{TcpTransport, TcpTransportConfig};

struct Knoten {
    handle: MeshHandle,
    transport: TcpTransport,
    ereignisse: mpsc::UnboundedReceiver<MeshEvent>,
}

impl Knoten {
    async fn warte_auf(&mut self, mut passt: impl FnMut(&MeshEvent) -> bool) -> MeshEvent {
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

    async fn warte_verschluesselt(&mut self, peer: PeerId) -> String {
        match self
            .warte_auf(|e| matches!(e, MeshEvent::EncryptionEstablished { peer: p, .. } if *p == peer))
            .await
        {
            MeshEvent::EncryptionEstablished { fingerprint, .. } => fingerprint,
            _ => unreachable!(),
        }
    }
}

async fn knoten(signale: &MemorySignalNetz, name: &str) -> Knoten {
    knoten_mit(signale, name, TcpTransportConfig::default()).await
}

async fn knoten_mit(signale: &MemorySignalNetz, name: &str, config: TcpTransportConfig) -> Knoten {
    let transport = TcpTransport::binden(config).await.unwrap();
    let kontext = MeshKontext::neu(
        PeerId::new(),
        MeshConfig::mit_name(name),
        Arc::new(StandardCrypto::default()),
    );
    let id = kontext.eigene_id();
    let (handle, _task) = Mesh::starten(kontext, Arc::new(transport.clone()), signale.sink(id));
    let ereignisse = handle
        .ereignis_kanal(&[
            EventKind::ChannelOpened,
            EventKind::EncryptionEstablished,
            EventKind::Disconnected,
            EventKind::MessageReceived,
        ])
        .await
        .unwrap();
    signale.registrieren(handle.clone(), name);
    Knoten {
        handle,
        transport,
        ereignisse,
    }
}

#[tokio::test]
async fn verschluesselte_nachrichten_ueber_tcp() {
    let signale = MemorySignalNetz::neu();
    let mut alice = knoten(&signale, "alice").await;
    let mut bob = knoten(&signale, "bob").await;
    let alice_id = alice.handle.eigene_id();
    let bob_id = bob.handle.eigene_id();

    alice.handle.initiate(bob_id, "bob").await.unwrap();
    let fp_a = alice.warte_verschluesselt(bob_id).await;
    let fp_b = bob.warte_verschluesselt(alice_id).await;
    assert_eq!(fp_a, fp_b);

    alice.handle.send(bob_id, "Hallo Bob").await.unwrap();
    bob.handle.send(alice_id, "Hallo Alice").await.unwrap();

    match bob.warte_auf(|e| matches!(e, MeshEvent::MessageReceived { .. })).await {
        MeshEvent::MessageReceived { peer, message, .. } => {
            assert_eq!(peer, alice_id);
            assert_eq!(message.text, "Hallo Bob");
        }
        _ => unreachable!(),
    }
    match alice.warte_auf(|e| matches!(e, MeshEvent::MessageReceived { .. })).await {
        MeshEvent::MessageReceived { name, message, .. } => {
            assert_eq!(name, "bob");
            assert_eq!(message.text, "Hallo Alice");
        }
        _ => unreachable!(),
    }

    let roster = alice.handle.roster().await.unwrap();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].state, SessionState::Encrypted);
    assert_eq!(alice.transport.offene_kanaele(), 1);
}

#[tokio::test]
async fn trennen_meldet_der_gegenseite_das_ende() {
    let signale = MemorySignalNetz::neu();
    let mut alice = knoten(&signale, "alice").await;
    let mut bob = knoten(&signale, "bob").await;
    let alice_id = alice.handle.eigene_id();
    let bob_id = bob.handle.eigene_id();

    alice.handle.initiate(bob_id, "bob").await.unwrap();
    alice.warte_verschluesselt(bob_id).await;
    bob.warte_verschluesselt(alice_id).await;

    assert!(alice.handle.disconnect_peer(bob_id).await.unwrap());
    match alice.warte_auf(|e| matches!(e, MeshEvent::Disconnected { .. })).await {
        MeshEvent::Disconnected { grund, .. } => assert_eq!(grund, Trennungsgrund::Lokal),
        _ => unreachable!(),
    }

    // Der Socket schliesst, Bob raeumt seine Sitzung genau einmal ab
    match bob.warte_auf(|e| matches!(e, MeshEvent::Disconnected { .. })).await {
        MeshEvent::Disconnected { peer, grund, .. } => {
            assert_eq!(peer, alice_id);
            assert!(matches!(grund, Trennungsgrund::Verhandlung(_)));
        }
        _ => unreachable!(),
    }
    assert!(bob.handle.roster().await.unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(bob
        .ereignisse
        .try_recv()
        .map(|e| !matches!(e, MeshEvent::Disconnected { .. }))
        .unwrap_or(true));
    assert_eq!(bob.transport.verbindungen(), 0);
}

#[tokio::test]
async fn unerreichbarer_kandidat_beendet_die_sitzung() {
    // Adresse eines bereits geschlossenen Listeners
    let tot = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let tote_adresse = tot.local_addr().unwrap();
    drop(tot);

    let signale = MemorySignalNetz::neu();
    let config = TcpTransportConfig {
        kandidat_adresse: Some(tote_adresse),
        ..Default::default()
    };
    let alice = knoten_mit(&signale, "alice", config).await;
    let mut bob = knoten(&signale, "bob").await;
    let alice_id = alice.handle.eigene_id();

    alice.handle.initiate(bob.handle.eigene_id(), "bob").await.unwrap();

    // Bob kann den Kandidaten nicht erreichen und gibt die Sitzung auf
    match bob.warte_auf(|e| matches!(e, MeshEvent::Disconnected { .. })).await {
        MeshEvent::Disconnected { peer, grund, .. } => {
            assert_eq!(peer, alice_id);
            assert!(matches!(grund, Trennungsgrund::Verhandlung(_)));
        }
        _ => unreachable!(),
    }
}
