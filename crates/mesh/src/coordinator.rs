//! Mesh-Koordinator
//!
//! Ein einzelner Task besitzt die [`SessionTable`] und den [`EventBus`].
//! Alles was eine Sitzung veraendert erreicht ihn als Nachricht:
//!
//! ```text
//! MeshHandle ──Befehl──────────┐
//! TransportEventSink ──Meldung─┼──> Mesh::run ──> MeshKern (Tabelle, Bus)
//! Verhandlungs-Tasks ──Intern──┘         │
//!                                        └──> tokio::spawn(Transport/Signaling)
//! ```
//!
//! Asynchrone Schritte (Transport, Signaling, Timer) laufen in eigenen
//! Tasks und melden ihr Ergebnis mit PeerId und [`ConnectionHandle`]
//! zurueck. Passt das Handle nicht mehr zur Sitzung, ist die Meldung
//! veraltet und wird verworfen.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tuschel_core::PeerId;
use tuschel_protocol::Signal;

use crate::dispatcher::{PeerOutcome, SendOutcome};
use crate::error::{MeshError, MeshResult};
use crate::events::{EventBus, EventHandler, EventKind, MeshEvent, StatusMeldung, SubscriptionId};
use crate::kontext::MeshKontext;
use crate::session::{RosterEintrag, SessionTable};
use crate::signal::SignalSink;
use crate::transport::{ConnectionHandle, TransportEventSink, TransportMeldung, TransportProvider};

/// Kapazitaet der Befehls-Queue
const BEFEHLS_PUFFER: usize = 256;

// ---------------------------------------------------------------------------
// Nachrichten an den Mesh-Task
// ---------------------------------------------------------------------------

pub(crate) enum Befehl {
    Initiate {
        peer: PeerId,
        name: String,
        antwort: oneshot::Sender<MeshResult<()>>,
    },
    Signal {
        von: PeerId,
        name: String,
        signal: Signal,
        antwort: oneshot::Sender<MeshResult<()>>,
    },
    Senden {
        peer: PeerId,
        text: String,
        antwort: oneshot::Sender<MeshResult<SendOutcome>>,
    },
    Broadcast {
        text: String,
        antwort: oneshot::Sender<Vec<PeerOutcome>>,
    },
    Trennen {
        peer: PeerId,
        antwort: oneshot::Sender<bool>,
    },
    AlleTrennen {
        antwort: oneshot::Sender<usize>,
    },
    Roster {
        antwort: oneshot::Sender<Vec<RosterEintrag>>,
    },
    Fingerprint {
        peer: PeerId,
        antwort: oneshot::Sender<Option<String>>,
    },
    Abonnieren {
        kind: EventKind,
        handler: EventHandler,
        antwort: oneshot::Sender<SubscriptionId>,
    },
    Abmelden {
        id: SubscriptionId,
        antwort: oneshot::Sender<bool>,
    },
    Status {
        meldung: StatusMeldung,
    },
    Beenden {
        antwort: oneshot::Sender<()>,
    },
}

/// Ergebnis eines asynchronen Verhandlungs-Schritts
#[derive(Debug)]
pub(crate) enum VerhandlungsSchritt {
    /// Entfernte Beschreibung gesetzt, gepufferte Kandidaten duerfen folgen
    RemoteBeschreibungGesetzt,
    /// Offer bzw. Answer ist beim Signaling abgegeben
    LokaleBeschreibungGesendet,
    /// Answer passte nicht zur laufenden Verbindung, Sitzung bleibt bestehen
    AnswerAbgelehnt(String),
    Fehlgeschlagen(String),
}

#[derive(Debug)]
pub(crate) enum InternMeldung {
    Verhandlung {
        peer: PeerId,
        connection: ConnectionHandle,
        schritt: VerhandlungsSchritt,
    },
    AufbauTimeout {
        peer: PeerId,
        connection: ConnectionHandle,
    },
}

/// Rueckkanal eines Verhandlungs-Tasks
#[derive(Clone)]
pub(crate) struct Rueckmelder {
    peer: PeerId,
    connection: ConnectionHandle,
    tx: mpsc::UnboundedSender<InternMeldung>,
}

impl Rueckmelder {
    pub(crate) fn melden(&self, schritt: VerhandlungsSchritt) {
        let _ = self.tx.send(InternMeldung::Verhandlung {
            peer: self.peer,
            connection: self.connection,
            schritt,
        });
    }
}

// ---------------------------------------------------------------------------
// MeshKern
// ---------------------------------------------------------------------------

/// Zustand des Mesh-Tasks
pub(crate) struct MeshKern {
    pub(crate) kontext: MeshKontext,
    pub(crate) transport: Arc<dyn TransportProvider>,
    pub(crate) signale: Arc<dyn SignalSink>,
    pub(crate) sitzungen: SessionTable,
    pub(crate) bus: EventBus,
    naechste_verbindung: u64,
    transport_tx: mpsc::UnboundedSender<TransportMeldung>,
    intern_tx: mpsc::UnboundedSender<InternMeldung>,
}

impl MeshKern {
    pub(crate) fn naechste_verbindung(&mut self) -> ConnectionHandle {
        self.naechste_verbindung += 1;
        ConnectionHandle(self.naechste_verbindung)
    }

    pub(crate) fn sink(&self, peer: PeerId, connection: ConnectionHandle) -> TransportEventSink {
        TransportEventSink::neu(peer, connection, self.transport_tx.clone())
    }

    pub(crate) fn rueckmelder(&self, peer: PeerId, connection: ConnectionHandle) -> Rueckmelder {
        Rueckmelder {
            peer,
            connection,
            tx: self.intern_tx.clone(),
        }
    }

    /// Startet einen Verhandlungs-Task; ein Fehler wird als Schritt gemeldet
    pub(crate) fn verhandlung_starten<F>(&self, melder: Rueckmelder, schritte: F)
    where
        F: Future<Output = MeshResult<()>> + Send + 'static,
    {
        tokio::spawn(async move {
            match schritte.await {
                Ok(()) => melder.melden(VerhandlungsSchritt::LokaleBeschreibungGesendet),
                Err(e) => melder.melden(VerhandlungsSchritt::Fehlgeschlagen(e.to_string())),
            }
        });
    }

    pub(crate) fn aufbau_timeout_planen(&self, peer: PeerId, connection: ConnectionHandle) {
        let dauer = self.kontext.config().aufbau_timeout;
        let tx = self.intern_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(dauer).await;
            let _ = tx.send(InternMeldung::AufbauTimeout { peer, connection });
        });
    }

    /// Schliesst eine Transport-Verbindung im Hintergrund
    pub(crate) fn verbindung_schliessen(&self, connection: ConnectionHandle) {
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            transport.close(connection).await;
        });
    }

    pub(crate) fn roster(&self) -> Vec<RosterEintrag> {
        self.sitzungen.roster(&self.kontext.eigene_id())
    }

    pub(crate) fn fingerprint(&self, peer: &PeerId) -> Option<String> {
        self.sitzungen
            .get(peer)
            .and_then(|s| s.shared_key())
            .map(|k| k.fingerprint())
    }

    /// Trennt einen Peer; kein Effekt wenn er nicht (mehr) existiert
    pub(crate) fn disconnect_peer(&mut self, peer: &PeerId) -> bool {
        self.teardown(peer, crate::events::Trennungsgrund::Lokal)
    }

    /// Trennt alle Peers; sicher auf leerer Tabelle
    pub(crate) fn disconnect_all(&mut self) -> usize {
        let ids = self.sitzungen.ids();
        let getrennt = ids
            .iter()
            .filter(|id| self.disconnect_peer(id))
            .count();
        if getrennt > 0 {
            info!(getrennt, "Alle Peers getrennt");
        }
        getrennt
    }

    fn befehl_ausfuehren(&mut self, befehl: Befehl) -> bool {
        match befehl {
            Befehl::Initiate {
                peer,
                name,
                antwort,
            } => {
                let _ = antwort.send(self.initiate(peer, name));
            }
            Befehl::Signal {
                von,
                name,
                signal,
                antwort,
            } => {
                let _ = antwort.send(self.handle_signal(von, name, signal));
            }
            Befehl::Senden {
                peer,
                text,
                antwort,
            } => {
                let _ = antwort.send(self.send_text(peer, text));
            }
            Befehl::Broadcast { text, antwort } => {
                let _ = antwort.send(self.broadcast(&text));
            }
            Befehl::Trennen { peer, antwort } => {
                let _ = antwort.send(self.disconnect_peer(&peer));
            }
            Befehl::AlleTrennen { antwort } => {
                let _ = antwort.send(self.disconnect_all());
            }
            Befehl::Roster { antwort } => {
                let _ = antwort.send(self.roster());
            }
            Befehl::Fingerprint { peer, antwort } => {
                let _ = antwort.send(self.fingerprint(&peer));
            }
            Befehl::Abonnieren {
                kind,
                handler,
                antwort,
            } => {
                let _ = antwort.send(self.bus.subscribe(kind, handler));
            }
            Befehl::Abmelden { id, antwort } => {
                let _ = antwort.send(self.bus.unsubscribe(id));
            }
            Befehl::Status { meldung } => {
                self.bus.publish(&MeshEvent::StatusChanged(meldung));
            }
            Befehl::Beenden { antwort } => {
                self.disconnect_all();
                let _ = antwort.send(());
                return false;
            }
        }
        true
    }

    fn intern_verarbeiten(&mut self, meldung: InternMeldung) {
        match meldung {
            InternMeldung::Verhandlung {
                peer,
                connection,
                schritt,
            } => self.verhandlungs_schritt(peer, connection, schritt),
            InternMeldung::AufbauTimeout { peer, connection } => {
                self.aufbau_timeout(peer, connection)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Mesh (Task) + MeshHandle
// ---------------------------------------------------------------------------

/// Der Mesh-Task
pub struct Mesh {
    kern: MeshKern,
    befehle_rx: mpsc::Receiver<Befehl>,
    transport_rx: mpsc::UnboundedReceiver<TransportMeldung>,
    intern_rx: mpsc::UnboundedReceiver<InternMeldung>,
}

impl Mesh {
    /// Erstellt den Mesh-Task und ein Handle darauf
    pub fn neu(
        kontext: MeshKontext,
        transport: Arc<dyn TransportProvider>,
        signale: Arc<dyn SignalSink>,
    ) -> (Self, MeshHandle) {
        let (befehle_tx, befehle_rx) = mpsc::channel(BEFEHLS_PUFFER);
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (intern_tx, intern_rx) = mpsc::unbounded_channel();

        let handle = MeshHandle {
            eigene_id: kontext.eigene_id(),
            befehle: befehle_tx,
        };
        let kern = MeshKern {
            kontext,
            transport,
            signale,
            sitzungen: SessionTable::neu(),
            bus: EventBus::neu(),
            naechste_verbindung: 0,
            transport_tx,
            intern_tx,
        };
        (
            Self {
                kern,
                befehle_rx,
                transport_rx,
                intern_rx,
            },
            handle,
        )
    }

    /// Erstellt den Mesh-Task und startet ihn auf der aktuellen Runtime
    pub fn starten(
        kontext: MeshKontext,
        transport: Arc<dyn TransportProvider>,
        signale: Arc<dyn SignalSink>,
    ) -> (MeshHandle, JoinHandle<()>) {
        let (mesh, handle) = Self::neu(kontext, transport, signale);
        let task = tokio::spawn(mesh.run());
        (handle, task)
    }

    /// Verarbeitet Nachrichten bis `shutdown` oder alle Handles weg sind
    pub async fn run(mut self) {
        info!(
            peer_id = %self.kern.kontext.eigene_id(),
            name = %self.kern.kontext.config().name,
            "Mesh gestartet"
        );
        loop {
            tokio::select! {
                befehl = self.befehle_rx.recv() => match befehl {
                    Some(befehl) => {
                        if !self.kern.befehl_ausfuehren(befehl) {
                            break;
                        }
                    }
                    None => {
                        debug!("Alle Mesh-Handles geschlossen");
                        self.kern.disconnect_all();
                        break;
                    }
                },
                Some(meldung) = self.transport_rx.recv() => {
                    self.kern.transport_ereignis(meldung);
                }
                Some(meldung) = self.intern_rx.recv() => {
                    self.kern.intern_verarbeiten(meldung);
                }
            }
        }
        info!("Mesh beendet");
    }
}

/// Handle auf einen laufenden Mesh-Task
#[derive(Debug, Clone)]
pub struct MeshHandle {
    eigene_id: PeerId,
    befehle: mpsc::Sender<Befehl>,
}

impl MeshHandle {
    pub fn eigene_id(&self) -> PeerId {
        self.eigene_id
    }

    async fn anfrage<T>(&self, befehl: impl FnOnce(oneshot::Sender<T>) -> Befehl) -> MeshResult<T> {
        let (tx, rx) = oneshot::channel();
        self.befehle
            .send(befehl(tx))
            .await
            .map_err(|_| MeshError::MeshStopped)?;
        rx.await.map_err(|_| MeshError::MeshStopped)
    }

    /// Baut eine Verbindung als Initiator auf
    pub async fn initiate(&self, peer: PeerId, name: impl Into<String>) -> MeshResult<()> {
        let name = name.into();
        self.anfrage(|antwort| Befehl::Initiate {
            peer,
            name,
            antwort,
        })
        .await?
    }

    /// Verarbeitet ein eingehendes Verhandlungs-Signal
    pub async fn handle_signal(
        &self,
        von: PeerId,
        name: impl Into<String>,
        signal: Signal,
    ) -> MeshResult<()> {
        let name = name.into();
        self.anfrage(|antwort| Befehl::Signal {
            von,
            name,
            signal,
            antwort,
        })
        .await?
    }

    /// Sendet eine Chat-Nachricht an einen Peer
    pub async fn send(&self, peer: PeerId, text: impl Into<String>) -> MeshResult<SendOutcome> {
        let text = text.into();
        self.anfrage(|antwort| Befehl::Senden {
            peer,
            text,
            antwort,
        })
        .await?
    }

    /// Sendet eine Chat-Nachricht an alle Peers (ein Ergebnis pro Peer)
    pub async fn broadcast(&self, text: impl Into<String>) -> MeshResult<Vec<PeerOutcome>> {
        let text = text.into();
        self.anfrage(|antwort| Befehl::Broadcast { text, antwort })
            .await
    }

    /// Trennt einen Peer; false wenn keine Sitzung bestand
    pub async fn disconnect_peer(&self, peer: PeerId) -> MeshResult<bool> {
        self.anfrage(|antwort| Befehl::Trennen { peer, antwort })
            .await
    }

    /// Trennt alle Peers und liefert die Anzahl getrennter Sitzungen
    pub async fn disconnect_all(&self) -> MeshResult<usize> {
        self.anfrage(|antwort| Befehl::AlleTrennen { antwort }).await
    }

    pub async fn roster(&self) -> MeshResult<Vec<RosterEintrag>> {
        self.anfrage(|antwort| Befehl::Roster { antwort }).await
    }

    /// Fingerabdruck des Paar-Schluessels, `None` solange unverschluesselt
    pub async fn fingerprint(&self, peer: PeerId) -> MeshResult<Option<String>> {
        self.anfrage(|antwort| Befehl::Fingerprint { peer, antwort })
            .await
    }

    pub async fn subscribe(
        &self,
        kind: EventKind,
        handler: impl FnMut(&MeshEvent) + Send + 'static,
    ) -> MeshResult<SubscriptionId> {
        let handler: EventHandler = Box::new(handler);
        self.anfrage(|antwort| Befehl::Abonnieren {
            kind,
            handler,
            antwort,
        })
        .await
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) -> MeshResult<bool> {
        self.anfrage(|antwort| Befehl::Abmelden { id, antwort })
            .await
    }

    /// Leitet die gewaehlten Ereignis-Arten in einen Kanal um
    pub async fn ereignis_kanal(
        &self,
        arten: &[EventKind],
    ) -> MeshResult<mpsc::UnboundedReceiver<MeshEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        for kind in arten {
            let tx = tx.clone();
            self.subscribe(*kind, move |event| {
                let _ = tx.send(event.clone());
            })
            .await?;
        }
        Ok(rx)
    }

    /// Veroeffentlicht eine Statusmeldung ueber den Event-Bus
    pub async fn status_melden(&self, meldung: StatusMeldung) -> MeshResult<()> {
        self.befehle
            .send(Befehl::Status { meldung })
            .await
            .map_err(|_| MeshError::MeshStopped)
    }

    /// Trennt alle Peers und beendet den Mesh-Task
    pub async fn shutdown(&self) -> MeshResult<()> {
        self.anfrage(|antwort| Befehl::Beenden { antwort }).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeshConfig;
    use crate::memory::{MemoryNetwork, MemorySignalNetz};
    use tuschel_crypto::StandardCrypto;

    fn mesh_starten(netz: &MemoryNetwork, signale: &MemorySignalNetz, name: &str) -> MeshHandle {
        let kontext = MeshKontext::neu(
            PeerId::new(),
            MeshConfig::mit_name(name),
            Arc::new(StandardCrypto::default()),
        );
        let id = kontext.eigene_id();
        let (handle, _task) = Mesh::starten(
            kontext,
            Arc::new(netz.transport()),
            signale.sink(id),
        );
        signale.registrieren(handle.clone(), name);
        handle
    }

    #[tokio::test]
    async fn leerer_mesh_roster_und_trennen() {
        let netz = MemoryNetwork::neu();
        let signale = MemorySignalNetz::neu();
        let a = mesh_starten(&netz, &signale, "alice");

        assert!(a.roster().await.unwrap().is_empty());
        assert_eq!(a.disconnect_all().await.unwrap(), 0);
        assert!(!a.disconnect_peer(PeerId::new()).await.unwrap());
        assert_eq!(a.fingerprint(PeerId::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn initiate_zu_sich_selbst_wird_abgelehnt() {
        let netz = MemoryNetwork::neu();
        let signale = MemorySignalNetz::neu();
        let a = mesh_starten(&netz, &signale, "alice");

        let ergebnis = a.initiate(a.eigene_id(), "ich").await;
        assert!(matches!(ergebnis, Err(MeshError::EigenerPeer)));
    }

    /// Signal-Ausgang ohne Gegenstelle, die Sitzung bleibt in `Negotiating`
    struct StummeSignale;

    #[async_trait::async_trait]
    impl SignalSink for StummeSignale {
        async fn send_signal(&self, _an: PeerId, _signal: Signal) -> MeshResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn doppeltes_initiate_meldet_bestehende_sitzung() {
        let netz = MemoryNetwork::neu();
        let kontext = MeshKontext::neu(
            PeerId::new(),
            MeshConfig::mit_name("alice"),
            Arc::new(StandardCrypto::default()),
        );
        let (a, _task) = Mesh::starten(kontext, Arc::new(netz.transport()), Arc::new(StummeSignale));
        let unbekannt = PeerId::new();

        a.initiate(unbekannt, "geist").await.unwrap();
        let zweites = a.initiate(unbekannt, "geist").await;
        assert!(matches!(zweites, Err(MeshError::SessionExists(p)) if p == unbekannt));
    }

    #[tokio::test]
    async fn senden_ohne_sitzung_kanal_nicht_verfuegbar() {
        let netz = MemoryNetwork::neu();
        let signale = MemorySignalNetz::neu();
        let a = mesh_starten(&netz, &signale, "alice");
        let peer = PeerId::new();

        let ergebnis = a.send(peer, "hallo").await;
        assert!(matches!(ergebnis, Err(MeshError::ChannelUnavailable(p)) if p == peer));
    }

    #[tokio::test]
    async fn statusmeldung_erreicht_abonnenten() {
        let netz = MemoryNetwork::neu();
        let signale = MemorySignalNetz::neu();
        let a = mesh_starten(&netz, &signale, "alice");

        let mut rx = a.ereignis_kanal(&[EventKind::StatusChanged]).await.unwrap();
        a.status_melden(StatusMeldung::SignalingEndgueltigGetrennt)
            .await
            .unwrap();

        match rx.recv().await {
            Some(MeshEvent::StatusChanged(StatusMeldung::SignalingEndgueltigGetrennt)) => {}
            anderes => panic!("Unerwartet: {anderes:?}"),
        }
    }

    #[tokio::test]
    async fn nach_shutdown_meldet_handle_beendet() {
        let netz = MemoryNetwork::neu();
        let signale = MemorySignalNetz::neu();
        let a = mesh_starten(&netz, &signale, "alice");

        a.shutdown().await.unwrap();
        // Der Task ist beendet, der Empfaenger ist weg
        tokio::task::yield_now().await;
        assert!(matches!(a.roster().await, Err(MeshError::MeshStopped)));
    }
}
