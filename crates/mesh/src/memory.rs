//! In-Memory Transport und Signal-Relay
//!
//! Fuer Tests und Demos ohne Netzwerk. Offer und Answer sind opake Tokens,
//! die ueber einen gemeinsamen Knoten ([`MemoryNetwork`]) aufgeloest werden.
//! Der Datenkanal oeffnet sich auf beiden Seiten sobald die Answer gesetzt
//! ist. Fehler koennen gezielt ausgeloest werden.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;
use tuschel_core::PeerId;
use tuschel_protocol::{Candidate, SessionDescription, Signal};

use crate::coordinator::MeshHandle;
use crate::error::{MeshError, MeshResult};
use crate::signal::SignalSink;
use crate::transport::{
    ChannelHandle, ConnectionHandle, ConnectionState, TransportError, TransportEvent,
    TransportEventSink, TransportProvider, TransportResult,
};

const OFFER_PRAEFIX: &str = "mem-offer:";
const ANSWER_PRAEFIX: &str = "mem-answer:";
const KANDIDAT_PRAEFIX: &str = "mem-candidate:";

/// Schluessel einer Verbindung im Knoten: (Endpunkt, Handle)
type VerbindungsSchluessel = (u64, ConnectionHandle);

struct MemVerbindung {
    sink: TransportEventSink,
    gegenstelle: Option<VerbindungsSchluessel>,
    kanal: Option<ChannelHandle>,
    /// Offer-Token bis die Answer gesetzt ist
    angebot: Option<String>,
}

#[derive(Default)]
struct Knoten {
    naechster_endpunkt: u64,
    naechster_kanal: u64,
    verbindungen: HashMap<VerbindungsSchluessel, MemVerbindung>,
    angebote: HashMap<String, VerbindungsSchluessel>,
    antworten: HashMap<String, VerbindungsSchluessel>,
    kanaele: HashMap<ChannelHandle, VerbindungsSchluessel>,
    /// Nach dieser Anzahl Frames lehnt `send` ab (None = nie)
    sende_budget: Option<usize>,
}

impl Knoten {
    fn verbindung(&self, schluessel: &VerbindungsSchluessel) -> TransportResult<&MemVerbindung> {
        self.verbindungen
            .get(schluessel)
            .ok_or(TransportError::UnbekannteVerbindung(schluessel.1))
    }

    fn kanal_vergeben(&mut self, schluessel: VerbindungsSchluessel) -> ChannelHandle {
        self.naechster_kanal += 1;
        let kanal = ChannelHandle(self.naechster_kanal);
        self.kanaele.insert(kanal, schluessel);
        kanal
    }

    /// Entfernt eine Verbindung und meldet der Gegenstelle `Closed`
    fn abbauen(&mut self, schluessel: &VerbindungsSchluessel) {
        let Some(verbindung) = self.verbindungen.remove(schluessel) else {
            return;
        };
        if let Some(kanal) = verbindung.kanal {
            self.kanaele.remove(&kanal);
        }
        if let Some(angebot) = verbindung.angebot {
            self.angebote.remove(&angebot);
        }
        if let Some(gegenstelle) = verbindung.gegenstelle {
            if let Some(andere) = self.verbindungen.get_mut(&gegenstelle) {
                andere.gegenstelle = None;
                andere
                    .sink
                    .melden(TransportEvent::StateChanged(ConnectionState::Closed));
            }
        }
    }
}

/// Gemeinsamer Knoten aller In-Memory-Transports
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    knoten: Arc<Mutex<Knoten>>,
}

impl MemoryNetwork {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Erzeugt einen Transport-Endpunkt fuer einen Mesh
    pub fn transport(&self) -> MemoryTransport {
        let mut knoten = self.knoten.lock();
        knoten.naechster_endpunkt += 1;
        MemoryTransport {
            netz: self.clone(),
            endpunkt: knoten.naechster_endpunkt,
        }
    }

    /// Laesst `send` nach `frames` weiteren Frames fehlschlagen
    pub fn sende_budget_setzen(&self, frames: Option<usize>) {
        self.knoten.lock().sende_budget = frames;
    }

    /// Anzahl offener Verbindungen ueber alle Endpunkte
    pub fn offene_verbindungen(&self) -> usize {
        self.knoten.lock().verbindungen.len()
    }
}

/// Transport-Endpunkt eines Mesh im [`MemoryNetwork`]
#[derive(Clone)]
pub struct MemoryTransport {
    netz: MemoryNetwork,
    endpunkt: u64,
}

impl MemoryTransport {
    fn schluessel(&self, connection: ConnectionHandle) -> VerbindungsSchluessel {
        (self.endpunkt, connection)
    }

    /// Simuliert einen Transport-Ausfall der Verbindung zu `peer`
    ///
    /// Die eigene Seite sieht `Failed`, die Gegenseite `Closed`.
    pub fn stoerung_ausloesen(&self, peer: PeerId) -> bool {
        let mut knoten = self.netz.knoten.lock();
        let betroffen = knoten
            .verbindungen
            .iter()
            .find(|(schluessel, v)| schluessel.0 == self.endpunkt && v.sink.peer() == peer)
            .map(|(schluessel, v)| (*schluessel, v.sink.clone()));

        let Some((schluessel, sink)) = betroffen else {
            return false;
        };
        knoten.abbauen(&schluessel);
        sink.melden(TransportEvent::StateChanged(ConnectionState::Failed));
        true
    }

    /// Stellt einen beliebigen Frame zu als kaeme er von der Gegenstelle
    pub fn frame_einspeisen(&self, peer: PeerId, frame: Bytes) -> bool {
        let knoten = self.netz.knoten.lock();
        knoten
            .verbindungen
            .iter()
            .find(|(schluessel, v)| {
                schluessel.0 == self.endpunkt && v.sink.peer() == peer && v.kanal.is_some()
            })
            .is_some_and(|(_, v)| v.sink.melden(TransportEvent::Frame(frame)))
    }
}

#[async_trait]
impl TransportProvider for MemoryTransport {
    async fn create_connection(
        &self,
        connection: ConnectionHandle,
        events: TransportEventSink,
    ) -> TransportResult<()> {
        let mut knoten = self.netz.knoten.lock();
        events.melden(TransportEvent::StateChanged(ConnectionState::New));
        knoten.verbindungen.insert(
            self.schluessel(connection),
            MemVerbindung {
                sink: events,
                gegenstelle: None,
                kanal: None,
                angebot: None,
            },
        );
        Ok(())
    }

    async fn open_channel(&self, connection: ConnectionHandle) -> TransportResult<()> {
        let knoten = self.netz.knoten.lock();
        knoten.verbindung(&self.schluessel(connection))?;
        Ok(())
    }

    async fn create_offer(
        &self,
        connection: ConnectionHandle,
    ) -> TransportResult<SessionDescription> {
        let schluessel = self.schluessel(connection);
        let token = format!("{OFFER_PRAEFIX}{}:{}", self.endpunkt, connection.0);

        let mut knoten = self.netz.knoten.lock();
        let verbindung = knoten
            .verbindungen
            .get_mut(&schluessel)
            .ok_or(TransportError::UnbekannteVerbindung(connection))?;
        verbindung.angebot = Some(token.clone());
        verbindung.sink.melden(TransportEvent::LocalCandidate(Candidate::new(format!(
            "{KANDIDAT_PRAEFIX}{}",
            self.endpunkt
        ))));
        knoten.angebote.insert(token.clone(), schluessel);
        Ok(SessionDescription::new(token))
    }

    async fn accept_offer(
        &self,
        connection: ConnectionHandle,
        offer: SessionDescription,
    ) -> TransportResult<SessionDescription> {
        let schluessel = self.schluessel(connection);
        let mut knoten = self.netz.knoten.lock();
        let initiator = *knoten
            .angebote
            .get(&offer.sdp)
            .ok_or_else(|| TransportError::Verhandlung(format!("Unbekanntes Offer {}", offer.sdp)))?;

        let verbindung = knoten
            .verbindungen
            .get_mut(&schluessel)
            .ok_or(TransportError::UnbekannteVerbindung(connection))?;
        verbindung.gegenstelle = Some(initiator);
        verbindung.sink.melden(TransportEvent::LocalCandidate(Candidate::new(format!(
            "{KANDIDAT_PRAEFIX}{}",
            self.endpunkt
        ))));

        let token = format!("{ANSWER_PRAEFIX}{}:{}", self.endpunkt, connection.0);
        knoten.antworten.insert(token.clone(), schluessel);
        Ok(SessionDescription::new(token))
    }

    async fn apply_answer(
        &self,
        connection: ConnectionHandle,
        answer: SessionDescription,
    ) -> TransportResult<()> {
        let schluessel = self.schluessel(connection);
        let mut knoten = self.netz.knoten.lock();
        let responder = knoten
            .antworten
            .remove(&answer.sdp)
            .ok_or_else(|| TransportError::Verhandlung(format!("Unbekannte Answer {}", answer.sdp)))?;
        knoten.verbindung(&schluessel)?;
        knoten.verbindung(&responder)?;

        let kanal_initiator = knoten.kanal_vergeben(schluessel);
        let kanal_responder = knoten.kanal_vergeben(responder);

        // Beide Seiten sehen ChannelOpen bevor irgendein Frame fliesst
        for (eigen, andere, kanal) in [
            (schluessel, responder, kanal_initiator),
            (responder, schluessel, kanal_responder),
        ] {
            if let Some(v) = knoten.verbindungen.get_mut(&eigen) {
                v.gegenstelle = Some(andere);
                v.kanal = Some(kanal);
                v.angebot = None;
                v.sink
                    .melden(TransportEvent::StateChanged(ConnectionState::Connected));
                v.sink.melden(TransportEvent::ChannelOpen(kanal));
            }
        }
        if let Some(token) = knoten
            .angebote
            .iter()
            .find(|(_, s)| **s == schluessel)
            .map(|(t, _)| t.clone())
        {
            knoten.angebote.remove(&token);
        }
        debug!(endpunkt = self.endpunkt, %connection, "In-Memory-Kanal offen");
        Ok(())
    }

    async fn add_candidate(
        &self,
        connection: ConnectionHandle,
        candidate: Candidate,
    ) -> TransportResult<()> {
        if !candidate.candidate.starts_with(KANDIDAT_PRAEFIX) {
            return Err(TransportError::UngueltigerKandidat(candidate.candidate));
        }
        let knoten = self.netz.knoten.lock();
        knoten.verbindung(&self.schluessel(connection))?;
        Ok(())
    }

    fn send(&self, channel: ChannelHandle, frame: Bytes) -> TransportResult<()> {
        let mut knoten = self.netz.knoten.lock();
        if let Some(budget) = knoten.sende_budget.as_mut() {
            if *budget == 0 {
                return Err(TransportError::Geschlossen);
            }
            *budget -= 1;
        }
        let absender = knoten
            .kanaele
            .get(&channel)
            .copied()
            .ok_or(TransportError::UnbekannterKanal(channel))?;
        if absender.0 != self.endpunkt {
            return Err(TransportError::UnbekannterKanal(channel));
        }
        let ziel = knoten
            .verbindung(&absender)?
            .gegenstelle
            .ok_or(TransportError::Geschlossen)?;
        let empfaenger = knoten.verbindung(&ziel)?;
        if empfaenger.sink.melden(TransportEvent::Frame(frame)) {
            Ok(())
        } else {
            Err(TransportError::Geschlossen)
        }
    }

    async fn close(&self, connection: ConnectionHandle) {
        let mut knoten = self.netz.knoten.lock();
        knoten.abbauen(&self.schluessel(connection));
    }
}

// ---------------------------------------------------------------------------
// Signal-Relay
// ---------------------------------------------------------------------------

/// Stellt Signale direkt an registrierte Mesh-Handles zu
#[derive(Clone, Default)]
pub struct MemorySignalNetz {
    teilnehmer: Arc<Mutex<HashMap<PeerId, (MeshHandle, String)>>>,
}

impl MemorySignalNetz {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Macht einen Mesh als Signal-Empfaenger erreichbar
    pub fn registrieren(&self, handle: MeshHandle, name: impl Into<String>) {
        self.teilnehmer
            .lock()
            .insert(handle.eigene_id(), (handle, name.into()));
    }

    /// Nimmt einen Mesh aus dem Relay (danach schlagen Signale an ihn fehl)
    pub fn entfernen(&self, peer: &PeerId) {
        self.teilnehmer.lock().remove(peer);
    }

    /// Signal-Ausgang fuer den Mesh mit der Kennung `absender`
    pub fn sink(&self, absender: PeerId) -> Arc<dyn SignalSink> {
        Arc::new(MemorySignalSink {
            netz: self.clone(),
            absender,
        })
    }
}

struct MemorySignalSink {
    netz: MemorySignalNetz,
    absender: PeerId,
}

#[async_trait]
impl SignalSink for MemorySignalSink {
    async fn send_signal(&self, an: PeerId, signal: Signal) -> MeshResult<()> {
        let (ziel, absender_name) = {
            let teilnehmer = self.netz.teilnehmer.lock();
            let ziel = teilnehmer
                .get(&an)
                .map(|(handle, _)| handle.clone())
                .ok_or_else(|| MeshError::SignalingDisconnected(format!("{an} nicht erreichbar")))?;
            let name = teilnehmer
                .get(&self.absender)
                .map(|(_, name)| name.clone())
                .unwrap_or_default();
            (ziel, name)
        };
        ziel.handle_signal(self.absender, absender_name, signal).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn sink(peer: PeerId, conn: u64) -> (TransportEventSink, mpsc::UnboundedReceiver<crate::transport::TransportMeldung>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TransportEventSink::neu(peer, ConnectionHandle(conn), tx), rx)
    }

    fn kanal_aus(rx: &mut mpsc::UnboundedReceiver<crate::transport::TransportMeldung>) -> ChannelHandle {
        while let Ok(meldung) = rx.try_recv() {
            if let TransportEvent::ChannelOpen(kanal) = meldung.event {
                return kanal;
            }
        }
        panic!("Kein ChannelOpen gemeldet");
    }

    #[tokio::test]
    async fn offer_answer_oeffnet_kanal_auf_beiden_seiten() {
        let netz = MemoryNetwork::neu();
        let a = netz.transport();
        let b = netz.transport();
        let (sink_a, mut rx_a) = sink(PeerId::new(), 1);
        let (sink_b, mut rx_b) = sink(PeerId::new(), 1);

        a.create_connection(ConnectionHandle(1), sink_a).await.unwrap();
        a.open_channel(ConnectionHandle(1)).await.unwrap();
        let offer = a.create_offer(ConnectionHandle(1)).await.unwrap();

        b.create_connection(ConnectionHandle(1), sink_b).await.unwrap();
        let answer = b.accept_offer(ConnectionHandle(1), offer).await.unwrap();
        a.apply_answer(ConnectionHandle(1), answer).await.unwrap();

        let kanal_a = kanal_aus(&mut rx_a);
        let kanal_b = kanal_aus(&mut rx_b);

        a.send(kanal_a, Bytes::from_static(b"ping")).unwrap();
        b.send(kanal_b, Bytes::from_static(b"pong")).unwrap();

        let frame_b = rx_b.try_recv().unwrap();
        assert!(matches!(frame_b.event, TransportEvent::Frame(ref f) if f.as_ref() == b"ping"));
        let frame_a = rx_a.try_recv().unwrap();
        assert!(matches!(frame_a.event, TransportEvent::Frame(ref f) if f.as_ref() == b"pong"));
        assert_eq!(netz.offene_verbindungen(), 2);
    }

    #[tokio::test]
    async fn unbekanntes_offer_wird_abgelehnt() {
        let netz = MemoryNetwork::neu();
        let b = netz.transport();
        let (sink_b, _rx) = sink(PeerId::new(), 1);
        b.create_connection(ConnectionHandle(1), sink_b).await.unwrap();

        let ergebnis = b
            .accept_offer(ConnectionHandle(1), SessionDescription::new("mem-offer:99:1"))
            .await;
        assert!(matches!(ergebnis, Err(TransportError::Verhandlung(_))));
    }

    #[tokio::test]
    async fn fremder_kandidat_wird_abgelehnt() {
        let netz = MemoryNetwork::neu();
        let a = netz.transport();
        let (sink_a, _rx) = sink(PeerId::new(), 1);
        a.create_connection(ConnectionHandle(1), sink_a).await.unwrap();

        let ergebnis = a
            .add_candidate(ConnectionHandle(1), Candidate::new("10.0.0.1:9"))
            .await;
        assert!(matches!(ergebnis, Err(TransportError::UngueltigerKandidat(_))));
    }

    #[tokio::test]
    async fn schliessen_meldet_gegenstelle_closed() {
        let netz = MemoryNetwork::neu();
        let a = netz.transport();
        let b = netz.transport();
        let (sink_a, _rx_a) = sink(PeerId::new(), 1);
        let (sink_b, mut rx_b) = sink(PeerId::new(), 1);

        a.create_connection(ConnectionHandle(1), sink_a).await.unwrap();
        let offer = a.create_offer(ConnectionHandle(1)).await.unwrap();
        b.create_connection(ConnectionHandle(1), sink_b).await.unwrap();
        let answer = b.accept_offer(ConnectionHandle(1), offer).await.unwrap();
        a.apply_answer(ConnectionHandle(1), answer).await.unwrap();

        a.close(ConnectionHandle(1)).await;

        let mut closed = false;
        while let Ok(meldung) = rx_b.try_recv() {
            if matches!(meldung.event, TransportEvent::StateChanged(ConnectionState::Closed)) {
                closed = true;
            }
        }
        assert!(closed);
        assert_eq!(netz.offene_verbindungen(), 1);
    }

    #[tokio::test]
    async fn send_auf_unbekanntem_kanal() {
        let netz = MemoryNetwork::neu();
        let a = netz.transport();
        assert!(matches!(
            a.send(ChannelHandle(42), Bytes::from_static(b"x")),
            Err(TransportError::UnbekannterKanal(_))
        ));
    }
}
