//! Transport-Schnittstelle
//!
//! Der Mesh-Kern baut Verbindungen nicht selbst auf. Ein
//! [`TransportProvider`] liefert Verbindung, Datenkanal und die opaken
//! Verhandlungsartefakte. Ereignisse (lokale Kandidaten, Kanal offen,
//! eingehende Frames, Zustandswechsel) meldet der Provider ueber die
//! [`TransportEventSink`] zurueck, die der Mesh-Kern pro Verbindung anlegt.
//!
//! Jede Meldung traegt das [`ConnectionHandle`] der Verbindung. Trifft eine
//! Meldung fuer eine inzwischen ersetzte Verbindung ein, verwirft der
//! Mesh-Kern sie.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;
use tuschel_core::PeerId;
use tuschel_protocol::{Candidate, SessionDescription};

/// Verbindungs-Handle, vom Mesh-Kern pro Verbindungsversuch vergeben
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(pub u64);

impl std::fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Kanal-Handle, vom Transport-Provider vergeben
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelHandle(pub u64);

impl std::fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chan#{}", self.0)
    }
}

/// Zustand der Transport-Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// Disconnected, Failed und Closed beenden die Sitzung
    pub fn ist_endgueltig(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed | Self::Closed)
    }
}

/// Ereignis eines Transport-Providers
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Lokaler Konnektivitaets-Kandidat, muss zum Peer signalisiert werden
    LocalCandidate(Candidate),
    /// Datenkanal ist offen (auf Initiator- und Responder-Seite)
    ChannelOpen(ChannelHandle),
    /// Ein vollstaendiger Frame vom Datenkanal
    Frame(Bytes),
    /// Zustandswechsel der Verbindung
    StateChanged(ConnectionState),
}

/// Eine Transport-Meldung mit Herkunft
#[derive(Debug, Clone)]
pub struct TransportMeldung {
    pub peer: PeerId,
    pub connection: ConnectionHandle,
    pub event: TransportEvent,
}

/// Rueckkanal vom Transport-Provider zum Mesh-Kern fuer eine Verbindung
#[derive(Debug, Clone)]
pub struct TransportEventSink {
    peer: PeerId,
    connection: ConnectionHandle,
    tx: mpsc::UnboundedSender<TransportMeldung>,
}

impl TransportEventSink {
    pub fn neu(
        peer: PeerId,
        connection: ConnectionHandle,
        tx: mpsc::UnboundedSender<TransportMeldung>,
    ) -> Self {
        Self {
            peer,
            connection,
            tx,
        }
    }

    pub fn peer(&self) -> PeerId {
        self.peer
    }

    pub fn connection(&self) -> ConnectionHandle {
        self.connection
    }

    /// Meldet ein Ereignis; gibt false zurueck wenn der Mesh-Kern nicht mehr laeuft
    pub fn melden(&self, event: TransportEvent) -> bool {
        self.tx
            .send(TransportMeldung {
                peer: self.peer,
                connection: self.connection,
                event,
            })
            .is_ok()
    }
}

/// Fehlertyp fuer Transport-Provider
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Unbekannte Verbindung: {0}")]
    UnbekannteVerbindung(ConnectionHandle),

    #[error("Unbekannter Kanal: {0}")]
    UnbekannterKanal(ChannelHandle),

    #[error("Verhandlung fehlgeschlagen: {0}")]
    Verhandlung(String),

    #[error("Ungueltiger Kandidat: {0}")]
    UngueltigerKandidat(String),

    #[error("IO-Fehler: {0}")]
    Io(String),

    #[error("Kanal geschlossen")]
    Geschlossen,
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Result-Typ fuer Transport-Provider
pub type TransportResult<T> = Result<T, TransportError>;

/// Schnittstelle zum Verbindungsaufbau
///
/// Reihenfolge auf Initiator-Seite: `create_connection`, `open_channel`,
/// `create_offer`, spaeter `apply_answer`. Auf Responder-Seite:
/// `create_connection`, `accept_offer`. Kandidaten koennen danach in
/// beliebiger Reihenfolge mit `add_candidate` uebergeben werden.
#[async_trait]
pub trait TransportProvider: Send + Sync + 'static {
    /// Legt eine neue Verbindung an; Ereignisse gehen an `events`
    async fn create_connection(
        &self,
        connection: ConnectionHandle,
        events: TransportEventSink,
    ) -> TransportResult<()>;

    /// Bereitet den Datenkanal auf Initiator-Seite vor
    async fn open_channel(&self, connection: ConnectionHandle) -> TransportResult<()>;

    /// Erzeugt das Offer und setzt es als lokale Beschreibung
    async fn create_offer(&self, connection: ConnectionHandle)
        -> TransportResult<SessionDescription>;

    /// Setzt das Offer als entfernte Beschreibung und erzeugt die Answer
    async fn accept_offer(
        &self,
        connection: ConnectionHandle,
        offer: SessionDescription,
    ) -> TransportResult<SessionDescription>;

    /// Setzt die Answer als entfernte Beschreibung
    async fn apply_answer(
        &self,
        connection: ConnectionHandle,
        answer: SessionDescription,
    ) -> TransportResult<()>;

    /// Uebergibt einen entfernten Kandidaten
    async fn add_candidate(
        &self,
        connection: ConnectionHandle,
        candidate: Candidate,
    ) -> TransportResult<()>;

    /// Sendet einen Frame ueber den Datenkanal, blockiert nicht
    fn send(&self, channel: ChannelHandle, frame: Bytes) -> TransportResult<()>;

    /// Schliesst die Verbindung und gibt alle Ressourcen frei
    async fn close(&self, connection: ConnectionHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endgueltige_zustaende() {
        assert!(ConnectionState::Disconnected.ist_endgueltig());
        assert!(ConnectionState::Failed.ist_endgueltig());
        assert!(ConnectionState::Closed.ist_endgueltig());
        assert!(!ConnectionState::Connected.ist_endgueltig());
        assert!(!ConnectionState::Connecting.ist_endgueltig());
    }

    #[test]
    fn sink_traegt_herkunft() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let peer = PeerId::new();
        let sink = TransportEventSink::neu(peer, ConnectionHandle(7), tx);
        assert!(sink.melden(TransportEvent::StateChanged(ConnectionState::Connected)));

        let meldung = rx.try_recv().unwrap();
        assert_eq!(meldung.peer, peer);
        assert_eq!(meldung.connection, ConnectionHandle(7));
    }

    #[test]
    fn sink_ohne_empfaenger() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let sink = TransportEventSink::neu(PeerId::new(), ConnectionHandle(1), tx);
        assert!(!sink.melden(TransportEvent::Frame(Bytes::from_static(b"x"))));
    }
}
