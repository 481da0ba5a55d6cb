//! Event-Bus des Mesh
//!
//! Abonnenten registrieren einen Handler pro [`EventKind`]. Die Zustellung
//! ist synchron, in Abonnement-Reihenfolge und ungepuffert: wer sich nach
//! einem Ereignis anmeldet, bekommt es nicht nachgereicht. Handler laufen
//! im Mesh-Task und muessen sofort zurueckkehren.

use tuschel_core::{PeerId, RoomCode};
use tuschel_protocol::MessageEnvelope;

/// Grund fuer das Ende einer Peer-Sitzung
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trennungsgrund {
    /// Explizit lokal getrennt
    Lokal,
    /// Verhandlung oder Transport zusammengebrochen
    Verhandlung(String),
    /// Kanal nicht rechtzeitig offen
    Timeout,
    /// Senden ueber den Kanal fehlgeschlagen
    Uebertragung(String),
    /// Peer hat eine neue Verhandlung begonnen
    Abgeloest,
}

impl std::fmt::Display for Trennungsgrund {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lokal => f.write_str("lokal getrennt"),
            Self::Verhandlung(grund) => write!(f, "Verhandlung: {grund}"),
            Self::Timeout => f.write_str("Zeitlimit fuer Verbindungsaufbau"),
            Self::Uebertragung(grund) => write!(f, "Uebertragung: {grund}"),
            Self::Abgeloest => f.write_str("durch neue Verhandlung abgeloest"),
        }
    }
}

/// Statusmeldungen von ausserhalb des Mesh (Signaling, Raum)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMeldung {
    SignalingVerbunden { peer_id: PeerId },
    SignalingWiederverbinden { versuch: u32, max: u32 },
    SignalingEndgueltigGetrennt,
    RaumBeigetreten { code: RoomCode },
    RaumVerlassen,
}

/// Alle Ereignisse die der Mesh ausstrahlt
#[derive(Debug, Clone)]
pub enum MeshEvent {
    /// Datenkanal zu einem Peer ist offen
    ChannelOpened { peer: PeerId, name: String },
    /// Paar-Schluessel ist gesetzt
    EncryptionEstablished {
        peer: PeerId,
        name: String,
        fingerprint: String,
    },
    /// Sitzung wurde entfernt (genau einmal pro Sitzung)
    Disconnected {
        peer: PeerId,
        name: String,
        grund: Trennungsgrund,
    },
    /// Entschluesselte Anwendungsnachricht
    MessageReceived {
        peer: PeerId,
        name: String,
        message: MessageEnvelope,
    },
    StatusChanged(StatusMeldung),
}

/// Ereignis-Art fuer Abonnements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ChannelOpened,
    EncryptionEstablished,
    Disconnected,
    MessageReceived,
    StatusChanged,
}

impl MeshEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ChannelOpened { .. } => EventKind::ChannelOpened,
            Self::EncryptionEstablished { .. } => EventKind::EncryptionEstablished,
            Self::Disconnected { .. } => EventKind::Disconnected,
            Self::MessageReceived { .. } => EventKind::MessageReceived,
            Self::StatusChanged(_) => EventKind::StatusChanged,
        }
    }
}

impl EventKind {
    /// Ereignis-Name (fuer Logs)
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChannelOpened => "channel-opened",
            Self::EncryptionEstablished => "encryption-established",
            Self::Disconnected => "disconnected",
            Self::MessageReceived => "message-received",
            Self::StatusChanged => "status-changed",
        }
    }
}

/// Kennung eines Abonnements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Handler fuer Mesh-Ereignisse
pub type EventHandler = Box<dyn FnMut(&MeshEvent) + Send + 'static>;

struct Abonnement {
    id: SubscriptionId,
    kind: EventKind,
    handler: EventHandler,
}

/// Publish/Subscribe-Register
#[derive(Default)]
pub struct EventBus {
    naechste_id: u64,
    abonnements: Vec<Abonnement>,
}

impl EventBus {
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, kind: EventKind, handler: EventHandler) -> SubscriptionId {
        self.naechste_id += 1;
        let id = SubscriptionId(self.naechste_id);
        self.abonnements.push(Abonnement { id, kind, handler });
        id
    }

    /// Entfernt ein Abonnement; false wenn es nicht (mehr) existiert
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let vorher = self.abonnements.len();
        self.abonnements.retain(|a| a.id != id);
        self.abonnements.len() != vorher
    }

    /// Stellt ein Ereignis allen passenden Abonnenten zu
    pub fn publish(&mut self, event: &MeshEvent) {
        let kind = event.kind();
        let mut zugestellt = 0usize;
        for abo in self.abonnements.iter_mut().filter(|a| a.kind == kind) {
            (abo.handler)(event);
            zugestellt += 1;
        }
        tracing::trace!(event = kind.name(), zugestellt, "Ereignis veroeffentlicht");
    }

    pub fn anzahl(&self) -> usize {
        self.abonnements.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("abonnements", &self.abonnements.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn getrennt() -> MeshEvent {
        MeshEvent::Disconnected {
            peer: PeerId::new(),
            name: "bob".into(),
            grund: Trennungsgrund::Lokal,
        }
    }

    #[test]
    fn zustellung_in_abonnement_reihenfolge() {
        let mut bus = EventBus::neu();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = Arc::clone(&log);
            bus.subscribe(
                EventKind::Disconnected,
                Box::new(move |_| log.lock().unwrap().push(i)),
            );
        }
        bus.publish(&getrennt());
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn nur_passende_art_wird_zugestellt() {
        let mut bus = EventBus::neu();
        let zaehler = Arc::new(Mutex::new(0));
        let z = Arc::clone(&zaehler);
        bus.subscribe(
            EventKind::ChannelOpened,
            Box::new(move |_| *z.lock().unwrap() += 1),
        );
        bus.publish(&getrennt());
        assert_eq!(*zaehler.lock().unwrap(), 0);
    }

    #[test]
    fn spaeter_abonnent_bekommt_nichts_nachgereicht() {
        let mut bus = EventBus::neu();
        bus.publish(&getrennt());

        let zaehler = Arc::new(Mutex::new(0));
        let z = Arc::clone(&zaehler);
        bus.subscribe(
            EventKind::Disconnected,
            Box::new(move |_| *z.lock().unwrap() += 1),
        );
        assert_eq!(*zaehler.lock().unwrap(), 0);

        bus.publish(&getrennt());
        assert_eq!(*zaehler.lock().unwrap(), 1);
    }

    #[test]
    fn abmelden() {
        let mut bus = EventBus::neu();
        let zaehler = Arc::new(Mutex::new(0));
        let z = Arc::clone(&zaehler);
        let id = bus.subscribe(
            EventKind::StatusChanged,
            Box::new(move |_| *z.lock().unwrap() += 1),
        );
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));

        bus.publish(&MeshEvent::StatusChanged(StatusMeldung::RaumVerlassen));
        assert_eq!(*zaehler.lock().unwrap(), 0);
        assert_eq!(bus.anzahl(), 0);
    }

    #[test]
    fn event_art_und_name() {
        let e = MeshEvent::StatusChanged(StatusMeldung::SignalingEndgueltigGetrennt);
        assert_eq!(e.kind(), EventKind::StatusChanged);
        assert_eq!(e.kind().name(), "status-changed");
    }
}
