//! Peer-Sitzungstabelle
//!
//! Ein Datensatz pro Peer, adressiert ausschliesslich ueber die
//! [`PeerId`]. Die Tabelle gehoert dem Mesh-Task; keine andere Stelle haelt
//! eine Referenz auf eine Sitzung ueber einen Ereignis-Schritt hinaus.

use std::collections::{BTreeMap, VecDeque};

use tuschel_core::PeerId;
use tuschel_crypto::SharedKey;
use tuschel_protocol::{Candidate, MessageEnvelope};

use crate::transport::{ChannelHandle, ConnectionHandle};

/// Zustand einer Peer-Sitzung
///
/// `Negotiating -> ChannelOpen -> Encrypted`, jeder Zustand kann nach
/// `Closed` wechseln. `Closed` wird nie verlassen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Negotiating,
    ChannelOpen,
    Encrypted,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Negotiating => "negotiating",
            Self::ChannelOpen => "channel-open",
            Self::Encrypted => "encrypted",
            Self::Closed => "closed",
        };
        f.pad(s)
    }
}

/// Veraenderlicher Datensatz eines Peers
#[derive(Debug)]
pub struct PeerSession {
    pub id: PeerId,
    pub name: String,
    pub connection: ConnectionHandle,
    pub channel: Option<ChannelHandle>,
    pub state: SessionState,
    pub is_initiator: bool,
    shared_key: Option<SharedKey>,
    pending_outbound: VecDeque<MessageEnvelope>,
    /// Entfernte Kandidaten vor gesetzter entfernter Beschreibung
    pub(crate) wartende_kandidaten: Vec<Candidate>,
    pub(crate) remote_beschreibung_gesetzt: bool,
    /// Answer liegt beim Transport, Duplikate werden verworfen
    pub(crate) answer_ausstehend: bool,
    /// Lokale Kandidaten bevor Offer/Answer beim Peer angekommen ist
    pub(crate) lokale_kandidaten: Vec<Candidate>,
    pub(crate) lokale_beschreibung_gesendet: bool,
}

impl PeerSession {
    pub fn neu(id: PeerId, name: String, connection: ConnectionHandle, is_initiator: bool) -> Self {
        Self {
            id,
            name,
            connection,
            channel: None,
            state: SessionState::Negotiating,
            is_initiator,
            shared_key: None,
            pending_outbound: VecDeque::new(),
            wartende_kandidaten: Vec::new(),
            remote_beschreibung_gesetzt: false,
            answer_ausstehend: false,
            lokale_kandidaten: Vec::new(),
            lokale_beschreibung_gesendet: false,
        }
    }

    pub fn shared_key(&self) -> Option<&SharedKey> {
        self.shared_key.as_ref()
    }

    pub fn ist_verschluesselt(&self) -> bool {
        self.shared_key.is_some()
    }

    /// Setzt den Paar-Schluessel und wechselt nach `Encrypted`
    ///
    /// Gibt false zurueck (und aendert nichts) wenn bereits ein Schluessel
    /// gesetzt ist.
    pub fn schluessel_setzen(&mut self, key: SharedKey) -> bool {
        if self.shared_key.is_some() {
            return false;
        }
        self.shared_key = Some(key);
        self.state = SessionState::Encrypted;
        true
    }

    pub fn wartende(&self) -> &VecDeque<MessageEnvelope> {
        &self.pending_outbound
    }

    pub(crate) fn einreihen(&mut self, nachricht: MessageEnvelope) -> usize {
        self.pending_outbound.push_back(nachricht);
        self.pending_outbound.len()
    }

    pub(crate) fn naechste_wartende(&mut self) -> Option<MessageEnvelope> {
        self.pending_outbound.pop_front()
    }

    /// Gibt true zurueck wenn der Datenkanal Nachrichten annimmt
    pub fn kanal_nutzbar(&self) -> bool {
        matches!(self.state, SessionState::ChannelOpen | SessionState::Encrypted)
    }
}

/// Eintrag der Teilnehmerliste (nur lesend)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEintrag {
    pub id: PeerId,
    pub name: String,
    pub state: SessionState,
    pub encrypted: bool,
}

/// Alle Peer-Sitzungen, nach PeerId geordnet
#[derive(Debug, Default)]
pub struct SessionTable {
    sitzungen: BTreeMap<PeerId, PeerSession>,
}

impl SessionTable {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Fuegt eine Sitzung ein; gibt sie zurueck falls der Peer schon existiert
    pub fn einfuegen(&mut self, sitzung: PeerSession) -> Result<(), PeerSession> {
        if self.sitzungen.contains_key(&sitzung.id) {
            return Err(sitzung);
        }
        self.sitzungen.insert(sitzung.id, sitzung);
        Ok(())
    }

    pub fn get(&self, id: &PeerId) -> Option<&PeerSession> {
        self.sitzungen.get(id)
    }

    pub fn get_mut(&mut self, id: &PeerId) -> Option<&mut PeerSession> {
        self.sitzungen.get_mut(id)
    }

    /// Liefert die Sitzung nur wenn sie noch zur gemeldeten Verbindung gehoert
    pub fn aktuell_mut(
        &mut self,
        id: &PeerId,
        connection: ConnectionHandle,
    ) -> Option<&mut PeerSession> {
        self.sitzungen
            .get_mut(id)
            .filter(|s| s.connection == connection)
    }

    pub fn ist_aktuell(&self, id: &PeerId, connection: ConnectionHandle) -> bool {
        self.sitzungen
            .get(id)
            .is_some_and(|s| s.connection == connection)
    }

    /// Entfernt eine Sitzung; ein zweiter Aufruf liefert `None`
    pub fn entfernen(&mut self, id: &PeerId) -> Option<PeerSession> {
        self.sitzungen.remove(id)
    }

    pub fn enthaelt(&self, id: &PeerId) -> bool {
        self.sitzungen.contains_key(id)
    }

    pub fn ids(&self) -> Vec<PeerId> {
        self.sitzungen.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sitzungen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sitzungen.is_empty()
    }

    /// Momentaufnahme aller Sitzungen ausser der eigenen Identitaet
    pub fn roster(&self, eigene_id: &PeerId) -> Vec<RosterEintrag> {
        self.sitzungen
            .values()
            .filter(|s| &s.id != eigene_id)
            .map(|s| RosterEintrag {
                id: s.id,
                name: s.name.clone(),
                state: s.state,
                encrypted: s.ist_verschluesselt(),
            })
            .collect()
    }
}
