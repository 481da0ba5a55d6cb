//! Rendezvous-Protokoll (Peer <-> Signaling-Server)
//!
//! JSON-Nachrichten ueber eine TCP-Verbindung mit Laengenpraefix
//! (siehe [`crate::wire::FrameCodec`]).
//!
//! ## Ablauf
//! ```text
//! Client                         Server
//!   | -- Hello{wunsch_id} -------> |
//!   | <------------ Welcome{id} -- |
//!   | -- JoinRoom{code,name} ----> |
//!   | <-- RoomJoined{members} ---- |   andere Mitglieder: PeerJoined
//!   | -- Relay{to,signal} -------> | -> Signal{from,name,signal} an `to`
//! ```

use serde::{Deserialize, Serialize};
use tuschel_core::{PeerId, RoomCode};

use crate::signal::Signal;

// ---------------------------------------------------------------------------
// Fehler-Codes
// ---------------------------------------------------------------------------

/// Standardisierte Fehler-Codes des Rendezvous-Servers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RendezvousFehlerCode {
    InvalidRequest,
    RoomFull,
    RoomNotFound,
    NotInRoom,
    UnknownPeer,
    ServerFull,
}

// ---------------------------------------------------------------------------
// Nachrichten
// ---------------------------------------------------------------------------

/// Mitglied eines Raums
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaumMitglied {
    pub peer_id: PeerId,
    pub name: String,
}

/// Nachrichten vom Client an den Server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientNachricht {
    /// Erste Nachricht einer Verbindung. Nach einem Reconnect wird die
    /// bisherige ID erneut angefragt.
    Hello { wunsch_id: Option<PeerId> },
    /// Neuen Raum anlegen und ihm beitreten
    CreateRoom { name: String },
    /// Bestehendem Raum beitreten
    JoinRoom { code: RoomCode, name: String },
    /// Aktuellen Raum verlassen
    LeaveRoom,
    /// Signal an einen anderen Peer im selben Raum weiterleiten
    Relay { to: PeerId, signal: Signal },
}

/// Nachrichten vom Server an den Client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerNachricht {
    /// Zugewiesene Peer-ID
    Welcome { peer_id: PeerId },
    /// Raum wurde angelegt, der Ersteller ist Mitglied
    RoomCreated { code: RoomCode },
    /// Beitritt erfolgreich, `members` ohne den Beitretenden selbst
    RoomJoined {
        code: RoomCode,
        members: Vec<RaumMitglied>,
    },
    /// Ein anderer Peer ist dem Raum beigetreten
    PeerJoined { member: RaumMitglied },
    /// Ein anderer Peer hat den Raum verlassen
    PeerLeft { peer_id: PeerId },
    /// Weitergeleitetes Signal
    Signal {
        from: PeerId,
        name: String,
        signal: Signal,
    },
    Error {
        code: RendezvousFehlerCode,
        message: String,
    },
}

impl ServerNachricht {
    /// Erstellt eine Fehler-Antwort
    pub fn error(code: RendezvousFehlerCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}
