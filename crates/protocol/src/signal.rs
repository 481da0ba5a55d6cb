//! Verhandlungs-Signale (Peer -> Rendezvous -> Peer)
//!
//! Session-Beschreibungen und Konnektivitaets-Kandidaten sind fuer den
//! Mesh-Kern opak: nur der Transport-Provider interpretiert ihren Inhalt.
//! Der Rendezvous-Server leitet sie unveraendert weiter und sieht nie
//! Nachrichteninhalte.

use serde::{Deserialize, Serialize};

/// Opake Session-Beschreibung (Offer oder Answer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
}

impl SessionDescription {
    pub fn new(sdp: impl Into<String>) -> Self {
        Self { sdp: sdp.into() }
    }
}

/// Opaker Konnektivitaets-Kandidat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub candidate: String,
}

impl Candidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
        }
    }
}

/// Ein Verhandlungs-Signal zwischen zwei Peers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Signal {
    Offer { description: SessionDescription },
    Answer { description: SessionDescription },
    Candidate { candidate: Candidate },
}

impl Signal {
    /// Signal-Name fuer Logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::Candidate { .. } => "candidate",
        }
    }
}
