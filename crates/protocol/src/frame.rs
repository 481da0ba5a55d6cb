//! Datenkanal-Frames (Peer <-> Peer)
//!
//! Jeder Frame auf dem Datenkanal ist ein JSON-Objekt mit `tag`-Feld:
//!
//! ```text
//! {"tag":"key-exchange","publicKey":"<base64>"}   unverschluesselt, einmal pro Richtung
//! {"tag":"message","data":"<base64(nonce || ciphertext)>"}
//! ```
//!
//! Der Klartext einer `message` ist ein serialisiertes [`MessageEnvelope`]:
//! `{"text":"...","time":1700000000000,"kind":"chat"}`.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use tuschel_core::jetzt_ms;

// ---------------------------------------------------------------------------
// ChannelFrame
// ---------------------------------------------------------------------------

/// Ein Frame auf dem Datenkanal zwischen zwei Peers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tag")]
pub enum ChannelFrame {
    /// Kontroll-Frame mit dem exportierten oeffentlichen Schluessel
    #[serde(rename = "key-exchange")]
    KeyExchange {
        #[serde(rename = "publicKey")]
        public_key: String,
    },
    /// Verschluesselte Anwendungsnachricht
    #[serde(rename = "message")]
    Message { data: String },
}

impl ChannelFrame {
    /// Erstellt einen Kontroll-Frame
    pub fn key_exchange(public_key: impl Into<String>) -> Self {
        Self::KeyExchange {
            public_key: public_key.into(),
        }
    }

    /// Verpackt verschluesselte Bytes (Nonce + Ciphertext) als Anwendungs-Frame
    pub fn message(verschluesselt: &[u8]) -> Self {
        Self::Message {
            data: STANDARD.encode(verschluesselt),
        }
    }

    /// Gibt true zurueck wenn es sich um einen Kontroll-Frame handelt
    pub fn ist_kontroll_frame(&self) -> bool {
        matches!(self, Self::KeyExchange { .. })
    }

    /// Serialisiert den Frame fuer den Datenkanal
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Deserialisiert einen Frame vom Datenkanal
    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Dekodiert die Nutzdaten eines `message`-Frames
pub fn message_bytes(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(data)
}

// ---------------------------------------------------------------------------
// MessageEnvelope
// ---------------------------------------------------------------------------

/// Art einer Anwendungsnachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Chat,
}

/// Anwendungsnachricht (Klartext, vor der Verschluesselung)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Nachrichtentext
    pub text: String,
    /// Sendezeitpunkt (Unix-Epoch in ms)
    pub time: i64,
    pub kind: MessageKind,
}

impl MessageEnvelope {
    /// Erstellt eine Chat-Nachricht mit dem aktuellen Zeitstempel
    pub fn chat(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            time: jetzt_ms(),
            kind: MessageKind::Chat,
        }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
