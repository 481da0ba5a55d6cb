//! Fehlertypen fuer Rendezvous-Server und Signaling-Client

use thiserror::Error;
use tuschel_protocol::RendezvousFehlerCode;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Protokollfehler (ungueltiges Frame, unerwartete Nachricht)
    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    /// Der Server hat die Anfrage abgelehnt
    #[error("Server-Fehler {code:?}: {message}")]
    Server {
        code: RendezvousFehlerCode,
        message: String,
    },

    /// Aktuell keine Verbindung zum Rendezvous-Server
    #[error("Nicht mit dem Rendezvous-Server verbunden")]
    NichtVerbunden,

    /// Alle Wiederverbindungs-Versuche sind gescheitert
    #[error("Verbindung endgueltig getrennt")]
    EndgueltigGetrennt,

    /// Keine Antwort innerhalb des Zeitlimits
    #[error("Timeout")]
    Timeout,
}

impl SignalingError {
    /// Erstellt einen Protokollfehler
    pub fn protokoll(msg: impl Into<String>) -> Self {
        Self::Protokoll(msg.into())
    }

    /// Fehler-Code des Servers, falls es eine Ablehnung war
    pub fn server_code(&self) -> Option<RendezvousFehlerCode> {
        match self {
            Self::Server { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;
