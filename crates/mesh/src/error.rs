//! Fehlertypen fuer das Peer-Mesh

use thiserror::Error;
use tuschel_core::PeerId;

/// Fehlertyp fuer das Peer-Mesh
#[derive(Debug, Error)]
pub enum MeshError {
    /// Zusammenbruch auf Transport-Ebene waehrend der Verhandlung
    #[error("Verhandlung fehlgeschlagen: {0}")]
    Negotiation(String),

    /// Oeffentlicher Schluessel des Peers fehlerhaft oder nicht dekodierbar
    #[error("Key-Exchange fehlgeschlagen: {0}")]
    KeyExchange(String),

    /// Frame beschaedigt, gefaelscht oder mit veraltetem Schluessel
    #[error("Entschluesselung fehlgeschlagen: {0}")]
    Decrypt(String),

    /// Senden bevor der Kanal nutzbar ist
    #[error("Kanal zu {0} nicht verfuegbar")]
    ChannelUnavailable(PeerId),

    /// Verbindung zum Rendezvous-Server unterbrochen
    #[error("Signaling getrennt: {0}")]
    SignalingDisconnected(String),

    /// Transport hat das Senden abgelehnt
    #[error("Senden fehlgeschlagen: {0}")]
    Transmission(String),

    /// Warteschlange bis zur Verschluesselung ist voll
    #[error("Warteschlange fuer {peer} voll ({max} Nachrichten)")]
    QueueFull { peer: PeerId, max: usize },

    #[error("Sitzung fuer {0} existiert bereits")]
    SessionExists(PeerId),

    #[error("Verbindung zur eigenen Peer-ID nicht moeglich")]
    EigenerPeer,

    /// Der Mesh-Task laeuft nicht mehr
    #[error("Mesh wurde beendet")]
    MeshStopped,

    #[error("Serialisierung fehlgeschlagen: {0}")]
    Serialisierung(#[from] serde_json::Error),
}

impl MeshError {
    /// Gibt true zurueck wenn ein spaeterer Versuch sinnvoll sein koennte
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(
            self,
            Self::ChannelUnavailable(_) | Self::QueueFull { .. } | Self::SignalingDisconnected(_)
        )
    }
}

/// Result-Typ fuer das Peer-Mesh
pub type MeshResult<T> = Result<T, MeshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = MeshError::QueueFull {
            peer: PeerId::new(),
            max: 3,
        };
        assert!(e.to_string().contains("3 Nachrichten"));
    }

    #[test]
    fn wiederholbar_erkennung() {
        assert!(MeshError::ChannelUnavailable(PeerId::new()).ist_wiederholbar());
        assert!(!MeshError::Decrypt("x".into()).ist_wiederholbar());
        assert!(!MeshError::MeshStopped.ist_wiederholbar());
    }
}
