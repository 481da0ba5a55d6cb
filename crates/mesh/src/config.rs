//! Mesh-Konfiguration

use std::time::Duration;

/// Standard-Zeitlimit fuer den Verbindungsaufbau bis zum offenen Kanal
pub const STANDARD_AUFBAU_TIMEOUT: Duration = Duration::from_secs(15);

/// Standard-Obergrenze fuer wartende Nachrichten pro Peer
pub const STANDARD_MAX_WARTENDE: usize = 256;

/// Laufzeit-Konfiguration des Mesh
#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// Eigener Anzeigename
    pub name: String,
    /// Zeitlimit bis ein Peer den Zustand `ChannelOpen` erreicht haben muss
    pub aufbau_timeout: Duration,
    /// Maximale Laenge der Warteschlange vor der Verschluesselung
    pub max_wartende_nachrichten: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            name: "anonym".into(),
            aufbau_timeout: STANDARD_AUFBAU_TIMEOUT,
            max_wartende_nachrichten: STANDARD_MAX_WARTENDE,
        }
    }
}

impl MeshConfig {
    /// Erstellt eine Konfiguration mit Anzeigename und Standardwerten
    pub fn mit_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}
