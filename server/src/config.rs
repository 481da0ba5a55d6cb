//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tuschel_observability::LoggingConfig;
use tuschel_signaling::RendezvousConfig;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Rendezvous-Einstellungen
    pub server: ServerEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingConfig,
}

/// Rendezvous-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Bind-Adresse des TCP-Listeners
    pub bind_adresse: String,
    /// TCP-Port
    pub port: u16,
    /// Maximale Mitglieder pro Raum
    pub max_raum_groesse: usize,
    /// Maximale Anzahl gleichzeitiger Clients
    pub max_clients: usize,
    /// Sekunden bis zum ersten Hello einer neuen Verbindung
    pub hello_timeout_sek: u64,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 7878,
            max_raum_groesse: 8,
            max_clients: 1024,
            hello_timeout_sek: 10,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei
    ///
    /// Gibt `None` zurueck wenn die Datei nicht existiert, der Aufrufer
    /// verwendet dann die Standardwerte.
    pub fn laden(pfad: &str) -> anyhow::Result<Option<Self>> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .with_context(|| format!("Konfigurationsfehler in '{pfad}'"))?;
                Ok(Some(config))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Gibt die vollstaendige Bind-Adresse fuer TCP zurueck
    pub fn tcp_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        let adresse = format!("{}:{}", self.server.bind_adresse, self.server.port);
        adresse
            .parse()
            .with_context(|| format!("Ungueltige Bind-Adresse '{adresse}'"))
    }

    /// Laufzeit-Konfiguration fuer den Rendezvous-Server
    pub fn rendezvous(&self) -> RendezvousConfig {
        RendezvousConfig {
            max_raum_groesse: self.server.max_raum_groesse,
            max_clients: self.server.max_clients,
            hello_timeout: Duration::from_secs(self.server.hello_timeout_sek),
        }
    }
}
