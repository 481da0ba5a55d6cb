//! Knoten-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Ohne Datei verbindet
//! sich der Knoten mit einem lokalen Rendezvous-Server und legt einen
//! neuen Raum an.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tuschel_core::RoomCode;
use tuschel_crypto::AeadAlgorithmus;
use tuschel_mesh::MeshConfig;
use tuschel_observability::LoggingConfig;
use tuschel_signaling::{ClientConfig, ReconnectPolicy};
use tuschel_transport::TcpTransportConfig;

/// Vollstaendige Knoten-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub identitaet: IdentitaetEinstellungen,
    pub signaling: SignalingEinstellungen,
    pub mesh: MeshEinstellungen,
    pub transport: TransportEinstellungen,
    pub raum: RaumEinstellungen,
    pub logging: LoggingConfig,
}

/// Eigene Identitaet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitaetEinstellungen {
    /// Anzeigename fuer andere Teilnehmer
    pub name: String,
}

impl Default for IdentitaetEinstellungen {
    fn default() -> Self {
        Self {
            name: "anonym".into(),
        }
    }
}

/// Verbindung zum Rendezvous-Server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingEinstellungen {
    /// Adresse des Servers (`tcp://host:port`)
    pub url: String,
    /// Wiederverbindungs-Versuche nach einem Abbruch
    pub reconnect_versuche: u32,
    /// Abstand zwischen zwei Versuchen in Millisekunden
    pub reconnect_verzoegerung_ms: u64,
}

impl Default for SignalingEinstellungen {
    fn default() -> Self {
        Self {
            url: "tcp://127.0.0.1:7878".into(),
            reconnect_versuche: 5,
            reconnect_verzoegerung_ms: 2000,
        }
    }
}

/// Einstellungen des Mesh
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshEinstellungen {
    /// Zeit bis ein Verbindungsaufbau aufgegeben wird
    pub aufbau_timeout_ms: u64,
    /// Obergrenze fuer Nachrichten vor Abschluss des Schluesselaustauschs
    pub max_wartende_nachrichten: usize,
    /// AEAD-Algorithmus fuer Anwendungsnachrichten
    pub algorithmus: AeadAlgorithmus,
}

impl Default for MeshEinstellungen {
    fn default() -> Self {
        Self {
            aufbau_timeout_ms: 15_000,
            max_wartende_nachrichten: 256,
            algorithmus: AeadAlgorithmus::default(),
        }
    }
}

/// TCP-Transport
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportEinstellungen {
    /// Listener fuer eingehende Datenkanaele (Port 0 = beliebig)
    pub bind_adresse: String,
    /// Adresse die anderen Peers als Kandidat gemeldet wird
    pub kandidat_adresse: Option<String>,
}

impl Default for TransportEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "127.0.0.1:0".into(),
            kandidat_adresse: None,
        }
    }
}

/// Raum-Auswahl
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RaumEinstellungen {
    /// Bestehender Raum; ohne Code wird ein neuer Raum angelegt
    pub code: Option<String>,
}

impl NodeConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei
    ///
    /// Gibt `None` zurueck wenn die Datei nicht existiert.
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

    pub fn mesh_config(&self) -> MeshConfig {
        MeshConfig {
            name: self.identitaet.name.clone(),
            aufbau_timeout: Duration::from_millis(self.mesh.aufbau_timeout_ms),
            max_wartende_nachrichten: self.mesh.max_wartende_nachrichten,
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            reconnect: ReconnectPolicy {
                max_versuche: self.signaling.reconnect_versuche,
                verzoegerung: Duration::from_millis(self.signaling.reconnect_verzoegerung_ms),
            },
            ..Default::default()
        }
    }

    pub fn transport_config(&self) -> anyhow::Result<TcpTransportConfig> {
        let bind_adresse: SocketAddr = self
            .transport
            .bind_adresse
            .parse()
            .with_context(|| format!("Ungueltige Bind-Adresse '{}'", self.transport.bind_adresse))?;
        let kandidat_adresse = self
            .transport
            .kandidat_adresse
            .as_deref()
            .map(|a| {
                a.parse::<SocketAddr>()
                    .with_context(|| format!("Ungueltige Kandidat-Adresse '{a}'"))
            })
            .transpose()?;
        Ok(TcpTransportConfig {
            bind_adresse,
            kandidat_adresse,
            ..Default::default()
        })
    }

    /// Raum-Code aus der Konfiguration, falls gesetzt
    pub fn raum_code(&self) -> anyhow::Result<Option<RoomCode>> {
        match self.raum.code.as_deref() {
            None => Ok(None),
            Some(roh) if roh.trim().is_empty() => Ok(None),
            Some(roh) => RoomCode::parse(roh)
                .map(Some)
                .ok_or_else(|| anyhow::anyhow!("Ungueltiger Raum-Code '{roh}'")),
        }
    }
}
