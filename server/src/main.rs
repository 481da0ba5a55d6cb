//! Tuschel Rendezvous-Server – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Server.

use anyhow::Result;
use tuschel_observability::logging_initialisieren;
use tuschel_server::{config::ServerConfig, Server};

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad =
        std::env::var("TUSCHEL_SERVER_CONFIG").unwrap_or_else(|_| "tuschel-server.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let geladen = ServerConfig::laden(&config_pfad)?;
    let datei_gefunden = geladen.is_some();
    let config = geladen.unwrap_or_default();

    logging_initialisieren(&config.logging)?;
    if !datei_gefunden {
        tracing::warn!(
            pfad = %config_pfad,
            "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
        );
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        adresse = %config.tcp_bind_adresse()?,
        max_raum_groesse = config.server.max_raum_groesse,
        "Tuschel Rendezvous-Server wird initialisiert"
    );

    Server::neu(config).starten().await
}
