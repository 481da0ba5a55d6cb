//! Tuschel Chat-Knoten – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Knoten.

use anyhow::Result;
use tuschel_node::{config::NodeConfig, Knoten};
use tuschel_observability::logging_initialisieren;

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("TUSCHEL_CONFIG").unwrap_or_else(|_| "tuschel.toml".into());

    let geladen = NodeConfig::laden(&config_pfad)?;
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
        signaling = %config.signaling.url,
        "Tuschel-Knoten wird initialisiert"
    );

    Knoten::neu(config).starten().await
}
