//! tuschel-server – Bibliotheks-Root
//!
//! Deklariert die Server-Module und stellt den oeffentlichen Einstiegspunkt
//! fuer Integrationstests bereit.

pub mod config;

use anyhow::Result;
use config::ServerConfig;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tuschel_signaling::RendezvousServer;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet den Rendezvous-Server und laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listener = TcpListener::bind(self.config.tcp_bind_adresse()?).await?;

        let server = tokio::spawn(self.ausfuehren(listener, shutdown_rx));

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
        shutdown_tx.send_replace(true);

        server.await??;
        Ok(())
    }

    /// Betreibt den Rendezvous-Server auf `listener` bis `shutdown_rx` true meldet
    pub async fn ausfuehren(
        self,
        listener: TcpListener,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<()> {
        let adresse = listener.local_addr()?;
        let rendezvous = RendezvousServer::neu(self.config.rendezvous(), adresse);
        let raeume = rendezvous.raeume();

        rendezvous.mit_listener_starten(listener, shutdown_rx).await?;
        tracing::info!(
            clients = raeume.client_anzahl(),
            raeume = raeume.raum_anzahl(),
            "Rendezvous-Server beendet"
        );
        Ok(())
    }
}
