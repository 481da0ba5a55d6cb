//! TCP-Listener des Rendezvous-Servers
//!
//! Der `RendezvousServer` bindet einen TCP-Socket und startet fuer jede
//! eingehende Verbindung einen eigenen tokio-Task mit einer
//! [`ClientConnection`].

use futures_util::SinkExt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::codec::Framed;
use tuschel_protocol::{ClientNachricht, FrameCodec, RendezvousFehlerCode, ServerNachricht};

use crate::connection::ClientConnection;
use crate::raeume::{RaumVerwaltung, STANDARD_MAX_RAUM_GROESSE};

/// Laufzeit-Konfiguration des Rendezvous-Servers
#[derive(Debug, Clone)]
pub struct RendezvousConfig {
    /// Maximale Mitglieder pro Raum
    pub max_raum_groesse: usize,
    /// Maximale gleichzeitige Clients
    pub max_clients: usize,
    /// Zeit bis zum ersten `Hello` einer neuen Verbindung
    pub hello_timeout: Duration,
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            max_raum_groesse: STANDARD_MAX_RAUM_GROESSE,
            max_clients: 1024,
            hello_timeout: Duration::from_secs(10),
        }
    }
}

/// TCP-Rendezvous-Server
pub struct RendezvousServer {
    config: RendezvousConfig,
    raeume: RaumVerwaltung,
    bind_addr: SocketAddr,
}

impl RendezvousServer {
    /// Erstellt einen neuen RendezvousServer
    pub fn neu(config: RendezvousConfig, bind_addr: SocketAddr) -> Self {
        let raeume = RaumVerwaltung::neu(config.max_raum_groesse);
        Self {
            config,
            raeume,
            bind_addr,
        }
    }

    /// Zugriff auf die Raum-Verwaltung (z.B. fuer Statistiken)
    pub fn raeume(&self) -> RaumVerwaltung {
        self.raeume.clone()
    }

    /// Gibt die Bind-Adresse zurueck
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    /// Bindet den Socket und akzeptiert Verbindungen
    ///
    /// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt.
    pub async fn starten(self, shutdown_rx: watch::Receiver<bool>) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        self.mit_listener_starten(listener, shutdown_rx).await
    }

    /// Akzeptiert Verbindungen auf einem bereits gebundenen Listener
    pub async fn mit_listener_starten(
        self,
        listener: TcpListener,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        let lokale_addr = listener.local_addr()?;
        tracing::info!(
            adresse = %lokale_addr,
            max_raum_groesse = self.config.max_raum_groesse,
            max_clients = self.config.max_clients,
            "Rendezvous-Server gestartet"
        );

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            // Client-Limit pruefen
                            if self.raeume.client_anzahl() >= self.config.max_clients {
                                tracing::warn!(
                                    peer = %peer_addr,
                                    max = self.config.max_clients,
                                    "Server voll, Verbindung abgelehnt"
                                );
                                tokio::spawn(ablehnen(stream));
                                continue;
                            }

                            tracing::debug!(peer = %peer_addr, "Verbindung akzeptiert");
                            let verbindung = ClientConnection::neu(
                                self.raeume.clone(),
                                peer_addr,
                                self.config.hello_timeout,
                            );
                            tokio::spawn(verbindung.verarbeiten(stream, shutdown_rx.clone()));
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Rendezvous-Server: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        tracing::info!("Rendezvous-Server gestoppt");
        Ok(())
    }
}

/// Teilt einem abgewiesenen Client den Grund mit und schliesst
async fn ablehnen(stream: TcpStream) {
    let mut framed = Framed::new(stream, FrameCodec::<ClientNachricht, ServerNachricht>::new());
    let _ = framed
        .send(ServerNachricht::error(
            RendezvousFehlerCode::ServerFull,
            "Server ist voll",
        ))
        .await;
}
