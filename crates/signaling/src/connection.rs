//! Client-Connection: verwaltet eine einzelne TCP-Verbindung
//!
//! ## Ablauf
//! ```text
//! Verbunden --Hello--> Registriert --Create/Join--> ImRaum
//!     |                     |                         |
//!     +---------------------+------ Trennen ----------+
//! ```
//!
//! Die erste Nachricht muss `Hello` sein. Danach laufen eingehende
//! Frames und die Sende-Queue der Registrierung in einer Schleife. Wird
//! die Registrierung entfernt (z.B. durch Uebernahme nach einem
//! Reconnect), schliesst sich die Queue und damit die Verbindung.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_util::codec::Framed;
use tuschel_core::PeerId;
use tuschel_protocol::{ClientNachricht, FrameCodec, RendezvousFehlerCode, ServerNachricht};

use crate::raeume::RaumVerwaltung;

type ServerFramed = Framed<TcpStream, FrameCodec<ClientNachricht, ServerNachricht>>;

/// Verarbeitet eine einzelne TCP-Verbindung
pub struct ClientConnection {
    raeume: RaumVerwaltung,
    peer_addr: SocketAddr,
    hello_timeout: Duration,
}

impl ClientConnection {
    /// Erstellt eine neue ClientConnection
    pub fn neu(raeume: RaumVerwaltung, peer_addr: SocketAddr, hello_timeout: Duration) -> Self {
        Self {
            raeume,
            peer_addr,
            hello_timeout,
        }
    }

    /// Verbindungs-Schleife, laeuft bis zur Trennung oder zum Shutdown
    pub async fn verarbeiten(self, stream: TcpStream, mut shutdown_rx: watch::Receiver<bool>) {
        let peer_addr = self.peer_addr;
        let mut framed: ServerFramed = Framed::new(stream, FrameCodec::new());

        let wunsch_id = match self.hello_erwarten(&mut framed).await {
            Some(wunsch) => wunsch,
            None => return,
        };

        let registrierung = self.raeume.registrieren(wunsch_id);
        let peer_id = registrierung.peer_id;
        let verbindung = registrierung.verbindung;
        let mut sende_rx = registrierung.empfaenger;

        if framed.send(ServerNachricht::Welcome { peer_id }).await.is_err() {
            self.raeume.abmelden(&peer_id, verbindung);
            return;
        }
        tracing::info!(
            adresse = %peer_addr,
            peer = %peer_id,
            wiederverbunden = wunsch_id.is_some(),
            "Client verbunden"
        );

        loop {
            tokio::select! {
                frame = framed.next() => {
                    match frame {
                        Some(Ok(nachricht)) => {
                            if let Some(antwort) = self.nachricht_verarbeiten(&peer_id, nachricht) {
                                if let Err(e) = framed.send(antwort).await {
                                    tracing::warn!(peer = %peer_id, fehler = %e, "Senden fehlgeschlagen");
                                    break;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(peer = %peer_id, fehler = %e, "Frame-Lesefehler");
                            break;
                        }
                        None => {
                            tracing::info!(peer = %peer_id, "Verbindung vom Client getrennt");
                            break;
                        }
                    }
                }

                ausgehend = sende_rx.recv() => {
                    match ausgehend {
                        Some(nachricht) => {
                            if let Err(e) = framed.send(nachricht).await {
                                tracing::warn!(peer = %peer_id, fehler = %e, "Senden fehlgeschlagen");
                                break;
                            }
                        }
                        None => {
                            tracing::info!(peer = %peer_id, "Registrierung entfernt, Verbindung wird geschlossen");
                            break;
                        }
                    }
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::debug!(peer = %peer_id, "Shutdown, Verbindung wird geschlossen");
                        break;
                    }
                }
            }
        }

        self.raeume.abmelden(&peer_id, verbindung);
        tracing::info!(peer = %peer_id, "Verbindung beendet");
    }

    /// Wartet auf die `Hello`-Nachricht und liefert die gewuenschte ID
    ///
    /// `None` bedeutet: Verbindung wird ohne Registrierung geschlossen.
    async fn hello_erwarten(&self, framed: &mut ServerFramed) -> Option<Option<PeerId>> {
        match tokio::time::timeout(self.hello_timeout, framed.next()).await {
            Ok(Some(Ok(ClientNachricht::Hello { wunsch_id }))) => Some(wunsch_id),
            Ok(Some(Ok(andere))) => {
                tracing::warn!(adresse = %self.peer_addr, nachricht = ?andere, "Hello erwartet");
                let _ = framed
                    .send(ServerNachricht::error(
                        RendezvousFehlerCode::InvalidRequest,
                        "Erste Nachricht muss Hello sein",
                    ))
                    .await;
                None
            }
            Ok(Some(Err(e))) => {
                tracing::warn!(adresse = %self.peer_addr, fehler = %e, "Frame-Lesefehler vor Hello");
                None
            }
            Ok(None) => None,
            Err(_) => {
                tracing::warn!(adresse = %self.peer_addr, "Kein Hello innerhalb des Zeitlimits");
                None
            }
        }
    }

    /// Verarbeitet eine Nachricht eines registrierten Clients
    ///
    /// Gibt die direkte Antwort zurueck, Benachrichtigungen an andere
    /// Mitglieder laufen ueber deren Sende-Queues.
    fn nachricht_verarbeiten(
        &self,
        peer_id: &PeerId,
        nachricht: ClientNachricht,
    ) -> Option<ServerNachricht> {
        match nachricht {
            ClientNachricht::Hello { .. } => Some(ServerNachricht::error(
                RendezvousFehlerCode::InvalidRequest,
                "Bereits registriert",
            )),

            ClientNachricht::CreateRoom { name } => {
                Some(match self.raeume.raum_erstellen(peer_id, &name) {
                    Ok(code) => ServerNachricht::RoomCreated { code },
                    Err(code) => ServerNachricht::error(code, "Raum konnte nicht erstellt werden"),
                })
            }

            ClientNachricht::JoinRoom { code, name } => {
                Some(match self.raeume.raum_beitreten(peer_id, &code, &name) {
                    Ok(members) => ServerNachricht::RoomJoined { code, members },
                    Err(RendezvousFehlerCode::RoomFull) => ServerNachricht::error(
                        RendezvousFehlerCode::RoomFull,
                        format!("Raum {code} ist voll"),
                    ),
                    Err(RendezvousFehlerCode::RoomNotFound) => ServerNachricht::error(
                        RendezvousFehlerCode::RoomNotFound,
                        format!("Raum {code} existiert nicht"),
                    ),
                    Err(fehler) => ServerNachricht::error(fehler, "Beitritt fehlgeschlagen"),
                })
            }

            ClientNachricht::LeaveRoom => {
                self.raeume.raum_verlassen(peer_id);
                None
            }

            ClientNachricht::Relay { to, signal } => {
                match self.raeume.weiterleiten(peer_id, &to, signal) {
                    Ok(()) => None,
                    Err(code) => {
                        tracing::debug!(von = %peer_id, an = %to, fehler = ?code, "Weiterleitung abgelehnt");
                        Some(ServerNachricht::error(
                            code,
                            format!("Signal an {to} nicht zustellbar"),
                        ))
                    }
                }
            }
        }
    }
}
