//! Signaling-Client
//!
//! Haelt eine TCP-Verbindung zum Rendezvous-Server, uebersetzt Server-
//! Nachrichten in [`SignalingNotice`]s und verbindet sich nach einem
//! Abbruch gemaess [`ReconnectPolicy`] neu. Nach erfolgreicher
//! Wiederverbindung wird dieselbe Peer-ID angefragt und der zuletzt
//! betretene Raum erneut betreten.
//!
//! Der Client implementiert [`SignalSink`], damit der Mesh-Kern ihn
//! direkt fuer ausgehende Signale nutzen kann.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::codec::Framed;
use tuschel_core::{PeerId, RoomCode};
use tuschel_mesh::{MeshError, MeshResult, SignalSink};
use tuschel_protocol::{
    ClientNachricht, FrameCodec, RaumMitglied, RendezvousFehlerCode, ServerNachricht, Signal,
};

use crate::error::{SignalingError, SignalingResult};
use crate::reconnect::{ReconnectPolicy, SignalingStatus};

type ClientFramed = Framed<TcpStream, FrameCodec<ServerNachricht, ClientNachricht>>;

/// Standard-Zeitlimit fuer Verbindungsaufbau und Raum-Anfragen
pub const STANDARD_ANFRAGE_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Konfiguration und Benachrichtigungen
// ---------------------------------------------------------------------------

/// Konfiguration des Signaling-Clients
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub reconnect: ReconnectPolicy,
    /// Zeitlimit fuer Verbindungsaufbau und Raum-Anfragen
    pub anfrage_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            anfrage_timeout: STANDARD_ANFRAGE_TIMEOUT,
        }
    }
}

/// Benachrichtigungen des Clients an die Anwendung
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingNotice {
    /// Weitergeleitetes Signal eines anderen Peers
    Signal {
        from: PeerId,
        name: String,
        signal: Signal,
    },
    PeerJoined(RaumMitglied),
    PeerLeft(PeerId),
    /// Raum nach einer Wiederverbindung erneut betreten
    RaumWiederbetreten {
        code: RoomCode,
        members: Vec<RaumMitglied>,
    },
    Status(SignalingStatus),
    /// Fehler-Antwort ohne zugehoerige Anfrage (z.B. fehlgeschlagenes Relay)
    Fehler {
        code: RendezvousFehlerCode,
        message: String,
    },
}

/// Antwort auf eine Raum-Anfrage
#[derive(Debug)]
enum RaumAntwort {
    Erstellt(RoomCode),
    Beigetreten {
        code: RoomCode,
        members: Vec<RaumMitglied>,
    },
}

struct OffeneAnfrage {
    name: String,
    antwort: oneshot::Sender<SignalingResult<RaumAntwort>>,
}

// ---------------------------------------------------------------------------
// SignalingClient
// ---------------------------------------------------------------------------

/// Handle auf die Verbindung zum Rendezvous-Server
///
/// Kann guenstig geklont werden. Sind alle Handles gedroppt, beendet sich
/// der Verbindungs-Task.
#[derive(Clone)]
pub struct SignalingClient {
    ausgang: mpsc::UnboundedSender<ClientNachricht>,
    geteilt: Arc<Geteilt>,
    anfrage_timeout: Duration,
}

/// Zustand den Handles und Verbindungs-Task teilen
struct Geteilt {
    adresse: String,
    peer_id: Mutex<PeerId>,
    status_tx: watch::Sender<SignalingStatus>,
    /// Zuletzt betretener Raum mit Anzeigename
    raum: Mutex<Option<(RoomCode, String)>>,
    anfrage: Mutex<Option<OffeneAnfrage>>,
    shutdown_tx: watch::Sender<bool>,
}

impl SignalingClient {
    /// Verbindet sich mit dem Rendezvous-Server
    ///
    /// `url` hat die Form `tcp://host:port` oder `host:port`. Gibt den
    /// Client und den Empfaenger seiner Benachrichtigungen zurueck.
    pub async fn verbinden(
        url: &str,
        config: ClientConfig,
    ) -> SignalingResult<(Self, mpsc::UnboundedReceiver<SignalingNotice>)> {
        let adresse = url.strip_prefix("tcp://").unwrap_or(url).to_string();
        let (framed, peer_id) = verbindung_aufbauen(&adresse, None, config.anfrage_timeout).await?;
        tracing::info!(adresse = %adresse, peer = %peer_id, "Mit Rendezvous-Server verbunden");

        let (ausgang_tx, ausgang_rx) = mpsc::unbounded_channel();
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(SignalingStatus::Verbunden { peer_id });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let geteilt = Arc::new(Geteilt {
            adresse,
            peer_id: Mutex::new(peer_id),
            status_tx,
            raum: Mutex::new(None),
            anfrage: Mutex::new(None),
            shutdown_tx,
        });

        let _ = notices_tx.send(SignalingNotice::Status(SignalingStatus::Verbunden { peer_id }));
        tokio::spawn(verbindung_treiben(
            Arc::clone(&geteilt),
            framed,
            ausgang_rx,
            notices_tx,
            config.clone(),
            shutdown_rx,
        ));

        Ok((
            Self {
                ausgang: ausgang_tx,
                geteilt,
                anfrage_timeout: config.anfrage_timeout,
            },
            notices_rx,
        ))
    }

    /// Vom Server zugewiesene Peer-ID
    pub fn peer_id(&self) -> PeerId {
        *self.geteilt.peer_id.lock()
    }

    /// Aktueller Verbindungsstatus
    pub fn status(&self) -> SignalingStatus {
        self.geteilt.status_tx.borrow().clone()
    }

    /// Empfaenger fuer Statusaenderungen
    pub fn status_abonnieren(&self) -> watch::Receiver<SignalingStatus> {
        self.geteilt.status_tx.subscribe()
    }

    /// Zuletzt betretener Raum
    pub fn raum(&self) -> Option<RoomCode> {
        self.geteilt.raum.lock().as_ref().map(|(code, _)| code.clone())
    }

    /// Legt einen neuen Raum an und tritt ihm bei
    pub async fn create_room(&self, name: &str) -> SignalingResult<RoomCode> {
        let antwort = self
            .anfrage(name, ClientNachricht::CreateRoom { name: name.to_string() })
            .await?;
        match antwort {
            RaumAntwort::Erstellt(code) => Ok(code),
            RaumAntwort::Beigetreten { .. } => {
                Err(SignalingError::protokoll("RoomJoined statt RoomCreated"))
            }
        }
    }

    /// Tritt einem bestehenden Raum bei
    ///
    /// Gibt die bisherigen Mitglieder zurueck. Der Beitretende ist
    /// dafuer zustaendig, zu jedem von ihnen eine Verbindung aufzubauen.
    pub async fn join_room(&self, code: &RoomCode, name: &str) -> SignalingResult<Vec<RaumMitglied>> {
        let antwort = self
            .anfrage(
                name,
                ClientNachricht::JoinRoom {
                    code: code.clone(),
                    name: name.to_string(),
                },
            )
            .await?;
        match antwort {
            RaumAntwort::Beigetreten { members, .. } => Ok(members),
            RaumAntwort::Erstellt(_) => Err(SignalingError::protokoll("RoomCreated statt RoomJoined")),
        }
    }

    /// Verlaesst den aktuellen Raum
    pub fn leave_room(&self) -> SignalingResult<()> {
        self.geteilt.raum.lock().take();
        self.senden_roh(ClientNachricht::LeaveRoom)
    }

    /// Leitet ein Signal ueber den Server an einen Peer im selben Raum
    pub fn send(&self, an: PeerId, signal: Signal) -> SignalingResult<()> {
        self.senden_roh(ClientNachricht::Relay { to: an, signal })
    }

    /// Trennt die Verbindung ohne Wiederverbindung
    pub fn trennen(&self) {
        self.geteilt.shutdown_tx.send_replace(true);
    }

    fn senden_roh(&self, nachricht: ClientNachricht) -> SignalingResult<()> {
        match self.status() {
            SignalingStatus::Verbunden { .. } => {}
            SignalingStatus::EndgueltigGetrennt => return Err(SignalingError::EndgueltigGetrennt),
            _ => return Err(SignalingError::NichtVerbunden),
        }
        self.ausgang
            .send(nachricht)
            .map_err(|_| SignalingError::NichtVerbunden)
    }

    /// Sendet eine Raum-Anfrage und wartet auf die Antwort
    async fn anfrage(&self, name: &str, nachricht: ClientNachricht) -> SignalingResult<RaumAntwort> {
        let (tx, rx) = oneshot::channel();
        // Eine vorherige offene Anfrage wird dadurch abgebrochen
        *self.geteilt.anfrage.lock() = Some(OffeneAnfrage {
            name: name.to_string(),
            antwort: tx,
        });
        if let Err(e) = self.senden_roh(nachricht) {
            self.geteilt.anfrage.lock().take();
            return Err(e);
        }

        match tokio::time::timeout(self.anfrage_timeout, rx).await {
            Ok(Ok(ergebnis)) => ergebnis,
            Ok(Err(_)) => Err(SignalingError::NichtVerbunden),
            Err(_) => {
                self.geteilt.anfrage.lock().take();
                Err(SignalingError::Timeout)
            }
        }
    }
}

impl std::fmt::Debug for SignalingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingClient")
            .field("adresse", &self.geteilt.adresse)
            .field("peer_id", &self.peer_id())
            .field("status", &self.status())
            .finish()
    }
}

#[async_trait]
impl SignalSink for SignalingClient {
    async fn send_signal(&self, an: PeerId, signal: Signal) -> MeshResult<()> {
        self.send(an, signal)
            .map_err(|e| MeshError::SignalingDisconnected(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Verbindungs-Task
// ---------------------------------------------------------------------------

/// TCP-Verbindung aufbauen und `Hello`/`Welcome` austauschen
async fn verbindung_aufbauen(
    adresse: &str,
    wunsch_id: Option<PeerId>,
    timeout: Duration,
) -> SignalingResult<(ClientFramed, PeerId)> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(adresse))
        .await
        .map_err(|_| SignalingError::Timeout)??;
    let mut framed: ClientFramed = Framed::new(stream, FrameCodec::new());
    framed.send(ClientNachricht::Hello { wunsch_id }).await?;

    match tokio::time::timeout(timeout, framed.next()).await {
        Ok(Some(Ok(ServerNachricht::Welcome { peer_id }))) => Ok((framed, peer_id)),
        Ok(Some(Ok(ServerNachricht::Error { code, message }))) => {
            Err(SignalingError::Server { code, message })
        }
        Ok(Some(Ok(andere))) => Err(SignalingError::protokoll(format!(
            "Welcome erwartet, erhalten: {andere:?}"
        ))),
        Ok(Some(Err(e))) => Err(SignalingError::Io(e)),
        Ok(None) => Err(SignalingError::NichtVerbunden),
        Err(_) => Err(SignalingError::Timeout),
    }
}

/// Wie eine Verbindung geendet hat
enum Ende {
    /// Trennung durch den Benutzer oder alle Handles gedroppt
    Beendet,
    /// Verbindung verloren, Wiederverbindung folgt
    Abgebrochen(String),
}

async fn verbindung_treiben(
    geteilt: Arc<Geteilt>,
    mut framed: ClientFramed,
    mut ausgang_rx: mpsc::UnboundedReceiver<ClientNachricht>,
    notices: mpsc::UnboundedSender<SignalingNotice>,
    config: ClientConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let status_setzen = |status: SignalingStatus| {
        geteilt.status_tx.send_replace(status.clone());
        let _ = notices.send(SignalingNotice::Status(status));
    };

    loop {
        let grund = match verbindung_betreiben(
            &geteilt,
            &mut framed,
            &mut ausgang_rx,
            &notices,
            &mut shutdown_rx,
        )
        .await
        {
            Ende::Beendet => {
                status_setzen(SignalingStatus::Getrennt);
                tracing::info!("Verbindung zum Rendezvous-Server getrennt");
                break;
            }
            Ende::Abgebrochen(grund) => grund,
        };

        tracing::warn!(grund = %grund, "Verbindung zum Rendezvous-Server verloren");
        if let Some(offen) = geteilt.anfrage.lock().take() {
            let _ = offen.antwort.send(Err(SignalingError::NichtVerbunden));
        }

        let wunsch_id = Some(*geteilt.peer_id.lock());
        let adresse: &str = &geteilt.adresse;
        let timeout = config.anfrage_timeout;
        let versuche = config.reconnect.ausfuehren(
            |_| verbindung_aufbauen(adresse, wunsch_id, timeout),
            &status_setzen,
        );

        let neu = tokio::select! {
            neu = versuche => neu,
            _ = shutdown_rx.changed() => {
                status_setzen(SignalingStatus::Getrennt);
                break;
            }
        };
        let Some((neues_framed, peer_id)) = neu else {
            break;
        };

        framed = neues_framed;
        let alte_id = std::mem::replace(&mut *geteilt.peer_id.lock(), peer_id);
        if alte_id != peer_id {
            tracing::warn!(alt = %alte_id, neu = %peer_id, "Server hat eine neue Peer-ID vergeben");
        }
        status_setzen(SignalingStatus::Verbunden { peer_id });

        // Letzten Raum erneut betreten, Antwort kommt als RaumWiederbetreten
        let raum = geteilt.raum.lock().clone();
        if let Some((code, name)) = raum {
            tracing::info!(raum = %code, "Raum wird erneut betreten");
            if let Err(e) = framed.send(ClientNachricht::JoinRoom { code, name }).await {
                tracing::warn!(fehler = %e, "Erneuter Raum-Beitritt fehlgeschlagen");
            }
        }
    }
}

/// Betreibt eine bestehende Verbindung bis sie endet
async fn verbindung_betreiben(
    geteilt: &Geteilt,
    framed: &mut ClientFramed,
    ausgang_rx: &mut mpsc::UnboundedReceiver<ClientNachricht>,
    notices: &mpsc::UnboundedSender<SignalingNotice>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Ende {
    loop {
        tokio::select! {
            frame = framed.next() => {
                match frame {
                    Some(Ok(nachricht)) => geteilt.eingang(nachricht, notices),
                    Some(Err(e)) => return Ende::Abgebrochen(e.to_string()),
                    None => return Ende::Abgebrochen("vom Server geschlossen".into()),
                }
            }

            ausgehend = ausgang_rx.recv() => {
                match ausgehend {
                    Some(nachricht) => {
                        if let Err(e) = framed.send(nachricht).await {
                            return Ende::Abgebrochen(e.to_string());
                        }
                    }
                    None => return Ende::Beendet,
                }
            }

            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    let _ = framed.close().await;
                    return Ende::Beendet;
                }
            }
        }
    }
}

impl Geteilt {
    /// Verarbeitet eine Nachricht des Servers
    fn eingang(&self, nachricht: ServerNachricht, notices: &mpsc::UnboundedSender<SignalingNotice>) {
        let notice = match nachricht {
            ServerNachricht::Welcome { peer_id } => {
                tracing::debug!(peer = %peer_id, "Unerwartetes Welcome ignoriert");
                None
            }

            ServerNachricht::RoomCreated { code } => {
                let offen = self.anfrage.lock().take();
                let name = offen.as_ref().map(|o| o.name.clone()).unwrap_or_default();
                *self.raum.lock() = Some((code.clone(), name));
                if let Some(offen) = offen {
                    let _ = offen.antwort.send(Ok(RaumAntwort::Erstellt(code)));
                }
                None
            }

            ServerNachricht::RoomJoined { code, members } => match self.anfrage.lock().take() {
                Some(offen) => {
                    *self.raum.lock() = Some((code.clone(), offen.name));
                    let _ = offen.antwort.send(Ok(RaumAntwort::Beigetreten { code, members }));
                    None
                }
                None => Some(SignalingNotice::RaumWiederbetreten { code, members }),
            },

            ServerNachricht::PeerJoined { member } => Some(SignalingNotice::PeerJoined(member)),
            ServerNachricht::PeerLeft { peer_id } => Some(SignalingNotice::PeerLeft(peer_id)),
            ServerNachricht::Signal { from, name, signal } => {
                Some(SignalingNotice::Signal { from, name, signal })
            }

            ServerNachricht::Error { code, message } => {
                let raum_fehler = matches!(
                    code,
                    RendezvousFehlerCode::RoomFull
                        | RendezvousFehlerCode::RoomNotFound
                        | RendezvousFehlerCode::InvalidRequest
                );
                let offen = if raum_fehler { self.anfrage.lock().take() } else { None };
                match offen {
                    Some(offen) => {
                        let _ = offen.antwort.send(Err(SignalingError::Server { code, message }));
                        None
                    }
                    None => {
                        tracing::warn!(code = ?code, message = %message, "Fehler vom Rendezvous-Server");
                        Some(SignalingNotice::Fehler { code, message })
                    }
                }
            }
        };

        if let Some(notice) = notice {
            let _ = notices.send(notice);
        }
    }
}
