//! TCP-Transport-Provider
//!
//! Ein [`TcpTransport`] besitzt einen Listener. Als Initiator meldet er
//! dessen Adresse als lokalen Kandidaten und wartet auf den Responder,
//! der sich mit dem Token aus dem Offer ausweist. Als Responder waehlt
//! er mit dem ersten brauchbaren Kandidaten die Gegenseite an.
//!
//! ## Tasks
//! - Accept-Loop: nimmt Verbindungen an und ordnet sie per Token zu
//! - Pro Datenkanal ein Task: liest Frames und leert die Sende-Queue

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tuschel_mesh::{
    ChannelHandle, ConnectionHandle, ConnectionState, TransportError, TransportEvent,
    TransportEventSink, TransportProvider, TransportResult,
};
use tuschel_protocol::{Candidate, SessionDescription};

use crate::beschreibung::{kandidat, kandidat_adresse, Beschreibung};

type KanalFramed = Framed<TcpStream, LengthDelimitedCodec>;

/// Maximale Frame-Groesse auf dem Datenkanal (1 MB)
const MAX_FRAME_GROESSE: usize = 1024 * 1024;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Konfiguration des TCP-Transports
#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    /// Adresse des Listeners (Port 0 = beliebig)
    pub bind_adresse: SocketAddr,
    /// Als Kandidat gemeldete Adresse, Standard ist die Listener-Adresse
    pub kandidat_adresse: Option<SocketAddr>,
    /// Zeit fuer Verbindungsaufbau und Token-Handshake
    pub handshake_timeout: Duration,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            bind_adresse: SocketAddr::from(([127, 0, 0, 1], 0)),
            kandidat_adresse: None,
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

// ---------------------------------------------------------------------------
// Verbindungszustand
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rolle {
    Offen,
    Initiator,
    Responder,
}

struct Verbindung {
    sink: TransportEventSink,
    rolle: Rolle,
    token: Option<String>,
    kanal: Option<ChannelHandle>,
    /// Laufender Verbindungsversuch des Responders
    anwahl: Option<JoinHandle<()>>,
}

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_GROESSE)
        .new_codec()
}

// ---------------------------------------------------------------------------
// TcpTransport
// ---------------------------------------------------------------------------

/// Transport-Provider ueber direkte TCP-Verbindungen
///
/// Kann guenstig geklont werden (intern Arc).
#[derive(Clone)]
pub struct TcpTransport {
    inner: Arc<TcpTransportInner>,
}

struct TcpTransportInner {
    config: TcpTransportConfig,
    lokale_adresse: SocketAddr,
    verbindungen: DashMap<ConnectionHandle, Verbindung>,
    /// Token des Offers -> wartende Initiator-Verbindung
    erwartet: DashMap<String, ConnectionHandle>,
    kanaele: DashMap<ChannelHandle, mpsc::UnboundedSender<Bytes>>,
    naechster_kanal: AtomicU64,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl TcpTransport {
    /// Bindet den Listener und startet die Accept-Loop
    pub async fn binden(config: TcpTransportConfig) -> TransportResult<Self> {
        let listener = TcpListener::bind(config.bind_adresse).await?;
        let lokale_adresse = listener.local_addr()?;

        let inner = Arc::new(TcpTransportInner {
            config,
            lokale_adresse,
            verbindungen: DashMap::new(),
            erwartet: DashMap::new(),
            kanaele: DashMap::new(),
            naechster_kanal: AtomicU64::new(1),
            accept_task: Mutex::new(None),
        });
        let task = tokio::spawn(accept_loop(listener, Arc::downgrade(&inner)));
        *inner.accept_task.lock() = Some(task);

        tracing::info!(adresse = %lokale_adresse, "TCP-Transport gestartet");
        Ok(Self { inner })
    }

    /// Adresse des Listeners
    pub fn lokale_adresse(&self) -> SocketAddr {
        self.inner.lokale_adresse
    }

    /// Als Kandidat gemeldete Adresse
    pub fn kandidat_adresse(&self) -> SocketAddr {
        self.inner
            .config
            .kandidat_adresse
            .unwrap_or(self.inner.lokale_adresse)
    }

    /// Anzahl offener Datenkanaele
    pub fn offene_kanaele(&self) -> usize {
        self.inner.kanaele.len()
    }

    /// Anzahl bekannter Verbindungen
    pub fn verbindungen(&self) -> usize {
        self.inner.verbindungen.len()
    }

    fn mit_verbindung<T>(
        &self,
        connection: ConnectionHandle,
        f: impl FnOnce(&mut Verbindung) -> TransportResult<T>,
    ) -> TransportResult<T> {
        let mut verbindung = self
            .inner
            .verbindungen
            .get_mut(&connection)
            .ok_or(TransportError::UnbekannteVerbindung(connection))?;
        f(&mut verbindung)
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("lokale_adresse", &self.inner.lokale_adresse)
            .field("verbindungen", &self.inner.verbindungen.len())
            .field("kanaele", &self.inner.kanaele.len())
            .finish()
    }
}

impl TcpTransportInner {
    /// Registriert einen aufgebauten Datenkanal und startet seinen Task
    ///
    /// `ChannelOpen` wird vor dem ersten Frame gemeldet.
    fn kanal_starten(self: &Arc<Self>, connection: ConnectionHandle, framed: KanalFramed) -> bool {
        let kanal = ChannelHandle(self.naechster_kanal.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();

        let sink = {
            let Some(mut verbindung) = self.verbindungen.get_mut(&connection) else {
                return false;
            };
            if verbindung.kanal.is_some() {
                return false;
            }
            verbindung.kanal = Some(kanal);
            verbindung.anwahl = None;
            verbindung.sink.clone()
        };
        self.kanaele.insert(kanal, tx);

        sink.melden(TransportEvent::StateChanged(ConnectionState::Connected));
        sink.melden(TransportEvent::ChannelOpen(kanal));
        tracing::debug!(%connection, %kanal, "Datenkanal aufgebaut");

        tokio::spawn(kanal_betreiben(Arc::downgrade(self), kanal, framed, rx, sink));
        true
    }

    /// Meldet einen gescheiterten Aufbau, sofern die Verbindung noch existiert
    fn aufbau_gescheitert(&self, connection: ConnectionHandle, fehler: &TransportError) {
        let sink = match self.verbindungen.get(&connection) {
            Some(verbindung) => verbindung.sink.clone(),
            None => return,
        };
        tracing::warn!(%connection, fehler = %fehler, "TCP-Verbindungsaufbau gescheitert");
        sink.melden(TransportEvent::StateChanged(ConnectionState::Failed));
    }
}

impl Drop for TcpTransportInner {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.lock().take() {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// TransportProvider
// ---------------------------------------------------------------------------

#[async_trait]
impl TransportProvider for TcpTransport {
    async fn create_connection(
        &self,
        connection: ConnectionHandle,
        events: TransportEventSink,
    ) -> TransportResult<()> {
        events.melden(TransportEvent::StateChanged(ConnectionState::New));
        self.inner.verbindungen.insert(
            connection,
            Verbindung {
                sink: events,
                rolle: Rolle::Offen,
                token: None,
                kanal: None,
                anwahl: None,
            },
        );
        Ok(())
    }

    async fn open_channel(&self, connection: ConnectionHandle) -> TransportResult<()> {
        self.mit_verbindung(connection, |v| {
            v.rolle = Rolle::Initiator;
            Ok(())
        })
    }

    async fn create_offer(
        &self,
        connection: ConnectionHandle,
    ) -> TransportResult<SessionDescription> {
        let offer = Beschreibung::neues_offer();
        let sink = self.mit_verbindung(connection, |v| {
            v.rolle = Rolle::Initiator;
            v.token = Some(offer.token().to_string());
            Ok(v.sink.clone())
        })?;
        self.inner.erwartet.insert(offer.token().to_string(), connection);

        sink.melden(TransportEvent::StateChanged(ConnectionState::Connecting));
        sink.melden(TransportEvent::LocalCandidate(kandidat(self.kandidat_adresse())));
        tracing::debug!(%connection, "Offer erstellt");
        Ok(offer.als_sdp())
    }

    async fn accept_offer(
        &self,
        connection: ConnectionHandle,
        offer: SessionDescription,
    ) -> TransportResult<SessionDescription> {
        let token = match Beschreibung::parsen(&offer)? {
            Beschreibung::Offer { token } => token,
            Beschreibung::Answer { .. } => {
                return Err(TransportError::Verhandlung("Offer erwartet, Answer erhalten".into()))
            }
        };
        self.mit_verbindung(connection, |v| {
            v.rolle = Rolle::Responder;
            v.token = Some(token.clone());
            v.sink
                .melden(TransportEvent::StateChanged(ConnectionState::Connecting));
            Ok(())
        })?;
        tracing::debug!(%connection, "Offer angenommen");
        Ok(Beschreibung::Answer { token }.als_sdp())
    }

    async fn apply_answer(
        &self,
        connection: ConnectionHandle,
        answer: SessionDescription,
    ) -> TransportResult<()> {
        let token = match Beschreibung::parsen(&answer)? {
            Beschreibung::Answer { token } => token,
            Beschreibung::Offer { .. } => {
                return Err(TransportError::Verhandlung("Answer erwartet, Offer erhalten".into()))
            }
        };
        self.mit_verbindung(connection, |v| {
            if v.rolle != Rolle::Initiator || v.token.as_deref() != Some(token.as_str()) {
                return Err(TransportError::Verhandlung("Answer passt nicht zum Offer".into()));
            }
            Ok(())
        })
    }

    async fn add_candidate(
        &self,
        connection: ConnectionHandle,
        candidate: Candidate,
    ) -> TransportResult<()> {
        let adresse = kandidat_adresse(&candidate)?;
        let inner = Arc::clone(&self.inner);
        let timeout = self.inner.config.handshake_timeout;

        self.mit_verbindung(connection, |v| {
            if v.rolle != Rolle::Responder {
                tracing::debug!(%connection, "Kandidat auf Initiator-Seite ignoriert");
                return Ok(());
            }
            // Nur der erste brauchbare Kandidat wird angewaehlt
            if v.anwahl.is_some() || v.kanal.is_some() {
                return Ok(());
            }
            let token = v
                .token
                .clone()
                .ok_or_else(|| TransportError::Verhandlung("Kandidat vor dem Offer".into()))?;

            v.anwahl = Some(tokio::spawn(async move {
                match anwaehlen(adresse, &token, timeout).await {
                    Ok(framed) => {
                        inner.kanal_starten(connection, framed);
                    }
                    Err(e) => inner.aufbau_gescheitert(connection, &e),
                }
            }));
            Ok(())
        })
    }

    fn send(&self, channel: ChannelHandle, frame: Bytes) -> TransportResult<()> {
        let tx = self
            .inner
            .kanaele
            .get(&channel)
            .map(|tx| tx.clone())
            .ok_or(TransportError::UnbekannterKanal(channel))?;
        tx.send(frame).map_err(|_| TransportError::Geschlossen)
    }

    async fn close(&self, connection: ConnectionHandle) {
        let Some((_, verbindung)) = self.inner.verbindungen.remove(&connection) else {
            return;
        };
        if let Some(token) = &verbindung.token {
            self.inner.erwartet.remove(token);
        }
        if let Some(anwahl) = verbindung.anwahl {
            anwahl.abort();
        }
        // Ohne Sender endet der Kanal-Task und schliesst den Socket
        if let Some(kanal) = verbindung.kanal {
            self.inner.kanaele.remove(&kanal);
        }
        tracing::debug!(%connection, "Verbindung geschlossen");
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Verbindet zum Initiator und weist sich mit dem Token aus
async fn anwaehlen(
    adresse: SocketAddr,
    token: &str,
    timeout: Duration,
) -> TransportResult<KanalFramed> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(adresse))
        .await
        .map_err(|_| TransportError::Verhandlung(format!("Timeout beim Verbinden zu {adresse}")))??;
    stream.set_nodelay(true)?;

    let mut framed = Framed::new(stream, codec());
    framed
        .send(Bytes::copy_from_slice(token.as_bytes()))
        .await?;
    tracing::debug!(ziel = %adresse, "Handshake gesendet");
    Ok(framed)
}

/// Nimmt eingehende Verbindungen an und ordnet sie per Token zu
async fn accept_loop(listener: TcpListener, inner: Weak<TcpTransportInner>) {
    loop {
        let (stream, absender) = match listener.accept().await {
            Ok(verbindung) => verbindung,
            Err(e) => {
                tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }
        };
        let Some(inner) = inner.upgrade() else {
            break;
        };
        tokio::spawn(async move {
            let timeout = inner.config.handshake_timeout;
            let _ = stream.set_nodelay(true);
            let mut framed = Framed::new(stream, codec());

            let token = match tokio::time::timeout(timeout, framed.next()).await {
                Ok(Some(Ok(token))) => String::from_utf8_lossy(&token).into_owned(),
                _ => {
                    tracing::warn!(absender = %absender, "Kein gueltiger Handshake");
                    return;
                }
            };
            let Some((_, connection)) = inner.erwartet.remove(&token) else {
                tracing::warn!(absender = %absender, "Handshake mit unbekanntem Token verworfen");
                return;
            };
            if inner.kanal_starten(connection, framed) {
                tracing::debug!(absender = %absender, %connection, "Eingehende Verbindung zugeordnet");
            }
        });
    }
    tracing::debug!("Accept-Loop beendet");
}

/// Liest Frames und leert die Sende-Queue eines Datenkanals
///
/// Endet der Socket, wird `Closed` bzw. bei Lesefehlern `Failed`
/// gemeldet. Endet die Sende-Queue (lokales `close`), endet der Task
/// ohne Meldung.
async fn kanal_betreiben(
    inner: Weak<TcpTransportInner>,
    kanal: ChannelHandle,
    mut framed: KanalFramed,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
    sink: TransportEventSink,
) {
    let zustand = loop {
        tokio::select! {
            eingehend = framed.next() => match eingehend {
                Some(Ok(frame)) => {
                    tracing::trace!(%kanal, bytes = frame.len(), "Frame empfangen");
                    sink.melden(TransportEvent::Frame(frame.freeze()));
                }
                Some(Err(e)) => {
                    tracing::warn!(%kanal, fehler = %e, "Lesefehler auf Datenkanal");
                    break Some(ConnectionState::Failed);
                }
                None => break Some(ConnectionState::Closed),
            },
            ausgehend = rx.recv() => match ausgehend {
                Some(frame) => {
                    if let Err(e) = framed.send(frame).await {
                        tracing::warn!(%kanal, fehler = %e, "Schreibfehler auf Datenkanal");
                        break Some(ConnectionState::Failed);
                    }
                }
                None => break None,
            },
        }
    };

    if let Some(inner) = inner.upgrade() {
        inner.kanaele.remove(&kanal);
    }
    match zustand {
        Some(zustand) => {
            tracing::debug!(%kanal, ?zustand, "Datenkanal beendet");
            sink.melden(TransportEvent::StateChanged(zustand));
        }
        None => tracing::debug!(%kanal, "Datenkanal lokal geschlossen"),
    }
}
