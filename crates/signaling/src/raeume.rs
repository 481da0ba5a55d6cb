//! Raum- und Client-Verwaltung des Rendezvous-Servers
//!
//! Haelt fuer jeden verbundenen Client die Sende-Queue und den aktuellen
//! Raum. Ein Client ist hoechstens in einem Raum gleichzeitig. Signale
//! werden nur zwischen Mitgliedern desselben Raums weitergeleitet.
//!
//! Lock-Disziplin: DashMap-Guards werden nie ueber einen Zugriff auf
//! eine andere Map oder ueber das Senden hinweg gehalten.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use tokio::sync::mpsc;
use tuschel_core::{PeerId, RoomCode};
use tuschel_protocol::{RaumMitglied, RendezvousFehlerCode, ServerNachricht, Signal};

/// Groesse der Sende-Queue pro Client
pub const SEND_QUEUE_GROESSE: usize = 64;

/// Standard-Obergrenze fuer Mitglieder pro Raum
pub const STANDARD_MAX_RAUM_GROESSE: usize = 8;

/// Sender-Handle fuer einen verbundenen Client
pub type ClientSender = mpsc::Sender<ServerNachricht>;

/// Registrierung eines verbundenen Clients
#[derive(Debug)]
struct ClientEintrag {
    /// Nummer der TCP-Verbindung, schuetzt vor dem Aufraeumen einer
    /// bereits uebernommenen Registrierung
    verbindung: u64,
    sender: ClientSender,
    raum: Option<RoomCode>,
    name: String,
}

/// Ergebnis einer Registrierung
#[derive(Debug)]
pub struct Registrierung {
    pub peer_id: PeerId,
    pub verbindung: u64,
    pub empfaenger: mpsc::Receiver<ServerNachricht>,
}

// ---------------------------------------------------------------------------
// RaumVerwaltung
// ---------------------------------------------------------------------------

/// Thread-sichere Verwaltung aller Clients und Raeume
///
/// Kann guenstig geklont werden (intern Arc).
#[derive(Clone)]
pub struct RaumVerwaltung {
    inner: Arc<RaumVerwaltungInner>,
}

struct RaumVerwaltungInner {
    clients: DashMap<PeerId, ClientEintrag>,
    raeume: DashMap<RoomCode, Vec<RaumMitglied>>,
    max_raum_groesse: usize,
    naechste_verbindung: AtomicU64,
}

impl RaumVerwaltung {
    /// Erstellt eine leere Verwaltung
    pub fn neu(max_raum_groesse: usize) -> Self {
        Self {
            inner: Arc::new(RaumVerwaltungInner {
                clients: DashMap::new(),
                raeume: DashMap::new(),
                max_raum_groesse: max_raum_groesse.max(2),
                naechste_verbindung: AtomicU64::new(1),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Clients
    // -----------------------------------------------------------------------

    /// Registriert einen neuen Client
    ///
    /// Eine gewuenschte ID (nach einem Reconnect) wird uebernommen. War
    /// sie noch einer alten Verbindung zugeordnet, wird diese abgeloest:
    /// ihre Registrierung verschwindet und ihre Verbindung endet.
    pub fn registrieren(&self, wunsch_id: Option<PeerId>) -> Registrierung {
        let peer_id = wunsch_id.unwrap_or_default();
        if let Some(alte) = self.verbindung_von(&peer_id) {
            tracing::info!(peer = %peer_id, "Alte Verbindung wird abgeloest");
            self.abmelden(&peer_id, alte);
        }

        let verbindung = self.inner.naechste_verbindung.fetch_add(1, Ordering::Relaxed);
        let (sender, empfaenger) = mpsc::channel(SEND_QUEUE_GROESSE);
        self.inner.clients.insert(
            peer_id,
            ClientEintrag {
                verbindung,
                sender,
                raum: None,
                name: String::new(),
            },
        );
        tracing::debug!(peer = %peer_id, verbindung, "Client registriert");

        Registrierung {
            peer_id,
            verbindung,
            empfaenger,
        }
    }

    /// Entfernt die Registrierung, sofern sie noch zu `verbindung` gehoert
    ///
    /// Ein eventueller Raum wird verlassen und die uebrigen Mitglieder
    /// erhalten `PeerLeft`. Gibt `true` zurueck wenn entfernt wurde.
    pub fn abmelden(&self, peer_id: &PeerId, verbindung: u64) -> bool {
        let entfernt = self
            .inner
            .clients
            .remove_if(peer_id, |_, eintrag| eintrag.verbindung == verbindung);

        match entfernt {
            Some((_, eintrag)) => {
                if let Some(code) = eintrag.raum {
                    self.mitglied_entfernen(&code, peer_id);
                }
                tracing::debug!(peer = %peer_id, verbindung, "Client abgemeldet");
                true
            }
            None => false,
        }
    }

    /// Trennt einen Client unabhaengig von seiner Verbindungsnummer
    ///
    /// Die zugehoerige Verbindung bemerkt das Ende ihrer Sende-Queue und
    /// schliesst sich.
    pub fn trennen(&self, peer_id: &PeerId) -> bool {
        match self.verbindung_von(peer_id) {
            Some(verbindung) => self.abmelden(peer_id, verbindung),
            None => false,
        }
    }

    fn verbindung_von(&self, peer_id: &PeerId) -> Option<u64> {
        self.inner.clients.get(peer_id).map(|e| e.verbindung)
    }

    /// Prueft ob ein Client registriert ist
    pub fn ist_verbunden(&self, peer_id: &PeerId) -> bool {
        self.inner.clients.contains_key(peer_id)
    }

    /// Anzahl verbundener Clients
    pub fn client_anzahl(&self) -> usize {
        self.inner.clients.len()
    }

    /// Sendet eine Nachricht an einen Client (non-blocking)
    ///
    /// Gibt `false` zurueck wenn der Client unbekannt oder seine Queue
    /// voll ist.
    pub fn senden(&self, peer_id: &PeerId, nachricht: ServerNachricht) -> bool {
        let sender = match self.inner.clients.get(peer_id) {
            Some(eintrag) => eintrag.sender.clone(),
            None => return false,
        };
        match sender.try_send(nachricht) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(peer = %peer_id, "Send-Queue voll, Nachricht verworfen");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    // -----------------------------------------------------------------------
    // Raeume
    // -----------------------------------------------------------------------

    /// Legt einen neuen Raum an, der Ersteller ist einziges Mitglied
    pub fn raum_erstellen(
        &self,
        peer_id: &PeerId,
        name: &str,
    ) -> Result<RoomCode, RendezvousFehlerCode> {
        if !self.ist_verbunden(peer_id) {
            return Err(RendezvousFehlerCode::UnknownPeer);
        }
        self.raum_verlassen(peer_id);

        let mitglied = RaumMitglied {
            peer_id: *peer_id,
            name: name.to_string(),
        };
        let code = loop {
            let Some(kandidat) = zufaelliger_code() else {
                continue;
            };
            if let Entry::Vacant(frei) = self.inner.raeume.entry(kandidat.clone()) {
                frei.insert(vec![mitglied]);
                break kandidat;
            }
        };

        self.client_raum_setzen(peer_id, Some(code.clone()), name);
        tracing::info!(peer = %peer_id, raum = %code, "Raum erstellt");
        Ok(code)
    }

    /// Tritt einem bestehenden Raum bei
    ///
    /// Gibt die bisherigen Mitglieder (ohne den Beitretenden) zurueck.
    /// Diese erhalten `PeerJoined`.
    pub fn raum_beitreten(
        &self,
        peer_id: &PeerId,
        code: &RoomCode,
        name: &str,
    ) -> Result<Vec<RaumMitglied>, RendezvousFehlerCode> {
        if !self.ist_verbunden(peer_id) {
            return Err(RendezvousFehlerCode::UnknownPeer);
        }
        if self.raum_von(peer_id).as_ref() != Some(code) {
            self.raum_verlassen(peer_id);
        }

        let neues_mitglied = RaumMitglied {
            peer_id: *peer_id,
            name: name.to_string(),
        };
        let andere: Vec<RaumMitglied> = {
            let mut mitglieder = self
                .inner
                .raeume
                .get_mut(code)
                .ok_or(RendezvousFehlerCode::RoomNotFound)?;

            mitglieder.retain(|m| m.peer_id != *peer_id);
            if mitglieder.len() >= self.inner.max_raum_groesse {
                return Err(RendezvousFehlerCode::RoomFull);
            }
            let andere = mitglieder.clone();
            mitglieder.push(neues_mitglied.clone());
            andere
        };

        self.client_raum_setzen(peer_id, Some(code.clone()), name);
        for mitglied in &andere {
            self.senden(
                &mitglied.peer_id,
                ServerNachricht::PeerJoined {
                    member: neues_mitglied.clone(),
                },
            );
        }
        tracing::info!(
            peer = %peer_id,
            raum = %code,
            mitglieder = andere.len() + 1,
            "Raum beigetreten"
        );
        Ok(andere)
    }

    /// Verlaesst den aktuellen Raum (no-op ohne Raum)
    pub fn raum_verlassen(&self, peer_id: &PeerId) -> bool {
        let code = match self.inner.clients.get_mut(peer_id) {
            Some(mut eintrag) => eintrag.raum.take(),
            None => None,
        };
        match code {
            Some(code) => {
                self.mitglied_entfernen(&code, peer_id);
                true
            }
            None => false,
        }
    }

    /// Entfernt ein Mitglied, benachrichtigt die uebrigen und loescht
    /// leere Raeume
    fn mitglied_entfernen(&self, code: &RoomCode, peer_id: &PeerId) {
        let verbleibend: Vec<PeerId> = match self.inner.raeume.get_mut(code) {
            Some(mut mitglieder) => {
                mitglieder.retain(|m| m.peer_id != *peer_id);
                mitglieder.iter().map(|m| m.peer_id).collect()
            }
            None => return,
        };

        if verbleibend.is_empty() {
            self.inner.raeume.remove_if(code, |_, m| m.is_empty());
            tracing::info!(raum = %code, "Leerer Raum entfernt");
        }
        for anderer in &verbleibend {
            self.senden(anderer, ServerNachricht::PeerLeft { peer_id: *peer_id });
        }
        tracing::debug!(peer = %peer_id, raum = %code, "Raum verlassen");
    }

    fn client_raum_setzen(&self, peer_id: &PeerId, raum: Option<RoomCode>, name: &str) {
        if let Some(mut eintrag) = self.inner.clients.get_mut(peer_id) {
            eintrag.raum = raum;
            eintrag.name = name.to_string();
        }
    }

    /// Aktueller Raum eines Clients
    pub fn raum_von(&self, peer_id: &PeerId) -> Option<RoomCode> {
        self.inner.clients.get(peer_id).and_then(|e| e.raum.clone())
    }

    /// Mitglieder eines Raums in Beitrittsreihenfolge
    pub fn mitglieder(&self, code: &RoomCode) -> Vec<RaumMitglied> {
        self.inner
            .raeume
            .get(code)
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Anzahl existierender Raeume
    pub fn raum_anzahl(&self) -> usize {
        self.inner.raeume.len()
    }

    // -----------------------------------------------------------------------
    // Weiterleitung
    // -----------------------------------------------------------------------

    /// Leitet ein Signal an einen Peer im selben Raum weiter
    pub fn weiterleiten(
        &self,
        von: &PeerId,
        an: &PeerId,
        signal: Signal,
    ) -> Result<(), RendezvousFehlerCode> {
        let (raum, name) = match self.inner.clients.get(von) {
            Some(eintrag) => match &eintrag.raum {
                Some(raum) => (raum.clone(), eintrag.name.clone()),
                None => return Err(RendezvousFehlerCode::NotInRoom),
            },
            None => return Err(RendezvousFehlerCode::UnknownPeer),
        };
        if self.raum_von(an).as_ref() != Some(&raum) {
            return Err(RendezvousFehlerCode::UnknownPeer);
        }

        tracing::trace!(von = %von, an = %an, art = signal.name(), "Signal weitergeleitet");
        if self.senden(
            an,
            ServerNachricht::Signal {
                from: *von,
                name,
                signal,
            },
        ) {
            Ok(())
        } else {
            Err(RendezvousFehlerCode::UnknownPeer)
        }
    }
}

impl std::fmt::Debug for RaumVerwaltung {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaumVerwaltung")
            .field("clients", &self.inner.clients.len())
            .field("raeume", &self.inner.raeume.len())
            .field("max_raum_groesse", &self.inner.max_raum_groesse)
            .finish()
    }
}

/// Erzeugt einen zufaelligen Code aus dem Raum-Code-Alphabet
fn zufaelliger_code() -> Option<RoomCode> {
    let mut rng = rand::thread_rng();
    let code: String = (0..RoomCode::LAENGE)
        .map(|_| RoomCode::ALPHABET[rng.gen_range(0..RoomCode::ALPHABET.len())] as char)
        .collect();
    RoomCode::parse(&code)
}
