//! Verbindungs-Lebenszyklus pro Peer
//!
//! `Negotiating -> ChannelOpen -> Encrypted`, von jedem Zustand nach
//! `Closed`. Jeder Zusammenbruch des Transports fuehrt zum Abbau mit genau
//! einem `Disconnected`-Ereignis.
//!
//! Kandidaten werden in beide Richtungen gepuffert: entfernte bis die
//! entfernte Beschreibung gesetzt ist, lokale bis Offer bzw. Answer beim
//! Signaling abgegeben wurde.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};
use tuschel_core::PeerId;
use tuschel_protocol::{Candidate, SessionDescription, Signal};

use crate::coordinator::{MeshKern, VerhandlungsSchritt};
use crate::error::{MeshError, MeshResult};
use crate::events::{MeshEvent, Trennungsgrund};
use crate::session::{PeerSession, SessionState};
use crate::transport::{
    ChannelHandle, ConnectionHandle, TransportError, TransportEvent, TransportMeldung,
};

fn verhandlungsfehler(e: TransportError) -> MeshError {
    MeshError::Negotiation(e.to_string())
}

impl MeshKern {
    /// Legt eine Sitzung als Initiator an und schickt das Offer
    pub(crate) fn initiate(&mut self, peer: PeerId, name: String) -> MeshResult<()> {
        if peer == self.kontext.eigene_id() {
            return Err(MeshError::EigenerPeer);
        }
        if self.sitzungen.enthaelt(&peer) {
            return Err(MeshError::SessionExists(peer));
        }

        let connection = self.sitzung_anlegen(peer, name.clone(), true)?;
        info!(peer = %peer, name = %name, %connection, "Verbindungsaufbau als Initiator");

        let sink = self.sink(peer, connection);
        let transport = Arc::clone(&self.transport);
        let signale = Arc::clone(&self.signale);
        self.verhandlung_starten(self.rueckmelder(peer, connection), async move {
            transport
                .create_connection(connection, sink)
                .await
                .map_err(verhandlungsfehler)?;
            transport
                .open_channel(connection)
                .await
                .map_err(verhandlungsfehler)?;
            let offer = transport
                .create_offer(connection)
                .await
                .map_err(verhandlungsfehler)?;
            signale
                .send_signal(peer, Signal::Offer { description: offer })
                .await
        });
        Ok(())
    }

    /// Verteilt ein eingehendes Signal
    pub(crate) fn handle_signal(
        &mut self,
        von: PeerId,
        name: String,
        signal: Signal,
    ) -> MeshResult<()> {
        if von == self.kontext.eigene_id() {
            return Err(MeshError::EigenerPeer);
        }
        trace!(peer = %von, signal = signal.name(), "Signal empfangen");
        match signal {
            Signal::Offer { description } => self.respond_to_offer(von, name, description),
            Signal::Answer { description } => {
                self.apply_answer(von, description);
                Ok(())
            }
            Signal::Candidate { candidate } => {
                self.apply_remote_candidate(von, candidate);
                Ok(())
            }
        }
    }

    /// Beantwortet ein Offer als Responder
    pub(crate) fn respond_to_offer(
        &mut self,
        von: PeerId,
        name: String,
        offer: SessionDescription,
    ) -> MeshResult<()> {
        if let Some(bestehend) = self.sitzungen.get(&von) {
            let glare = bestehend.is_initiator && bestehend.state == SessionState::Negotiating;
            if glare && self.kontext.eigene_id() < von {
                debug!(peer = %von, "Gleichzeitiges Offer: eigenes Offer hat Vorrang");
                return Ok(());
            }
            if glare {
                // Der eigene Versuch war nie angekuendigt, also kein Ereignis
                if let Some(alt) = self.sitzungen.entfernen(&von) {
                    self.verbindung_schliessen(alt.connection);
                }
                debug!(peer = %von, "Gleichzeitiges Offer: eigener Versuch aufgegeben");
            } else {
                self.teardown(&von, Trennungsgrund::Abgeloest);
            }
        }

        let connection = self.sitzung_anlegen(von, name.clone(), false)?;
        info!(peer = %von, name = %name, %connection, "Offer empfangen, beantworte");

        let sink = self.sink(von, connection);
        let transport = Arc::clone(&self.transport);
        let signale = Arc::clone(&self.signale);
        let melder = self.rueckmelder(von, connection);
        let zwischenmelder = melder.clone();
        self.verhandlung_starten(melder, async move {
            transport
                .create_connection(connection, sink)
                .await
                .map_err(verhandlungsfehler)?;
            let answer = transport
                .accept_offer(connection, offer)
                .await
                .map_err(verhandlungsfehler)?;
            zwischenmelder.melden(VerhandlungsSchritt::RemoteBeschreibungGesetzt);
            signale
                .send_signal(von, Signal::Answer { description: answer })
                .await
        });
        Ok(())
    }

    /// Setzt die Answer des Responders als entfernte Beschreibung
    pub(crate) fn apply_answer(&mut self, von: PeerId, answer: SessionDescription) {
        let Some(sitzung) = self.sitzungen.get_mut(&von) else {
            debug!(peer = %von, "Answer ohne Sitzung verworfen");
            return;
        };
        if !sitzung.is_initiator || sitzung.remote_beschreibung_gesetzt || sitzung.answer_ausstehend
        {
            warn!(peer = %von, "Unerwartete Answer verworfen");
            return;
        }
        sitzung.answer_ausstehend = true;

        let connection = sitzung.connection;
        let transport = Arc::clone(&self.transport);
        let melder = self.rueckmelder(von, connection);
        tokio::spawn(async move {
            match transport.apply_answer(connection, answer).await {
                Ok(()) => melder.melden(VerhandlungsSchritt::RemoteBeschreibungGesetzt),
                Err(e) => melder.melden(VerhandlungsSchritt::AnswerAbgelehnt(e.to_string())),
            }
        });
    }

    /// Uebergibt einen entfernten Kandidaten oder puffert ihn
    pub(crate) fn apply_remote_candidate(&mut self, von: PeerId, candidate: Candidate) {
        let Some(sitzung) = self.sitzungen.get_mut(&von) else {
            debug!(peer = %von, "Kandidat ohne Sitzung verworfen");
            return;
        };
        if !sitzung.remote_beschreibung_gesetzt {
            sitzung.wartende_kandidaten.push(candidate);
            trace!(
                peer = %von,
                gepuffert = sitzung.wartende_kandidaten.len(),
                "Kandidat vor entfernter Beschreibung gepuffert"
            );
            return;
        }
        let connection = sitzung.connection;
        self.kandidaten_uebergeben(von, connection, vec![candidate]);
    }

    fn kandidaten_uebergeben(
        &self,
        peer: PeerId,
        connection: ConnectionHandle,
        kandidaten: Vec<Candidate>,
    ) {
        if kandidaten.is_empty() {
            return;
        }
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            for kandidat in kandidaten {
                if let Err(e) = transport.add_candidate(connection, kandidat).await {
                    warn!(peer = %peer, fehler = %e, "Kandidat abgelehnt");
                }
            }
        });
    }

    fn lokale_kandidaten_senden(&self, peer: PeerId, kandidaten: Vec<Candidate>) {
        if kandidaten.is_empty() {
            return;
        }
        let signale = Arc::clone(&self.signale);
        tokio::spawn(async move {
            for candidate in kandidaten {
                if let Err(e) = signale
                    .send_signal(peer, Signal::Candidate { candidate })
                    .await
                {
                    warn!(peer = %peer, fehler = %e, "Kandidat konnte nicht signalisiert werden");
                }
            }
        });
    }

    fn sitzung_anlegen(
        &mut self,
        peer: PeerId,
        name: String,
        is_initiator: bool,
    ) -> MeshResult<ConnectionHandle> {
        let connection = self.naechste_verbindung();
        self.sitzungen
            .einfuegen(PeerSession::neu(peer, name, connection, is_initiator))
            .map_err(|s| MeshError::SessionExists(s.id))?;
        self.aufbau_timeout_planen(peer, connection);
        Ok(connection)
    }

    /// Ergebnis eines Verhandlungs-Tasks
    pub(crate) fn verhandlungs_schritt(
        &mut self,
        peer: PeerId,
        connection: ConnectionHandle,
        schritt: VerhandlungsSchritt,
    ) {
        let Some(sitzung) = self.sitzungen.aktuell_mut(&peer, connection) else {
            trace!(peer = %peer, %connection, ?schritt, "Veralteter Verhandlungs-Schritt");
            return;
        };
        match schritt {
            VerhandlungsSchritt::RemoteBeschreibungGesetzt => {
                sitzung.remote_beschreibung_gesetzt = true;
                let kandidaten = std::mem::take(&mut sitzung.wartende_kandidaten);
                debug!(peer = %peer, gepuffert = kandidaten.len(), "Entfernte Beschreibung gesetzt");
                self.kandidaten_uebergeben(peer, connection, kandidaten);
            }
            VerhandlungsSchritt::LokaleBeschreibungGesendet => {
                sitzung.lokale_beschreibung_gesendet = true;
                let kandidaten = std::mem::take(&mut sitzung.lokale_kandidaten);
                self.lokale_kandidaten_senden(peer, kandidaten);
            }
            VerhandlungsSchritt::AnswerAbgelehnt(grund) => {
                // Signale tragen keine Verbindungskennung, eine fremde Answer
                // darf die laufende Verhandlung nicht beenden
                sitzung.answer_ausstehend = false;
                warn!(peer = %peer, fehler = %grund, "Answer vom Transport abgelehnt, verworfen");
            }
            VerhandlungsSchritt::Fehlgeschlagen(grund) => {
                warn!(peer = %peer, fehler = %grund, "Verhandlung fehlgeschlagen");
                self.teardown(&peer, Trennungsgrund::Verhandlung(grund));
            }
        }
    }

    pub(crate) fn aufbau_timeout(&mut self, peer: PeerId, connection: ConnectionHandle) {
        let verhandelt_noch = self
            .sitzungen
            .aktuell_mut(&peer, connection)
            .is_some_and(|s| s.state == SessionState::Negotiating);
        if verhandelt_noch {
            warn!(
                peer = %peer,
                timeout_ms = self.kontext.config().aufbau_timeout.as_millis() as u64,
                "Kanal nicht rechtzeitig offen"
            );
            self.teardown(&peer, Trennungsgrund::Timeout);
        }
    }

    /// Verarbeitet ein Ereignis des Transport-Providers
    pub(crate) fn transport_ereignis(&mut self, meldung: TransportMeldung) {
        let TransportMeldung {
            peer,
            connection,
            event,
        } = meldung;
        if !self.sitzungen.ist_aktuell(&peer, connection) {
            trace!(peer = %peer, %connection, "Veraltete Transport-Meldung verworfen");
            return;
        }

        match event {
            TransportEvent::LocalCandidate(candidate) => {
                let Some(sitzung) = self.sitzungen.get_mut(&peer) else {
                    return;
                };
                if sitzung.lokale_beschreibung_gesendet {
                    self.lokale_kandidaten_senden(peer, vec![candidate]);
                } else {
                    sitzung.lokale_kandidaten.push(candidate);
                }
            }
            TransportEvent::ChannelOpen(channel) => self.kanal_offen(peer, channel),
            TransportEvent::Frame(frame) => self.receive(peer, &frame),
            TransportEvent::StateChanged(state) if state.ist_endgueltig() => {
                info!(peer = %peer, ?state, "Transport-Verbindung beendet");
                self.teardown(&peer, Trennungsgrund::Verhandlung(format!("Transport {state:?}")));
            }
            TransportEvent::StateChanged(state) => {
                debug!(peer = %peer, ?state, "Transport-Zustand");
            }
        }
    }

    fn kanal_offen(&mut self, peer: PeerId, channel: ChannelHandle) {
        let Some(sitzung) = self.sitzungen.get_mut(&peer) else {
            return;
        };
        if sitzung.state != SessionState::Negotiating {
            debug!(peer = %peer, "Doppeltes ChannelOpen ignoriert");
            return;
        }
        sitzung.channel = Some(channel);
        sitzung.state = SessionState::ChannelOpen;
        let name = sitzung.name.clone();

        info!(peer = %peer, name = %name, %channel, "Datenkanal offen");
        self.bus.publish(&MeshEvent::ChannelOpened { peer, name });
        self.kontroll_frame_senden(peer);
    }

    /// Entfernt die Sitzung, schliesst die Verbindung und meldet `Disconnected`
    ///
    /// Gibt false zurueck wenn keine Sitzung (mehr) bestand.
    pub(crate) fn teardown(&mut self, peer: &PeerId, grund: Trennungsgrund) -> bool {
        let Some(mut sitzung) = self.sitzungen.entfernen(peer) else {
            return false;
        };
        let vorher = sitzung.state;
        sitzung.state = SessionState::Closed;
        self.verbindung_schliessen(sitzung.connection);

        info!(
            peer = %peer,
            name = %sitzung.name,
            zustand = %vorher,
            verworfen = sitzung.wartende().len(),
            grund = %grund,
            "Sitzung beendet"
        );
        self.bus.publish(&MeshEvent::Disconnected {
            peer: *peer,
            name: sitzung.name,
            grund,
        });
        true
    }
}
