//! Nachrichten-Warteschlange und Dispatcher
//!
//! Ausgehend: vor der Verschluesselung landen Nachrichten in der
//! Warteschlange der Sitzung, danach werden sie sofort verschluesselt und
//! gesendet. Eingehend: Kontroll-Frames gehen an den Schluesselaustausch,
//! Anwendungs-Frames werden entschluesselt und als `MessageReceived`
//! veroeffentlicht. Ein einzelner defekter Frame beendet nie die Sitzung.

use bytes::Bytes;
use tracing::{debug, warn};
use tuschel_core::PeerId;
use tuschel_protocol::{message_bytes, ChannelFrame, MessageEnvelope};

use crate::coordinator::MeshKern;
use crate::error::{MeshError, MeshResult};
use crate::events::{MeshEvent, Trennungsgrund};
use crate::kontext::MeshKontext;
use crate::session::{PeerSession, SessionState};
use crate::transport::TransportProvider;

/// Ergebnis eines erfolgreichen `send`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Verschluesselt und an den Transport uebergeben
    Gesendet,
    /// Angenommen, wartet auf die Verschluesselung (1-basierte Position)
    Eingereiht { position: usize },
}

/// Ergebnis eines Broadcasts fuer einen Peer
#[derive(Debug)]
pub struct PeerOutcome {
    pub peer: PeerId,
    pub ergebnis: MeshResult<SendOutcome>,
}

/// Verschluesselt eine Nachricht und uebergibt sie dem Transport
fn uebertragen(
    kontext: &MeshKontext,
    transport: &dyn TransportProvider,
    sitzung: &PeerSession,
    nachricht: &MessageEnvelope,
) -> MeshResult<()> {
    let (Some(key), Some(channel)) = (sitzung.shared_key(), sitzung.channel) else {
        return Err(MeshError::ChannelUnavailable(sitzung.id));
    };
    let klartext = nachricht.to_bytes()?;
    let verschluesselt = kontext
        .crypto()
        .encrypt(key, &klartext)
        .map_err(|e| MeshError::Transmission(e.to_string()))?;
    let frame = ChannelFrame::message(&verschluesselt).to_bytes()?;
    transport
        .send(channel, Bytes::from(frame))
        .map_err(|e| MeshError::Transmission(e.to_string()))
}

impl MeshKern {
    pub(crate) fn send_text(&mut self, peer: PeerId, text: String) -> MeshResult<SendOutcome> {
        self.send(peer, MessageEnvelope::chat(text))
    }

    /// Sendet oder reiht eine Nachricht fuer einen Peer ein
    pub(crate) fn send(
        &mut self,
        peer: PeerId,
        nachricht: MessageEnvelope,
    ) -> MeshResult<SendOutcome> {
        let max = self.kontext.config().max_wartende_nachrichten;
        let Some(sitzung) = self.sitzungen.get_mut(&peer) else {
            return Err(MeshError::ChannelUnavailable(peer));
        };

        match sitzung.state {
            SessionState::ChannelOpen => {
                if sitzung.wartende().len() >= max {
                    return Err(MeshError::QueueFull { peer, max });
                }
                let position = sitzung.einreihen(nachricht);
                debug!(peer = %peer, position, "Nachricht bis zur Verschluesselung eingereiht");
                Ok(SendOutcome::Eingereiht { position })
            }
            SessionState::Encrypted => {
                uebertragen(&self.kontext, self.transport.as_ref(), sitzung, &nachricht)?;
                debug!(peer = %peer, "Nachricht gesendet");
                Ok(SendOutcome::Gesendet)
            }
            SessionState::Negotiating | SessionState::Closed => {
                Err(MeshError::ChannelUnavailable(peer))
            }
        }
    }

    /// Sendet an alle Sitzungen der aktuellen Tabelle
    ///
    /// Ein Fehler bei einem Peer bricht die Zustellung an andere nicht ab.
    pub(crate) fn broadcast(&mut self, text: &str) -> Vec<PeerOutcome> {
        let nachricht = MessageEnvelope::chat(text);
        self.sitzungen
            .ids()
            .into_iter()
            .map(|peer| PeerOutcome {
                peer,
                ergebnis: self.send(peer, nachricht.clone()),
            })
            .collect()
    }

    /// Sendet alle wartenden Nachrichten in Einreihungs-Reihenfolge
    ///
    /// Scheitert eine Uebertragung, wird die Sitzung abgebaut.
    pub(crate) fn warteschlange_leeren(&mut self, peer: PeerId) {
        let mut gesendet = 0usize;
        loop {
            let Some(sitzung) = self.sitzungen.get_mut(&peer) else {
                return;
            };
            let Some(nachricht) = sitzung.naechste_wartende() else {
                break;
            };
            if let Err(e) = uebertragen(&self.kontext, self.transport.as_ref(), sitzung, &nachricht)
            {
                warn!(peer = %peer, fehler = %e, gesendet, "Warteschlange konnte nicht geleert werden");
                self.teardown(&peer, Trennungsgrund::Uebertragung(e.to_string()));
                return;
            }
            gesendet += 1;
        }
        if gesendet > 0 {
            debug!(peer = %peer, gesendet, "Warteschlange geleert");
        }
    }

    /// Verarbeitet einen rohen Frame vom Datenkanal
    pub(crate) fn receive(&mut self, peer: PeerId, roh: &[u8]) {
        let Some(sitzung) = self.sitzungen.get(&peer) else {
            return;
        };
        if !sitzung.kanal_nutzbar() {
            warn!(peer = %peer, zustand = %sitzung.state, "Frame vor offenem Kanal verworfen");
            return;
        }

        let frame = match ChannelFrame::from_bytes(roh) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(peer = %peer, fehler = %e, bytes = roh.len(), "Unlesbarer Frame verworfen");
                return;
            }
        };

        match frame {
            ChannelFrame::KeyExchange { public_key } => {
                if let Err(e) = self.kontroll_frame_empfangen(peer, &public_key) {
                    warn!(peer = %peer, fehler = %e, "Schluesselaustausch fehlgeschlagen, Sitzung bleibt unverschluesselt");
                }
            }
            ChannelFrame::Message { data } => match self.entschluesseln(peer, &data) {
                Ok((name, message)) => {
                    debug!(peer = %peer, laenge = message.text.len(), "Nachricht empfangen");
                    self.bus.publish(&MeshEvent::MessageReceived {
                        peer,
                        name,
                        message,
                    });
                }
                Err(e) => warn!(peer = %peer, fehler = %e, "Anwendungs-Frame verworfen"),
            },
        }
    }

    fn entschluesseln(&self, peer: PeerId, data: &str) -> MeshResult<(String, MessageEnvelope)> {
        let sitzung = self
            .sitzungen
            .get(&peer)
            .ok_or(MeshError::ChannelUnavailable(peer))?;
        let key = sitzung
            .shared_key()
            .ok_or_else(|| MeshError::Decrypt("noch kein Paar-Schluessel".into()))?;
        let roh = message_bytes(data).map_err(|e| MeshError::Decrypt(e.to_string()))?;
        let klartext = self
            .kontext
            .crypto()
            .decrypt(key, &roh)
            .map_err(|e| MeshError::Decrypt(e.to_string()))?;
        let nachricht = MessageEnvelope::from_bytes(&klartext)
            .map_err(|e| MeshError::Decrypt(format!("Umschlag unlesbar: {e}")))?;
        Ok((sitzung.name.clone(), nachricht))
    }
}
