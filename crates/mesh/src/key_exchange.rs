//! Schluesselaustausch ueber den offenen Datenkanal
//!
//! Jede Seite schickt bei offenem Kanal einmal ihren oeffentlichen
//! Schluessel als Kontroll-Frame. Wer den Frame der Gegenseite empfaengt,
//! leitet den Paar-Schluessel selbst ab und gilt ab dann als verschluesselt.
//! Es gibt keine Bestaetigung; beide Richtungen laufen unabhaengig und die
//! Warteschlange faengt das Rennen ab. Ein zweiter Kontroll-Frame aendert
//! nichts.

use bytes::Bytes;
use tracing::{debug, info, warn};
use tuschel_core::PeerId;
use tuschel_protocol::ChannelFrame;

use crate::coordinator::MeshKern;
use crate::error::{MeshError, MeshResult};
use crate::events::{MeshEvent, Trennungsgrund};

impl MeshKern {
    /// Schickt den eigenen oeffentlichen Schluessel an den Peer
    pub(crate) fn kontroll_frame_senden(&mut self, peer: PeerId) {
        let Some(channel) = self.sitzungen.get(&peer).and_then(|s| s.channel) else {
            return;
        };
        let frame = ChannelFrame::key_exchange(self.kontext.oeffentlicher_schluessel());
        let ergebnis = frame
            .to_bytes()
            .map_err(MeshError::from)
            .and_then(|bytes| {
                self.transport
                    .send(channel, Bytes::from(bytes))
                    .map_err(|e| MeshError::Transmission(e.to_string()))
            });

        match ergebnis {
            Ok(()) => debug!(peer = %peer, "Kontroll-Frame gesendet"),
            Err(e) => {
                warn!(peer = %peer, fehler = %e, "Kontroll-Frame konnte nicht gesendet werden");
                self.teardown(&peer, Trennungsgrund::Uebertragung(e.to_string()));
            }
        }
    }

    /// Verarbeitet den Kontroll-Frame des Peers
    ///
    /// Ein fehlerhafter Schluessel laesst die Sitzung unverschluesselt und
    /// die Warteschlange unveraendert.
    pub(crate) fn kontroll_frame_empfangen(
        &mut self,
        peer: PeerId,
        public_key: &str,
    ) -> MeshResult<()> {
        let kontext = &self.kontext;
        let Some(sitzung) = self.sitzungen.get_mut(&peer) else {
            return Ok(());
        };
        if sitzung.ist_verschluesselt() {
            debug!(peer = %peer, "Doppelter Kontroll-Frame ignoriert");
            return Ok(());
        }

        let peer_key = kontext
            .crypto()
            .import_public_key(public_key)
            .map_err(|e| MeshError::KeyExchange(e.to_string()))?;
        let key = kontext
            .crypto()
            .derive_shared_key(kontext.key_pair(), &peer_key)
            .map_err(|e| MeshError::KeyExchange(e.to_string()))?;

        let fingerprint = key.fingerprint();
        if !sitzung.schluessel_setzen(key) {
            return Ok(());
        }
        let name = sitzung.name.clone();
        let wartend = sitzung.wartende().len();

        info!(peer = %peer, fingerprint = %fingerprint, wartend, "Verschluesselung hergestellt");
        self.bus.publish(&MeshEvent::EncryptionEstablished {
            peer,
            name,
            fingerprint,
        });
        self.warteschlange_leeren(peer);
        Ok(())
    }
}
