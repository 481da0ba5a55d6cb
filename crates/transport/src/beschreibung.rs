//! Kodierung der Verhandlungsartefakte des TCP-Transports

use std::net::SocketAddr;

use rand::RngCore;
use tuschel_mesh::{TransportError, TransportResult};
use tuschel_protocol::{Candidate, SessionDescription};

const OFFER_PRAEFIX: &str = "tcp-offer:";
const ANSWER_PRAEFIX: &str = "tcp-answer:";

/// Praefix eines TCP-Kandidaten (`tcp:<ip>:<port>`)
pub const KANDIDAT_PRAEFIX: &str = "tcp:";

/// Laenge eines Tokens in Bytes
const TOKEN_LAENGE: usize = 16;

/// Offer oder Answer des TCP-Transports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Beschreibung {
    Offer { token: String },
    Answer { token: String },
}

impl Beschreibung {
    /// Erzeugt ein Offer mit frischem Zufalls-Token
    pub fn neues_offer() -> Self {
        let mut bytes = [0u8; TOKEN_LAENGE];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = bytes.iter().map(|b| format!("{b:02x}")).collect();
        Self::Offer { token }
    }

    pub fn token(&self) -> &str {
        match self {
            Self::Offer { token } | Self::Answer { token } => token,
        }
    }

    pub fn als_sdp(&self) -> SessionDescription {
        match self {
            Self::Offer { token } => SessionDescription::new(format!("{OFFER_PRAEFIX}{token}")),
            Self::Answer { token } => SessionDescription::new(format!("{ANSWER_PRAEFIX}{token}")),
        }
    }

    /// Liest ein Offer oder eine Answer
    pub fn parsen(sdp: &SessionDescription) -> TransportResult<Self> {
        let (beschreibung, token) = if let Some(token) = sdp.sdp.strip_prefix(OFFER_PRAEFIX) {
            (Self::Offer { token: token.to_string() }, token)
        } else if let Some(token) = sdp.sdp.strip_prefix(ANSWER_PRAEFIX) {
            (Self::Answer { token: token.to_string() }, token)
        } else {
            return Err(TransportError::Verhandlung(format!(
                "Unbekannte Beschreibung: {}",
                sdp.sdp
            )));
        };
        if token.len() != TOKEN_LAENGE * 2 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TransportError::Verhandlung("Ungueltiger Token".into()));
        }
        Ok(beschreibung)
    }
}

/// Kodiert eine Adresse als Kandidat
pub fn kandidat(adresse: SocketAddr) -> Candidate {
    Candidate::new(format!("{KANDIDAT_PRAEFIX}{adresse}"))
}

/// Liest die Adresse aus einem Kandidaten
pub fn kandidat_adresse(candidate: &Candidate) -> TransportResult<SocketAddr> {
    candidate
        .candidate
        .strip_prefix(KANDIDAT_PRAEFIX)
        .and_then(|a| a.parse().ok())
        .ok_or_else(|| TransportError::UngueltigerKandidat(candidate.candidate.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_und_answer_teilen_den_token() {
        let offer = Beschreibung::neues_offer();
        let gelesen = Beschreibung::parsen(&offer.als_sdp()).unwrap();
        assert_eq!(gelesen, offer);

        let answer = Beschreibung::Answer {
            token: offer.token().to_string(),
        };
        assert!(answer.als_sdp().sdp.starts_with("tcp-answer:"));
        assert_eq!(Beschreibung::parsen(&answer.als_sdp()).unwrap().token(), offer.token());
    }

    #[test]
    fn tokens_sind_zufaellig() {
        assert_ne!(
            Beschreibung::neues_offer().token(),
            Beschreibung::neues_offer().token()
        );
    }

    #[test]
    fn fremde_beschreibung_wird_abgelehnt() {
        assert!(Beschreibung::parsen(&SessionDescription::new("v=0")).is_err());
        assert!(Beschreibung::parsen(&SessionDescription::new("tcp-offer:zz")).is_err());
    }

    #[test]
    fn kandidat_kodierung() {
        let adresse: SocketAddr = "127.0.0.1:4711".parse().unwrap();
        assert_eq!(kandidat_adresse(&kandidat(adresse)).unwrap(), adresse);
        assert!(kandidat_adresse(&Candidate::new("udp:1.2.3.4:5")).is_err());
        assert!(kandidat_adresse(&Candidate::new("tcp:kein-port")).is_err());
    }
}
