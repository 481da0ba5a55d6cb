//! Gemeinsame Identifikationstypen fuer Tuschel
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eindeutige Peer-ID, vom Rendezvous-Server pro Sitzung vergeben
///
/// Die Ordnung wird bei gleichzeitigen Offers (Glare) genutzt: die
/// kleinere ID behaelt die Initiator-Rolle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(pub Uuid);

impl PeerId {
    /// Erstellt eine neue zufaellige PeerId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }

    /// Kurzform fuer Logs und Anzeige (erste 8 Hex-Zeichen)
    pub fn kurz(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer:{}", self.0)
    }
}

impl std::str::FromStr for PeerId {
    type Err = uuid::Error;

    /// Akzeptiert sowohl `peer:<uuid>` als auch die nackte UUID
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let roh = s.strip_prefix("peer:").unwrap_or(s);
        Ok(Self(Uuid::parse_str(roh)?))
    }
}

/// Menschenlesbarer Raum-Code (z.B. `K7QM2X`)
///
/// Das Alphabet laesst verwechselbare Zeichen (0/O, 1/I) weg, damit der
/// Code muendlich oder per Chat weitergegeben werden kann.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomCode(String);

impl RoomCode {
    /// Erlaubte Zeichen eines Raum-Codes
    pub const ALPHABET: &'static [u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

    /// Laenge eines Raum-Codes
    pub const LAENGE: usize = 6;

    /// Prueft und normalisiert einen Code (Leerraum entfernt, Grossbuchstaben)
    pub fn parse(eingabe: &str) -> Option<Self> {
        let code: String = eingabe.trim().to_ascii_uppercase();
        if code.len() != Self::LAENGE {
            return None;
        }
        if !code.bytes().all(|b| Self::ALPHABET.contains(&b)) {
            return None;
        }
        Some(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Aktuelle Zeit als Unix-Epoch in Millisekunden
pub fn jetzt_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_eindeutig() {
        let a = PeerId::new();
        let b = PeerId::new();
        assert_ne!(a, b, "Zwei neue PeerIds muessen verschieden sein");
    }

    #[test]
    fn peer_id_display_und_parse() {
        let id = PeerId(Uuid::nil());
        assert!(id.to_string().starts_with("peer:"));
        let zurueck: PeerId = id.to_string().parse().unwrap();
        assert_eq!(zurueck, id);
        let nackt: PeerId = Uuid::nil().to_string().parse().unwrap();
        assert_eq!(nackt, id);
    }

    #[test]
    fn peer_id_kurzform() {
        let id = PeerId::new();
        assert_eq!(id.kurz().len(), 8);
    }

    #[test]
    fn peer_id_ist_serde_kompatibel() {
        let id = PeerId::new();
        let json = serde_json::to_string(&id).unwrap();
        // Newtype wird als nackte UUID serialisiert
        assert!(!json.contains("peer:"));
        let id2: PeerId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, id2);
    }

    #[test]
    fn raum_code_normalisiert() {
        let code = RoomCode::parse(" k7qm2x ").unwrap();
        assert_eq!(code.as_str(), "K7QM2X");
    }

    #[test]
    fn raum_code_ablehnung() {
        assert!(RoomCode::parse("ABC").is_none());
        assert!(RoomCode::parse("ABCDEFG").is_none());
        // 0 und O sind nicht im Alphabet
        assert!(RoomCode::parse("AB0DEF").is_none());
        assert!(RoomCode::parse("ABODEF").is_none());
    }

    #[test]
    fn jetzt_ms_ist_plausibel() {
        // Nach 2020-01-01
        assert!(jetzt_ms() > 1_577_836_800_000);
    }
}
