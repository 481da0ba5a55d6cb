//! Eingabe-Befehle des Knotens
//!
//! ```text
//! /peers            Teilnehmerliste mit Zustand und Fingerabdruck
//! /to <id> <text>   Nachricht an einen Peer (volle ID oder Kurzform)
//! /leave            Raum verlassen und alle Verbindungen trennen
//! /quit             Beenden
//! <text>            Nachricht an alle
//! ```

use tuschel_core::PeerId;
use tuschel_mesh::RosterEintrag;

/// Eine geparste Eingabezeile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eingabe {
    Peers,
    An { ziel: String, text: String },
    Verlassen,
    Beenden,
    Broadcast(String),
    Leer,
}

/// Fehler beim Parsen einer Eingabezeile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EingabeFehler {
    UnbekannterBefehl(String),
    FehlendesArgument(&'static str),
}

impl std::fmt::Display for EingabeFehler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnbekannterBefehl(befehl) => write!(f, "Unbekannter Befehl: {befehl}"),
            Self::FehlendesArgument(hilfe) => write!(f, "Aufruf: {hilfe}"),
        }
    }
}

impl Eingabe {
    /// Parst eine Zeile von stdin
    pub fn parsen(zeile: &str) -> Result<Self, EingabeFehler> {
        let zeile = zeile.trim();
        if zeile.is_empty() {
            return Ok(Self::Leer);
        }
        let Some(befehl) = zeile.strip_prefix('/') else {
            return Ok(Self::Broadcast(zeile.to_string()));
        };

        let (name, rest) = befehl.split_once(char::is_whitespace).unwrap_or((befehl, ""));
        match name {
            "peers" => Ok(Self::Peers),
            "leave" => Ok(Self::Verlassen),
            "quit" => Ok(Self::Beenden),
            "to" => {
                let (ziel, text) = rest
                    .trim()
                    .split_once(char::is_whitespace)
                    .ok_or(EingabeFehler::FehlendesArgument("/to <id> <text>"))?;
                let text = text.trim();
                if text.is_empty() {
                    return Err(EingabeFehler::FehlendesArgument("/to <id> <text>"));
                }
                Ok(Self::An {
                    ziel: ziel.to_string(),
                    text: text.to_string(),
                })
            }
            andere => Err(EingabeFehler::UnbekannterBefehl(format!("/{andere}"))),
        }
    }
}

/// Findet einen Peer per voller ID, Kurzform oder Anzeigename
///
/// Mehrdeutige Kurzformen oder Namen ergeben `None`.
pub fn ziel_aufloesen(roster: &[RosterEintrag], ziel: &str) -> Option<PeerId> {
    if let Ok(id) = ziel.parse::<PeerId>() {
        return roster.iter().find(|e| e.id == id).map(|e| e.id);
    }
    let treffer: Vec<PeerId> = roster
        .iter()
        .filter(|e| e.id.kurz().starts_with(ziel) || e.name == ziel)
        .map(|e| e.id)
        .collect();
    match treffer.as_slice() {
        [einzig] => Some(*einzig),
        _ => None,
    }
}
