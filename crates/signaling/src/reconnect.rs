//! Begrenzte Wiederverbindung mit fester Verzoegerung
//!
//! Nach einem Verbindungsabbruch folgen bis zu `max_versuche` Versuche im
//! Abstand `verzoegerung`. Scheitert auch der letzte, wird
//! [`SignalingStatus::EndgueltigGetrennt`] gemeldet und es gibt keine
//! weiteren automatischen Versuche.

use std::future::Future;
use std::time::Duration;

use tuschel_core::PeerId;
use tuschel_mesh::StatusMeldung;

use crate::error::SignalingResult;

/// Standard-Anzahl an Wiederverbindungs-Versuchen
pub const STANDARD_MAX_VERSUCHE: u32 = 5;

/// Standard-Abstand zwischen zwei Versuchen
pub const STANDARD_VERZOEGERUNG: Duration = Duration::from_secs(2);

/// Verbindungsstatus des Signaling-Clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingStatus {
    Verbunden { peer_id: PeerId },
    Wiederverbinden { versuch: u32, max: u32 },
    EndgueltigGetrennt,
    /// Vom Benutzer getrennt
    Getrennt,
}

impl SignalingStatus {
    pub fn ist_verbunden(&self) -> bool {
        matches!(self, Self::Verbunden { .. })
    }

    /// Entsprechende Statusmeldung fuer den Event-Bus des Mesh
    pub fn als_meldung(&self) -> Option<StatusMeldung> {
        match self {
            Self::Verbunden { peer_id } => Some(StatusMeldung::SignalingVerbunden { peer_id: *peer_id }),
            Self::Wiederverbinden { versuch, max } => Some(StatusMeldung::SignalingWiederverbinden {
                versuch: *versuch,
                max: *max,
            }),
            Self::EndgueltigGetrennt => Some(StatusMeldung::SignalingEndgueltigGetrennt),
            Self::Getrennt => None,
        }
    }
}

/// Richtlinie fuer die Wiederverbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_versuche: u32,
    pub verzoegerung: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_versuche: STANDARD_MAX_VERSUCHE,
            verzoegerung: STANDARD_VERZOEGERUNG,
        }
    }
}

impl ReconnectPolicy {
    /// Fuehrt die Versuche aus bis einer gelingt oder alle gescheitert sind
    ///
    /// `status` wird vor jedem Versuch mit `Wiederverbinden` und nach dem
    /// letzten Fehlschlag mit `EndgueltigGetrennt` aufgerufen.
    pub async fn ausfuehren<T, F, Fut>(
        &self,
        mut versuch: F,
        mut status: impl FnMut(SignalingStatus),
    ) -> Option<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = SignalingResult<T>>,
    {
        for nr in 1..=self.max_versuche {
            status(SignalingStatus::Wiederverbinden {
                versuch: nr,
                max: self.max_versuche,
            });
            tokio::time::sleep(self.verzoegerung).await;

            match versuch(nr).await {
                Ok(ergebnis) => {
                    tracing::info!(versuch = nr, "Wiederverbindung erfolgreich");
                    return Some(ergebnis);
                }
                Err(e) => {
                    tracing::warn!(
                        versuch = nr,
                        max = self.max_versuche,
                        fehler = %e,
                        "Wiederverbindung fehlgeschlagen"
                    );
                }
            }
        }
        tracing::error!(
            versuche = self.max_versuche,
            "Rendezvous-Server nicht erreichbar, keine weiteren Versuche"
        );
        status(SignalingStatus::EndgueltigGetrennt);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SignalingError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn fuenf_versuche_dann_endgueltig_getrennt() {
        let policy = ReconnectPolicy::default();
        let versuche = Arc::new(AtomicU32::new(0));
        let mut statusfolge = Vec::new();
        let start = tokio::time::Instant::now();

        let v = Arc::clone(&versuche);
        let ergebnis: Option<()> = policy
            .ausfuehren(
                move |_| {
                    v.fetch_add(1, Ordering::SeqCst);
                    async { Err(SignalingError::NichtVerbunden) }
                },
                |s| statusfolge.push(s),
            )
            .await;

        assert!(ergebnis.is_none());
        assert_eq!(versuche.load(Ordering::SeqCst), 5);
        assert_eq!(statusfolge.len(), 6);
        assert_eq!(
            statusfolge[0],
            SignalingStatus::Wiederverbinden { versuch: 1, max: 5 }
        );
        assert_eq!(
            statusfolge[4],
            SignalingStatus::Wiederverbinden { versuch: 5, max: 5 }
        );
        assert_eq!(statusfolge[5], SignalingStatus::EndgueltigGetrennt);
        // Feste Verzoegerung vor jedem Versuch
        assert_eq!(start.elapsed(), STANDARD_VERZOEGERUNG * 5);
    }

    #[tokio::test(start_paused = true)]
    async fn erfolg_beendet_die_versuche() {
        let policy = ReconnectPolicy {
            max_versuche: 5,
            verzoegerung: Duration::from_millis(500),
        };
        let mut statusfolge = Vec::new();

        let ergebnis = policy
            .ausfuehren(
                |nr| async move {
                    if nr < 3 {
                        Err(SignalingError::Timeout)
                    } else {
                        Ok(nr)
                    }
                },
                |s| statusfolge.push(s),
            )
            .await;

        assert_eq!(ergebnis, Some(3));
        assert_eq!(statusfolge.len(), 3);
        assert!(!statusfolge.contains(&SignalingStatus::EndgueltigGetrennt));
    }

    #[test]
    fn status_als_meldung() {
        assert_eq!(
            SignalingStatus::EndgueltigGetrennt.als_meldung(),
            Some(StatusMeldung::SignalingEndgueltigGetrennt)
        );
        assert_eq!(SignalingStatus::Getrennt.als_meldung(), None);
        assert!(SignalingStatus::Verbunden {
            peer_id: PeerId::new()
        }
        .ist_verbunden());
    }
}
