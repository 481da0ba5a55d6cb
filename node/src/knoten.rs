//! Laufzeit des Chat-Knotens
//!
//! ```text
//! stdin ──> Eingabe ──> MeshHandle (send / broadcast / roster)
//! SignalingClient ──> SignalingNotice ──> notice_verarbeiten ──> MeshHandle
//! MeshHandle ──> MeshEvent ──> ereignis_text ──> stdout
//! ```
//!
//! Raum-Konvention: wer einem Raum beitritt, baut zu allen bisherigen
//! Mitgliedern auf. Bestehende Mitglieder antworten nur.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tuschel_core::PeerId;
use tuschel_crypto::StandardCrypto;
use tuschel_mesh::{
    EventKind, Mesh, MeshEvent, MeshHandle, MeshKontext, MeshResult, SendOutcome, StatusMeldung,
};
use tuschel_signaling::{SignalingClient, SignalingNotice, SignalingStatus};
use tuschel_transport::TcpTransport;

use crate::befehle::{ziel_aufloesen, Eingabe};
use crate::config::NodeConfig;

const ALLE_EREIGNISSE: [EventKind; 5] = [
    EventKind::ChannelOpened,
    EventKind::EncryptionEstablished,
    EventKind::Disconnected,
    EventKind::MessageReceived,
    EventKind::StatusChanged,
];

/// Ein Chat-Knoten
pub struct Knoten {
    config: NodeConfig,
}

impl Knoten {
    pub fn neu(config: NodeConfig) -> Self {
        Self { config }
    }

    /// Verbindet sich, betritt den Raum und verarbeitet Eingaben bis `/quit`
    pub async fn starten(self) -> anyhow::Result<()> {
        let config = self.config;
        let (signaling, mut notices) =
            SignalingClient::verbinden(&config.signaling.url, config.client_config())
                .await
                .with_context(|| format!("Rendezvous-Server {} nicht erreichbar", config.signaling.url))?;
        let transport = TcpTransport::binden(config.transport_config()?)
            .await
            .context("TCP-Transport konnte nicht gestartet werden")?;

        let kontext = MeshKontext::neu(
            signaling.peer_id(),
            config.mesh_config(),
            Arc::new(StandardCrypto::neu(config.mesh.algorithmus)),
        );
        let (mesh, mesh_task) = Mesh::starten(
            kontext,
            Arc::new(transport.clone()),
            Arc::new(signaling.clone()),
        );
        let mut ereignisse = mesh.ereignis_kanal(&ALLE_EREIGNISSE).await?;

        tracing::info!(
            peer = %mesh.eigene_id(),
            name = %config.identitaet.name,
            transport = %transport.kandidat_adresse(),
            "Knoten gestartet"
        );

        raum_betreten(&config, &signaling, &mesh).await?;

        let mut zeilen = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                notice = notices.recv() => match notice {
                    Some(notice) => notice_verarbeiten(&mesh, notice).await?,
                    None => {
                        tracing::warn!("Signaling-Client beendet");
                        break;
                    }
                },
                Some(ereignis) = ereignisse.recv() => {
                    if let Some(text) = ereignis_text(&ereignis) {
                        println!("{text}");
                    }
                }
                zeile = zeilen.next_line() => match zeile? {
                    Some(zeile) => {
                        if !eingabe_ausfuehren(&zeile, &signaling, &mesh).await? {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        let getrennt = mesh.disconnect_all().await?;
        tracing::info!(getrennt, "Knoten wird beendet");
        let _ = signaling.leave_room();
        signaling.trennen();
        mesh.shutdown().await?;
        let _ = mesh_task.await;
        Ok(())
    }
}

/// Betritt den konfigurierten Raum oder legt einen neuen an
async fn raum_betreten(
    config: &NodeConfig,
    signaling: &SignalingClient,
    mesh: &MeshHandle,
) -> anyhow::Result<()> {
    let name = &config.identitaet.name;
    let code = match config.raum_code()? {
        Some(code) => {
            let mitglieder = signaling
                .join_room(&code, name)
                .await
                .with_context(|| format!("Beitritt zu Raum {code} fehlgeschlagen"))?;
            println!("Raum {code} beigetreten, {} weitere Teilnehmer", mitglieder.len());
            for mitglied in mitglieder {
                mesh.initiate(mitglied.peer_id, mitglied.name).await?;
            }
            code
        }
        None => {
            let code = signaling
                .create_room(name)
                .await
                .context("Raum konnte nicht angelegt werden")?;
            println!("Raum {code} angelegt, Code an andere weitergeben");
            code
        }
    };
    mesh.status_melden(StatusMeldung::RaumBeigetreten { code }).await?;
    Ok(())
}

/// Fuehrt eine Eingabezeile aus, `false` beendet den Knoten
async fn eingabe_ausfuehren(
    zeile: &str,
    signaling: &SignalingClient,
    mesh: &MeshHandle,
) -> MeshResult<bool> {
    let eingabe = match Eingabe::parsen(zeile) {
        Ok(eingabe) => eingabe,
        Err(e) => {
            println!("{e}");
            return Ok(true);
        }
    };

    match eingabe {
        Eingabe::Leer => {}
        Eingabe::Beenden => return Ok(false),
        Eingabe::Peers => {
            let roster = mesh.roster().await?;
            if roster.is_empty() {
                println!("Keine Teilnehmer verbunden");
            }
            for eintrag in roster {
                let fingerprint = mesh.fingerprint(eintrag.id).await?.unwrap_or_else(|| "-".into());
                println!(
                    "{}  {:<16} {:<14} {}",
                    eintrag.id.kurz(),
                    eintrag.name,
                    eintrag.state,
                    fingerprint
                );
            }
        }
        Eingabe::An { ziel, text } => {
            let roster = mesh.roster().await?;
            match ziel_aufloesen(&roster, &ziel) {
                Some(peer) => match mesh.send(peer, text).await {
                    Ok(SendOutcome::Gesendet) => {}
                    Ok(SendOutcome::Eingereiht { position }) => {
                        println!("Nachricht eingereiht (Position {position})");
                    }
                    Err(e) => println!("Senden fehlgeschlagen: {e}"),
                },
                None => println!("Kein eindeutiger Teilnehmer '{ziel}'"),
            }
        }
        Eingabe::Broadcast(text) => {
            for ergebnis in mesh.broadcast(text).await? {
                if let Err(e) = ergebnis.ergebnis {
                    println!("An {} nicht zugestellt: {e}", ergebnis.peer.kurz());
                }
            }
        }
        Eingabe::Verlassen => {
            if let Err(e) = signaling.leave_room() {
                println!("Raum verlassen fehlgeschlagen: {e}");
            }
            let getrennt = mesh.disconnect_all().await?;
            mesh.status_melden(StatusMeldung::RaumVerlassen).await?;
            println!("Raum verlassen, {getrennt} Verbindungen getrennt");
        }
    }
    Ok(true)
}

/// Uebersetzt eine Signaling-Benachrichtigung in Mesh-Operationen
pub async fn notice_verarbeiten(mesh: &MeshHandle, notice: SignalingNotice) -> MeshResult<()> {
    match notice {
        SignalingNotice::Signal { from, name, signal } => {
            // Fehler einzelner Signale betreffen nur diese Sitzung
            if let Err(e) = mesh.handle_signal(from, name, signal).await {
                tracing::warn!(peer = %from, fehler = %e, "Signal nicht verarbeitet");
            }
        }
        SignalingNotice::PeerJoined(mitglied) => {
            tracing::info!(peer = %mitglied.peer_id, name = %mitglied.name, "Peer dem Raum beigetreten");
        }
        SignalingNotice::PeerLeft(peer) => {
            mesh.disconnect_peer(peer).await?;
        }
        SignalingNotice::RaumWiederbetreten { code, members } => {
            let bekannt: Vec<PeerId> = mesh.roster().await?.into_iter().map(|e| e.id).collect();
            for mitglied in members.into_iter().filter(|m| !bekannt.contains(&m.peer_id)) {
                mesh.initiate(mitglied.peer_id, mitglied.name).await?;
            }
            mesh.status_melden(StatusMeldung::RaumBeigetreten { code }).await?;
        }
        SignalingNotice::Status(status) => {
            if let Some(meldung) = status.als_meldung() {
                mesh.status_melden(meldung).await?;
            }
            if status == SignalingStatus::EndgueltigGetrennt {
                tracing::error!("Rendezvous-Server endgueltig nicht erreichbar, bestehende Verbindungen bleiben");
            }
        }
        SignalingNotice::Fehler { code, message } => {
            tracing::warn!(code = ?code, message = %message, "Fehler vom Rendezvous-Server");
        }
    }
    Ok(())
}

/// Anzeigetext fuer ein Mesh-Ereignis
pub fn ereignis_text(ereignis: &MeshEvent) -> Option<String> {
    let text = match ereignis {
        MeshEvent::ChannelOpened { name, .. } => format!("* Kanal zu {name} offen"),
        MeshEvent::EncryptionEstablished {
            name, fingerprint, ..
        } => format!("* Verschluesselt mit {name} (Fingerabdruck {fingerprint})"),
        MeshEvent::Disconnected { name, grund, .. } => format!("* {name} getrennt: {grund}"),
        MeshEvent::MessageReceived { name, message, .. } => format!("<{name}> {}", message.text),
        MeshEvent::StatusChanged(meldung) => match meldung {
            StatusMeldung::SignalingVerbunden { peer_id } => {
                format!("* Mit Rendezvous-Server verbunden als {}", peer_id.kurz())
            }
            StatusMeldung::SignalingWiederverbinden { versuch, max } => {
                format!("* Verbindung zum Rendezvous-Server verloren, Versuch {versuch}/{max}")
            }
            StatusMeldung::SignalingEndgueltigGetrennt => {
                "* Rendezvous-Server nicht erreichbar, keine neuen Teilnehmer moeglich".to_string()
            }
            StatusMeldung::RaumBeigetreten { .. } | StatusMeldung::RaumVerlassen => return None,
        },
    };
    Some(text)
}
