//! tuschel-signaling – Rendezvous-Server und Signaling-Client
//!
//! Der Rendezvous-Server verwaltet Raeume und leitet Verhandlungs-
//! Signale zwischen Peers desselben Raums weiter. Nachrichteninhalte
//! sieht er nie: diese laufen verschluesselt direkt zwischen den Peers.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (RendezvousServer)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |  Verbunden -> Registriert -> ImRaum
//!     v
//! RaumVerwaltung  – Clients, Raeume, Weiterleitung
//!
//! SignalingClient – Verbindung zum Server, Reconnect, SignalSink
//! ```

pub mod client;
pub mod connection;
pub mod error;
pub mod raeume;
pub mod reconnect;
pub mod tcp;

// Bequeme Re-Exporte
pub use client::{ClientConfig, SignalingClient, SignalingNotice};
pub use error::{SignalingError, SignalingResult};
pub use raeume::RaumVerwaltung;
pub use reconnect::{ReconnectPolicy, SignalingStatus};
pub use tcp::{RendezvousConfig, RendezvousServer};
