//! tuschel-transport – Transport-Provider ueber direkte TCP-Verbindungen
//!
//! ## Verhandlung
//!
//! ```text
//! Initiator                                   Responder
//!   create_offer  -> "tcp-offer:<token>"  ---->  accept_offer
//!   LocalCandidate "tcp:<listen-addr>"    ---->  add_candidate: dial
//!   accept  <------- Handshake-Frame <token> --  connect
//!   ChannelOpen                                  ChannelOpen
//! ```
//!
//! Der Token authentifiziert die eingehende Verbindung gegenueber dem
//! Initiator. Danach tragen beide Richtungen laengen-praefixierte Frames
//! ([`tokio_util::codec::LengthDelimitedCodec`]).

pub mod beschreibung;
pub mod tcp;

pub use beschreibung::{Beschreibung, KANDIDAT_PRAEFIX};
pub use tcp::{TcpTransport, TcpTransportConfig};
