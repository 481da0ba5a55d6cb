//! tuschel-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert alle Nachrichtentypen die zwischen Peers
//! (ueber den Datenkanal) und zwischen Peer und Rendezvous-Server
//! (ueber den Signaling-Kanal) ausgetauscht werden.

pub mod frame;
pub mod rendezvous;
pub mod signal;
pub mod wire;

pub use frame::{message_bytes, ChannelFrame, MessageEnvelope, MessageKind};
pub use rendezvous::{ClientNachricht, RaumMitglied, RendezvousFehlerCode, ServerNachricht};
pub use signal::{Candidate, SessionDescription, Signal};
pub use wire::FrameCodec;
