//! tuschel-node – Bibliotheks-Root
//!
//! Verbindet Signaling-Client, Mesh und TCP-Transport zu einem Chat-
//! Knoten mit Zeilen-Ein- und Ausgabe.

pub mod befehle;
pub mod config;
pub mod knoten;

pub use knoten::{ereignis_text, notice_verarbeiten, Knoten};
