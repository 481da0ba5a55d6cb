//! # tuschel-mesh
//!
//! Vollvermaschtes, Ende-zu-Ende verschluesseltes Peer-Mesh.
//!
//! ## Architektur
//! ```text
//! MeshHandle (klonbar)
//!   │  initiate / handle_signal / send / broadcast / roster / subscribe
//!   ▼
//! Mesh-Task (besitzt SessionTable + EventBus)
//!   ├── lifecycle     Negotiating -> ChannelOpen -> Encrypted -> Closed
//!   ├── key_exchange  Kontroll-Frame, Paar-Schluessel, einmalig
//!   └── dispatcher    Warteschlange, Verschluesselung, Empfang
//!   │
//!   ├──> TransportProvider (Verbindung, Datenkanal)
//!   └──> SignalSink        (Offer/Answer/Kandidaten ueber Rendezvous)
//! ```
//!
//! ## Module
//! - `session`      – Sitzungstabelle und Roster
//! - `events`       – Ereignisse und Event-Bus
//! - `transport`    – Transport-Schnittstelle und Handles
//! - `signal`       – Ausgehende Signale
//! - `coordinator`  – Mesh-Task und Handle
//! - `memory`       – In-Memory-Transport fuer Tests und Demos

pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod kontext;
mod key_exchange;
mod lifecycle;
pub mod memory;
pub mod session;
pub mod signal;
pub mod transport;

pub use config::MeshConfig;
pub use coordinator::{Mesh, MeshHandle};
pub use dispatcher::{PeerOutcome, SendOutcome};
pub use error::{MeshError, MeshResult};
pub use events::{
    EventBus, EventHandler, EventKind, MeshEvent, StatusMeldung, SubscriptionId, Trennungsgrund,
};
pub use kontext::MeshKontext;
pub use memory::{MemoryNetwork, MemorySignalNetz, MemoryTransport};
pub use session::{PeerSession, RosterEintrag, SessionState, SessionTable};
pub use signal::SignalSink;
pub use transport::{
    ChannelHandle, ConnectionHandle, ConnectionState, TransportError, TransportEvent,
    TransportEventSink, TransportMeldung, TransportProvider, TransportResult,
};
