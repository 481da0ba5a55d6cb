//! Ausgehender Signalisierungs-Pfad

use async_trait::async_trait;
use tuschel_core::PeerId;
use tuschel_protocol::Signal;

use crate::error::MeshResult;

/// Ziel fuer ausgehende Verhandlungs-Signale
///
/// Wird vom Signaling-Client implementiert. Signale an denselben Peer
/// muessen in Aufrufreihenfolge zugestellt werden.
#[async_trait]
pub trait SignalSink: Send + Sync + 'static {
    /// Sendet ein Signal an einen Peer im selben Raum
    ///
    /// Schlaegt mit `MeshError::SignalingDisconnected` fehl wenn keine
    /// Verbindung zum Rendezvous-Server besteht.
    async fn send_signal(&self, an: PeerId, signal: Signal) -> MeshResult<()>;
}
