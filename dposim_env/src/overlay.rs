//! Peer overlay abstraction for simulated players.

use crate::error::EnvError;
use crate::types::{OverlayPacket, PlayerId};
use async_trait::async_trait;

/// Abstraction for a player's outbound peer-to-peer traffic.
///
/// # Implementations
///
/// - **Simulation**: `SimOverlay` - isolated, records what would be sent
///
/// # Packet Flow
///
/// ```text
/// Sync unit                  Overlay                     Peers
///   |                           |                          |
///   |-- broadcast(packet) ----->|                          |
///   |                           |-- [one copy per peer] -->|
/// ```
#[async_trait]
pub trait PeerOverlay: Send + Sync + 'static {
    /// Sends a packet to a single peer.
    ///
    /// # Arguments
    /// * `peer` - The destination peer address
    /// * `packet` - The packet to send
    ///
    /// # Returns
    /// * `Ok(())` - Packet queued for delivery
    /// * `Err(EnvError::NodeUnreachable)` - Peer is not part of the overlay
    /// * `Err(EnvError::NetworkError)` - Immediate send failure (e.g., queue full)
    async fn send(&self, peer: &str, packet: OverlayPacket) -> Result<(), EnvError>;

    /// Broadcasts a packet to all connected peers.
    ///
    /// # Returns
    /// Number of peers the packet was queued for.
    async fn broadcast(&self, packet: OverlayPacket) -> usize;

    /// Returns the owning player's ID.
    fn local_id(&self) -> PlayerId;
}
