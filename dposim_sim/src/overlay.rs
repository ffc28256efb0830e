//! Isolated peer overlay for simulated players.
//!
//! Simulated players never talk to each other directly: the driver relays
//! protocol output between them. The overlay still accepts the sync unit's
//! traffic so it can be inspected, bounded by the configured queue size.

use async_trait::async_trait;
use dposim_env::{EnvError, OverlayPacket, PeerOverlay, PlayerId};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// A packet the overlay would have delivered.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub peer: String,
    pub packet: OverlayPacket,
}

/// Simulated overlay for one player.
pub struct SimOverlay {
    /// Owning player
    local_id: PlayerId,

    /// Configured peer addresses
    peers: Vec<String>,

    /// Undelivered packets, oldest first
    outbound: Mutex<VecDeque<Outbound>>,

    max_outbound: usize,
}

impl SimOverlay {
    pub fn new(local_id: PlayerId, peers: Vec<String>, max_outbound: usize) -> Self {
        Self {
            local_id,
            peers,
            outbound: Mutex::new(VecDeque::new()),
            max_outbound,
        }
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<Outbound>> {
        self.outbound.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    /// Number of queued packets.
    pub fn pending(&self) -> usize {
        self.queue().len()
    }

    /// Removes and returns every queued packet.
    pub fn drain(&self) -> Vec<Outbound> {
        self.queue().drain(..).collect()
    }

    fn enqueue(&self, peer: &str, packet: OverlayPacket) -> Result<(), EnvError> {
        let mut queue = self.queue();
        if queue.len() >= self.max_outbound {
            return Err(EnvError::network(format!(
                "outbound queue full ({} packets)",
                self.max_outbound
            )));
        }
        queue.push_back(Outbound {
            peer: peer.to_string(),
            packet,
        });
        Ok(())
    }
}

#[async_trait]
impl PeerOverlay for SimOverlay {
    async fn send(&self, peer: &str, packet: OverlayPacket) -> Result<(), EnvError> {
        if !self.peers.iter().any(|p| p == peer) {
            return Err(EnvError::unreachable(peer));
        }
        debug!(player = %self.local_id, peer, bytes = packet.size(), "Queued packet");
        self.enqueue(peer, packet)
    }

    async fn broadcast(&self, packet: OverlayPacket) -> usize {
        let mut queued = 0;
        for peer in &self.peers {
            match self.enqueue(peer, packet.clone()) {
                Ok(()) => queued += 1,
                Err(e) => {
                    warn!(player = %self.local_id, peer = %peer, error = %e, "Broadcast truncated");
                    break;
                }
            }
        }
        queued
    }

    fn local_id(&self) -> PlayerId {
        self.local_id
    }
}
