//! Shared fixtures for unit tests.

use crate::address::Identity;
use crate::block::Genesis;
use crate::config::ChainConfig;
use crate::ledger::Ledger;
use async_trait::async_trait;
use dposim_env::{ChainId, EnvError, OverlayPacket, PeerOverlay, PlayerId};
use ed25519_dalek::SigningKey;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

/// Overlay with no peers.
pub struct NullOverlay;

#[async_trait]
impl PeerOverlay for NullOverlay {
    async fn send(&self, peer: &str, _packet: OverlayPacket) -> Result<(), EnvError> {
        Err(EnvError::unreachable(peer))
    }

    async fn broadcast(&self, _packet: OverlayPacket) -> usize {
        0
    }

    fn local_id(&self) -> PlayerId {
        PlayerId(0)
    }
}

/// Deterministic identity on the chain of player `seed`.
pub fn identity(seed: u64) -> Identity {
    let key = SigningKey::generate(&mut ChaCha8Rng::seed_from_u64(seed));
    Identity::new(ChainId::for_player(PlayerId(seed as u32)), key)
}

/// Fresh in-memory ledger with a genesis at timestamp 0.
pub fn open_ledger() -> (tempfile::TempDir, Arc<Ledger>) {
    let dir = tempfile::tempdir().unwrap();
    let config = ChainConfig {
        chain_db_path: dir.path().join("chain.db"),
        in_memory: true,
        ..ChainConfig::default()
    };
    let ledger = Ledger::open(&config, &Genesis { timestamp_ms: 0 }).unwrap();
    (dir, Arc::new(ledger))
}
