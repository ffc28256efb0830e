//! Block synchronization unit.
//!
//! Accepts committed blocks gossiped by peers and keeps the ledger in step
//! with them: the next block is committed straight away, blocks further
//! ahead are buffered and the missing range is requested over the overlay.

use crate::block::Block;
use crate::config::BlockSyncConfig;
use crate::delegate::DelegatePool;
use crate::ledger::{Ledger, LedgerError};
use crate::txpool::TxPool;
use dposim_env::{EnvError, OverlayPacket, PeerOverlay};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the sync unit did with one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The block (and any buffered successors) committed; new tip height.
    Committed { tip: u64 },

    /// The block is ahead of the tip and was buffered.
    Buffered { missing_from: u64, missing_to: u64 },

    /// The block is at or below the tip.
    Stale { tip: u64 },
}

/// Request for a range of blocks, broadcast when a gap is detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub from: u64,
    pub to: u64,
}

/// Per-player block-sync unit.
pub struct BlockSyncer<Net: PeerOverlay> {
    config: BlockSyncConfig,
    ledger: Arc<Ledger>,
    pool: Arc<TxPool>,
    overlay: Arc<Net>,
    delegates: Arc<DelegatePool>,

    /// Future blocks by height
    buffer: BTreeMap<u64, Block>,
}

impl<Net: PeerOverlay> BlockSyncer<Net> {
    pub fn new(
        config: BlockSyncConfig,
        ledger: Arc<Ledger>,
        pool: Arc<TxPool>,
        overlay: Arc<Net>,
        delegates: Arc<DelegatePool>,
    ) -> Self {
        Self {
            config,
            ledger,
            pool,
            overlay,
            delegates,
            buffer: BTreeMap::new(),
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Handles a gossiped block.
    pub fn process_block(&mut self, block: Block) -> Result<SyncOutcome, LedgerError> {
        if !self.delegates.contains(&block.producer) {
            return Err(LedgerError::InvalidBlock {
                height: block.height,
                reason: format!("producer {} is not a delegate", block.producer),
            });
        }

        let tip = self.ledger.tip_height()?;
        if block.height <= tip {
            debug!(height = block.height, tip, "Ignoring stale block");
            return Ok(SyncOutcome::Stale { tip });
        }

        if block.height > tip + 1 {
            if self.buffer.len() >= self.config.buffer_size && !self.buffer.contains_key(&block.height)
            {
                // Keep the blocks closest to the tip.
                if let Some((&highest, _)) = self.buffer.last_key_value() {
                    if highest > block.height {
                        self.buffer.remove(&highest);
                    } else {
                        warn!(height = block.height, "Sync buffer full, dropping block");
                        return Ok(SyncOutcome::Buffered {
                            missing_from: tip + 1,
                            missing_to: block.height - 1,
                        });
                    }
                }
            }
            let missing_to = block.height - 1;
            self.buffer.insert(block.height, block);
            return Ok(SyncOutcome::Buffered {
                missing_from: tip + 1,
                missing_to,
            });
        }

        self.commit(&block)?;
        Ok(SyncOutcome::Committed {
            tip: self.ledger.tip_height()?,
        })
    }

    /// Commits a block agreed by consensus, then drains any buffered
    /// successors that now connect to the tip.
    pub fn commit(&mut self, block: &Block) -> Result<(), LedgerError> {
        self.ledger.commit_block(block)?;
        self.pool.remove_committed(block);
        self.drain_buffer()
    }

    fn drain_buffer(&mut self) -> Result<(), LedgerError> {
        loop {
            let next = self.ledger.tip_height()? + 1;
            // Anything at or below the tip can never commit now.
            self.buffer = self.buffer.split_off(&next);
            let Some(block) = self.buffer.remove(&next) else {
                return Ok(());
            };
            match self.ledger.commit_block(&block) {
                Ok(()) => {
                    self.pool.remove_committed(&block);
                }
                Err(e) => {
                    warn!(height = next, error = %e, "Dropping buffered block");
                }
            }
        }
    }

    /// Broadcasts a request for the blocks in `from..=to`.
    pub async fn request_range(&self, from: u64, to: u64, timestamp_ms: u64) -> Result<usize, EnvError> {
        let payload = serde_json::to_vec(&SyncRequest { from, to })
            .map_err(|e| EnvError::SerializationError(e.to_string()))?;
        let peers = self
            .overlay
            .broadcast(OverlayPacket::new(payload, timestamp_ms))
            .await;
        info!(from, to, peers, "Requested missing blocks");
        Ok(peers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Identity;
    use crate::block::{Genesis, Hash32};
    use crate::config::ChainConfig;
    use async_trait::async_trait;
    use dposim_env::{ChainId, PlayerId};
    use ed25519_dalek::SigningKey;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::sync::Mutex;

    /// Overlay that records broadcasts.
    #[derive(Default)]
    struct RecordingOverlay {
        sent: Mutex<Vec<OverlayPacket>>,
    }

    #[async_trait]
    impl PeerOverlay for RecordingOverlay {
        async fn send(&self, peer: &str, _packet: OverlayPacket) -> Result<(), EnvError> {
            Err(EnvError::unreachable(peer))
        }

        async fn broadcast(&self, packet: OverlayPacket) -> usize {
            self.sent.lock().unwrap().push(packet);
            1
        }

        fn local_id(&self) -> PlayerId {
            PlayerId(0)
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        syncer: BlockSyncer<RecordingOverlay>,
        overlay: Arc<RecordingOverlay>,
        producer: Identity,
    }

    fn fixture(buffer_size: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = ChainConfig {
            chain_db_path: dir.path().join("chain.db"),
            in_memory: true,
            ..ChainConfig::default()
        };
        let ledger = Arc::new(Ledger::open(&config, &Genesis { timestamp_ms: 0 }).unwrap());
        let pool = Arc::new(TxPool::new(ledger.clone(), 16));
        let producer = Identity::new(
            ChainId::for_player(PlayerId(1)),
            SigningKey::generate(&mut ChaCha8Rng::seed_from_u64(1)),
        );
        let delegates = Arc::new(DelegatePool::with_addresses(vec![producer
            .address()
            .raw()
            .to_string()]));
        let overlay = Arc::new(RecordingOverlay::default());
        let syncer = BlockSyncer::new(
            BlockSyncConfig { buffer_size },
            ledger,
            pool,
            overlay.clone(),
            delegates,
        );
        Fixture {
            _dir: dir,
            syncer,
            overlay,
            producer,
        }
    }

    /// Chain of `n` blocks on top of genesis.
    fn chain(producer: &Identity, n: u64) -> Vec<Block> {
        let mut prev = Genesis { timestamp_ms: 0 }.block().hash();
        (1..=n)
            .map(|height| {
                let block = Block::mint(height, prev, height * 10, producer, vec![]);
                prev = block.hash();
                block
            })
            .collect()
    }

    #[test]
    fn test_next_block_commits() {
        let mut f = fixture(4);
        let blocks = chain(&f.producer, 1);
        assert_eq!(
            f.syncer.process_block(blocks[0].clone()).unwrap(),
            SyncOutcome::Committed { tip: 1 }
        );
        assert_eq!(
            f.syncer.process_block(blocks[0].clone()).unwrap(),
            SyncOutcome::Stale { tip: 1 }
        );
    }

    #[test]
    fn test_gap_buffers_then_drains() {
        let mut f = fixture(4);
        let blocks = chain(&f.producer, 3);

        assert_eq!(
            f.syncer.process_block(blocks[2].clone()).unwrap(),
            SyncOutcome::Buffered {
                missing_from: 1,
                missing_to: 2
            }
        );
        assert_eq!(
            f.syncer.process_block(blocks[1].clone()).unwrap(),
            SyncOutcome::Buffered {
                missing_from: 1,
                missing_to: 1
            }
        );
        assert_eq!(f.syncer.buffered(), 2);

        assert_eq!(
            f.syncer.process_block(blocks[0].clone()).unwrap(),
            SyncOutcome::Committed { tip: 3 }
        );
        assert_eq!(f.syncer.buffered(), 0);
    }

    #[test]
    fn test_full_buffer_keeps_lowest_heights() {
        let mut f = fixture(1);
        let blocks = chain(&f.producer, 4);

        f.syncer.process_block(blocks[3].clone()).unwrap();
        f.syncer.process_block(blocks[2].clone()).unwrap();
        assert_eq!(f.syncer.buffered(), 1);

        f.syncer.process_block(blocks[1].clone()).unwrap();
        f.syncer.process_block(blocks[0].clone()).unwrap();
        assert_eq!(f.syncer.ledger().tip_height().unwrap(), 2);
    }

    #[test]
    fn test_rejects_non_delegate_producer() {
        let mut f = fixture(4);
        let outsider = Identity::new(
            ChainId::for_player(PlayerId(9)),
            SigningKey::generate(&mut ChaCha8Rng::seed_from_u64(9)),
        );
        let block = Block::mint(1, Hash32::ZERO, 10, &outsider, vec![]);
        assert!(matches!(
            f.syncer.process_block(block),
            Err(LedgerError::InvalidBlock { height: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_request_range_broadcasts() {
        let f = fixture(4);
        let peers = f.syncer.request_range(1, 3, 42).await.unwrap();
        assert_eq!(peers, 1);

        let sent = f.overlay.sent.lock().unwrap();
        let request: SyncRequest = serde_json::from_slice(&sent[0].payload).unwrap();
        assert_eq!(request, SyncRequest { from: 1, to: 3 });
        assert_eq!(sent[0].timestamp_ms, 42);
    }
}
