//! The ledger: a `sled`-backed chain of blocks.
//!
//! Blocks are stored as JSON keyed by big-endian height, so the last entry
//! of the tree is always the tip. Each player opens its own database; no
//! two players ever share one.

use crate::block::{Block, Genesis, Hash32};
use crate::config::ChainConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid block at height {height}: {reason}")]
    InvalidBlock { height: u64, reason: String },

    #[error("Genesis mismatch: stored {stored}, expected {expected}")]
    GenesisMismatch { stored: Hash32, expected: Hash32 },
}

impl LedgerError {
    fn invalid(height: u64, reason: impl Into<String>) -> Self {
        Self::InvalidBlock {
            height,
            reason: reason.into(),
        }
    }
}

/// One player's chain.
pub struct Ledger {
    db: sled::Db,
    blocks: sled::Tree,
    path: PathBuf,
}

impl Ledger {
    /// Opens (or creates) the ledger described by `config`, writing the
    /// genesis block into a fresh database.
    pub fn open(config: &ChainConfig, genesis: &Genesis) -> Result<Self, LedgerError> {
        let db = sled::Config::new()
            .path(&config.chain_db_path)
            .temporary(config.in_memory)
            .open()
            .map_err(|e| LedgerError::StorageError(format!("Failed to open sled DB: {}", e)))?;
        let blocks = db
            .open_tree("blocks")
            .map_err(|e| LedgerError::StorageError(format!("Failed to open tree: {}", e)))?;

        let ledger = Self {
            db,
            blocks,
            path: config.chain_db_path.clone(),
        };

        let expected = genesis.block();
        match ledger.block_by_height(0)? {
            Some(stored) if stored.hash() != expected.hash() => {
                return Err(LedgerError::GenesisMismatch {
                    stored: stored.hash(),
                    expected: expected.hash(),
                });
            }
            Some(_) => {
                info!(
                    path = %ledger.path.display(),
                    height = ledger.tip_height()?,
                    "Reopened existing ledger"
                );
            }
            None => {
                ledger.put(&expected)?;
                debug!(path = %ledger.path.display(), "Created ledger with genesis");
            }
        }

        Ok(ledger)
    }

    /// Location of the underlying database.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The highest committed block.
    pub fn tip(&self) -> Result<Block, LedgerError> {
        let (_, value) = self
            .blocks
            .last()
            .map_err(|e| LedgerError::StorageError(format!("Read failed: {}", e)))?
            .ok_or_else(|| LedgerError::StorageError("ledger has no genesis".to_string()))?;
        decode(&value)
    }

    pub fn tip_height(&self) -> Result<u64, LedgerError> {
        Ok(self.tip()?.height)
    }

    pub fn tip_hash(&self) -> Result<Hash32, LedgerError> {
        Ok(self.tip()?.hash())
    }

    pub fn block_by_height(&self, height: u64) -> Result<Option<Block>, LedgerError> {
        self.blocks
            .get(height.to_be_bytes())
            .map_err(|e| LedgerError::StorageError(format!("Read failed: {}", e)))?
            .map(|value| decode(&value))
            .transpose()
    }

    /// Checks that `block` can be appended to the current tip.
    pub fn validate_block(&self, block: &Block) -> Result<(), LedgerError> {
        let tip = self.tip()?;
        if block.height != tip.height + 1 {
            return Err(LedgerError::invalid(
                block.height,
                format!("expected height {}", tip.height + 1),
            ));
        }
        if block.prev_hash != tip.hash() {
            return Err(LedgerError::invalid(
                block.height,
                format!("prev_hash {} does not match tip {}", block.prev_hash, tip.hash()),
            ));
        }
        if block.timestamp_ms < tip.timestamp_ms {
            return Err(LedgerError::invalid(block.height, "timestamp precedes tip"));
        }
        if !block.verify_producer() {
            return Err(LedgerError::invalid(block.height, "bad producer signature"));
        }
        Ok(())
    }

    /// Validates and appends `block`.
    pub fn commit_block(&self, block: &Block) -> Result<(), LedgerError> {
        self.validate_block(block)?;
        self.put(block)?;
        info!(
            height = block.height,
            hash = %block.hash(),
            producer = %block.producer,
            transfers = block.transfers.len(),
            "Committed block"
        );
        Ok(())
    }

    fn put(&self, block: &Block) -> Result<(), LedgerError> {
        let value = serde_json::to_vec(block)
            .map_err(|e| LedgerError::SerializationError(e.to_string()))?;
        self.blocks
            .insert(block.height.to_be_bytes(), value)
            .map_err(|e| LedgerError::StorageError(format!("Insert failed: {}", e)))?;
        self.db
            .flush()
            .map_err(|e| LedgerError::StorageError(format!("Flush failed: {}", e)))?;
        Ok(())
    }
}

fn decode(value: &[u8]) -> Result<Block, LedgerError> {
    serde_json::from_slice(value).map_err(|e| LedgerError::SerializationError(e.to_string()))
}
