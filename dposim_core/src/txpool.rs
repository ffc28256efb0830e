//! Bounded, insertion-ordered transfer pool.

use crate::block::{Block, Hash32, Transfer};
use crate::ledger::Ledger;
use indexmap::IndexMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

/// Pool admission errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("Transfer {0} is already pooled")]
    Duplicate(Hash32),

    #[error("Pool is full ({0} transfers)")]
    Full(usize),

    #[error("Invalid transfer: {0}")]
    Invalid(String),
}

/// Pending transfers waiting to be packed into a block.
pub struct TxPool {
    /// Ledger this pool feeds
    ledger: Arc<Ledger>,
    max_size: usize,
    pending: Mutex<IndexMap<Hash32, Transfer>>,
}

impl TxPool {
    pub fn new(ledger: Arc<Ledger>, max_size: usize) -> Self {
        Self {
            ledger,
            max_size,
            pending: Mutex::new(IndexMap::new()),
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Admits a transfer, returning its hash.
    pub fn add(&self, transfer: Transfer) -> Result<Hash32, PoolError> {
        if transfer.amount == 0 {
            return Err(PoolError::Invalid("zero amount".to_string()));
        }
        if transfer.sender.is_empty() || transfer.recipient.is_empty() {
            return Err(PoolError::Invalid("missing sender or recipient".to_string()));
        }
        if transfer.sender == transfer.recipient {
            return Err(PoolError::Invalid("sender equals recipient".to_string()));
        }

        let hash = transfer.hash();
        let mut pending = self.lock();
        if pending.contains_key(&hash) {
            return Err(PoolError::Duplicate(hash));
        }
        if pending.len() >= self.max_size {
            return Err(PoolError::Full(self.max_size));
        }
        pending.insert(hash, transfer);
        debug!(hash = %hash, pooled = pending.len(), "Transfer pooled");
        Ok(hash)
    }

    /// Oldest `limit` transfers, left in the pool until committed.
    pub fn pick(&self, limit: usize) -> Vec<Transfer> {
        self.lock().values().take(limit).cloned().collect()
    }

    /// Drops every transfer contained in a committed block.
    pub fn remove_committed(&self, block: &Block) -> usize {
        let mut pending = self.lock();
        let before = pending.len();
        for transfer in &block.transfers {
            pending.shift_remove(&transfer.hash());
        }
        before - pending.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IndexMap<Hash32, Transfer>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Genesis;
    use crate::config::ChainConfig;

    fn pool(max_size: usize) -> (tempfile::TempDir, TxPool) {
        let dir = tempfile::tempdir().unwrap();
        let config = ChainConfig {
            chain_db_path: dir.path().join("chain.db"),
            in_memory: true,
            ..ChainConfig::default()
        };
        let ledger = Ledger::open(&config, &Genesis { timestamp_ms: 0 }).unwrap();
        (dir, TxPool::new(Arc::new(ledger), max_size))
    }

    fn transfer(nonce: u64) -> Transfer {
        Transfer {
            sender: "alice".to_string(),
            recipient: "bob".to_string(),
            amount: 5,
            nonce,
        }
    }

    #[test]
    fn test_add_and_pick_in_order() {
        let (_dir, pool) = pool(10);
        for nonce in 0..3 {
            pool.add(transfer(nonce)).unwrap();
        }

        let picked = pool.pick(2);
        assert_eq!(picked, vec![transfer(0), transfer(1)]);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn test_rejects_duplicates_and_overflow() {
        let (_dir, pool) = pool(2);
        let hash = pool.add(transfer(0)).unwrap();
        assert_eq!(pool.add(transfer(0)), Err(PoolError::Duplicate(hash)));

        pool.add(transfer(1)).unwrap();
        assert_eq!(pool.add(transfer(2)), Err(PoolError::Full(2)));
    }

    #[test]
    fn test_rejects_invalid_transfers() {
        let (_dir, pool) = pool(2);
        let mut zero = transfer(0);
        zero.amount = 0;
        assert!(matches!(pool.add(zero), Err(PoolError::Invalid(_))));

        let mut loopback = transfer(0);
        loopback.recipient = loopback.sender.clone();
        assert!(matches!(pool.add(loopback), Err(PoolError::Invalid(_))));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_remove_committed() {
        let (_dir, pool) = pool(10);
        pool.add(transfer(0)).unwrap();
        pool.add(transfer(1)).unwrap();

        let mut block = Genesis { timestamp_ms: 0 }.block();
        block.transfers = vec![transfer(0), transfer(7)];

        assert_eq!(pool.remove_committed(&block), 1);
        assert_eq!(pool.pick(10), vec![transfer(1)]);
    }
}
