//! DPoS Simulator Core - the collaborators behind each simulated player
//!
//! Every player in the simulator is a full RollDPoS participant built from
//! the pieces in this crate:
//! 1. **Config**: TOML configuration with chain, network, delegate and consensus sections
//! 2. **Ledger**: `sled`-backed chain storage with a deterministic genesis
//! 3. **Pool + Sync**: a bounded transfer pool and a block-sync unit
//! 4. **Consensus**: the view-change state machine and its actor adapter

pub mod address;
pub mod block;
pub mod blocksync;
pub mod config;
pub mod consensus;
pub mod delegate;
pub mod ledger;
pub mod txpool;

#[cfg(test)]
mod testing;

// Re-export key types for convenience
pub use address::{Address, Identity};
pub use block::{Block, Genesis, Hash32, Transfer};
pub use blocksync::{BlockSyncer, SyncOutcome};
pub use config::{Config, ConfigError};
pub use consensus::{ConsensusEngine, MessageError, MessageKind, ViewChangeMsg, VoteKind};
pub use delegate::DelegatePool;
pub use ledger::{Ledger, LedgerError};
pub use txpool::{PoolError, TxPool};
