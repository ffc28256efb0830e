//! NodeInstance - one simulated RollDPoS player.
//!
//! Wires a player's private collaborators together:
//! - an identity rebuilt from the miner keys in its configuration
//! - its own ledger, transfer pool, overlay and sync unit
//! - a consensus engine whose output goes to the player's session slot

use crate::controller::{InitError, InjectError};
use crate::overlay::SimOverlay;
use crate::session::{InFlightGuard, Session, SessionSlot};
use dposim_core::consensus::RollDpos;
use dposim_core::{
    Address, BlockSyncer, Config, ConsensusEngine, DelegatePool, Genesis, Identity, Ledger,
    LedgerError, TxPool,
};
use dposim_env::{CompletionSignal, Envelope, HarnessContext, PlayerId};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

type NodeEngine<C> = ConsensusEngine<C, SessionSlot, SimOverlay>;

/// A simulated player with isolated state.
pub struct NodeInstance<C: HarnessContext> {
    player_id: PlayerId,
    address: Address,
    ledger: Arc<Ledger>,
    pool: Arc<TxPool>,
    overlay: Arc<SimOverlay>,
    delegates: Arc<DelegatePool>,
    slot: Arc<SessionSlot>,
    engine: NodeEngine<C>,
}

impl<C: HarnessContext> NodeInstance<C> {
    /// Builds a player from its own configuration. The engine is not started.
    pub fn build(
        player_id: PlayerId,
        config: &Config,
        delegates: Arc<DelegatePool>,
        ctx: Arc<C>,
    ) -> Result<Self, InitError> {
        let ledger_error = |source: LedgerError| InitError::Ledger {
            player: player_id,
            source,
        };

        let identity = Identity::from_miner_config(&config.chain.miner)?;
        let address = identity.address().clone();

        let genesis = Genesis {
            timestamp_ms: config.chain.genesis_timestamp_ms,
        };
        let ledger = Arc::new(Ledger::open(&config.chain, &genesis).map_err(ledger_error)?);
        let pool = Arc::new(TxPool::new(ledger.clone(), config.txpool.max_size));
        let overlay = Arc::new(SimOverlay::new(
            player_id,
            config.network.peers.clone(),
            config.network.max_outbound_queue,
        ));
        let syncer = BlockSyncer::new(
            config.block_sync.clone(),
            ledger.clone(),
            pool.clone(),
            overlay.clone(),
            delegates.clone(),
        );
        let fsm = RollDpos::new(
            identity,
            delegates.clone(),
            pool.clone(),
            syncer,
            config.consensus.clone(),
            ctx.now(),
        )
        .map_err(ledger_error)?;

        let slot = Arc::new(SessionSlot::new(player_id));
        let engine = ConsensusEngine::new(
            player_id,
            fsm,
            config.consensus.propose_interval(),
            ctx,
            slot.clone(),
        );

        info!(
            player = %player_id,
            address = %address,
            ledger = %ledger.path().display(),
            "Built player"
        );

        Ok(Self {
            player_id,
            address,
            ledger,
            pool,
            overlay,
            delegates,
            slot,
            engine,
        })
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn chain_db_path(&self) -> &Path {
        self.ledger.path()
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn pool(&self) -> &Arc<TxPool> {
        &self.pool
    }

    pub fn overlay(&self) -> &Arc<SimOverlay> {
        &self.overlay
    }

    pub fn delegates(&self) -> &Arc<DelegatePool> {
        &self.delegates
    }

    /// Height of the last committed block.
    pub fn tip_height(&self) -> Result<u64, LedgerError> {
        self.ledger.tip_height()
    }

    /// Starts the consensus engine.
    pub fn start(&self) -> bool {
        self.engine.start()
    }

    /// Routes this player's output to `session` until the next binding.
    ///
    /// Fails with `PlayerBusy` while another call holds the player.
    pub fn set_session(&self, session: &Session) -> Result<InFlightGuard, InjectError> {
        self.slot.bind(session)
    }

    pub fn bound_session(&self) -> Option<u64> {
        self.slot.bound_session()
    }

    /// Feeds `envelope` to the engine; `done` fires once it has reacted.
    pub fn handle_event(&self, envelope: Envelope, done: CompletionSignal) {
        self.engine.handle_event(envelope, done);
    }

    pub fn shutdown(&self) {
        self.engine.shutdown();
    }

    pub fn is_stopped(&self) -> bool {
        self.engine.is_stopped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimContext;
    use dposim_env::{completion_channel, ChainId, EventOutcome};

    fn player_config(dir: &tempfile::TempDir, identity: &Identity) -> Config {
        let mut config = Config::default();
        config.chain.chain_db_path = dir.path().join("chain0.db");
        config.chain.miner = identity.to_miner_config();
        config
    }

    fn solo(ctx: &Arc<SimContext>) -> (Identity, Arc<DelegatePool>) {
        let identity = Identity::new(ChainId::for_player(PlayerId(0)), ctx.derive_signing_key(0));
        let delegates = Arc::new(DelegatePool::with_addresses(vec![identity
            .address()
            .raw()
            .to_string()]));
        (identity, delegates)
    }

    #[tokio::test]
    async fn test_build_and_drive_single_player() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = SimContext::shared(42);
        let (identity, delegates) = solo(&ctx);

        let node = NodeInstance::build(PlayerId(0), &player_config(&dir, &identity), delegates, ctx)
            .unwrap();
        assert_eq!(node.address(), identity.address());
        assert_eq!(node.chain_db_path(), dir.path().join("chain0.db"));
        assert!(node.start());

        let (session, mut rx) = Session::open();
        let guard = node.set_session(&session).unwrap();
        let (done, outcome) = completion_channel();
        node.handle_event(Envelope::combine(3, Vec::new()), done);

        assert_eq!(outcome.await.unwrap(), EventOutcome::Processed { emitted: 3 });
        drop(guard);
        assert_eq!(node.tip_height().unwrap(), 1);
        for _ in 0..3 {
            assert!(rx.try_recv().is_ok());
        }
        assert_eq!(node.bound_session(), Some(session.id()));
    }

    #[tokio::test]
    async fn test_mismatched_miner_keys_fail_build() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = SimContext::shared(42);
        let (identity, delegates) = solo(&ctx);
        let mut config = player_config(&dir, &identity);
        config.chain.miner.public_key = "00".repeat(32);

        let result = NodeInstance::build(PlayerId(0), &config, delegates, ctx);
        assert!(matches!(result, Err(InitError::Config(_))));
    }

    #[tokio::test]
    async fn test_shutdown_abandons_pending_events() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = SimContext::shared(1);
        let (identity, delegates) = solo(&ctx);
        let node = NodeInstance::build(PlayerId(0), &player_config(&dir, &identity), delegates, ctx)
            .unwrap();

        node.shutdown();
        let (done, outcome) = completion_channel();
        node.handle_event(Envelope::combine(3, Vec::new()), done);
        assert_eq!(outcome.await.unwrap(), EventOutcome::Abandoned);
    }
}
