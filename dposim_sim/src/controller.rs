//! Simulator - owns the players and serves Init and Inject.

use crate::node::NodeInstance;
use crate::session::Session;
use dposim_core::{Config, ConfigError, DelegatePool, Identity, LedgerError};
use dposim_env::{completion_channel, ChainId, Envelope, EventOutcome, HarnessContext, PlayerId};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Upper bound on players in one simulation; each one owns a ledger and an engine task.
pub const MAX_PLAYERS: u32 = 4096;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to open ledger for player {player}: {source}")]
    Ledger {
        player: PlayerId,
        #[source]
        source: LedgerError,
    },

    #[error("Cannot add {requested} players to {existing}: limit is {}", MAX_PLAYERS)]
    TooManyPlayers { existing: usize, requested: u32 },
}

#[derive(Debug, Error)]
pub enum InjectError {
    #[error("Unknown player {player_id} (simulation has {players} players)")]
    UnknownPlayer { player_id: u32, players: usize },

    #[error("Payload is not valid hex: {0}")]
    PayloadDecode(#[from] hex::FromHexError),

    #[error("Player {0} is already handling an inject")]
    PlayerBusy(PlayerId),

    #[error("Engine of player {0} stopped before completing the event")]
    EngineStopped(PlayerId),
}

/// Where players get their configuration and storage.
#[derive(Debug, Clone)]
pub struct SimulatorOptions {
    /// Base configuration file; built-in defaults when absent
    pub config_path: Option<PathBuf>,

    /// Directory holding one ledger per player
    pub data_dir: PathBuf,
}

impl Default for SimulatorOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            data_dir: PathBuf::from("./dposim-data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub first_player: PlayerId,
    pub added: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectReport {
    pub session_id: u64,
    pub player_id: PlayerId,
    pub outcome: EventOutcome,
}

/// The simulation controller.
///
/// Players live in an append-only arena indexed by `PlayerId`. Init holds
/// the write lock for the whole batch; Inject only clones a handle under
/// the read lock, so injects to different players run concurrently.
pub struct Simulator<C: HarnessContext> {
    ctx: Arc<C>,
    options: SimulatorOptions,
    players: RwLock<Vec<Arc<NodeInstance<C>>>>,
}

impl<C: HarnessContext> Simulator<C> {
    pub fn new(ctx: Arc<C>, options: SimulatorOptions) -> Self {
        Self {
            ctx,
            options,
            players: RwLock::new(Vec::new()),
        }
    }

    pub fn context(&self) -> &Arc<C> {
        &self.ctx
    }

    fn load_config(&self) -> Result<Config, ConfigError> {
        match &self.options.config_path {
            Some(path) => Config::load(path),
            None => {
                let config = Config::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Adds `n_players` started players after the existing ones.
    ///
    /// The batch is all-or-nothing: on error no player is added.
    pub async fn init(&self, n_players: u32) -> Result<InitReport, InitError> {
        let mut players = self.players.write().await;
        let existing = players.len();
        let first = u32::try_from(existing)
            .ok()
            .filter(|first| {
                first
                    .checked_add(n_players)
                    .is_some_and(|total| total <= MAX_PLAYERS)
            })
            .ok_or(InitError::TooManyPlayers {
                existing,
                requested: n_players,
            })?;

        let base = self.load_config()?;

        let mut configs = Vec::new();
        for index in first..first + n_players {
            let player_id = PlayerId(index);
            let identity = Identity::new(
                ChainId::for_player(player_id),
                self.ctx.derive_signing_key(player_id.seed_extension()),
            );
            let mut config = base.clone();
            config.chain.chain_db_path = self.options.data_dir.join(format!("chain{}.db", index));
            config.chain.miner = identity.to_miner_config();
            configs.push((player_id, identity.address().raw().to_string(), config));
        }

        let delegates = Arc::new(if base.delegate.from_players {
            DelegatePool::with_addresses(configs.iter().map(|(_, addr, _)| addr.clone()).collect())
        } else {
            DelegatePool::from_config(&base.delegate)
        });

        let mut batch = Vec::with_capacity(configs.len());
        for (player_id, _, config) in &configs {
            match NodeInstance::build(*player_id, config, delegates.clone(), self.ctx.clone()) {
                Ok(node) => batch.push(Arc::new(node)),
                Err(e) => {
                    error!(player = %player_id, error = %e, "Init failed, discarding batch");
                    for node in &batch {
                        node.shutdown();
                    }
                    return Err(e);
                }
            }
        }

        for node in &batch {
            node.start();
        }
        players.extend(batch);

        info!(
            added = n_players,
            total = players.len(),
            delegates = delegates.len(),
            seed = self.ctx.seed(),
            "Initialized players"
        );
        Ok(InitReport {
            first_player: PlayerId(first),
            added: n_players as usize,
            total: players.len(),
        })
    }

    pub async fn player_count(&self) -> usize {
        self.players.read().await.len()
    }

    pub async fn player(&self, player_id: u32) -> Option<Arc<NodeInstance<C>>> {
        self.players.read().await.get(player_id as usize).cloned()
    }

    /// Injects one hex-encoded message into a player and waits until the
    /// player's engine has reacted to it.
    ///
    /// Output produced meanwhile is delivered on `session`.
    pub async fn inject(
        &self,
        player_id: u32,
        internal_msg_type: u32,
        value_hex: &str,
        session: &Session,
    ) -> Result<InjectReport, InjectError> {
        let payload = hex::decode(value_hex).map_err(|e| {
            warn!(player_id, error = %e, "Rejecting inject with malformed payload");
            InjectError::PayloadDecode(e)
        })?;

        let node = {
            let players = self.players.read().await;
            players
                .get(player_id as usize)
                .cloned()
                .ok_or(InjectError::UnknownPlayer {
                    player_id,
                    players: players.len(),
                })?
        };

        let _in_flight = node.set_session(session)?;

        let envelope = Envelope::combine(internal_msg_type, payload);
        let (done, completed) = completion_channel();
        debug!(
            player = %node.player_id(),
            session = session.id(),
            tag = internal_msg_type,
            bytes = envelope.payload().len(),
            "Injecting envelope"
        );
        node.handle_event(envelope, done);

        let outcome = completed.await.unwrap_or(EventOutcome::Abandoned);
        if outcome == EventOutcome::Abandoned {
            return Err(InjectError::EngineStopped(node.player_id()));
        }
        Ok(InjectReport {
            session_id: session.id(),
            player_id: node.player_id(),
            outcome,
        })
    }

    /// Stops every player's engine.
    pub async fn shutdown(&self) {
        let players = self.players.read().await;
        for node in players.iter() {
            node.shutdown();
        }
        info!(players = players.len(), "Simulation stopped");
    }
}
