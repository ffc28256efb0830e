//! RollDPoS view-change state machine.
//!
//! Synchronous and deterministic: given the same state, message and clock
//! readings it always returns the same actions. It owns the player's sync
//! unit and mutates the ledger only through it.

use super::message::{ConsensusMessage, ViewChangeMsg, VoteKind};
use crate::address::Identity;
use crate::block::{Block, Hash32};
use crate::blocksync::{BlockSyncer, SyncOutcome};
use crate::config::ConsensusConfig;
use crate::delegate::DelegatePool;
use crate::ledger::LedgerError;
use crate::txpool::TxPool;
use dposim_env::PeerOverlay;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where the current round stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the round's proposal
    Idle,
    /// Proposal seen, collecting prevotes
    AcceptPrevote,
    /// Prevote quorum reached, collecting votes
    AcceptVote,
}

/// Side effect requested by the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send a view-change message to the driver session
    Emit(ViewChangeMsg),

    /// Ask peers for the blocks in `from..=to`
    RequestSync { from: u64, to: u64 },
}

/// Result of handling one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    Acted(Vec<Action>),
    Ignored(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Ballot {
    hash: Hash32,
    decision: bool,
}

#[derive(Debug)]
struct RoundState {
    height: u64,
    round: u32,
    phase: Phase,
    started_at: Duration,
    proposal: Option<Block>,
    prevotes: BTreeMap<String, Ballot>,
    votes: BTreeMap<String, Ballot>,
}

impl RoundState {
    fn new(height: u64, round: u32, now: Duration) -> Self {
        Self {
            height,
            round,
            phase: Phase::Idle,
            started_at: now,
            proposal: None,
            prevotes: BTreeMap::new(),
            votes: BTreeMap::new(),
        }
    }
}

/// One player's consensus state.
pub struct RollDpos<Net: PeerOverlay> {
    identity: Identity,
    delegates: Arc<DelegatePool>,
    pool: Arc<TxPool>,
    syncer: BlockSyncer<Net>,
    config: ConsensusConfig,
    state: RoundState,
}

impl<Net: PeerOverlay> RollDpos<Net> {
    /// Starts at round 0 of the height after the ledger tip.
    pub fn new(
        identity: Identity,
        delegates: Arc<DelegatePool>,
        pool: Arc<TxPool>,
        syncer: BlockSyncer<Net>,
        config: ConsensusConfig,
        now: Duration,
    ) -> Result<Self, LedgerError> {
        let height = syncer.ledger().tip_height()? + 1;
        Ok(Self {
            identity,
            delegates,
            pool,
            syncer,
            config,
            state: RoundState::new(height, 0, now),
        })
    }

    pub fn height(&self) -> u64 {
        self.state.height
    }

    pub fn round(&self) -> u32 {
        self.state.round
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn syncer(&self) -> &BlockSyncer<Net> {
        &self.syncer
    }

    fn own_address(&self) -> &str {
        self.identity.address().raw()
    }

    /// Handles one decoded message.
    ///
    /// `now` drives round timeouts; `wall_ms` stamps proposed blocks.
    pub fn handle(&mut self, message: ConsensusMessage, now: Duration, wall_ms: u64) -> Reaction {
        match message {
            ConsensusMessage::ViewChange(msg) => self.on_view_change(msg, now),
            ConsensusMessage::Block(block) => self.on_block(block, now),
            ConsensusMessage::Transfer(transfer) => match self.pool.add(transfer) {
                Ok(_) => Reaction::Acted(Vec::new()),
                Err(e) => Reaction::Ignored(e.to_string()),
            },
            ConsensusMessage::TimerTick => self.on_timer(now, wall_ms),
        }
    }

    fn on_view_change(&mut self, msg: ViewChangeMsg, now: Duration) -> Reaction {
        if msg.sender == self.own_address() {
            return Reaction::Ignored("own message".to_string());
        }
        if !self.delegates.contains(&msg.sender) {
            return Reaction::Ignored(format!("sender {} is not a delegate", msg.sender));
        }
        if msg.height != self.state.height {
            return Reaction::Ignored(format!(
                "message for height {}, consensus is at {}",
                msg.height, self.state.height
            ));
        }
        if msg.round < self.state.round {
            return Reaction::Ignored(format!(
                "stale round {} (current {})",
                msg.round, self.state.round
            ));
        }
        if msg.round > self.state.round {
            if msg.vc_type != VoteKind::Propose {
                return Reaction::Ignored(format!(
                    "ballot for future round {} (current {})",
                    msg.round, self.state.round
                ));
            }
            // Only a proposal that would be accepted in its round may move us there.
            let Some(block) = msg.block.as_ref() else {
                return Reaction::Ignored("proposal without block".to_string());
            };
            if let Err(reason) = self.validate_proposal(&msg.sender, block, msg.round) {
                return Reaction::Ignored(format!(
                    "future round {} proposal rejected: {}",
                    msg.round, reason
                ));
            }
            info!(
                height = self.state.height,
                from = self.state.round,
                to = msg.round,
                "Catching up to proposer's round"
            );
            self.enter_round(msg.round, now);
        }

        match msg.vc_type {
            VoteKind::Propose => self.on_propose(msg, now),
            VoteKind::Prevote | VoteKind::Vote => {
                let Some(hash) = msg.block_hash else {
                    return Reaction::Ignored("ballot without block hash".to_string());
                };
                let ballot = Ballot {
                    hash,
                    decision: msg.decision,
                };
                let ballots = match msg.vc_type {
                    VoteKind::Prevote => &mut self.state.prevotes,
                    _ => &mut self.state.votes,
                };
                if ballots.contains_key(&msg.sender) {
                    return Reaction::Ignored(format!(
                        "duplicate {:?} from {}",
                        msg.vc_type, msg.sender
                    ));
                }
                ballots.insert(msg.sender, ballot);

                let mut actions = self.check_prevotes(now);
                actions.extend(self.check_votes(now));
                Reaction::Acted(actions)
            }
        }
    }

    fn on_propose(&mut self, msg: ViewChangeMsg, now: Duration) -> Reaction {
        if self.state.phase != Phase::Idle {
            return Reaction::Ignored(format!(
                "round {} already has a proposal",
                self.state.round
            ));
        }
        let Some(block) = msg.block else {
            return Reaction::Ignored("proposal without block".to_string());
        };

        let decision = match self.validate_proposal(&msg.sender, &block, self.state.round) {
            Ok(()) => true,
            Err(reason) => {
                warn!(
                    height = block.height,
                    round = self.state.round,
                    %reason,
                    "Rejecting proposal"
                );
                false
            }
        };
        Reaction::Acted(self.accept_proposal(block, decision, now))
    }

    fn validate_proposal(&self, sender: &str, block: &Block, round: u32) -> Result<(), String> {
        if block.height != self.state.height {
            return Err(format!("block height {} in round for {}", block.height, self.state.height));
        }
        if block.producer != sender {
            return Err(format!("sender {} did not produce the block", sender));
        }
        let expected = self.delegates.proposer(self.state.height, round);
        if expected != Some(block.producer.as_str()) {
            return Err(format!(
                "{} is not the proposer for round {}",
                block.producer, round
            ));
        }
        self.syncer
            .ledger()
            .validate_block(block)
            .map_err(|e| e.to_string())
    }

    fn accept_proposal(&mut self, block: Block, decision: bool, now: Duration) -> Vec<Action> {
        let hash = block.hash();
        debug!(height = block.height, hash = %hash, decision, "Accepted proposal");
        if decision {
            self.state.proposal = Some(block);
        }
        self.state.phase = Phase::AcceptPrevote;

        let mut actions = self.cast(VoteKind::Prevote, Ballot { hash, decision });
        actions.extend(self.check_prevotes(now));
        actions
    }

    /// Records and announces this node's own ballot (delegates only).
    fn cast(&mut self, kind: VoteKind, ballot: Ballot) -> Vec<Action> {
        if !self.delegates.contains(self.own_address()) {
            return Vec::new();
        }
        let sender = self.own_address().to_string();
        match kind {
            VoteKind::Prevote => self.state.prevotes.insert(sender.clone(), ballot),
            _ => self.state.votes.insert(sender.clone(), ballot),
        };
        vec![Action::Emit(ViewChangeMsg {
            vc_type: kind,
            height: self.state.height,
            round: self.state.round,
            block: None,
            block_hash: Some(ballot.hash),
            decision: ballot.decision,
            sender,
        })]
    }

    fn quorum_ballot(&self, ballots: &BTreeMap<String, Ballot>) -> Option<Ballot> {
        let mut tally: BTreeMap<Ballot, usize> = BTreeMap::new();
        for ballot in ballots.values() {
            *tally.entry(*ballot).or_default() += 1;
        }
        let quorum = self.delegates.quorum();
        tally
            .into_iter()
            .find(|(_, count)| *count >= quorum)
            .map(|(ballot, _)| ballot)
    }

    fn check_prevotes(&mut self, now: Duration) -> Vec<Action> {
        if self.state.phase != Phase::AcceptPrevote {
            return Vec::new();
        }
        let Some(ballot) = self.quorum_ballot(&self.state.prevotes) else {
            return Vec::new();
        };
        debug!(height = self.state.height, decision = ballot.decision, "Prevote quorum");
        self.state.phase = Phase::AcceptVote;

        let mut actions = self.cast(VoteKind::Vote, ballot);
        actions.extend(self.check_votes(now));
        actions
    }

    fn check_votes(&mut self, now: Duration) -> Vec<Action> {
        if self.state.phase != Phase::AcceptVote {
            return Vec::new();
        }
        let Some(ballot) = self.quorum_ballot(&self.state.votes) else {
            return Vec::new();
        };

        if !ballot.decision {
            info!(
                height = self.state.height,
                round = self.state.round,
                "Delegates rejected the proposal, changing view"
            );
            self.advance_round(now);
            return Vec::new();
        }

        let proposal = self
            .state
            .proposal
            .take()
            .filter(|block| block.hash() == ballot.hash);
        let Some(block) = proposal else {
            // Agreed on a block this node never accepted; fetch it.
            warn!(height = self.state.height, hash = %ballot.hash, "Vote quorum on unknown block");
            let height = self.state.height;
            self.advance_round(now);
            return vec![Action::RequestSync {
                from: height,
                to: height,
            }];
        };

        match self.syncer.commit(&block) {
            Ok(()) => {
                info!(
                    height = block.height,
                    round = self.state.round,
                    hash = %ballot.hash,
                    "Consensus reached"
                );
                self.enter_next_height(now);
            }
            Err(e) => {
                warn!(height = block.height, error = %e, "Failed to commit agreed block");
                self.advance_round(now);
            }
        }
        Vec::new()
    }

    fn on_block(&mut self, block: Block, now: Duration) -> Reaction {
        match self.syncer.process_block(block) {
            Ok(SyncOutcome::Committed { tip }) => {
                if tip >= self.state.height {
                    self.enter_next_height(now);
                }
                Reaction::Acted(Vec::new())
            }
            Ok(SyncOutcome::Buffered {
                missing_from,
                missing_to,
            }) => Reaction::Acted(vec![Action::RequestSync {
                from: missing_from,
                to: missing_to,
            }]),
            Ok(SyncOutcome::Stale { tip }) => {
                Reaction::Ignored(format!("stale block, ledger tip is {}", tip))
            }
            Err(e) => Reaction::Ignored(e.to_string()),
        }
    }

    fn on_timer(&mut self, now: Duration, wall_ms: u64) -> Reaction {
        let proposer = self
            .delegates
            .proposer(self.state.height, self.state.round)
            .map(str::to_string);
        if self.state.phase == Phase::Idle && proposer.as_deref() == Some(self.own_address()) {
            return match self.propose(now, wall_ms) {
                Ok(actions) => Reaction::Acted(actions),
                Err(e) => Reaction::Ignored(format!("cannot propose: {}", e)),
            };
        }

        if now.saturating_sub(self.state.started_at) >= self.config.round_timeout() {
            info!(
                height = self.state.height,
                round = self.state.round,
                "Round timed out, changing view"
            );
            if !self.advance_round(now) {
                return Reaction::Ignored(format!(
                    "round number exhausted at height {}",
                    self.state.height
                ));
            }
            return Reaction::Acted(Vec::new());
        }
        Reaction::Ignored("round timer not yet expired".to_string())
    }

    fn propose(&mut self, now: Duration, wall_ms: u64) -> Result<Vec<Action>, LedgerError> {
        let tip = self.syncer.ledger().tip()?;
        let transfers = self.pool.pick(self.config.max_transfers_per_block);
        let block = Block::mint(
            self.state.height,
            tip.hash(),
            wall_ms.max(tip.timestamp_ms),
            &self.identity,
            transfers,
        );
        info!(
            height = block.height,
            round = self.state.round,
            transfers = block.transfers.len(),
            "Proposing block"
        );

        let mut actions = vec![Action::Emit(ViewChangeMsg {
            vc_type: VoteKind::Propose,
            height: self.state.height,
            round: self.state.round,
            block_hash: Some(block.hash()),
            block: Some(block.clone()),
            decision: true,
            sender: self.own_address().to_string(),
        })];
        actions.extend(self.accept_proposal(block, true, now));
        Ok(actions)
    }

    fn enter_round(&mut self, round: u32, now: Duration) {
        self.state = RoundState::new(self.state.height, round, now);
    }

    /// Moves to the next round. Returns `false`, leaving the state alone,
    /// when the round number cannot grow.
    fn advance_round(&mut self, now: Duration) -> bool {
        match self.state.round.checked_add(1) {
            Some(next) => {
                self.enter_round(next, now);
                true
            }
            None => {
                warn!(height = self.state.height, "Round number exhausted");
                false
            }
        }
    }

    fn enter_next_height(&mut self, now: Duration) {
        let height = match self.syncer.ledger().tip_height() {
            Ok(tip) => tip + 1,
            Err(e) => {
                warn!(error = %e, "Cannot read ledger tip");
                self.state.height + 1
            }
        };
        self.state = RoundState::new(height, 0, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Transfer;
    use crate::testing::{identity, open_ledger, NullOverlay};
    use crate::config::BlockSyncConfig;

    struct Fixture {
        _dir: tempfile::TempDir,
        fsm: RollDpos<NullOverlay>,
        /// Delegates other than the local node, in rotation order
        peers: Vec<Identity>,
    }

    /// Local node is delegate 0 of `n`.
    fn fixture(n: u64) -> Fixture {
        let (dir, ledger) = open_ledger();
        let local = identity(0);
        let peers: Vec<Identity> = (1..n).map(identity).collect();
        let delegates = Arc::new(DelegatePool::with_addresses(
            std::iter::once(&local)
                .chain(peers.iter())
                .map(|id| id.address().raw().to_string())
                .collect(),
        ));
        let pool = Arc::new(TxPool::new(ledger.clone(), 16));
        let syncer = BlockSyncer::new(
            BlockSyncConfig::default(),
            ledger,
            pool.clone(),
            Arc::new(NullOverlay),
            delegates.clone(),
        );
        let fsm = RollDpos::new(
            local,
            delegates,
            pool,
            syncer,
            ConsensusConfig::default(),
            Duration::ZERO,
        )
        .unwrap();
        Fixture {
            _dir: dir,
            fsm,
            peers,
        }
    }

    fn ballot(from: &Identity, kind: VoteKind, height: u64, round: u32, hash: Hash32, decision: bool) -> ConsensusMessage {
        ConsensusMessage::ViewChange(ViewChangeMsg {
            vc_type: kind,
            height,
            round,
            block: None,
            block_hash: Some(hash),
            decision,
            sender: from.address().raw().to_string(),
        })
    }

    fn proposal(from: &Identity, fsm: &RollDpos<NullOverlay>, round: u32) -> (Block, ConsensusMessage) {
        let tip = fsm.syncer().ledger().tip().unwrap();
        let block = Block::mint(fsm.height(), tip.hash(), tip.timestamp_ms + 1, from, vec![]);
        let msg = ConsensusMessage::ViewChange(ViewChangeMsg {
            vc_type: VoteKind::Propose,
            height: fsm.height(),
            round,
            block_hash: Some(block.hash()),
            block: Some(block.clone()),
            decision: true,
            sender: from.address().raw().to_string(),
        });
        (block, msg)
    }

    fn emitted(reaction: Reaction) -> Vec<ViewChangeMsg> {
        match reaction {
            Reaction::Acted(actions) => actions
                .into_iter()
                .filter_map(|a| match a {
                    Action::Emit(msg) => Some(msg),
                    Action::RequestSync { .. } => None,
                })
                .collect(),
            Reaction::Ignored(reason) => panic!("unexpectedly ignored: {}", reason),
        }
    }

    #[test]
    fn test_single_delegate_commits_on_timer() {
        let mut f = fixture(1);
        let out = emitted(f.fsm.handle(ConsensusMessage::TimerTick, Duration::ZERO, 1_704_067_200_500));

        let kinds: Vec<VoteKind> = out.iter().map(|m| m.vc_type).collect();
        assert_eq!(kinds, vec![VoteKind::Propose, VoteKind::Prevote, VoteKind::Vote]);
        assert_eq!(f.fsm.syncer().ledger().tip_height().unwrap(), 1);
        assert_eq!(f.fsm.height(), 2);
        assert_eq!(f.fsm.phase(), Phase::Idle);
    }

    #[test]
    fn test_four_delegates_full_round() {
        let mut f = fixture(4);
        // Height 1, round 0: proposer is delegate 1
        let proposer = f.peers[0].clone();
        let (block, msg) = proposal(&proposer, &f.fsm, 0);
        let hash = block.hash();

        let out = emitted(f.fsm.handle(msg, Duration::ZERO, 0));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].vc_type, VoteKind::Prevote);
        assert!(out[0].decision);
        assert_eq!(f.fsm.phase(), Phase::AcceptPrevote);

        let b = f.peers[1].clone();
        let c = f.peers[2].clone();
        assert!(emitted(f.fsm.handle(ballot(&b, VoteKind::Prevote, 1, 0, hash, true), Duration::ZERO, 0)).is_empty());
        let out = emitted(f.fsm.handle(ballot(&c, VoteKind::Prevote, 1, 0, hash, true), Duration::ZERO, 0));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].vc_type, VoteKind::Vote);
        assert_eq!(f.fsm.phase(), Phase::AcceptVote);

        emitted(f.fsm.handle(ballot(&proposer, VoteKind::Vote, 1, 0, hash, true), Duration::ZERO, 0));
        assert_eq!(f.fsm.height(), 1);
        emitted(f.fsm.handle(ballot(&b, VoteKind::Vote, 1, 0, hash, true), Duration::ZERO, 0));

        assert_eq!(f.fsm.syncer().ledger().tip_hash().unwrap(), hash);
        assert_eq!(f.fsm.height(), 2);
        assert_eq!(f.fsm.round(), 0);
    }

    #[test]
    fn test_wrong_proposer_gets_negative_prevote() {
        let mut f = fixture(4);
        let impostor = f.peers[1].clone();
        let (_, msg) = proposal(&impostor, &f.fsm, 0);

        let out = emitted(f.fsm.handle(msg, Duration::ZERO, 0));
        assert_eq!(out[0].vc_type, VoteKind::Prevote);
        assert!(!out[0].decision);
    }

    #[test]
    fn test_negative_vote_quorum_changes_view() {
        let mut f = fixture(4);
        let hash = Hash32::digest(b"rejected");
        for peer in f.peers.clone() {
            f.fsm.handle(ballot(&peer, VoteKind::Prevote, 1, 0, hash, false), Duration::ZERO, 0);
        }
        // Prevotes alone don't advance an Idle round
        assert_eq!(f.fsm.phase(), Phase::Idle);

        let (_, msg) = proposal(&f.peers[1].clone(), &f.fsm, 0);
        f.fsm.handle(msg, Duration::ZERO, 0);
        assert_eq!(f.fsm.phase(), Phase::AcceptVote);

        for peer in f.peers.clone() {
            f.fsm.handle(ballot(&peer, VoteKind::Vote, 1, 0, hash, false), Duration::ZERO, 0);
        }
        assert_eq!(f.fsm.round(), 1);
        assert_eq!(f.fsm.phase(), Phase::Idle);
        assert_eq!(f.fsm.syncer().ledger().tip_height().unwrap(), 0);
    }

    #[test]
    fn test_ignores_irrelevant_ballots() {
        let mut f = fixture(4);
        let hash = Hash32::digest(b"x");
        let peer = f.peers[0].clone();

        let outsider = identity(99);
        assert!(matches!(
            f.fsm.handle(ballot(&outsider, VoteKind::Prevote, 1, 0, hash, true), Duration::ZERO, 0),
            Reaction::Ignored(_)
        ));
        assert!(matches!(
            f.fsm.handle(ballot(&peer, VoteKind::Prevote, 5, 0, hash, true), Duration::ZERO, 0),
            Reaction::Ignored(_)
        ));
        assert!(matches!(
            f.fsm.handle(ballot(&peer, VoteKind::Prevote, 1, 3, hash, true), Duration::ZERO, 0),
            Reaction::Ignored(_)
        ));

        f.fsm.handle(ballot(&peer, VoteKind::Prevote, 1, 0, hash, true), Duration::ZERO, 0);
        assert!(matches!(
            f.fsm.handle(ballot(&peer, VoteKind::Prevote, 1, 0, hash, true), Duration::ZERO, 0),
            Reaction::Ignored(_)
        ));
    }

    #[test]
    fn test_timer_on_non_proposer_changes_view() {
        let mut f = fixture(4);
        assert_eq!(f.fsm.handle(ConsensusMessage::TimerTick, Duration::ZERO, 0), Reaction::Acted(vec![]));
        assert_eq!(f.fsm.round(), 1);
    }

    #[test]
    fn test_timer_respects_round_timeout() {
        let mut f = fixture(4);
        f.fsm.config.round_timeout_ms = 1_000;
        assert!(matches!(
            f.fsm.handle(ConsensusMessage::TimerTick, Duration::from_millis(500), 0),
            Reaction::Ignored(_)
        ));
        f.fsm.handle(ConsensusMessage::TimerTick, Duration::from_millis(1_000), 0);
        assert_eq!(f.fsm.round(), 1);
    }

    #[test]
    fn test_future_round_proposal_catches_up() {
        let mut f = fixture(4);
        // Height 1, round 1: proposer is delegate 2
        let proposer = f.peers[1].clone();
        let (_, msg) = proposal(&proposer, &f.fsm, 1);

        let out = emitted(f.fsm.handle(msg, Duration::ZERO, 0));
        assert_eq!(f.fsm.round(), 1);
        assert!(out[0].decision);
    }

    #[test]
    fn test_bogus_future_round_proposal_changes_nothing() {
        let mut f = fixture(4);
        let sender = f.peers[0].clone();
        let empty = ConsensusMessage::ViewChange(ViewChangeMsg {
            vc_type: VoteKind::Propose,
            height: 1,
            round: u32::MAX,
            block: None,
            block_hash: None,
            decision: true,
            sender: sender.address().raw().to_string(),
        });
        assert!(matches!(f.fsm.handle(empty, Duration::ZERO, 0), Reaction::Ignored(_)));
        assert_eq!(f.fsm.round(), 0);

        // Round 1 belongs to peers[1].
        let (_, wrong) = proposal(&f.peers[2].clone(), &f.fsm, 1);
        assert!(matches!(f.fsm.handle(wrong, Duration::ZERO, 0), Reaction::Ignored(_)));
        assert_eq!(f.fsm.round(), 0);

        f.fsm.handle(ConsensusMessage::TimerTick, Duration::ZERO, 0);
        assert_eq!(f.fsm.round(), 1);
    }

    #[test]
    fn test_timer_at_last_round_does_not_overflow() {
        let mut f = fixture(3);
        f.fsm.enter_round(u32::MAX, Duration::ZERO);
        assert_ne!(
            f.fsm.delegates.proposer(1, u32::MAX),
            Some(f.fsm.own_address())
        );

        assert!(matches!(
            f.fsm.handle(ConsensusMessage::TimerTick, Duration::ZERO, 0),
            Reaction::Ignored(_)
        ));
        assert_eq!(f.fsm.round(), u32::MAX);
        assert!(matches!(
            f.fsm.handle(ConsensusMessage::TimerTick, Duration::ZERO, 0),
            Reaction::Ignored(_)
        ));
    }

    #[test]
    fn test_gossiped_block_advances_height() {
        let mut f = fixture(4);
        let (block, _) = proposal(&f.peers[0].clone(), &f.fsm, 0);

        assert_eq!(f.fsm.handle(ConsensusMessage::Block(block.clone()), Duration::ZERO, 0), Reaction::Acted(vec![]));
        assert_eq!(f.fsm.height(), 2);
        assert!(matches!(
            f.fsm.handle(ConsensusMessage::Block(block), Duration::ZERO, 0),
            Reaction::Ignored(_)
        ));
    }

    #[test]
    fn test_future_block_requests_sync() {
        let mut f = fixture(4);
        let peer = f.peers[0].clone();
        let block = Block::mint(3, Hash32::digest(b"h2"), 5, &peer, vec![]);

        assert_eq!(
            f.fsm.handle(ConsensusMessage::Block(block), Duration::ZERO, 0),
            Reaction::Acted(vec![Action::RequestSync { from: 1, to: 2 }])
        );
    }

    #[test]
    fn test_pooled_transfers_are_proposed_and_cleared() {
        let mut f = fixture(1);
        let transfer = Transfer {
            sender: "alice".to_string(),
            recipient: "bob".to_string(),
            amount: 3,
            nonce: 0,
        };
        assert_eq!(
            f.fsm.handle(ConsensusMessage::Transfer(transfer.clone()), Duration::ZERO, 0),
            Reaction::Acted(vec![])
        );
        assert!(matches!(
            f.fsm.handle(ConsensusMessage::Transfer(transfer.clone()), Duration::ZERO, 0),
            Reaction::Ignored(_)
        ));

        let out = emitted(f.fsm.handle(ConsensusMessage::TimerTick, Duration::ZERO, 0));
        assert_eq!(out[0].block.as_ref().unwrap().transfers, vec![transfer]);
        assert!(f.fsm.pool.is_empty());
    }

    #[test]
    fn test_echoed_own_message_is_ignored() {
        let mut f = fixture(1);
        let out = emitted(f.fsm.handle(ConsensusMessage::TimerTick, Duration::ZERO, 0));
        let echo = ConsensusMessage::ViewChange(out[0].clone());
        assert_eq!(f.fsm.handle(echo, Duration::ZERO, 0), Reaction::Ignored("own message".to_string()));
    }
}
