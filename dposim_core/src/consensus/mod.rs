//! RollDPoS consensus for a single simulated player.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ConsensusEngine (actor)                  │
//! │   mailbox ──► decode Envelope ──► RollDpos::handle()        │
//! │                                        │                    │
//! │                     ┌──────────────────┴──────────┐         │
//! │                     ▼                             ▼         │
//! │           Action::Emit → OutputSink   Action::RequestSync   │
//! │                                        → BlockSyncer/overlay│
//! │   then: CompletionSignal::fire(outcome)                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! `RollDpos` is synchronous and deterministic; all I/O happens in the
//! engine task that drives it.

mod engine;
mod fsm;
mod message;

pub use engine::ConsensusEngine;
pub use fsm::{Action, Phase, Reaction, RollDpos};
pub use message::{ConsensusMessage, MessageError, MessageKind, ViewChangeMsg, VoteKind};
