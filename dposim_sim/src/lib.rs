//! DPoS Simulator - multi-player RollDPoS simulation harness
//!
//! Hosts N independently initialized consensus players in one process and
//! lets an external driver inject protocol messages into any of them,
//! observing each player's output on the driver's own session.
//!
//! # Core Principle: One Reaction Per Inject
//!
//! An Inject call returns only after the targeted player's engine has
//! reacted to the injected envelope:
//! - **Envelope**: the message-type tag combined with the hex-decoded payload
//! - **Session slot**: at most one Inject in flight per player
//! - **Completion signal**: fired exactly once per envelope, even if the
//!   engine stops first
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Simulator                           │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ Player arena (RwLock<Vec<Arc<NodeInstance>>>)        │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                        │                            │
//! │  ┌────▼────┐              ┌────▼────┐                       │
//! │  │ Player  │              │ Player  │     ...               │
//! │  │   #0    │              │   #1    │                       │
//! │  │ ledger  │              │ ledger  │                       │
//! │  │ engine ─┼──┐           │ engine ─┼──┐                    │
//! │  └─────────┘  │           └─────────┘  │                    │
//! │               ▼                        ▼                    │
//! │         SessionSlot              SessionSlot                │
//! └───────────────┼────────────────────────┼────────────────────┘
//!                 └────────► Session ◄─────┘
//!                       (driver connection)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use dposim_sim::{Session, SimContext, Simulator, SimulatorOptions};
//!
//! let sim = Simulator::new(SimContext::shared(42), SimulatorOptions::default());
//! sim.init(2).await?;
//!
//! let (session, mut outputs) = Session::open();
//! let report = sim.inject(0, 1, "deadbeef", &session).await?;
//! ```

mod context;
mod controller;
mod node;
mod overlay;
mod server;
mod session;
pub mod wire;

pub use context::SimContext;
pub use controller::{
    InitError, InitReport, InjectError, InjectReport, Simulator, SimulatorOptions, MAX_PLAYERS,
};
pub use node::NodeInstance;
pub use overlay::{Outbound, SimOverlay};
pub use server::SimServer;
pub use session::{InFlightGuard, Session, SessionSlot};
