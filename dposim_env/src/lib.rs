//! DPoS Simulator Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seams that let a consensus engine run
//! unchanged inside the simulator or against a real clock:
//! - Time and task spawning (`HarnessContext`)
//! - Outbound peer traffic (`PeerOverlay`)
//! - Protocol output towards the driver (`OutputSink`)
//! - Randomness (`derive_signing_key()`)
//!
//! With a seeded context every key and timestamp a player produces is
//! reproducible from the seed alone.
//!
//! # Example
//!
//! ```ignore
//! use dposim_env::{Envelope, HarnessContext, TokioContext};
//!
//! let ctx = TokioContext::shared();
//! let key = ctx.derive_signing_key(0);
//! let envelope = Envelope::combine(1, hex::decode("deadbeef")?);
//! ```

mod completion;
mod context;
mod error;
mod output;
mod overlay;
mod tokio_impl;
mod types;

pub use completion::{completion_channel, CompletionSignal, EventOutcome};
pub use context::HarnessContext;
pub use error::EnvError;
pub use output::OutputSink;
pub use overlay::PeerOverlay;
pub use tokio_impl::TokioContext;
pub use types::{ChainId, Envelope, OverlayPacket, PlayerId, ProtocolOutput};
