//! One-shot completion signalling between a driver call and an engine.

use tokio::sync::oneshot;
use tracing::warn;

/// How an engine reacted to one injected envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// The envelope was processed; `emitted` outputs were produced.
    Processed { emitted: usize },

    /// The envelope was understood to be irrelevant or malformed and
    /// dropped without any state change.
    Ignored { reason: String },

    /// The engine went away before reacting to the envelope.
    Abandoned,
}

/// Write side of a completion signal.
///
/// Fired exactly once: `fire` consumes the signal, and a signal dropped
/// unfired reports `EventOutcome::Abandoned` from its `Drop` impl.
#[derive(Debug)]
pub struct CompletionSignal {
    tx: Option<oneshot::Sender<EventOutcome>>,
}

/// Creates a connected completion signal and the receiver the caller waits on.
pub fn completion_channel() -> (CompletionSignal, oneshot::Receiver<EventOutcome>) {
    let (tx, rx) = oneshot::channel();
    (CompletionSignal { tx: Some(tx) }, rx)
}

impl CompletionSignal {
    /// Reports the outcome and consumes the signal.
    pub fn fire(mut self, outcome: EventOutcome) {
        if let Some(tx) = self.tx.take() {
            // Receiver gone means the caller stopped waiting; nothing to do.
            let _ = tx.send(outcome);
        }
    }
}

impl Drop for CompletionSignal {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            warn!("completion signal dropped without firing");
            let _ = tx.send(EventOutcome::Abandoned);
        }
    }
}
