//! Protocol output abstraction.

use crate::types::ProtocolOutput;

/// Destination for a consensus engine's protocol output.
///
/// The engine neither knows nor cares who is listening: in the simulator
/// the sink forwards to whichever driver session is currently bound to the
/// player, and silently drops output when nobody is.
pub trait OutputSink: Send + Sync + 'static {
    /// Delivers one output message.
    ///
    /// # Returns
    /// * `true` - The output was handed to a live session
    /// * `false` - No session was bound, or the session has gone away
    fn emit(&self, output: ProtocolOutput) -> bool;
}
