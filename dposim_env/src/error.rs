//! Error types for the environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Overlay send failed (queue full, overlay closed, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Target peer is not known to the overlay
    #[error("Peer unreachable: {0}")]
    NodeUnreachable(String),

    /// Packet serialization/deserialization failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl EnvError {
    /// Creates a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkError(msg.into())
    }

    /// Creates an unreachable error.
    pub fn unreachable(peer: impl std::fmt::Display) -> Self {
        Self::NodeUnreachable(peer.to_string())
    }
}
