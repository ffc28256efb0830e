//! Common types for the simulator environment abstraction.

use serde::{Deserialize, Serialize};

/// Identifier of a simulated player.
///
/// Assigned sequentially at initialization and stable for the lifetime of
/// the simulation; doubles as the index into the simulator's player arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u32);

impl PlayerId {
    /// Returns the arena index for this player.
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    /// Returns the value used to derive this player's keys.
    pub fn seed_extension(&self) -> u64 {
        self.0 as u64
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PlayerId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Per-player chain identifier (4 bytes, little-endian player index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainId(pub [u8; 4]);

impl ChainId {
    /// Derives the chain identifier for a player.
    pub fn for_player(player: PlayerId) -> Self {
        Self(player.0.to_le_bytes())
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Lowercase hex rendering, as embedded in addresses.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses the 8-character hex rendering produced by `to_hex`.
    pub fn from_hex(s: &str) -> Option<Self> {
        let mut bytes = [0u8; 4];
        hex::decode_to_slice(s, &mut bytes).ok()?;
        Some(Self(bytes))
    }
}

/// A protocol message addressed to one player's consensus engine.
///
/// The envelope pairs a message-type tag with an opaque payload. Its
/// internal structure is only meaningful to the engine that consumes it.
/// Envelopes are immutable and are consumed by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Envelope {
    tag: u32,
    payload: Vec<u8>,
}

impl Envelope {
    /// Combines a message-type tag with a raw payload.
    ///
    /// Total: any tag and any payload (including an empty one) produce an
    /// envelope, and equal inputs produce equal envelopes.
    pub fn combine(tag: u32, payload: Vec<u8>) -> Self {
        Self { tag, payload }
    }

    /// Returns the message-type tag.
    pub fn tag(&self) -> u32 {
        self.tag
    }

    /// Returns the payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Splits the envelope back into tag and payload.
    pub fn into_parts(self) -> (u32, Vec<u8>) {
        (self.tag, self.payload)
    }
}

/// One message emitted by a consensus engine towards the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolOutput {
    /// Message-type tag, in the same numbering as injected envelopes
    pub message_type: u32,

    /// Encoded message body
    pub value: Vec<u8>,
}

impl ProtocolOutput {
    /// Creates a new output.
    pub fn new(message_type: u32, value: Vec<u8>) -> Self {
        Self { message_type, value }
    }

    /// Re-wraps this output as an envelope, so it can be injected into
    /// another player.
    pub fn into_envelope(self) -> Envelope {
        Envelope::combine(self.message_type, self.value)
    }
}

/// Packet handed to a player's peer overlay.
///
/// A transport-layer wrapper: the content is opaque bytes that would be
/// decoded by the receiving peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayPacket {
    /// Raw packet bytes
    pub payload: Vec<u8>,

    /// Timestamp when the packet was created (sender's clock)
    pub timestamp_ms: u64,

    /// Routing hint for multi-hop delivery
    pub hop_count: u8,
}

impl OverlayPacket {
    /// Creates a new packet from payload bytes.
    pub fn new(payload: Vec<u8>, timestamp_ms: u64) -> Self {
        Self {
            payload,
            timestamp_ms,
            hop_count: 0,
        }
    }

    /// Returns the payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}
