//! Consensus message kinds and their envelope encoding.

use crate::block::{Block, Hash32, Transfer};
use dposim_env::{Envelope, ProtocolOutput};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors decoding an envelope into a consensus message.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("Unknown message type tag {0}")]
    UnknownTag(u32),

    #[error("Malformed {kind:?} payload: {reason}")]
    Malformed { kind: MessageKind, reason: String },
}

/// Message-type tags understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Propose / prevote / vote traffic
    ViewChange = 0,

    /// A committed block gossiped by a peer
    Block = 1,

    /// A transfer for the pool
    Transfer = 2,

    /// The round timer fired
    TimerTick = 3,
}

impl MessageKind {
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(MessageKind::ViewChange),
            1 => Some(MessageKind::Block),
            2 => Some(MessageKind::Transfer),
            3 => Some(MessageKind::TimerTick),
            _ => None,
        }
    }

    pub fn tag(self) -> u32 {
        self as u32
    }
}

/// Step of a view-change round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoteKind {
    Propose,
    Prevote,
    Vote,
}

/// A view-change message: a proposal or a ballot on one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewChangeMsg {
    pub vc_type: VoteKind,
    pub height: u64,
    pub round: u32,

    /// Proposed block (`Propose` only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<Block>,

    /// Ballot target (`Prevote`/`Vote`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<Hash32>,

    #[serde(default)]
    pub decision: bool,

    /// Sender address
    pub sender: String,
}

impl ViewChangeMsg {
    /// Encodes this message as engine output.
    pub fn to_output(&self) -> ProtocolOutput {
        // Plain data with string keys; serialization cannot fail.
        let value = serde_json::to_vec(self).unwrap_or_default();
        ProtocolOutput::new(MessageKind::ViewChange.tag(), value)
    }
}

/// A decoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusMessage {
    ViewChange(ViewChangeMsg),
    Block(Block),
    Transfer(Transfer),
    TimerTick,
}

impl ConsensusMessage {
    /// Interprets an envelope according to its tag.
    pub fn decode(envelope: &Envelope) -> Result<Self, MessageError> {
        let kind = MessageKind::from_tag(envelope.tag())
            .ok_or(MessageError::UnknownTag(envelope.tag()))?;
        let malformed = |e: serde_json::Error| MessageError::Malformed {
            kind,
            reason: e.to_string(),
        };

        match kind {
            MessageKind::ViewChange => serde_json::from_slice(envelope.payload())
                .map(ConsensusMessage::ViewChange)
                .map_err(malformed),
            MessageKind::Block => serde_json::from_slice(envelope.payload())
                .map(ConsensusMessage::Block)
                .map_err(malformed),
            MessageKind::Transfer => serde_json::from_slice(envelope.payload())
                .map(ConsensusMessage::Transfer)
                .map_err(malformed),
            MessageKind::TimerTick => Ok(ConsensusMessage::TimerTick),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            ConsensusMessage::ViewChange(_) => MessageKind::ViewChange,
            ConsensusMessage::Block(_) => MessageKind::Block,
            ConsensusMessage::Transfer(_) => MessageKind::Transfer,
            ConsensusMessage::TimerTick => MessageKind::TimerTick,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn prevote() -> ViewChangeMsg {
        ViewChangeMsg {
            vc_type: VoteKind::Prevote,
            height: 1,
            round: 0,
            block: None,
            block_hash: Some(Hash32::digest(b"b")),
            decision: true,
            sender: "io00000000ab".to_string(),
        }
    }

    #[test]
    fn test_output_reinjects() {
        let output = prevote().to_output();
        assert_eq!(output.message_type, 0);

        let decoded = ConsensusMessage::decode(&output.into_envelope()).unwrap();
        assert_eq!(decoded, ConsensusMessage::ViewChange(prevote()));
    }

    #[test]
    fn test_vc_type_wire_names() {
        let json = serde_json::to_value(prevote()).unwrap();
        assert_eq!(json["vc_type"], "PREVOTE");
        assert!(json.get("block").is_none());
    }

    #[test]
    fn test_unknown_tag() {
        let envelope = Envelope::combine(99, Vec::new());
        assert!(matches!(
            ConsensusMessage::decode(&envelope),
            Err(MessageError::UnknownTag(99))
        ));
    }

    #[test]
    fn test_garbage_payload_is_malformed() {
        let envelope = Envelope::combine(1, vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(matches!(
            ConsensusMessage::decode(&envelope),
            Err(MessageError::Malformed {
                kind: MessageKind::Block,
                ..
            })
        ));
    }

    #[test]
    fn test_timer_tick_ignores_payload() {
        let envelope = Envelope::combine(3, vec![1, 2, 3]);
        assert_eq!(
            ConsensusMessage::decode(&envelope).unwrap(),
            ConsensusMessage::TimerTick
        );
    }

    #[test]
    fn test_tags_round_trip() {
        for kind in [
            MessageKind::ViewChange,
            MessageKind::Block,
            MessageKind::Transfer,
            MessageKind::TimerTick,
        ] {
            assert_eq!(MessageKind::from_tag(kind.tag()), Some(kind));
        }
    }

    proptest! {
        #[test]
        fn combining_the_same_inputs_decodes_identically(
            tag in 0u32..6,
            payload in proptest::collection::vec(any::<u8>(), 0..64),
        ) {
            let a = Envelope::combine(tag, payload.clone());
            let b = Envelope::combine(tag, payload);
            prop_assert_eq!(&a, &b);
            let da = ConsensusMessage::decode(&a).map_err(|e| e.to_string());
            let db = ConsensusMessage::decode(&b).map_err(|e| e.to_string());
            prop_assert_eq!(da, db);
        }
    }
}
