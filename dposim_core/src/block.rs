//! Blocks, transfers, and the genesis marker.

use crate::address::{parse_public_key, verify_hex, Address, Identity};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// 32-byte SHA-256 digest, serialized as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    pub const ZERO: Hash32 = Hash32([0u8; 32]);

    pub fn digest(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).ok()?;
        Some(Self(bytes))
    }
}

impl std::fmt::Display for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short form for logs
        write!(f, "{}", &self.to_hex()[..8])
    }
}

impl Serialize for Hash32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash32::from_hex(&s).ok_or_else(|| serde::de::Error::custom("expected 64 hex characters"))
    }
}

/// A value transfer between two addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub sender: String,
    pub recipient: String,
    pub amount: u64,
    pub nonce: u64,
}

impl Transfer {
    pub fn hash(&self) -> Hash32 {
        let mut bytes = Vec::with_capacity(self.sender.len() + self.recipient.len() + 18);
        bytes.extend_from_slice(self.sender.as_bytes());
        bytes.push(0);
        bytes.extend_from_slice(self.recipient.as_bytes());
        bytes.push(0);
        bytes.extend_from_slice(&self.amount.to_le_bytes());
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        Hash32::digest(&bytes)
    }
}

/// Genesis parameters shared by every player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Genesis {
    pub timestamp_ms: u64,
}

impl Genesis {
    pub const PRODUCER: &'static str = "genesis";

    pub fn block(&self) -> Block {
        Block {
            height: 0,
            prev_hash: Hash32::ZERO,
            timestamp_ms: self.timestamp_ms,
            producer: Self::PRODUCER.to_string(),
            producer_key: String::new(),
            transfers: Vec::new(),
            signature: String::new(),
        }
    }
}

/// A block of transfers, signed by its producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub prev_hash: Hash32,
    pub timestamp_ms: u64,

    /// Producer address
    pub producer: String,

    /// Producer public key (hex)
    pub producer_key: String,

    pub transfers: Vec<Transfer>,

    /// Producer signature over `hash()` (hex)
    pub signature: String,
}

impl Block {
    /// Builds and signs a block on top of `prev_hash`.
    pub fn mint(
        height: u64,
        prev_hash: Hash32,
        timestamp_ms: u64,
        identity: &Identity,
        transfers: Vec<Transfer>,
    ) -> Self {
        let mut block = Block {
            height,
            prev_hash,
            timestamp_ms,
            producer: identity.address().raw().to_string(),
            producer_key: identity.address().public_key_hex(),
            transfers,
            signature: String::new(),
        };
        block.signature = hex::encode(identity.sign(&block.hash().0).to_bytes());
        block
    }

    /// Hash of the block header and transfer hashes (signature excluded).
    pub fn hash(&self) -> Hash32 {
        let mut bytes = Vec::with_capacity(128 + 32 * self.transfers.len());
        bytes.extend_from_slice(&self.height.to_le_bytes());
        bytes.extend_from_slice(&self.prev_hash.0);
        bytes.extend_from_slice(&self.timestamp_ms.to_le_bytes());
        bytes.extend_from_slice(self.producer.as_bytes());
        bytes.push(0);
        bytes.extend_from_slice(self.producer_key.as_bytes());
        bytes.push(0);
        for transfer in &self.transfers {
            bytes.extend_from_slice(&transfer.hash().0);
        }
        Hash32::digest(&bytes)
    }

    /// Checks the producer signature and that the producer address belongs
    /// to the producer key.
    pub fn verify_producer(&self) -> bool {
        let Some(key) = parse_public_key(&self.producer_key) else {
            return false;
        };
        Address::matches_key(&self.producer, &key)
            && verify_hex(&self.producer_key, &self.hash().0, &self.signature)
    }
}
