//! Player addresses and signing identities.
//!
//! An address is `"io" + hex(chain id) + hex(sha256(public key)[..20])`, so
//! the chain a key was minted for can be read back from the address and the
//! key can be checked against it without any registry.

use crate::config::{ConfigError, MinerConfig};
use dposim_env::ChainId;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

const ADDRESS_PREFIX: &str = "io";
const KEY_HASH_LEN: usize = 20;

/// A public address bound to a chain identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    raw: String,
    chain_id: ChainId,
    public_key: VerifyingKey,
}

impl Address {
    /// Derives the address of `public_key` on `chain_id`.
    pub fn new(chain_id: ChainId, public_key: VerifyingKey) -> Self {
        Self {
            raw: Self::render(chain_id, &public_key),
            chain_id,
            public_key,
        }
    }

    fn render(chain_id: ChainId, public_key: &VerifyingKey) -> String {
        let digest = Sha256::digest(public_key.as_bytes());
        format!(
            "{}{}{}",
            ADDRESS_PREFIX,
            chain_id.to_hex(),
            hex::encode(&digest[..KEY_HASH_LEN])
        )
    }

    /// Checks that `raw` is the address of `public_key`.
    pub fn matches_key(raw: &str, public_key: &VerifyingKey) -> bool {
        let Some(chain_hex) = raw
            .strip_prefix(ADDRESS_PREFIX)
            .and_then(|rest| rest.get(..8))
        else {
            return false;
        };
        match ChainId::from_hex(chain_hex) {
            Some(chain_id) => Self::render(chain_id, public_key) == raw,
            None => false,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn public_key(&self) -> &VerifyingKey {
        &self.public_key
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.as_bytes())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A player's signing key together with its address.
#[derive(Debug, Clone)]
pub struct Identity {
    signing_key: SigningKey,
    address: Address,
}

impl Identity {
    /// Creates the identity of `signing_key` on `chain_id`.
    pub fn new(chain_id: ChainId, signing_key: SigningKey) -> Self {
        let address = Address::new(chain_id, signing_key.verifying_key());
        Self {
            signing_key,
            address,
        }
    }

    /// Rebuilds an identity from the hex key material in a miner config.
    ///
    /// The private key is authoritative; the public key and raw address
    /// must agree with it.
    pub fn from_miner_config(miner: &MinerConfig) -> Result<Self, ConfigError> {
        let mut secret = [0u8; 32];
        hex::decode_to_slice(&miner.private_key, &mut secret)
            .map_err(|e| ConfigError::Invalid(format!("chain.miner.private_key: {}", e)))?;
        let signing_key = SigningKey::from_bytes(&secret);
        let public_key = signing_key.verifying_key();

        if hex::encode(public_key.as_bytes()) != miner.public_key {
            return Err(ConfigError::Invalid(
                "chain.miner.public_key does not match private_key".to_string(),
            ));
        }
        if !Address::matches_key(&miner.raw_address, &public_key) {
            return Err(ConfigError::Invalid(format!(
                "chain.miner.raw_address '{}' does not match public_key",
                miner.raw_address
            )));
        }

        let chain_id = miner
            .raw_address
            .get(2..10)
            .and_then(ChainId::from_hex)
            .ok_or_else(|| ConfigError::Invalid("chain.miner.raw_address".to_string()))?;
        Ok(Self::new(chain_id, signing_key))
    }

    /// Renders this identity as miner key material.
    pub fn to_miner_config(&self) -> MinerConfig {
        MinerConfig {
            public_key: self.address.public_key_hex(),
            private_key: hex::encode(self.signing_key.to_bytes()),
            raw_address: self.address.raw().to_string(),
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }
}

/// Verifies an ed25519 signature given hex-encoded key and signature.
pub fn verify_hex(public_key_hex: &str, message: &[u8], signature_hex: &str) -> bool {
    let mut key_bytes = [0u8; 32];
    let mut sig_bytes = [0u8; 64];
    if hex::decode_to_slice(public_key_hex, &mut key_bytes).is_err()
        || hex::decode_to_slice(signature_hex, &mut sig_bytes).is_err()
    {
        return false;
    }
    let Ok(key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    key.verify(message, &Signature::from_bytes(&sig_bytes)).is_ok()
}

/// Parses a hex-encoded verifying key.
pub fn parse_public_key(public_key_hex: &str) -> Option<VerifyingKey> {
    let mut key_bytes = [0u8; 32];
    hex::decode_to_slice(public_key_hex, &mut key_bytes).ok()?;
    VerifyingKey::from_bytes(&key_bytes).ok()
}
