//! Delegate (validator) set view.

use crate::config::DelegateConfig;

/// The ordered delegate set a player votes with.
///
/// Order is significant: it is the proposer rotation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelegatePool {
    delegates: Vec<String>,
}

impl DelegatePool {
    /// Builds the pool from the static `delegate.addrs` list.
    pub fn from_config(config: &DelegateConfig) -> Self {
        Self::with_addresses(config.addrs.clone())
    }

    /// Builds the pool from explicit addresses, dropping repeats.
    pub fn with_addresses(addresses: Vec<String>) -> Self {
        let mut delegates: Vec<String> = Vec::with_capacity(addresses.len());
        for address in addresses {
            if !delegates.contains(&address) {
                delegates.push(address);
            }
        }
        Self { delegates }
    }

    pub fn len(&self) -> usize {
        self.delegates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.delegates.is_empty()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.delegates.iter().any(|d| d == address)
    }

    pub fn addresses(&self) -> &[String] {
        &self.delegates
    }

    /// Proposer for `(height, round)`: rotates by height, then by round.
    pub fn proposer(&self, height: u64, round: u32) -> Option<&str> {
        if self.delegates.is_empty() {
            return None;
        }
        let slot = height.wrapping_add(round as u64) % self.delegates.len() as u64;
        Some(&self.delegates[slot as usize])
    }

    /// Ballots needed to decide: more than two thirds of the delegates.
    pub fn quorum(&self) -> usize {
        self.delegates.len() * 2 / 3 + 1
    }
}
