//! # Network Settings
//!
//! The immutable per-network constants, constructed once at bootstrap and
//! shared by reference. Anything consensus can change at runtime lives in
//! `NetworkParamsState` instead.

use crate::primitives::U256;

/// Immutable settings for one chain id.
#[derive(Debug, Clone)]
pub struct NetworkSettings {
    /// Chain id; part of every transaction and the status handshake.
    pub network_id: u32,
    /// Wire protocol version. Peers below `min_protocol_version` are
    /// rejected at handshake.
    pub protocol_version: u32,
    pub min_protocol_version: u32,
    /// Advertised in the handshake and the directory ping.
    pub software_version: String,
    /// Hard cap on one canonical transaction encoding.
    pub max_tx_size: u32,
    /// How far ahead of the stored nonce the mempool accepts.
    pub max_future_nonce_gap: u64,
    /// Header timestamps may lead local time by at most this much.
    pub clock_skew_tolerance_ms: u64,
    /// Proposals expire this long after creation.
    pub bip_expiration_period_ms: u64,
    /// Approval threshold over the authority set, in basis points.
    pub bip_approval_threshold_bps: u32,
    /// Replace-by-fee bump as a numerator over 100. 110 means a
    /// replacement must price strictly above 1.10 times the old fee.
    pub rbf_bump_percent: u64,
    max_block_size_base: u64,
    max_tx_count_base: u32,
}

impl NetworkSettings {
    /// Maximum serialized block size at `height`, header included.
    ///
    /// Height-dependent so a future hard fork can raise it; currently flat.
    #[must_use]
    pub fn max_block_size(&self, _height: u64) -> u64 {
        self.max_block_size_base
    }

    /// Maximum transaction count per block at `height`.
    #[must_use]
    pub fn max_tx_count_per_block(&self, _height: u64) -> u32 {
        self.max_tx_count_base
    }

    /// Votes required to approve a proposal given the current authority
    /// count. Two of three authorities suffice at the default threshold.
    #[must_use]
    pub fn required_votes(&self, authority_count: u32) -> u32 {
        if authority_count == 0 {
            return u32::MAX;
        }
        let num = u64::from(authority_count) * u64::from(self.bip_approval_threshold_bps);
        ((num / 10_000) as u32).max(1)
    }

    /// A single-node development network.
    #[must_use]
    pub fn devnet() -> Self {
        Self {
            network_id: 0xEB01,
            protocol_version: 1,
            min_protocol_version: 1,
            software_version: concat!("ember/", env!("CARGO_PKG_VERSION")).to_string(),
            max_tx_size: 128 * 1024,
            max_future_nonce_gap: 16,
            clock_skew_tolerance_ms: 15_000,
            bip_expiration_period_ms: 7 * 24 * 60 * 60 * 1000,
            bip_approval_threshold_bps: 6_667,
            rbf_bump_percent: 110,
            max_block_size_base: 2 * 1024 * 1024,
            max_tx_count_base: 4_096,
        }
    }

    /// The public test network.
    #[must_use]
    pub fn testnet() -> Self {
        Self {
            network_id: 0xEB02,
            ..Self::devnet()
        }
    }

    /// The main network.
    #[must_use]
    pub fn mainnet() -> Self {
        Self {
            network_id: 0xEB03,
            ..Self::devnet()
        }
    }

    /// Resolve a network by its configuration name.
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "devnet" => Some(Self::devnet()),
            "testnet" => Some(Self::testnet()),
            "mainnet" => Some(Self::mainnet()),
            _ => None,
        }
    }
}

/// Default genesis consensus parameters, shared by the genesis builder and
/// tests. The values land in `NetworkParamsState` and may change later via
/// governance.
#[derive(Debug, Clone)]
pub struct GenesisParams {
    pub block_reward: U256,
    pub target_mining_time_ms: u64,
    pub asert_half_life_blocks: u64,
    pub min_difficulty: U256,
    pub min_tx_base_fee: u64,
    pub min_tx_byte_fee: u64,
    /// Genesis difficulty target; high means easy, suitable for CPU dev
    /// mining. Production networks override this.
    pub initial_target: U256,
}

impl Default for GenesisParams {
    fn default() -> Self {
        Self {
            block_reward: U256::from(50_000_000u64),
            target_mining_time_ms: 10_000,
            asert_half_life_blocks: 144,
            min_difficulty: U256::one(),
            min_tx_base_fee: 0,
            min_tx_byte_fee: 0,
            initial_target: U256::MAX / U256::from(1_000u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_votes_examples() {
        let settings = NetworkSettings::devnet();
        // 3 * 6667 bps = 2.0001, so two of three authorities suffice.
        assert_eq!(settings.required_votes(3), 2);
        assert_eq!(settings.required_votes(1), 1);
        assert_eq!(settings.required_votes(2), 1);
        assert_eq!(settings.required_votes(6), 4);
        assert_eq!(settings.required_votes(0), u32::MAX);
    }

    #[test]
    fn test_network_lookup() {
        assert!(NetworkSettings::by_name("devnet").is_some());
        assert!(NetworkSettings::by_name("nope").is_none());
        assert_ne!(
            NetworkSettings::devnet().network_id,
            NetworkSettings::mainnet().network_id
        );
    }
}
