//! # Per-Network Genesis
//!
//! The fixed genesis definition for each named network. Two nodes on the
//! same network name always compute the same genesis hash; a data
//! directory initialized for another network fails bootstrap.

use ember_chain::GenesisSpec;
use shared_types::settings::GenesisParams;
use shared_types::{Address, U256};

fn addr(hex_str: &str) -> Address {
    let bytes = hex::decode(hex_str).expect("genesis addresses are static hex");
    Address::from_slice(&bytes).expect("genesis addresses are 20 bytes")
}

/// Genesis for a named network.
#[must_use]
pub fn genesis_for(network: &str) -> GenesisSpec {
    match network {
        "mainnet" => GenesisSpec {
            timestamp: 1_717_200_000_000,
            premine: vec![
                (addr("1f1d3c8e09a2b5590ab3c1b8cf0d7a4e62f90815"), U256::from(250_000_000_000u64)),
                (addr("7b44e1a8c0f2d96633db5a71c04a8ef119c2ab03"), U256::from(250_000_000_000u64)),
            ],
            authorities: vec![
                addr("3a91c4f7d850b26e14af07cd2b66d10a9e53c7f1"),
                addr("58d20b9ae4f1c6573c9e8b02d7410fa6b2d9e466"),
                addr("9c07d5e2a6b8413f880172cd5e9a4b30f61d2a88"),
            ],
            reward_pool_address: addr("c4a1709b3ed52f8844bc06ad17e2de95130f7b52"),
            reward_pool_balance: U256::from(500_000_000_000u64),
            params: GenesisParams {
                target_mining_time_ms: 30_000,
                initial_target: U256::MAX >> 24,
                ..GenesisParams::default()
            },
        },
        "testnet" => GenesisSpec {
            timestamp: 1_714_500_000_000,
            premine: vec![(
                addr("aa00000000000000000000000000000000000001"),
                U256::from(1_000_000_000_000u64),
            )],
            authorities: vec![
                addr("aa00000000000000000000000000000000000002"),
                addr("aa00000000000000000000000000000000000003"),
            ],
            reward_pool_address: addr("aa000000000000000000000000000000000000ee"),
            reward_pool_balance: U256::from(1_000_000_000_000u64),
            params: GenesisParams {
                initial_target: U256::MAX >> 16,
                ..GenesisParams::default()
            },
        },
        // Anything else validated earlier as devnet.
        _ => GenesisSpec {
            timestamp: 1_700_000_000_000,
            premine: vec![(
                addr("dd00000000000000000000000000000000000001"),
                U256::from(1_000_000_000_000u64),
            )],
            authorities: vec![addr("dd00000000000000000000000000000000000002")],
            reward_pool_address: addr("dd000000000000000000000000000000000000ee"),
            reward_pool_balance: U256::from(1_000_000_000_000u64),
            params: GenesisParams {
                initial_target: U256::MAX >> 8,
                ..GenesisParams::default()
            },
        },
    }
}
