//! # State Key Layout
//!
//! Every entity lives in the one world trie under a one-byte kind prefix.
//! Keys are raw bytes; the trie nibbles them itself.

use shared_types::{Address, Hash};

const BALANCE: u8 = 0x01;
const NONCE: u8 = 0x02;
const TOKEN: u8 = 0x03;
const AUTHORITY: u8 = 0x04;
const VALIDATOR: u8 = 0x05;
const ALIAS: u8 = 0x06;
const BIP: u8 = 0x07;
const PARAMS: u8 = 0x08;

#[must_use]
pub fn balance_key(address: &Address, token: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(41);
    key.push(BALANCE);
    key.extend_from_slice(address.as_bytes());
    key.extend_from_slice(token.as_bytes());
    key
}

#[must_use]
pub fn nonce_key(address: &Address) -> Vec<u8> {
    prefixed_address(NONCE, address)
}

#[must_use]
pub fn token_key(token: &Address) -> Vec<u8> {
    prefixed_address(TOKEN, token)
}

#[must_use]
pub fn authority_key(address: &Address) -> Vec<u8> {
    prefixed_address(AUTHORITY, address)
}

#[must_use]
pub fn validator_key(address: &Address) -> Vec<u8> {
    prefixed_address(VALIDATOR, address)
}

#[must_use]
pub fn alias_key(alias: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + alias.len());
    key.push(ALIAS);
    key.extend_from_slice(alias.as_bytes());
    key
}

#[must_use]
pub fn bip_key(origin_tx_hash: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(BIP);
    key.extend_from_slice(origin_tx_hash.as_bytes());
    key
}

#[must_use]
pub fn params_key() -> Vec<u8> {
    vec![PARAMS]
}

fn prefixed_address(prefix: u8, address: &Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.push(prefix);
    key.extend_from_slice(address.as_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_disjoint_across_kinds() {
        let addr = Address([7; 20]);
        let keys = [
            balance_key(&addr, &Address::NATIVE_TOKEN),
            nonce_key(&addr),
            token_key(&addr),
            authority_key(&addr),
            validator_key(&addr),
        ];
        for (i, a) in keys.iter().enumerate() {
            for b in keys.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_balance_key_separates_tokens() {
        let addr = Address([1; 20]);
        assert_ne!(
            balance_key(&addr, &Address::NATIVE_TOKEN),
            balance_key(&addr, &Address([2; 20]))
        );
    }
}
