//! # Sealing
//!
//! Turning raw decoded records into their sealed forms: compute the
//! canonical encoding once, derive content hash and size from it, and
//! recover the sender from the signature over the signing hash.
//!
//! The signing hash covers every field except the signature itself; the
//! content hash covers the full encoding. The proof-of-work input is the
//! signing encoding of a header, so miners can grind the nonce without
//! re-signing.

use shared_crypto::{keccak256, recover_signer, CryptoError, NodeIdentity};
use shared_types::{
    BlockHeader, Hash, SealedBlock, SealedHeader, SealedTransaction, Transaction,
};
use thiserror::Error;

use crate::entities::{header_fields, transaction_fields};
use crate::value::{CodecError, FromValue, ToValue, Value};

/// Failure while sealing a decoded record.
#[derive(Debug, Clone, Error)]
pub enum SealError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// Hash a transaction's signing encoding (all fields except the signature).
#[must_use]
pub fn tx_signing_hash(tx: &Transaction) -> Hash {
    keccak256(&Value::list(transaction_fields(tx, false)).encode())
}

/// Seal a transaction: canonical encoding, content hash, recovered sender.
pub fn seal_transaction(tx: Transaction) -> Result<SealedTransaction, SealError> {
    let encoded = tx.to_value().encode();
    let hash = keccak256(&encoded);
    let sender = recover_signer(&tx_signing_hash(&tx), &tx.signature)?;
    Ok(SealedTransaction {
        transaction: tx,
        hash,
        sender,
        size: encoded.len() as u32,
    })
}

/// Sign with `identity` and seal.
pub fn sign_and_seal_transaction(
    mut tx: Transaction,
    identity: &NodeIdentity,
) -> Result<SealedTransaction, SealError> {
    tx.signature = identity.sign(&tx_signing_hash(&tx))?;
    seal_transaction(tx)
}

/// Decode a wire transaction and seal it.
pub fn sealed_transaction_from_value(value: &Value) -> Result<SealedTransaction, SealError> {
    let tx = Transaction::from_value(value)?;
    seal_transaction(tx)
}

// =============================================================================
// HEADERS AND BLOCKS
// =============================================================================

/// Hash a header's signing encoding (all fields except the signature).
#[must_use]
pub fn header_signing_hash(header: &BlockHeader) -> Hash {
    keccak256(&header_pow_bytes(header))
}

/// The proof-of-work input: the signing encoding, nonce included.
#[must_use]
pub fn header_pow_bytes(header: &BlockHeader) -> Vec<u8> {
    Value::list(header_fields(header, false)).encode()
}

/// Seal a header: content hash and encoded size.
#[must_use]
pub fn seal_header(header: BlockHeader) -> SealedHeader {
    let encoded = header.to_value().encode();
    let hash = keccak256(&encoded);
    SealedHeader {
        header,
        hash,
        size: encoded.len() as u32,
    }
}

/// Sign the header with the miner identity and seal it.
pub fn sign_and_seal_header(
    mut header: BlockHeader,
    identity: &NodeIdentity,
) -> Result<SealedHeader, SealError> {
    header.signature = identity.sign(&header_signing_hash(&header))?;
    Ok(seal_header(header))
}

/// Seal a full block from raw parts.
pub fn seal_block(
    header: BlockHeader,
    transactions: Vec<Transaction>,
) -> Result<SealedBlock, SealError> {
    let transactions = transactions
        .into_iter()
        .map(seal_transaction)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SealedBlock {
        header: seal_header(header),
        transactions,
    })
}

/// Decode a wire block (`[header, [tx, ...]]`) and seal every part.
pub fn sealed_block_from_value(value: &Value) -> Result<SealedBlock, SealError> {
    let fields = value.as_fields("block", 2)?;
    let header = BlockHeader::from_value(&fields[0])?;
    let transactions = fields[1]
        .as_list()?
        .iter()
        .map(|v| Transaction::from_value(v))
        .collect::<Result<Vec<_>, _>>()?;
    seal_block(header, transactions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{HEADER_VERSION, TX_VERSION};
    use shared_crypto::NodeIdentity;
    use shared_types::{Address, Signature, TxType, U256};

    fn raw_transfer() -> Transaction {
        Transaction {
            version: TX_VERSION,
            tx_type: TxType::Transfer,
            network: 0xEB01,
            timestamp: 1_700_000_000_000,
            nonce: 1,
            recipient: Some(Address([2; 20])),
            amount: Some(U256::from(250u64)),
            fee: 3,
            token_address: Some(Address::NATIVE_TOKEN),
            payload: None,
            reference_hash: None,
            message: None,
            signature: Signature::default(),
        }
    }

    #[test]
    fn test_sign_and_seal_recovers_sender() {
        let identity = NodeIdentity::generate();
        let sealed = sign_and_seal_transaction(raw_transfer(), &identity).unwrap();
        assert_eq!(sealed.sender, identity.address());
        assert!(sealed.size > 0);
    }

    #[test]
    fn test_signing_hash_excludes_signature() {
        let mut a = raw_transfer();
        let mut b = raw_transfer();
        a.signature = Signature([0x01; 65]);
        b.signature = Signature([0x02; 65]);
        assert_eq!(tx_signing_hash(&a), tx_signing_hash(&b));
        // The content hash does cover the signature.
        assert_ne!(
            keccak256(&crate::encode(&a)),
            keccak256(&crate::encode(&b))
        );
    }

    #[test]
    fn test_wire_block_roundtrip() {
        let identity = NodeIdentity::generate();
        let sealed_tx =
            sign_and_seal_transaction(raw_transfer(), &identity).unwrap();

        let header = BlockHeader {
            version: HEADER_VERSION,
            height: 1,
            timestamp: 1_700_000_000_100,
            previous_hash: Hash([1; 32]),
            tx_root_hash: Hash([2; 32]),
            state_root_hash: Hash([3; 32]),
            difficulty: U256::MAX,
            coinbase: identity.address(),
            nonce: 9,
            identity: identity.address(),
            signature: Signature::default(),
        };
        let sealed_header = sign_and_seal_header(header, &identity).unwrap();

        let block = SealedBlock {
            header: sealed_header,
            transactions: vec![sealed_tx],
        };
        let wire = block.to_value().encode();
        let decoded = sealed_block_from_value(&Value::decode(&wire).unwrap()).unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn test_pow_bytes_vary_with_nonce_only_when_nonce_changes() {
        let header = BlockHeader {
            version: HEADER_VERSION,
            height: 1,
            timestamp: 1,
            previous_hash: Hash::ZERO,
            tx_root_hash: Hash::ZERO,
            state_root_hash: Hash::ZERO,
            difficulty: U256::MAX,
            coinbase: Address::ZERO,
            nonce: 1,
            identity: Address::ZERO,
            signature: Signature::default(),
        };
        let mut bumped = header.clone();
        bumped.nonce = 2;
        assert_ne!(header_pow_bytes(&header), header_pow_bytes(&bumped));

        let mut resigned = header.clone();
        resigned.signature = Signature([9; 65]);
        assert_eq!(header_pow_bytes(&header), header_pow_bytes(&resigned));
    }
}
