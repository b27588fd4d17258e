//! # Ember Codec Crate
//!
//! The canonical binary serialization used for everything consensus
//! touches: persisted state entities, transactions, headers, stored
//! blocks, block events, and the P2P message payloads.
//!
//! ## Format
//!
//! A self-describing list/leaf format with three constructors:
//!
//! - a byte-string of arbitrary length,
//! - a list of nested values,
//! - an empty marker for absent optional values.
//!
//! Integer scalars are byte-strings holding the minimal big-endian
//! encoding (no leading zero bytes, zero is the empty string); 32-byte
//! hashes and 20-byte addresses are fixed-width byte-strings.
//!
//! ## Versioning
//!
//! Every versioned type encodes a leading `version` scalar. Decoders
//! dispatch on it and fail with [`CodecError::UnsupportedVersion`] for
//! versions they do not know. Versions are additive: a new version never
//! changes the encoding of an older one, and every version round-trips
//! losslessly.

pub mod entities;
pub mod merkle;
pub mod seal;
pub mod value;

pub use merkle::tx_merkle_root;
pub use seal::{
    header_pow_bytes, header_signing_hash, seal_block, seal_header, seal_transaction,
    sealed_block_from_value, sealed_transaction_from_value, sign_and_seal_header,
    sign_and_seal_transaction, tx_signing_hash, SealError,
};
pub use value::{CodecError, FromValue, ToValue, Value};

/// Encode any canonical type to bytes.
#[must_use]
pub fn encode<T: ToValue>(item: &T) -> Vec<u8> {
    item.to_value().encode()
}

/// Decode any canonical type from bytes, rejecting trailing garbage.
pub fn decode<T: FromValue>(bytes: &[u8]) -> Result<T, CodecError> {
    let value = Value::decode(bytes)?;
    T::from_value(&value)
}
