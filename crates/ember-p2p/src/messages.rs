//! # Message Set
//!
//! The envelope is `[message_code, payload]` in the canonical codec.
//! Sealed content (blocks, transactions) is re-sealed on decode, so a
//! peer cannot hand us a block with forged derived fields.

use ember_codec::{
    sealed_block_from_value, sealed_transaction_from_value, CodecError, FromValue, ToValue,
    Value,
};
use shared_types::{
    Address, BlockHeader, Hash, SealedBlock, SealedTransaction, Signature, U256,
};

use crate::error::NetworkError;

const CODE_STATUS: u64 = 0x01;
const CODE_PING: u64 = 0x02;
const CODE_PONG: u64 = 0x03;
const CODE_NEW_BLOCK: u64 = 0x10;
const CODE_NEW_MEMPOOL_TX: u64 = 0x11;
const CODE_GET_BLOCK_HEADERS: u64 = 0x20;
const CODE_BLOCK_HEADERS: u64 = 0x21;
const CODE_GET_BLOCK_BODIES: u64 = 0x22;
const CODE_BLOCK_BODIES: u64 = 0x23;
const CODE_GET_MEMPOOL_HASHES: u64 = 0x24;
const CODE_MEMPOOL_HASHES: u64 = 0x25;
const CODE_GET_MEMPOOL_TXS: u64 = 0x26;
const CODE_MEMPOOL_TXS: u64 = 0x27;

/// The chain position and identity a peer announces, signed by its
/// identity key. Also the keepalive payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPayload {
    pub network_id: u32,
    pub protocol_version: u32,
    pub software_version: String,
    pub node_identity: Address,
    pub total_difficulty: U256,
    pub head_hash: Hash,
    pub head_height: u64,
    pub timestamp: u64,
    pub signature: Signature,
}

impl StatusPayload {
    /// Fields covered by the identity signature.
    #[must_use]
    pub fn signing_value(&self) -> Value {
        Value::list(vec![
            Value::uint(u64::from(self.network_id)),
            Value::uint(u64::from(self.protocol_version)),
            Value::string(&self.software_version),
            Value::address(&self.node_identity),
            Value::u256(&self.total_difficulty),
            Value::hash(&self.head_hash),
            Value::uint(self.head_height),
            Value::uint(self.timestamp),
        ])
    }
}

impl ToValue for StatusPayload {
    fn to_value(&self) -> Value {
        let mut items = match self.signing_value() {
            Value::List(items) => items,
            _ => unreachable!("signing value is a list"),
        };
        items.push(Value::signature(&self.signature));
        Value::list(items)
    }
}

impl FromValue for StatusPayload {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let fields = value.as_fields("status", 9)?;
        Ok(StatusPayload {
            network_id: fields[0].as_uint()? as u32,
            protocol_version: fields[1].as_uint()? as u32,
            software_version: fields[2].as_string()?,
            node_identity: fields[3].as_address()?,
            total_difficulty: fields[4].as_u256()?,
            head_hash: fields[5].as_hash()?,
            head_height: fields[6].as_uint()?,
            timestamp: fields[7].as_uint()?,
            signature: fields[8].as_signature()?,
        })
    }
}

/// Where a header request starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadersStart {
    FromHash(Hash),
    FromHeight(u64),
}

/// Header range request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetHeadersRequest {
    pub start: HeadersStart,
    pub count: u32,
    /// False walks toward genesis.
    pub ascending: bool,
    /// Headers skipped between returned entries.
    pub skip: u32,
}

impl ToValue for GetHeadersRequest {
    fn to_value(&self) -> Value {
        let start = match self.start {
            HeadersStart::FromHash(hash) => {
                Value::list(vec![Value::uint(0), Value::hash(&hash)])
            }
            HeadersStart::FromHeight(height) => {
                Value::list(vec![Value::uint(1), Value::uint(height)])
            }
        };
        Value::list(vec![
            start,
            Value::uint(u64::from(self.count)),
            Value::bool(self.ascending),
            Value::uint(u64::from(self.skip)),
        ])
    }
}

impl FromValue for GetHeadersRequest {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let fields = value.as_fields("get headers", 4)?;
        let start_fields = fields[0].as_fields("headers start", 2)?;
        let start = match start_fields[0].as_uint()? {
            0 => HeadersStart::FromHash(start_fields[1].as_hash()?),
            1 => HeadersStart::FromHeight(start_fields[1].as_uint()?),
            kind => {
                return Err(CodecError::format(
                    "headers start",
                    format!("unknown start kind {kind}"),
                ))
            }
        };
        Ok(GetHeadersRequest {
            start,
            count: fields[1].as_uint()? as u32,
            ascending: fields[2].as_bool()?,
            skip: fields[3].as_uint()? as u32,
        })
    }
}

/// Every message on the wire.
#[derive(Debug, Clone)]
pub enum Message {
    Status(StatusPayload),
    Ping(StatusPayload),
    Pong(StatusPayload),
    NewBlock(SealedBlock),
    NewMempoolTx(SealedTransaction),
    GetBlockHeaders(GetHeadersRequest),
    BlockHeaders(Vec<BlockHeader>),
    GetBlockBodies(Vec<Hash>),
    /// Ordered transaction lists, one per requested hash, in request
    /// order. An unknown hash yields an empty list.
    BlockBodies(Vec<Vec<SealedTransaction>>),
    GetMempoolHashes,
    MempoolHashes(Vec<Hash>),
    GetMempoolTransactions(Vec<Hash>),
    MempoolTransactions(Vec<(Hash, SealedTransaction)>),
}

impl Message {
    #[must_use]
    pub fn code(&self) -> u64 {
        match self {
            Message::Status(_) => CODE_STATUS,
            Message::Ping(_) => CODE_PING,
            Message::Pong(_) => CODE_PONG,
            Message::NewBlock(_) => CODE_NEW_BLOCK,
            Message::NewMempoolTx(_) => CODE_NEW_MEMPOOL_TX,
            Message::GetBlockHeaders(_) => CODE_GET_BLOCK_HEADERS,
            Message::BlockHeaders(_) => CODE_BLOCK_HEADERS,
            Message::GetBlockBodies(_) => CODE_GET_BLOCK_BODIES,
            Message::BlockBodies(_) => CODE_BLOCK_BODIES,
            Message::GetMempoolHashes => CODE_GET_MEMPOOL_HASHES,
            Message::MempoolHashes(_) => CODE_MEMPOOL_HASHES,
            Message::GetMempoolTransactions(_) => CODE_GET_MEMPOOL_TXS,
            Message::MempoolTransactions(_) => CODE_MEMPOOL_TXS,
        }
    }

    /// Gossip may be shed under backpressure; everything else is kept.
    #[must_use]
    pub fn sheddable(&self) -> bool {
        matches!(
            self,
            Message::NewMempoolTx(_)
                | Message::MempoolHashes(_)
                | Message::MempoolTransactions(_)
        )
    }

    /// Encode the `[code, payload]` envelope.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let payload = match self {
            Message::Status(status) | Message::Ping(status) | Message::Pong(status) => {
                status.to_value()
            }
            Message::NewBlock(block) => block.to_value(),
            Message::NewMempoolTx(tx) => tx.to_value(),
            Message::GetBlockHeaders(req) => req.to_value(),
            Message::BlockHeaders(headers) => {
                Value::list(headers.iter().map(ToValue::to_value).collect())
            }
            Message::GetBlockBodies(hashes) => {
                Value::list(hashes.iter().map(Value::hash).collect())
            }
            Message::BlockBodies(bodies) => Value::list(
                bodies
                    .iter()
                    .map(|txs| Value::list(txs.iter().map(ToValue::to_value).collect()))
                    .collect(),
            ),
            Message::GetMempoolHashes => Value::Empty,
            Message::MempoolHashes(hashes) => {
                Value::list(hashes.iter().map(Value::hash).collect())
            }
            Message::GetMempoolTransactions(hashes) => {
                Value::list(hashes.iter().map(Value::hash).collect())
            }
            Message::MempoolTransactions(pairs) => Value::list(
                pairs
                    .iter()
                    .map(|(hash, tx)| Value::list(vec![Value::hash(hash), tx.to_value()]))
                    .collect(),
            ),
        };
        Value::list(vec![Value::uint(self.code()), payload]).encode()
    }

    /// Decode an envelope, re-sealing any signed content.
    pub fn decode(bytes: &[u8]) -> Result<Message, NetworkError> {
        let value = Value::decode(bytes)?;
        let fields = value.as_fields("message envelope", 2)?;
        let code = fields[0].as_uint()?;
        let payload = &fields[1];

        let hashes = |value: &Value| -> Result<Vec<Hash>, CodecError> {
            value.as_list()?.iter().map(Value::as_hash).collect()
        };

        Ok(match code {
            CODE_STATUS => Message::Status(StatusPayload::from_value(payload)?),
            CODE_PING => Message::Ping(StatusPayload::from_value(payload)?),
            CODE_PONG => Message::Pong(StatusPayload::from_value(payload)?),
            CODE_NEW_BLOCK => Message::NewBlock(sealed_block_from_value(payload)?),
            CODE_NEW_MEMPOOL_TX => {
                Message::NewMempoolTx(sealed_transaction_from_value(payload)?)
            }
            CODE_GET_BLOCK_HEADERS => {
                Message::GetBlockHeaders(GetHeadersRequest::from_value(payload)?)
            }
            CODE_BLOCK_HEADERS => Message::BlockHeaders(
                payload
                    .as_list()?
                    .iter()
                    .map(BlockHeader::from_value)
                    .collect::<Result<_, _>>()?,
            ),
            CODE_GET_BLOCK_BODIES => Message::GetBlockBodies(hashes(payload)?),
            CODE_BLOCK_BODIES => {
                let mut bodies = Vec::new();
                for body in payload.as_list()? {
                    let txs = body
                        .as_list()?
                        .iter()
                        .map(sealed_transaction_from_value)
                        .collect::<Result<Vec<_>, _>>()?;
                    bodies.push(txs);
                }
                Message::BlockBodies(bodies)
            }
            CODE_GET_MEMPOOL_HASHES => Message::GetMempoolHashes,
            CODE_MEMPOOL_HASHES => Message::MempoolHashes(hashes(payload)?),
            CODE_GET_MEMPOOL_TXS => Message::GetMempoolTransactions(hashes(payload)?),
            CODE_MEMPOOL_TXS => {
                let mut pairs = Vec::new();
                for pair in payload.as_list()? {
                    let fields = pair.as_fields("mempool tx pair", 2)?;
                    pairs.push((
                        fields[0].as_hash()?,
                        sealed_transaction_from_value(&fields[1])?,
                    ));
                }
                Message::MempoolTransactions(pairs)
            }
            other => {
                return Err(NetworkError::Codec(CodecError::format(
                    "message envelope",
                    format!("unknown message code {other:#x}"),
                )))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status() -> StatusPayload {
        StatusPayload {
            network_id: 0xEB01,
            protocol_version: 1,
            software_version: "ember/0.1.0".to_string(),
            node_identity: Address([7; 20]),
            total_difficulty: U256::from(12_345u64),
            head_hash: Hash([1; 32]),
            head_height: 42,
            timestamp: 1_700_000_000_000,
            signature: Signature([9; 65]),
        }
    }

    #[test]
    fn test_status_roundtrip() {
        let msg = Message::Status(status());
        let decoded = Message::decode(&msg.encode()).unwrap();
        match decoded {
            Message::Status(got) => assert_eq!(got, status()),
            other => panic!("wrong variant {other:?}"),
        }
    }

    #[test]
    fn test_get_headers_roundtrip() {
        for start in [
            HeadersStart::FromHash(Hash([3; 32])),
            HeadersStart::FromHeight(77),
        ] {
            let msg = Message::GetBlockHeaders(GetHeadersRequest {
                start,
                count: 192,
                ascending: true,
                skip: 0,
            });
            match Message::decode(&msg.encode()).unwrap() {
                Message::GetBlockHeaders(req) => {
                    assert_eq!(req.start, start);
                    assert_eq!(req.count, 192);
                }
                other => panic!("wrong variant {other:?}"),
            }
        }
    }

    #[test]
    fn test_hash_list_messages_roundtrip() {
        let hashes = vec![Hash([1; 32]), Hash([2; 32])];
        for msg in [
            Message::GetBlockBodies(hashes.clone()),
            Message::MempoolHashes(hashes.clone()),
            Message::GetMempoolTransactions(hashes.clone()),
        ] {
            let decoded = Message::decode(&msg.encode()).unwrap();
            assert_eq!(decoded.code(), msg.code());
        }
    }

    #[test]
    fn test_get_mempool_hashes_is_payloadless() {
        let decoded = Message::decode(&Message::GetMempoolHashes.encode()).unwrap();
        assert!(matches!(decoded, Message::GetMempoolHashes));
    }

    #[test]
    fn test_unknown_code_rejected() {
        let bytes = Value::list(vec![Value::uint(0xFF), Value::Empty]).encode();
        assert!(Message::decode(&bytes).is_err());
    }

    #[test]
    fn test_sheddable_classification() {
        assert!(Message::NewMempoolTx(dummy_tx()).sheddable());
        assert!(!Message::BlockHeaders(vec![]).sheddable());
        assert!(!Message::Status(status()).sheddable());
    }

    fn dummy_tx() -> SealedTransaction {
        SealedTransaction {
            transaction: shared_types::Transaction {
                version: 1,
                tx_type: shared_types::TxType::Transfer,
                network: 1,
                timestamp: 0,
                nonce: 1,
                recipient: Some(Address([1; 20])),
                amount: Some(U256::one()),
                fee: 1,
                token_address: Some(Address::NATIVE_TOKEN),
                payload: None,
                reference_hash: None,
                message: None,
                signature: Signature([0; 65]),
            },
            hash: Hash([5; 32]),
            sender: Address([6; 20]),
            size: 10,
        }
    }
}
