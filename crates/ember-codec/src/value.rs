//! # The Value Tree
//!
//! Parsed form of the canonical format. Encoders build a [`Value`] and
//! serialize it; decoders parse bytes into a [`Value`] and map it onto
//! domain types. The indirection keeps per-type codecs free of cursor
//! arithmetic and makes round-trip testing trivial.

use shared_types::{Address, Hash, Signature, U256};
use thiserror::Error;

/// Wire tags. One byte each, followed by a 4-byte big-endian length
/// (byte-strings) or element count (lists).
const TAG_EMPTY: u8 = 0x00;
const TAG_BYTES: u8 = 0x01;
const TAG_LIST: u8 = 0x02;

/// Nesting bound; deeper input is rejected as malformed rather than
/// risking stack exhaustion on hostile frames.
const MAX_DEPTH: usize = 64;

/// Errors of the canonical codec.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of input")]
    UnexpectedEnd,

    #[error("{remaining} trailing bytes after value")]
    TrailingBytes { remaining: usize },

    #[error("invalid tag byte 0x{tag:02x}")]
    InvalidTag { tag: u8 },

    #[error("nesting deeper than {MAX_DEPTH}")]
    TooDeep,

    #[error("scalar not minimally encoded")]
    NonMinimalScalar,

    #[error("scalar too large for target width")]
    ScalarOverflow,

    #[error("unsupported {type_name} version {version}")]
    UnsupportedVersion {
        type_name: &'static str,
        version: u64,
    },

    #[error("malformed {type_name}: {detail}")]
    InvalidFormat {
        type_name: &'static str,
        detail: String,
    },
}

impl CodecError {
    /// Shorthand for a malformed-input error.
    pub fn format(type_name: &'static str, detail: impl Into<String>) -> Self {
        CodecError::InvalidFormat {
            type_name,
            detail: detail.into(),
        }
    }
}

/// A node of the canonical format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Absent optional value.
    Empty,
    Bytes(Vec<u8>),
    List(Vec<Value>),
}

impl Value {
    // -------------------------------------------------------------------------
    // Builders
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Value {
        Value::Bytes(bytes.into())
    }

    #[must_use]
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(items)
    }

    /// Minimal big-endian scalar; zero encodes as the empty byte-string.
    #[must_use]
    pub fn uint(value: u64) -> Value {
        let bytes = value.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        Value::Bytes(bytes[skip..].to_vec())
    }

    #[must_use]
    pub fn u256(value: &U256) -> Value {
        let mut bytes = [0u8; 32];
        value.to_big_endian(&mut bytes);
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        Value::Bytes(bytes[skip..].to_vec())
    }

    #[must_use]
    pub fn hash(hash: &Hash) -> Value {
        Value::Bytes(hash.as_bytes().to_vec())
    }

    #[must_use]
    pub fn address(address: &Address) -> Value {
        Value::Bytes(address.as_bytes().to_vec())
    }

    #[must_use]
    pub fn signature(signature: &Signature) -> Value {
        Value::Bytes(signature.as_bytes().to_vec())
    }

    #[must_use]
    pub fn string(s: &str) -> Value {
        Value::Bytes(s.as_bytes().to_vec())
    }

    #[must_use]
    pub fn bool(flag: bool) -> Value {
        Value::uint(u64::from(flag))
    }

    /// Map `None` to the empty marker.
    #[must_use]
    pub fn opt(value: Option<Value>) -> Value {
        value.unwrap_or(Value::Empty)
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn as_bytes(&self) -> Result<&[u8], CodecError> {
        match self {
            Value::Bytes(b) => Ok(b),
            other => Err(CodecError::format("bytes", format!("got {}", other.kind()))),
        }
    }

    pub fn as_list(&self) -> Result<&[Value], CodecError> {
        match self {
            Value::List(items) => Ok(items),
            other => Err(CodecError::format("list", format!("got {}", other.kind()))),
        }
    }

    /// Fixed-arity list accessor.
    pub fn as_fields(&self, type_name: &'static str, arity: usize) -> Result<&[Value], CodecError> {
        let items = self.as_list()?;
        if items.len() != arity {
            return Err(CodecError::format(
                type_name,
                format!("expected {arity} fields, got {}", items.len()),
            ));
        }
        Ok(items)
    }

    pub fn as_uint(&self) -> Result<u64, CodecError> {
        let bytes = self.as_bytes()?;
        check_minimal(bytes)?;
        if bytes.len() > 8 {
            return Err(CodecError::ScalarOverflow);
        }
        let mut out = [0u8; 8];
        out[8 - bytes.len()..].copy_from_slice(bytes);
        Ok(u64::from_be_bytes(out))
    }

    pub fn as_u256(&self) -> Result<U256, CodecError> {
        let bytes = self.as_bytes()?;
        check_minimal(bytes)?;
        if bytes.len() > 32 {
            return Err(CodecError::ScalarOverflow);
        }
        Ok(U256::from_big_endian(bytes))
    }

    pub fn as_hash(&self) -> Result<Hash, CodecError> {
        let bytes = self.as_bytes()?;
        Hash::from_slice(bytes)
            .ok_or_else(|| CodecError::format("hash", format!("length {}", bytes.len())))
    }

    pub fn as_address(&self) -> Result<Address, CodecError> {
        let bytes = self.as_bytes()?;
        Address::from_slice(bytes)
            .ok_or_else(|| CodecError::format("address", format!("length {}", bytes.len())))
    }

    pub fn as_signature(&self) -> Result<Signature, CodecError> {
        let bytes = self.as_bytes()?;
        Signature::from_slice(bytes)
            .ok_or_else(|| CodecError::format("signature", format!("length {}", bytes.len())))
    }

    pub fn as_string(&self) -> Result<String, CodecError> {
        let bytes = self.as_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| CodecError::format("string", "invalid utf-8"))
    }

    pub fn as_bool(&self) -> Result<bool, CodecError> {
        match self.as_uint()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::format("bool", format!("scalar {other}"))),
        }
    }

    /// `None` for the empty marker, otherwise maps the value.
    pub fn as_opt<T>(
        &self,
        map: impl FnOnce(&Value) -> Result<T, CodecError>,
    ) -> Result<Option<T>, CodecError> {
        match self {
            Value::Empty => Ok(None),
            other => map(other).map(Some),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Empty => "empty",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
        }
    }

    // -------------------------------------------------------------------------
    // Wire form
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }

    fn encoded_len(&self) -> usize {
        match self {
            Value::Empty => 1,
            Value::Bytes(b) => 5 + b.len(),
            Value::List(items) => 5 + items.iter().map(Value::encoded_len).sum::<usize>(),
        }
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Value::Empty => out.push(TAG_EMPTY),
            Value::Bytes(b) => {
                out.push(TAG_BYTES);
                out.extend_from_slice(&(b.len() as u32).to_be_bytes());
                out.extend_from_slice(b);
            }
            Value::List(items) => {
                out.push(TAG_LIST);
                out.extend_from_slice(&(items.len() as u32).to_be_bytes());
                for item in items {
                    item.encode_into(out);
                }
            }
        }
    }

    /// Decode exactly one value spanning the whole input.
    pub fn decode(bytes: &[u8]) -> Result<Value, CodecError> {
        let mut cursor = Cursor { bytes, pos: 0 };
        let value = cursor.read_value(0)?;
        if cursor.pos != bytes.len() {
            return Err(CodecError::TrailingBytes {
                remaining: bytes.len() - cursor.pos,
            });
        }
        Ok(value)
    }
}

fn check_minimal(bytes: &[u8]) -> Result<(), CodecError> {
    if bytes.first() == Some(&0) {
        return Err(CodecError::NonMinimalScalar);
    }
    Ok(())
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn take(&mut self, n: usize) -> Result<&[u8], CodecError> {
        if self.bytes.len() - self.pos < n {
            return Err(CodecError::UnexpectedEnd);
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_u32(&mut self) -> Result<u32, CodecError> {
        let raw = self.take(4)?;
        Ok(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn read_value(&mut self, depth: usize) -> Result<Value, CodecError> {
        if depth > MAX_DEPTH {
            return Err(CodecError::TooDeep);
        }
        let tag = self.take(1)?[0];
        match tag {
            TAG_EMPTY => Ok(Value::Empty),
            TAG_BYTES => {
                let len = self.read_u32()? as usize;
                Ok(Value::Bytes(self.take(len)?.to_vec()))
            }
            TAG_LIST => {
                let count = self.read_u32()? as usize;
                // An element takes at least one tag byte; bound the
                // allocation by what the input could possibly hold.
                if count > self.bytes.len() - self.pos {
                    return Err(CodecError::UnexpectedEnd);
                }
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.read_value(depth + 1)?);
                }
                Ok(Value::List(items))
            }
            tag => Err(CodecError::InvalidTag { tag }),
        }
    }
}

/// Conversion into the canonical value tree.
pub trait ToValue {
    fn to_value(&self) -> Value;
}

/// Conversion out of the canonical value tree.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, CodecError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: Value) {
        let encoded = value.encode();
        assert_eq!(Value::decode(&encoded).unwrap(), value);
    }

    #[test]
    fn test_roundtrip_leaves() {
        roundtrip(Value::Empty);
        roundtrip(Value::bytes(vec![]));
        roundtrip(Value::bytes(vec![1, 2, 3]));
        roundtrip(Value::uint(0));
        roundtrip(Value::uint(u64::MAX));
    }

    #[test]
    fn test_roundtrip_nested_lists() {
        roundtrip(Value::list(vec![
            Value::uint(7),
            Value::Empty,
            Value::list(vec![Value::bytes(vec![0xFF]), Value::list(vec![])]),
        ]));
    }

    #[test]
    fn test_uint_is_minimal() {
        assert_eq!(Value::uint(0), Value::Bytes(vec![]));
        assert_eq!(Value::uint(1), Value::Bytes(vec![1]));
        assert_eq!(Value::uint(256), Value::Bytes(vec![1, 0]));
    }

    #[test]
    fn test_non_minimal_scalar_rejected() {
        let padded = Value::Bytes(vec![0, 1]);
        assert_eq!(padded.as_uint(), Err(CodecError::NonMinimalScalar));
    }

    #[test]
    fn test_scalar_overflow_rejected() {
        let wide = Value::Bytes(vec![1; 9]);
        assert_eq!(wide.as_uint(), Err(CodecError::ScalarOverflow));
        let wider = Value::Bytes(vec![1; 33]);
        assert_eq!(wider.as_u256(), Err(CodecError::ScalarOverflow));
    }

    #[test]
    fn test_u256_roundtrip() {
        let value = U256::from(123_456_789u64) * U256::from(10u64).pow(U256::from(18u64));
        assert_eq!(Value::u256(&value).as_u256().unwrap(), value);
        assert_eq!(Value::u256(&U256::zero()).as_u256().unwrap(), U256::zero());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut encoded = Value::uint(5).encode();
        encoded.push(0xAB);
        assert!(matches!(
            Value::decode(&encoded),
            Err(CodecError::TrailingBytes { remaining: 1 })
        ));
    }

    #[test]
    fn test_truncated_input_rejected() {
        let encoded = Value::bytes(vec![1, 2, 3, 4]).encode();
        assert_eq!(
            Value::decode(&encoded[..encoded.len() - 1]),
            Err(CodecError::UnexpectedEnd)
        );
    }

    #[test]
    fn test_invalid_tag_rejected() {
        assert_eq!(
            Value::decode(&[0x07]),
            Err(CodecError::InvalidTag { tag: 0x07 })
        );
    }

    #[test]
    fn test_hostile_list_count_rejected() {
        // Claims four billion elements in a five-byte frame.
        let mut encoded = vec![TAG_LIST];
        encoded.extend_from_slice(&u32::MAX.to_be_bytes());
        assert_eq!(Value::decode(&encoded), Err(CodecError::UnexpectedEnd));
    }

    #[test]
    fn test_depth_bound() {
        let mut value = Value::bytes(vec![1]);
        for _ in 0..80 {
            value = Value::list(vec![value]);
        }
        let encoded = value.encode();
        assert_eq!(Value::decode(&encoded), Err(CodecError::TooDeep));
    }

    #[test]
    fn test_opt_accessor() {
        assert_eq!(Value::Empty.as_opt(|v| v.as_uint()).unwrap(), None);
        assert_eq!(Value::uint(9).as_opt(|v| v.as_uint()).unwrap(), Some(9));
    }
}
