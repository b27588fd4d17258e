//! # Entity Undo Log
//!
//! Reverse operations for the enumeration indices a block touched.
//! Disconnecting a block replays its undo log inside the same atomic
//! batch that rewinds the main-chain index. The world state itself needs
//! no undo entries: the persistent trie keeps every prior root alive.

use ember_codec::{CodecError, FromValue, ToValue, Value};
use shared_types::{Address, Hash};

const UNDO_LOG_VERSION: u64 = 1;

/// One reverse operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoOp {
    /// Restore the token mirror entry to its prior bytes, or delete the
    /// entry if the token did not exist before the block.
    RestoreToken {
        token: Address,
        prior: Option<Vec<u8>>,
    },
    /// Restore the authority mirror entry.
    RestoreAuthority {
        address: Address,
        prior: Option<Vec<u8>>,
    },
    /// Truncate an address's transaction list back to `prior_counter`.
    RewindAddressTxs {
        address: Address,
        prior_counter: u64,
    },
    /// Drop a transaction location entry.
    RemoveTxIndex { tx_hash: Hash },
}

impl UndoOp {
    fn code(&self) -> u64 {
        match self {
            UndoOp::RestoreToken { .. } => 1,
            UndoOp::RestoreAuthority { .. } => 2,
            UndoOp::RewindAddressTxs { .. } => 3,
            UndoOp::RemoveTxIndex { .. } => 4,
        }
    }
}

impl ToValue for UndoOp {
    fn to_value(&self) -> Value {
        let code = Value::uint(self.code());
        match self {
            UndoOp::RestoreToken { token, prior } => Value::list(vec![
                code,
                Value::address(token),
                Value::opt(prior.as_ref().map(|b| Value::bytes(b.clone()))),
            ]),
            UndoOp::RestoreAuthority { address, prior } => Value::list(vec![
                code,
                Value::address(address),
                Value::opt(prior.as_ref().map(|b| Value::bytes(b.clone()))),
            ]),
            UndoOp::RewindAddressTxs {
                address,
                prior_counter,
            } => Value::list(vec![code, Value::address(address), Value::uint(*prior_counter)]),
            UndoOp::RemoveTxIndex { tx_hash } => Value::list(vec![code, Value::hash(tx_hash)]),
        }
    }
}

impl FromValue for UndoOp {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let items = value.as_list()?;
        if items.is_empty() {
            return Err(CodecError::format("undo op", "empty list"));
        }
        let arity = |n: usize| -> Result<(), CodecError> {
            if items.len() != n {
                return Err(CodecError::format(
                    "undo op",
                    format!("expected {n} fields, got {}", items.len()),
                ));
            }
            Ok(())
        };
        match items[0].as_uint()? {
            1 => {
                arity(3)?;
                Ok(UndoOp::RestoreToken {
                    token: items[1].as_address()?,
                    prior: items[2].as_opt(|v| v.as_bytes().map(<[u8]>::to_vec))?,
                })
            }
            2 => {
                arity(3)?;
                Ok(UndoOp::RestoreAuthority {
                    address: items[1].as_address()?,
                    prior: items[2].as_opt(|v| v.as_bytes().map(<[u8]>::to_vec))?,
                })
            }
            3 => {
                arity(3)?;
                Ok(UndoOp::RewindAddressTxs {
                    address: items[1].as_address()?,
                    prior_counter: items[2].as_uint()?,
                })
            }
            4 => {
                arity(2)?;
                Ok(UndoOp::RemoveTxIndex {
                    tx_hash: items[1].as_hash()?,
                })
            }
            code => Err(CodecError::format(
                "undo op",
                format!("unknown op code {code}"),
            )),
        }
    }
}

/// The full undo log of one block, applied in order on disconnect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UndoLog {
    pub ops: Vec<UndoOp>,
}

impl ToValue for UndoLog {
    fn to_value(&self) -> Value {
        Value::list(vec![
            Value::uint(UNDO_LOG_VERSION),
            Value::list(self.ops.iter().map(ToValue::to_value).collect()),
        ])
    }
}

impl FromValue for UndoLog {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let fields = value.as_fields("undo log", 2)?;
        let version = fields[0].as_uint()?;
        if version != UNDO_LOG_VERSION {
            return Err(CodecError::UnsupportedVersion {
                type_name: "undo log",
                version,
            });
        }
        Ok(UndoLog {
            ops: fields[1]
                .as_list()?
                .iter()
                .map(UndoOp::from_value)
                .collect::<Result<_, _>>()?,
        })
    }
}
