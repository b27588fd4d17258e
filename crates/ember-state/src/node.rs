//! # Trie Nodes
//!
//! The four node kinds of the Merkle-radix trie. Every node is content
//! addressed: its hash is the Keccak-256 of its canonical encoding, and
//! the node store maps that hash to the encoded bytes.

use ember_codec::{CodecError, Value};
use shared_crypto::keccak256;
use shared_types::Hash;

use crate::nibbles::Nibbles;

const KIND_LEAF: u64 = 1;
const KIND_EXTENSION: u64 = 2;
const KIND_BRANCH: u64 = 3;

/// A node of the trie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrieNode {
    /// Terminal node holding the remaining path and the value bytes.
    Leaf { path: Nibbles, value: Vec<u8> },

    /// Shared-prefix shortcut to a single child.
    Extension { path: Nibbles, child: Hash },

    /// Sixteen-way fan-out, plus a value for keys ending here.
    Branch {
        children: Box<[Option<Hash>; 16]>,
        value: Option<Vec<u8>>,
    },
}

impl TrieNode {
    /// Canonical encoding. `[kind, ...]` per kind; branch children use
    /// the empty marker for absent slots.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let value = match self {
            TrieNode::Leaf { path, value } => Value::list(vec![
                Value::uint(KIND_LEAF),
                Value::bytes(path.encode_hex_prefix(true)),
                Value::bytes(value.clone()),
            ]),
            TrieNode::Extension { path, child } => Value::list(vec![
                Value::uint(KIND_EXTENSION),
                Value::bytes(path.encode_hex_prefix(false)),
                Value::hash(child),
            ]),
            TrieNode::Branch { children, value } => Value::list(vec![
                Value::uint(KIND_BRANCH),
                Value::list(
                    children
                        .iter()
                        .map(|slot| Value::opt(slot.as_ref().map(Value::hash)))
                        .collect(),
                ),
                Value::opt(value.as_ref().map(|v| Value::bytes(v.clone()))),
            ]),
        };
        value.encode()
    }

    /// Content hash of the canonical encoding.
    #[must_use]
    pub fn hash(&self) -> Hash {
        keccak256(&self.encode())
    }

    /// Decode a node fetched from the store.
    pub fn decode(bytes: &[u8]) -> Result<TrieNode, CodecError> {
        let value = Value::decode(bytes)?;
        let fields = value.as_fields("trie node", 3)?;
        match fields[0].as_uint()? {
            KIND_LEAF => {
                let (path, is_leaf) = Nibbles::decode_hex_prefix(fields[1].as_bytes()?)
                    .ok_or_else(|| CodecError::format("trie node", "bad hex prefix"))?;
                if !is_leaf {
                    return Err(CodecError::format("trie node", "leaf flag mismatch"));
                }
                Ok(TrieNode::Leaf {
                    path,
                    value: fields[2].as_bytes()?.to_vec(),
                })
            }
            KIND_EXTENSION => {
                let (path, is_leaf) = Nibbles::decode_hex_prefix(fields[1].as_bytes()?)
                    .ok_or_else(|| CodecError::format("trie node", "bad hex prefix"))?;
                if is_leaf {
                    return Err(CodecError::format("trie node", "extension flag mismatch"));
                }
                Ok(TrieNode::Extension {
                    path,
                    child: fields[2].as_hash()?,
                })
            }
            KIND_BRANCH => {
                let slots = fields[1].as_list()?;
                if slots.len() != 16 {
                    return Err(CodecError::format(
                        "trie node",
                        format!("branch with {} slots", slots.len()),
                    ));
                }
                let mut children: Box<[Option<Hash>; 16]> = Box::new([None; 16]);
                for (idx, slot) in slots.iter().enumerate() {
                    children[idx] = slot.as_opt(Value::as_hash)?;
                }
                Ok(TrieNode::Branch {
                    children,
                    value: fields[2].as_opt(|v| v.as_bytes().map(<[u8]>::to_vec))?,
                })
            }
            kind => Err(CodecError::format(
                "trie node",
                format!("unknown node kind {kind}"),
            )),
        }
    }

    /// A branch with all sixteen slots empty and no value.
    #[must_use]
    pub fn empty_branch() -> TrieNode {
        TrieNode::Branch {
            children: Box::new([None; 16]),
            value: None,
        }
    }
}
