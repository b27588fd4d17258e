//! # Canonical Encodings of Domain Types
//!
//! One `ToValue`/`FromValue` pair per consensus type. Field order is part
//! of consensus; never reorder within a version. New versions add new
//! decode arms, they never touch old ones.

use shared_types::{
    AccountBalanceState, AccountNonceState, Address, AddressAliasState, AuthorityState, BipAction,
    BipState, BipStatus, BipType, BlockEvent, BlockHeader, ConnectedSource, NetworkParamsState,
    NetworkParamsUpdate, SealedBlock, SealedHeader, SealedTransaction, StoredBlock, TokenState,
    Transaction, TxPayload, TxType, ValidatorState,
};

use crate::value::{CodecError, FromValue, ToValue, Value};

/// Current transaction encoding version.
pub const TX_VERSION: u16 = 1;
/// Current header encoding version.
pub const HEADER_VERSION: u16 = 1;
/// Current stored-block encoding version.
pub const STORED_BLOCK_VERSION: u16 = 1;

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// Shared between the full encoding and the signing encoding; the latter
/// drops the trailing signature field.
pub(crate) fn transaction_fields(tx: &Transaction, include_signature: bool) -> Vec<Value> {
    let mut fields = vec![
        Value::uint(u64::from(tx.version)),
        Value::uint(u64::from(tx.tx_type.code())),
        Value::uint(u64::from(tx.network)),
        Value::uint(tx.timestamp),
        Value::uint(tx.nonce),
        Value::opt(tx.recipient.as_ref().map(Value::address)),
        Value::opt(tx.amount.as_ref().map(Value::u256)),
        Value::uint(tx.fee),
        Value::opt(tx.token_address.as_ref().map(Value::address)),
        Value::opt(tx.payload.as_ref().map(ToValue::to_value)),
        Value::opt(tx.reference_hash.as_ref().map(Value::hash)),
        Value::opt(tx.message.as_deref().map(Value::string)),
    ];
    if include_signature {
        fields.push(Value::signature(&tx.signature));
    }
    fields
}

impl ToValue for Transaction {
    fn to_value(&self) -> Value {
        Value::list(transaction_fields(self, true))
    }
}

impl FromValue for Transaction {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let fields = value.as_fields("transaction", 13)?;
        let version = fields[0].as_uint()?;
        if version != u64::from(TX_VERSION) {
            return Err(CodecError::UnsupportedVersion {
                type_name: "transaction",
                version,
            });
        }
        let type_code = fields[1].as_uint()?;
        let tx_type = u8::try_from(type_code)
            .ok()
            .and_then(TxType::from_code)
            .ok_or_else(|| {
                CodecError::format("transaction", format!("unknown type code {type_code}"))
            })?;
        Ok(Transaction {
            version: version as u16,
            tx_type,
            network: fields[2].as_uint()? as u32,
            timestamp: fields[3].as_uint()?,
            nonce: fields[4].as_uint()?,
            recipient: fields[5].as_opt(Value::as_address)?,
            amount: fields[6].as_opt(Value::as_u256)?,
            fee: fields[7].as_uint()?,
            token_address: fields[8].as_opt(Value::as_address)?,
            payload: fields[9].as_opt(TxPayload::from_value)?,
            reference_hash: fields[10].as_opt(Value::as_hash)?,
            message: fields[11].as_opt(Value::as_string)?,
            signature: fields[12].as_signature()?,
        })
    }
}

impl ToValue for TxPayload {
    fn to_value(&self) -> Value {
        match self {
            TxPayload::BipProposal(action) => {
                Value::list(vec![Value::uint(1), action.to_value()])
            }
            TxPayload::BipVote { approve } => {
                Value::list(vec![Value::uint(2), Value::bool(*approve)])
            }
        }
    }
}

impl FromValue for TxPayload {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let fields = value.as_fields("tx payload", 2)?;
        match fields[0].as_uint()? {
            1 => Ok(TxPayload::BipProposal(BipAction::from_value(&fields[1])?)),
            2 => Ok(TxPayload::BipVote {
                approve: fields[1].as_bool()?,
            }),
            kind => Err(CodecError::format(
                "tx payload",
                format!("unknown payload kind {kind}"),
            )),
        }
    }
}

impl ToValue for BipAction {
    fn to_value(&self) -> Value {
        let code = Value::uint(u64::from(self.bip_type().code()));
        let items = match self {
            BipAction::TokenCreate {
                name,
                smallest_unit_name,
                decimals,
                initial_supply,
                max_supply,
                user_burnable,
                website_url,
                whitepaper_url,
            } => vec![
                code,
                Value::string(name),
                Value::string(smallest_unit_name),
                Value::uint(u64::from(*decimals)),
                Value::u256(initial_supply),
                Value::opt(max_supply.as_ref().map(Value::u256)),
                Value::bool(*user_burnable),
                Value::opt(website_url.as_deref().map(Value::string)),
                Value::opt(whitepaper_url.as_deref().map(Value::string)),
            ],
            BipAction::TokenMint {
                token,
                recipient,
                amount,
            } => vec![
                code,
                Value::address(token),
                Value::address(recipient),
                Value::u256(amount),
            ],
            BipAction::TokenBurn {
                token,
                holder,
                amount,
            } => vec![
                code,
                Value::address(token),
                Value::address(holder),
                Value::u256(amount),
            ],
            BipAction::AuthorityAdd { address }
            | BipAction::AuthorityRemove { address }
            | BipAction::ValidatorAdd { address }
            | BipAction::ValidatorRemove { address } => vec![code, Value::address(address)],
            BipAction::AliasRegister { alias, address } => {
                vec![code, Value::string(alias), Value::address(address)]
            }
            BipAction::AliasRemove { alias } => vec![code, Value::string(alias)],
            BipAction::NetworkParamsSet(update) => vec![code, update.to_value()],
        };
        Value::list(items)
    }
}

impl FromValue for BipAction {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let items = value.as_list()?;
        if items.is_empty() {
            return Err(CodecError::format("bip action", "empty list"));
        }
        let code = items[0].as_uint()?;
        let bip_type = u8::try_from(code)
            .ok()
            .and_then(BipType::from_code)
            .ok_or_else(|| {
                CodecError::format("bip action", format!("unknown action code {code}"))
            })?;

        let expect = |arity: usize| -> Result<(), CodecError> {
            if items.len() != arity {
                return Err(CodecError::format(
                    "bip action",
                    format!("expected {arity} fields, got {}", items.len()),
                ));
            }
            Ok(())
        };

        match bip_type {
            BipType::TokenCreate => {
                expect(9)?;
                Ok(BipAction::TokenCreate {
                    name: items[1].as_string()?,
                    smallest_unit_name: items[2].as_string()?,
                    decimals: items[3].as_uint()? as u8,
                    initial_supply: items[4].as_u256()?,
                    max_supply: items[5].as_opt(Value::as_u256)?,
                    user_burnable: items[6].as_bool()?,
                    website_url: items[7].as_opt(Value::as_string)?,
                    whitepaper_url: items[8].as_opt(Value::as_string)?,
                })
            }
            BipType::TokenMint => {
                expect(4)?;
                Ok(BipAction::TokenMint {
                    token: items[1].as_address()?,
                    recipient: items[2].as_address()?,
                    amount: items[3].as_u256()?,
                })
            }
            BipType::TokenBurn => {
                expect(4)?;
                Ok(BipAction::TokenBurn {
                    token: items[1].as_address()?,
                    holder: items[2].as_address()?,
                    amount: items[3].as_u256()?,
                })
            }
            BipType::AuthorityAdd => {
                expect(2)?;
                Ok(BipAction::AuthorityAdd {
                    address: items[1].as_address()?,
                })
            }
            BipType::AuthorityRemove => {
                expect(2)?;
                Ok(BipAction::AuthorityRemove {
                    address: items[1].as_address()?,
                })
            }
            BipType::ValidatorAdd => {
                expect(2)?;
                Ok(BipAction::ValidatorAdd {
                    address: items[1].as_address()?,
                })
            }
            BipType::ValidatorRemove => {
                expect(2)?;
                Ok(BipAction::ValidatorRemove {
                    address: items[1].as_address()?,
                })
            }
            BipType::AliasRegister => {
                expect(3)?;
                Ok(BipAction::AliasRegister {
                    alias: items[1].as_string()?,
                    address: items[2].as_address()?,
                })
            }
            BipType::AliasRemove => {
                expect(2)?;
                Ok(BipAction::AliasRemove {
                    alias: items[1].as_string()?,
                })
            }
            BipType::NetworkParamsSet => {
                expect(2)?;
                Ok(BipAction::NetworkParamsSet(NetworkParamsUpdate::from_value(
                    &items[1],
                )?))
            }
        }
    }
}

impl ToValue for NetworkParamsUpdate {
    fn to_value(&self) -> Value {
        Value::list(vec![
            Value::opt(self.block_reward.as_ref().map(Value::u256)),
            Value::opt(self.block_reward_pool_address.as_ref().map(Value::address)),
            Value::opt(self.target_mining_time_ms.map(Value::uint)),
            Value::opt(self.asert_half_life_blocks.map(Value::uint)),
            Value::opt(self.min_difficulty.as_ref().map(Value::u256)),
            Value::opt(self.min_tx_base_fee.map(Value::uint)),
            Value::opt(self.min_tx_byte_fee.map(Value::uint)),
        ])
    }
}

impl FromValue for NetworkParamsUpdate {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let fields = value.as_fields("network params update", 7)?;
        Ok(NetworkParamsUpdate {
            block_reward: fields[0].as_opt(Value::as_u256)?,
            block_reward_pool_address: fields[1].as_opt(Value::as_address)?,
            target_mining_time_ms: fields[2].as_opt(Value::as_uint)?,
            asert_half_life_blocks: fields[3].as_opt(Value::as_uint)?,
            min_difficulty: fields[4].as_opt(Value::as_u256)?,
            min_tx_base_fee: fields[5].as_opt(Value::as_uint)?,
            min_tx_byte_fee: fields[6].as_opt(Value::as_uint)?,
        })
    }
}

// =============================================================================
// HEADERS AND BLOCKS
// =============================================================================

pub(crate) fn header_fields(header: &BlockHeader, include_signature: bool) -> Vec<Value> {
    let mut fields = vec![
        Value::uint(u64::from(header.version)),
        Value::uint(header.height),
        Value::uint(header.timestamp),
        Value::hash(&header.previous_hash),
        Value::hash(&header.tx_root_hash),
        Value::hash(&header.state_root_hash),
        Value::u256(&header.difficulty),
        Value::address(&header.coinbase),
        Value::uint(header.nonce),
        Value::address(&header.identity),
    ];
    if include_signature {
        fields.push(Value::signature(&header.signature));
    }
    fields
}

impl ToValue for BlockHeader {
    fn to_value(&self) -> Value {
        Value::list(header_fields(self, true))
    }
}

impl FromValue for BlockHeader {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let fields = value.as_fields("block header", 11)?;
        let version = fields[0].as_uint()?;
        if version != u64::from(HEADER_VERSION) {
            return Err(CodecError::UnsupportedVersion {
                type_name: "block header",
                version,
            });
        }
        Ok(BlockHeader {
            version: version as u16,
            height: fields[1].as_uint()?,
            timestamp: fields[2].as_uint()?,
            previous_hash: fields[3].as_hash()?,
            tx_root_hash: fields[4].as_hash()?,
            state_root_hash: fields[5].as_hash()?,
            difficulty: fields[6].as_u256()?,
            coinbase: fields[7].as_address()?,
            nonce: fields[8].as_uint()?,
            identity: fields[9].as_address()?,
            signature: fields[10].as_signature()?,
        })
    }
}

impl ToValue for SealedTransaction {
    fn to_value(&self) -> Value {
        self.transaction.to_value()
    }
}

impl ToValue for SealedBlock {
    fn to_value(&self) -> Value {
        Value::list(vec![
            self.header.header.to_value(),
            Value::list(self.transactions.iter().map(ToValue::to_value).collect()),
        ])
    }
}

// =============================================================================
// STORED BLOCKS
// =============================================================================
//
// The stored form keeps the derived fields (hashes, senders, sizes) so the
// block store never re-runs signature recovery on its own data.

fn stored_tx_value(tx: &SealedTransaction) -> Value {
    Value::list(vec![
        tx.transaction.to_value(),
        Value::hash(&tx.hash),
        Value::address(&tx.sender),
        Value::uint(u64::from(tx.size)),
    ])
}

fn stored_tx_from_value(value: &Value) -> Result<SealedTransaction, CodecError> {
    let fields = value.as_fields("stored transaction", 4)?;
    Ok(SealedTransaction {
        transaction: Transaction::from_value(&fields[0])?,
        hash: fields[1].as_hash()?,
        sender: fields[2].as_address()?,
        size: fields[3].as_uint()? as u32,
    })
}

fn stored_header_value(header: &SealedHeader) -> Value {
    Value::list(vec![
        header.header.to_value(),
        Value::hash(&header.hash),
        Value::uint(u64::from(header.size)),
    ])
}

fn stored_header_from_value(value: &Value) -> Result<SealedHeader, CodecError> {
    let fields = value.as_fields("stored header", 3)?;
    Ok(SealedHeader {
        header: BlockHeader::from_value(&fields[0])?,
        hash: fields[1].as_hash()?,
        size: fields[2].as_uint()? as u32,
    })
}

impl ToValue for StoredBlock {
    fn to_value(&self) -> Value {
        Value::list(vec![
            Value::uint(u64::from(STORED_BLOCK_VERSION)),
            stored_header_value(&self.block.header),
            Value::list(self.block.transactions.iter().map(stored_tx_value).collect()),
            Value::u256(&self.cumulative_difficulty),
            Value::uint(self.received_at),
            Value::opt(self.received_from.as_ref().map(Value::address)),
            Value::uint(u64::from(self.source.code())),
            Value::list(self.events.iter().map(ToValue::to_value).collect()),
        ])
    }
}

impl FromValue for StoredBlock {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let fields = value.as_fields("stored block", 8)?;
        let version = fields[0].as_uint()?;
        if version != u64::from(STORED_BLOCK_VERSION) {
            return Err(CodecError::UnsupportedVersion {
                type_name: "stored block",
                version,
            });
        }
        let source_code = fields[6].as_uint()?;
        let source = u8::try_from(source_code)
            .ok()
            .and_then(ConnectedSource::from_code)
            .ok_or_else(|| {
                CodecError::format("stored block", format!("unknown source {source_code}"))
            })?;
        Ok(StoredBlock {
            block: SealedBlock {
                header: stored_header_from_value(&fields[1])?,
                transactions: fields[2]
                    .as_list()?
                    .iter()
                    .map(stored_tx_from_value)
                    .collect::<Result<_, _>>()?,
            },
            cumulative_difficulty: fields[3].as_u256()?,
            received_at: fields[4].as_uint()?,
            received_from: fields[5].as_opt(Value::as_address)?,
            source,
            events: fields[7]
                .as_list()?
                .iter()
                .map(BlockEvent::from_value)
                .collect::<Result<_, _>>()?,
        })
    }
}

// =============================================================================
// BLOCK EVENTS
// =============================================================================

impl ToValue for BlockEvent {
    fn to_value(&self) -> Value {
        let code = Value::uint(u64::from(self.code()));
        let items = match self {
            BlockEvent::BlockReward { recipient, amount }
            | BlockEvent::FeesCollected { recipient, amount } => {
                vec![code, Value::address(recipient), Value::u256(amount)]
            }
            BlockEvent::TokenCreated { token } => vec![code, Value::address(token)],
            BlockEvent::TokenMinted {
                token,
                recipient,
                amount,
            } => vec![
                code,
                Value::address(token),
                Value::address(recipient),
                Value::u256(amount),
            ],
            BlockEvent::TokenBurned {
                token,
                holder,
                amount,
            } => vec![
                code,
                Value::address(token),
                Value::address(holder),
                Value::u256(amount),
            ],
            BlockEvent::AuthorityAdded { address }
            | BlockEvent::AuthorityRemoved { address }
            | BlockEvent::ValidatorAdded { address }
            | BlockEvent::ValidatorRemoved { address } => vec![code, Value::address(address)],
            BlockEvent::NetworkParamsChanged => vec![code],
            BlockEvent::AddressAliasRegistered { alias, address } => {
                vec![code, Value::string(alias), Value::address(address)]
            }
            BlockEvent::AddressAliasRemoved { alias } => vec![code, Value::string(alias)],
            BlockEvent::BipStateChanged {
                bip_hash,
                old_status,
                new_status,
            } => vec![
                code,
                Value::hash(bip_hash),
                Value::opt(old_status.map(|s| Value::uint(u64::from(s.code())))),
                Value::uint(u64::from(new_status.code())),
            ],
        };
        Value::list(items)
    }
}

impl FromValue for BlockEvent {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let items = value.as_list()?;
        if items.is_empty() {
            return Err(CodecError::format("block event", "empty list"));
        }
        let code = items[0].as_uint()?;

        let field = |idx: usize| -> Result<&Value, CodecError> {
            items
                .get(idx)
                .ok_or_else(|| CodecError::format("block event", format!("missing field {idx}")))
        };
        let status = |v: &Value| -> Result<BipStatus, CodecError> {
            let raw = v.as_uint()?;
            u8::try_from(raw)
                .ok()
                .and_then(BipStatus::from_code)
                .ok_or_else(|| CodecError::format("block event", format!("bad status {raw}")))
        };

        match code {
            1 => Ok(BlockEvent::BlockReward {
                recipient: field(1)?.as_address()?,
                amount: field(2)?.as_u256()?,
            }),
            2 => Ok(BlockEvent::FeesCollected {
                recipient: field(1)?.as_address()?,
                amount: field(2)?.as_u256()?,
            }),
            3 => Ok(BlockEvent::TokenCreated {
                token: field(1)?.as_address()?,
            }),
            4 => Ok(BlockEvent::TokenMinted {
                token: field(1)?.as_address()?,
                recipient: field(2)?.as_address()?,
                amount: field(3)?.as_u256()?,
            }),
            5 => Ok(BlockEvent::TokenBurned {
                token: field(1)?.as_address()?,
                holder: field(2)?.as_address()?,
                amount: field(3)?.as_u256()?,
            }),
            6 => Ok(BlockEvent::AuthorityAdded {
                address: field(1)?.as_address()?,
            }),
            7 => Ok(BlockEvent::AuthorityRemoved {
                address: field(1)?.as_address()?,
            }),
            8 => Ok(BlockEvent::ValidatorAdded {
                address: field(1)?.as_address()?,
            }),
            9 => Ok(BlockEvent::ValidatorRemoved {
                address: field(1)?.as_address()?,
            }),
            10 => Ok(BlockEvent::NetworkParamsChanged),
            11 => Ok(BlockEvent::AddressAliasRegistered {
                alias: field(1)?.as_string()?,
                address: field(2)?.as_address()?,
            }),
            12 => Ok(BlockEvent::AddressAliasRemoved {
                alias: field(1)?.as_string()?,
            }),
            13 => Ok(BlockEvent::BipStateChanged {
                bip_hash: field(1)?.as_hash()?,
                old_status: field(2)?.as_opt(|v| status(v))?,
                new_status: status(field(3)?)?,
            }),
            other => Err(CodecError::format(
                "block event",
                format!("unknown event code {other}"),
            )),
        }
    }
}

// =============================================================================
// STATE ENTITIES
// =============================================================================

const STATE_VERSION: u64 = 1;

fn check_state_version(
    type_name: &'static str,
    fields: &[Value],
) -> Result<(), CodecError> {
    let version = fields[0].as_uint()?;
    if version != STATE_VERSION {
        return Err(CodecError::UnsupportedVersion { type_name, version });
    }
    Ok(())
}

impl ToValue for AccountBalanceState {
    fn to_value(&self) -> Value {
        Value::list(vec![
            Value::uint(u64::from(self.version)),
            Value::u256(&self.balance),
            Value::uint(self.updated_at_height),
            Value::uint(self.updated_at_timestamp),
        ])
    }
}

impl FromValue for AccountBalanceState {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let fields = value.as_fields("balance state", 4)?;
        check_state_version("balance state", fields)?;
        Ok(AccountBalanceState::new(
            fields[1].as_u256()?,
            fields[2].as_uint()?,
            fields[3].as_uint()?,
        ))
    }
}

impl ToValue for AccountNonceState {
    fn to_value(&self) -> Value {
        Value::list(vec![
            Value::uint(u64::from(self.version)),
            Value::uint(self.nonce),
            Value::uint(self.updated_at_height),
            Value::uint(self.updated_at_timestamp),
        ])
    }
}

impl FromValue for AccountNonceState {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let fields = value.as_fields("nonce state", 4)?;
        check_state_version("nonce state", fields)?;
        Ok(AccountNonceState::new(
            fields[1].as_uint()?,
            fields[2].as_uint()?,
            fields[3].as_uint()?,
        ))
    }
}

impl ToValue for TokenState {
    fn to_value(&self) -> Value {
        Value::list(vec![
            Value::uint(u64::from(self.version)),
            Value::string(&self.name),
            Value::string(&self.smallest_unit_name),
            Value::uint(u64::from(self.decimals)),
            Value::u256(&self.total_supply),
            Value::opt(self.max_supply.as_ref().map(Value::u256)),
            Value::bool(self.user_burnable),
            Value::opt(self.website_url.as_deref().map(Value::string)),
            Value::opt(self.whitepaper_url.as_deref().map(Value::string)),
            Value::hash(&self.origin_tx_hash),
            Value::uint(self.created_at_timestamp),
            Value::uint(self.updated_at_height),
            Value::uint(self.updated_at_timestamp),
        ])
    }
}

impl FromValue for TokenState {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let fields = value.as_fields("token state", 13)?;
        check_state_version("token state", fields)?;
        Ok(TokenState {
            version: fields[0].as_uint()? as u16,
            name: fields[1].as_string()?,
            smallest_unit_name: fields[2].as_string()?,
            decimals: fields[3].as_uint()? as u8,
            total_supply: fields[4].as_u256()?,
            max_supply: fields[5].as_opt(Value::as_u256)?,
            user_burnable: fields[6].as_bool()?,
            website_url: fields[7].as_opt(Value::as_string)?,
            whitepaper_url: fields[8].as_opt(Value::as_string)?,
            origin_tx_hash: fields[9].as_hash()?,
            created_at_timestamp: fields[10].as_uint()?,
            updated_at_height: fields[11].as_uint()?,
            updated_at_timestamp: fields[12].as_uint()?,
        })
    }
}

impl ToValue for AuthorityState {
    fn to_value(&self) -> Value {
        Value::list(vec![
            Value::uint(u64::from(self.version)),
            Value::hash(&self.origin_tx_hash),
            Value::uint(self.created_at_height),
            Value::uint(self.created_at_timestamp),
        ])
    }
}

impl FromValue for AuthorityState {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let fields = value.as_fields("authority state", 4)?;
        check_state_version("authority state", fields)?;
        Ok(AuthorityState {
            version: fields[0].as_uint()? as u16,
            origin_tx_hash: fields[1].as_hash()?,
            created_at_height: fields[2].as_uint()?,
            created_at_timestamp: fields[3].as_uint()?,
        })
    }
}

impl ToValue for ValidatorState {
    fn to_value(&self) -> Value {
        Value::list(vec![
            Value::uint(u64::from(self.version)),
            Value::hash(&self.origin_tx_hash),
            Value::uint(self.created_at_height),
            Value::uint(self.created_at_timestamp),
        ])
    }
}

impl FromValue for ValidatorState {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let fields = value.as_fields("validator state", 4)?;
        check_state_version("validator state", fields)?;
        Ok(ValidatorState {
            version: fields[0].as_uint()? as u16,
            origin_tx_hash: fields[1].as_hash()?,
            created_at_height: fields[2].as_uint()?,
            created_at_timestamp: fields[3].as_uint()?,
        })
    }
}

impl ToValue for AddressAliasState {
    fn to_value(&self) -> Value {
        Value::list(vec![
            Value::uint(u64::from(self.version)),
            Value::address(&self.address),
            Value::hash(&self.origin_tx_hash),
            Value::uint(self.created_at_height),
            Value::uint(self.created_at_timestamp),
        ])
    }
}

impl FromValue for AddressAliasState {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let fields = value.as_fields("alias state", 5)?;
        check_state_version("alias state", fields)?;
        Ok(AddressAliasState {
            version: fields[0].as_uint()? as u16,
            address: fields[1].as_address()?,
            origin_tx_hash: fields[2].as_hash()?,
            created_at_height: fields[3].as_uint()?,
            created_at_timestamp: fields[4].as_uint()?,
        })
    }
}

impl ToValue for BipState {
    fn to_value(&self) -> Value {
        Value::list(vec![
            Value::uint(u64::from(self.version)),
            Value::uint(u64::from(self.bip_type.code())),
            Value::uint(u64::from(self.status.code())),
            Value::bool(self.is_action_executed),
            Value::address(&self.proposer),
            Value::list(self.approvers.iter().map(Value::address).collect()),
            Value::list(self.disapprovers.iter().map(Value::address).collect()),
            Value::uint(u64::from(self.number_of_required_votes)),
            Value::uint(self.expiration_timestamp),
            Value::uint(u64::from(self.tx_version)),
            self.action.to_value(),
            Value::opt(self.derived_token_address.as_ref().map(Value::address)),
            Value::opt(self.executed_at_timestamp.map(Value::uint)),
            Value::hash(&self.origin_tx_hash),
            Value::hash(&self.updated_by_tx_hash),
            Value::uint(self.updated_at_height),
            Value::uint(self.updated_at_timestamp),
        ])
    }
}

impl FromValue for BipState {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let fields = value.as_fields("bip state", 17)?;
        check_state_version("bip state", fields)?;

        let type_code = fields[1].as_uint()?;
        let bip_type = u8::try_from(type_code)
            .ok()
            .and_then(BipType::from_code)
            .ok_or_else(|| CodecError::format("bip state", format!("bad type {type_code}")))?;
        let status_code = fields[2].as_uint()?;
        let status = u8::try_from(status_code)
            .ok()
            .and_then(BipStatus::from_code)
            .ok_or_else(|| CodecError::format("bip state", format!("bad status {status_code}")))?;

        Ok(BipState {
            version: fields[0].as_uint()? as u16,
            bip_type,
            status,
            is_action_executed: fields[3].as_bool()?,
            proposer: fields[4].as_address()?,
            approvers: fields[5]
                .as_list()?
                .iter()
                .map(Value::as_address)
                .collect::<Result<_, _>>()?,
            disapprovers: fields[6]
                .as_list()?
                .iter()
                .map(Value::as_address)
                .collect::<Result<_, _>>()?,
            number_of_required_votes: fields[7].as_uint()? as u32,
            expiration_timestamp: fields[8].as_uint()?,
            tx_version: fields[9].as_uint()? as u16,
            action: BipAction::from_value(&fields[10])?,
            derived_token_address: fields[11].as_opt(Value::as_address)?,
            executed_at_timestamp: fields[12].as_opt(Value::as_uint)?,
            origin_tx_hash: fields[13].as_hash()?,
            updated_by_tx_hash: fields[14].as_hash()?,
            updated_at_height: fields[15].as_uint()?,
            updated_at_timestamp: fields[16].as_uint()?,
        })
    }
}

impl ToValue for NetworkParamsState {
    fn to_value(&self) -> Value {
        Value::list(vec![
            Value::uint(u64::from(self.version)),
            Value::u256(&self.block_reward),
            Value::address(&self.block_reward_pool_address),
            Value::uint(self.target_mining_time_ms),
            Value::uint(self.asert_half_life_blocks),
            Value::uint(self.asert_anchor_height),
            Value::u256(&self.min_difficulty),
            Value::uint(self.min_tx_base_fee),
            Value::uint(self.min_tx_byte_fee),
            Value::uint(u64::from(self.current_authority_count)),
            Value::hash(&self.updated_by_tx_hash),
            Value::uint(self.updated_at_height),
            Value::uint(self.updated_at_timestamp),
        ])
    }
}

impl FromValue for NetworkParamsState {
    fn from_value(value: &Value) -> Result<Self, CodecError> {
        let fields = value.as_fields("network params state", 13)?;
        check_state_version("network params state", fields)?;
        Ok(NetworkParamsState {
            version: fields[0].as_uint()? as u16,
            block_reward: fields[1].as_u256()?,
            block_reward_pool_address: fields[2].as_address()?,
            target_mining_time_ms: fields[3].as_uint()?,
            asert_half_life_blocks: fields[4].as_uint()?,
            asert_anchor_height: fields[5].as_uint()?,
            min_difficulty: fields[6].as_u256()?,
            min_tx_base_fee: fields[7].as_uint()?,
            min_tx_byte_fee: fields[8].as_uint()?,
            current_authority_count: fields[9].as_uint()? as u32,
            updated_by_tx_hash: fields[10].as_hash()?,
            updated_at_height: fields[11].as_uint()?,
            updated_at_timestamp: fields[12].as_uint()?,
        })
    }
}
