//! # Block Application
//!
//! Applying validated transactions to a world state and crediting the
//! coinbase. The same code runs under the engine's connect path and under
//! the miner's candidate assembly; only the diff-tracking mode of the
//! world state differs.

use ember_state::WorldState;
use shared_crypto::keccak256;
use shared_types::{
    Address, AddressAliasState, AuthorityState, BipAction, BipState, BipStatus, BlockEvent,
    Hash, NetworkSettings, SealedTransaction, TokenState, TxPayload, TxType, ValidatorState,
    U256, STATE_ENTITY_VERSION,
};
use tracing::debug;

use crate::error::{ChainError, InvalidTxReason};

/// Position of the block being applied.
#[derive(Debug, Clone, Copy)]
pub struct BlockPosition {
    pub height: u64,
    pub timestamp: u64,
}

/// Deterministic token address for a `TokenCreate` proposal: the trailing
/// twenty bytes of the hash of the proposal transaction hash.
#[must_use]
pub fn derive_token_address(origin_tx_hash: &Hash) -> Address {
    let digest = keccak256(origin_tx_hash.as_bytes());
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest.as_bytes()[12..]);
    Address(out)
}

/// Apply one already-validated transaction. Emits the domain events the
/// application produced, in order, into `events`.
pub fn apply_transaction(
    state: &mut WorldState,
    tx: &SealedTransaction,
    pos: BlockPosition,
    settings: &NetworkSettings,
    events: &mut Vec<BlockEvent>,
) -> Result<U256, ChainError> {
    let t = &tx.transaction;
    let fee = U256::from(t.fee);

    state.debit(&tx.sender, &Address::NATIVE_TOKEN, fee)?;

    match t.tx_type {
        TxType::Transfer => {
            let token = t.token_address.ok_or(InvalidTxReason::MissingTokenAddress)?;
            let recipient = t.recipient.ok_or(InvalidTxReason::MissingRecipient)?;
            let amount = t.amount.ok_or(InvalidTxReason::MissingAmount)?;
            state.debit(&tx.sender, &token, amount)?;
            state.credit(&recipient, &token, amount)?;
        }
        TxType::BipCreate => {
            let Some(TxPayload::BipProposal(action)) = &t.payload else {
                return Err(InvalidTxReason::MissingPayload.into());
            };
            create_bip(state, tx, action.clone(), pos, settings, events)?;
        }
        TxType::BipVote => {
            let Some(TxPayload::BipVote { approve }) = t.payload else {
                return Err(InvalidTxReason::MissingPayload.into());
            };
            let reference = t.reference_hash.ok_or(InvalidTxReason::MissingReference)?;
            vote_on_bip(state, tx, reference, approve, pos, events)?;
        }
    }

    state.set_nonce(&tx.sender, t.nonce)?;
    Ok(fee)
}

fn create_bip(
    state: &mut WorldState,
    tx: &SealedTransaction,
    action: BipAction,
    pos: BlockPosition,
    settings: &NetworkSettings,
    events: &mut Vec<BlockEvent>,
) -> Result<(), ChainError> {
    let params = state.params()?;
    let required = settings.required_votes(params.current_authority_count);
    let derived_token_address = match &action {
        BipAction::TokenCreate { .. } => Some(derive_token_address(&tx.hash)),
        _ => None,
    };

    // An authority proposing counts as its own approval, so a
    // single-authority network executes immediately.
    let approvers = if state.is_authority(&tx.sender)? {
        vec![tx.sender]
    } else {
        Vec::new()
    };

    let mut bip = BipState {
        bip_type: action.bip_type(),
        status: BipStatus::Pending,
        is_action_executed: false,
        proposer: tx.sender,
        approvers,
        disapprovers: Vec::new(),
        number_of_required_votes: required,
        expiration_timestamp: pos.timestamp + settings.bip_expiration_period_ms,
        tx_version: tx.transaction.version,
        action,
        derived_token_address,
        executed_at_timestamp: None,
        origin_tx_hash: tx.hash,
        updated_by_tx_hash: tx.hash,
        updated_at_height: pos.height,
        updated_at_timestamp: pos.timestamp,
        version: STATE_ENTITY_VERSION,
    };

    events.push(BlockEvent::BipStateChanged {
        bip_hash: tx.hash,
        old_status: None,
        new_status: BipStatus::Pending,
    });
    if bip.approvers.len() as u32 >= bip.number_of_required_votes {
        bip.status = BipStatus::Approved;
        execute_bip_action(state, &mut bip, tx.hash, pos, events)?;
        events.push(BlockEvent::BipStateChanged {
            bip_hash: tx.hash,
            old_status: Some(BipStatus::Pending),
            new_status: BipStatus::Approved,
        });
    }
    state.put_bip(tx.hash, bip)?;
    Ok(())
}

fn vote_on_bip(
    state: &mut WorldState,
    tx: &SealedTransaction,
    reference: Hash,
    approve: bool,
    pos: BlockPosition,
    events: &mut Vec<BlockEvent>,
) -> Result<(), ChainError> {
    let mut bip = state
        .get_bip(&reference)?
        .ok_or(InvalidTxReason::UnknownBip(reference))?;
    if bip.status != BipStatus::Pending {
        return Err(InvalidTxReason::BipNotPending.into());
    }
    if bip.has_voted(&tx.sender) {
        return Err(InvalidTxReason::AlreadyVoted.into());
    }

    if approve {
        bip.approvers.push(tx.sender);
    } else {
        bip.disapprovers.push(tx.sender);
    }
    bip.updated_by_tx_hash = tx.hash;
    bip.updated_at_height = pos.height;
    bip.updated_at_timestamp = pos.timestamp;

    let old_status = bip.status;
    let authority_count = state.params()?.current_authority_count;
    let approvals = bip.approvers.len() as u32;
    let disapprovals = bip.disapprovers.len() as u32;

    if approvals >= bip.number_of_required_votes {
        bip.status = BipStatus::Approved;
        execute_bip_action(state, &mut bip, tx.hash, pos, events)?;
    } else if disapprovals > authority_count.saturating_sub(bip.number_of_required_votes) {
        // Approval can no longer be reached.
        bip.status = BipStatus::Rejected;
    }

    if bip.status != old_status {
        events.push(BlockEvent::BipStateChanged {
            bip_hash: reference,
            old_status: Some(old_status),
            new_status: bip.status,
        });
    }
    state.put_bip(reference, bip)?;
    Ok(())
}

/// Execute an approved proposal's action exactly once.
fn execute_bip_action(
    state: &mut WorldState,
    bip: &mut BipState,
    vote_tx_hash: Hash,
    pos: BlockPosition,
    events: &mut Vec<BlockEvent>,
) -> Result<(), ChainError> {
    debug!(bip = %bip.origin_tx_hash, kind = ?bip.bip_type, "executing approved proposal");

    match bip.action.clone() {
        BipAction::TokenCreate {
            name,
            smallest_unit_name,
            decimals,
            initial_supply,
            max_supply,
            user_burnable,
            website_url,
            whitepaper_url,
        } => {
            let token = bip
                .derived_token_address
                .unwrap_or_else(|| derive_token_address(&bip.origin_tx_hash));
            state.put_token(
                token,
                TokenState {
                    name,
                    smallest_unit_name,
                    decimals,
                    total_supply: initial_supply,
                    max_supply,
                    user_burnable,
                    website_url,
                    whitepaper_url,
                    origin_tx_hash: bip.origin_tx_hash,
                    created_at_timestamp: pos.timestamp,
                    updated_at_height: pos.height,
                    updated_at_timestamp: pos.timestamp,
                    version: STATE_ENTITY_VERSION,
                },
            )?;
            if !initial_supply.is_zero() {
                state.credit(&bip.proposer, &token, initial_supply)?;
            }
            events.push(BlockEvent::TokenCreated { token });
            if !initial_supply.is_zero() {
                events.push(BlockEvent::TokenMinted {
                    token,
                    recipient: bip.proposer,
                    amount: initial_supply,
                });
            }
        }
        BipAction::TokenMint {
            token,
            recipient,
            amount,
        } => {
            let mut token_state = state
                .get_token(&token)?
                .ok_or(InvalidTxReason::UnknownToken(token))?;
            if let Some(max) = token_state.max_supply {
                if token_state.total_supply.saturating_add(amount) > max {
                    return Err(InvalidTxReason::ExceedsMaxSupply.into());
                }
            }
            token_state.total_supply = token_state.total_supply.saturating_add(amount);
            token_state.updated_at_height = pos.height;
            token_state.updated_at_timestamp = pos.timestamp;
            state.put_token(token, token_state)?;
            state.credit(&recipient, &token, amount)?;
            events.push(BlockEvent::TokenMinted {
                token,
                recipient,
                amount,
            });
        }
        BipAction::TokenBurn {
            token,
            holder,
            amount,
        } => {
            let mut token_state = state
                .get_token(&token)?
                .ok_or(InvalidTxReason::UnknownToken(token))?;
            state.debit(&holder, &token, amount)?;
            token_state.total_supply = token_state.total_supply.saturating_sub(amount);
            token_state.updated_at_height = pos.height;
            token_state.updated_at_timestamp = pos.timestamp;
            state.put_token(token, token_state)?;
            events.push(BlockEvent::TokenBurned {
                token,
                holder,
                amount,
            });
        }
        BipAction::AuthorityAdd { address } => {
            state.put_authority(
                address,
                AuthorityState {
                    origin_tx_hash: bip.origin_tx_hash,
                    created_at_height: pos.height,
                    created_at_timestamp: pos.timestamp,
                    version: STATE_ENTITY_VERSION,
                },
            )?;
            bump_authority_count(state, 1, vote_tx_hash, pos)?;
            events.push(BlockEvent::AuthorityAdded { address });
        }
        BipAction::AuthorityRemove { address } => {
            state.remove_authority(&address)?;
            bump_authority_count(state, -1, vote_tx_hash, pos)?;
            events.push(BlockEvent::AuthorityRemoved { address });
        }
        BipAction::ValidatorAdd { address } => {
            state.put_validator(
                address,
                ValidatorState {
                    origin_tx_hash: bip.origin_tx_hash,
                    created_at_height: pos.height,
                    created_at_timestamp: pos.timestamp,
                    version: STATE_ENTITY_VERSION,
                },
            )?;
            events.push(BlockEvent::ValidatorAdded { address });
        }
        BipAction::ValidatorRemove { address } => {
            state.remove_validator(&address)?;
            events.push(BlockEvent::ValidatorRemoved { address });
        }
        BipAction::AliasRegister { alias, address } => {
            state.put_alias(
                alias.clone(),
                AddressAliasState {
                    address,
                    origin_tx_hash: bip.origin_tx_hash,
                    created_at_height: pos.height,
                    created_at_timestamp: pos.timestamp,
                    version: STATE_ENTITY_VERSION,
                },
            )?;
            events.push(BlockEvent::AddressAliasRegistered { alias, address });
        }
        BipAction::AliasRemove { alias } => {
            state.remove_alias(&alias)?;
            events.push(BlockEvent::AddressAliasRemoved { alias });
        }
        BipAction::NetworkParamsSet(update) => {
            let mut params = state.params()?;
            if let Some(v) = update.block_reward {
                params.block_reward = v;
            }
            if let Some(v) = update.block_reward_pool_address {
                params.block_reward_pool_address = v;
            }
            if let Some(v) = update.target_mining_time_ms {
                params.target_mining_time_ms = v;
            }
            if let Some(v) = update.asert_half_life_blocks {
                params.asert_half_life_blocks = v;
            }
            if let Some(v) = update.min_difficulty {
                params.min_difficulty = v;
            }
            if let Some(v) = update.min_tx_base_fee {
                params.min_tx_base_fee = v;
            }
            if let Some(v) = update.min_tx_byte_fee {
                params.min_tx_byte_fee = v;
            }
            params.updated_by_tx_hash = vote_tx_hash;
            params.updated_at_height = pos.height;
            params.updated_at_timestamp = pos.timestamp;
            state.set_params(params)?;
            events.push(BlockEvent::NetworkParamsChanged);
        }
    }

    bip.is_action_executed = true;
    bip.executed_at_timestamp = Some(pos.timestamp);
    Ok(())
}

fn bump_authority_count(
    state: &mut WorldState,
    delta: i64,
    tx_hash: Hash,
    pos: BlockPosition,
) -> Result<(), ChainError> {
    let mut params = state.params()?;
    params.current_authority_count = if delta >= 0 {
        params.current_authority_count.saturating_add(delta as u32)
    } else {
        params.current_authority_count.saturating_sub((-delta) as u32)
    };
    params.updated_by_tx_hash = tx_hash;
    params.updated_at_height = pos.height;
    params.updated_at_timestamp = pos.timestamp;
    state.set_params(params)?;
    Ok(())
}

/// Credit the coinbase: the pool-limited block reward plus all fees.
/// Returns the reward actually paid from the pool; a dry pool simply pays
/// less, never fails.
pub fn credit_coinbase(
    state: &mut WorldState,
    coinbase: &Address,
    total_fees: U256,
    events: &mut Vec<BlockEvent>,
) -> Result<U256, ChainError> {
    let params = state.params()?;
    let pool = params.block_reward_pool_address;
    let pool_balance = state.get_balance(&pool, &Address::NATIVE_TOKEN)?.balance;
    let reward = params.block_reward.min(pool_balance);

    if !reward.is_zero() {
        state.debit(&pool, &Address::NATIVE_TOKEN, reward)?;
    }
    let payout = reward.saturating_add(total_fees);
    if !payout.is_zero() {
        state.credit(coinbase, &Address::NATIVE_TOKEN, payout)?;
    }

    events.push(BlockEvent::BlockReward {
        recipient: *coinbase,
        amount: reward,
    });
    if !total_fees.is_zero() {
        events.push(BlockEvent::FeesCollected {
            recipient: *coinbase,
            amount: total_fees,
        });
    }
    Ok(reward)
}
