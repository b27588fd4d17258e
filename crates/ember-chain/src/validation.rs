//! # Transaction Validation
//!
//! Stateless checks need nothing but the transaction and the network
//! settings; stateful checks run against a world-state snapshot. Both are
//! pure: no side effects, first failing rule wins.

use ember_state::WorldState;
use shared_types::{
    Address, BipAction, NetworkParamsUpdate, NetworkSettings, SealedTransaction, TxPayload,
    TxType, U256,
};

use crate::apply::derive_token_address;
use crate::error::{ChainError, InvalidTxReason};

/// How strictly the sender nonce is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceRule {
    /// Block application: exactly `stored + 1`.
    Exact,
    /// Mempool admission: `stored + 1 ..= stored + max_gap`.
    Windowed { max_gap: u64 },
}

// =============================================================================
// STATELESS
// =============================================================================

/// Validate everything knowable without a database.
pub fn validate_stateless(
    tx: &SealedTransaction,
    settings: &NetworkSettings,
) -> Result<(), InvalidTxReason> {
    if tx.size > settings.max_tx_size {
        return Err(InvalidTxReason::TooLarge {
            size: tx.size,
            limit: settings.max_tx_size,
        });
    }
    if tx.transaction.network != settings.network_id {
        return Err(InvalidTxReason::WrongNetwork {
            expected: settings.network_id,
            got: tx.transaction.network,
        });
    }
    if tx.transaction.nonce == 0 {
        return Err(InvalidTxReason::ZeroNonce);
    }

    validate_shape(tx)?;
    if let Some(payload) = &tx.transaction.payload {
        validate_payload(payload)?;
    }

    // Sealing already recovered the sender from the signature; a
    // transaction that reaches this point carries a valid signature by
    // construction. The zero address can never be recovered.
    if tx.sender == Address::ZERO {
        return Err(InvalidTxReason::BadSignature);
    }
    if tx.transaction.recipient == Some(tx.sender) {
        return Err(InvalidTxReason::SelfTransfer);
    }
    Ok(())
}

/// Per-type structural field rules.
fn validate_shape(tx: &SealedTransaction) -> Result<(), InvalidTxReason> {
    let t = &tx.transaction;
    match t.tx_type {
        TxType::Transfer => {
            if t.recipient.is_none() {
                return Err(InvalidTxReason::MissingRecipient);
            }
            if t.amount.is_none() {
                return Err(InvalidTxReason::MissingAmount);
            }
            if t.token_address.is_none() {
                return Err(InvalidTxReason::MissingTokenAddress);
            }
            if t.reference_hash.is_some() {
                return Err(InvalidTxReason::UnexpectedReference);
            }
            if t.payload.is_some() {
                return Err(InvalidTxReason::WrongPayloadKind);
            }
        }
        TxType::BipCreate => {
            if t.recipient.is_some() {
                return Err(InvalidTxReason::UnexpectedRecipient);
            }
            if t.amount.is_some() {
                return Err(InvalidTxReason::UnexpectedAmount);
            }
            if t.token_address.is_some() {
                return Err(InvalidTxReason::UnexpectedTokenAddress);
            }
            if t.reference_hash.is_some() {
                return Err(InvalidTxReason::UnexpectedReference);
            }
            match &t.payload {
                Some(TxPayload::BipProposal(_)) => {}
                Some(_) => return Err(InvalidTxReason::WrongPayloadKind),
                None => return Err(InvalidTxReason::MissingPayload),
            }
        }
        TxType::BipVote => {
            if t.recipient.is_some() {
                return Err(InvalidTxReason::UnexpectedRecipient);
            }
            if t.amount.is_some() {
                return Err(InvalidTxReason::UnexpectedAmount);
            }
            if t.token_address.is_some() {
                return Err(InvalidTxReason::UnexpectedTokenAddress);
            }
            if t.reference_hash.is_none() {
                return Err(InvalidTxReason::MissingReference);
            }
            match &t.payload {
                Some(TxPayload::BipVote { .. }) => {}
                Some(_) => return Err(InvalidTxReason::WrongPayloadKind),
                None => return Err(InvalidTxReason::MissingPayload),
            }
        }
    }
    Ok(())
}

fn validate_payload(payload: &TxPayload) -> Result<(), InvalidTxReason> {
    match payload {
        TxPayload::BipVote { .. } => Ok(()),
        TxPayload::BipProposal(action) => validate_action(action),
    }
}

fn validate_action(action: &BipAction) -> Result<(), InvalidTxReason> {
    match action {
        BipAction::TokenCreate {
            name,
            smallest_unit_name,
            decimals,
            website_url,
            whitepaper_url,
            ..
        } => {
            if !token_name_ok(name) || !token_name_ok(smallest_unit_name) {
                return Err(InvalidTxReason::BadTokenName);
            }
            if *decimals > 18 {
                return Err(InvalidTxReason::BadDecimals);
            }
            for url in [website_url, whitepaper_url].into_iter().flatten() {
                if !url_ok(url) {
                    return Err(InvalidTxReason::BadUrl);
                }
            }
            Ok(())
        }
        BipAction::AliasRegister { alias, .. } | BipAction::AliasRemove { alias } => {
            if !alias_ok(alias) {
                return Err(InvalidTxReason::BadAlias);
            }
            Ok(())
        }
        BipAction::NetworkParamsSet(update) => validate_params_update(update),
        BipAction::TokenMint { amount, .. } | BipAction::TokenBurn { amount, .. } => {
            if amount.is_zero() {
                return Err(InvalidTxReason::BadParamsUpdate(
                    "zero token amount".to_string(),
                ));
            }
            Ok(())
        }
        BipAction::AuthorityAdd { .. }
        | BipAction::AuthorityRemove { .. }
        | BipAction::ValidatorAdd { .. }
        | BipAction::ValidatorRemove { .. } => Ok(()),
    }
}

fn validate_params_update(update: &NetworkParamsUpdate) -> Result<(), InvalidTxReason> {
    if update.is_empty() {
        return Err(InvalidTxReason::BadParamsUpdate("empty update".to_string()));
    }
    if let Some(target) = update.target_mining_time_ms {
        if target < 5_000 {
            return Err(InvalidTxReason::BadParamsUpdate(format!(
                "target mining time {target} ms below 5000"
            )));
        }
    }
    if let Some(half_life) = update.asert_half_life_blocks {
        if half_life == 0 {
            return Err(InvalidTxReason::BadParamsUpdate(
                "zero half life".to_string(),
            ));
        }
    }
    Ok(())
}

/// `[A-Z0-9_]{1,16}`, not starting or ending with an underscore.
fn token_name_ok(name: &str) -> bool {
    let len_ok = (1..=16).contains(&name.len());
    let chars_ok = name
        .bytes()
        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_');
    len_ok && chars_ok && !name.starts_with('_') && !name.ends_with('_')
}

/// `[a-z0-9_]{1,64}`.
fn alias_ok(alias: &str) -> bool {
    (1..=64).contains(&alias.len())
        && alias
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

fn url_ok(url: &str) -> bool {
    url.len() <= 256 && (url.starts_with("https://") || url.starts_with("http://"))
}

// =============================================================================
// STATEFUL
// =============================================================================

/// Validate against a world-state snapshot. `now_ms` is the reference
/// clock for proposal expiry: the block timestamp during application, the
/// local clock during mempool admission.
pub fn validate_stateful(
    tx: &SealedTransaction,
    state: &WorldState,
    rule: NonceRule,
    now_ms: u64,
) -> Result<(), ChainError> {
    let t = &tx.transaction;
    let stored = state.get_nonce(&tx.sender)?.nonce;

    if t.nonce <= stored {
        return Err(InvalidTxReason::NonceTooLow {
            stored,
            got: t.nonce,
        }
        .into());
    }
    match rule {
        NonceRule::Exact => {
            if t.nonce != stored + 1 {
                return Err(InvalidTxReason::NonceNotNext {
                    stored,
                    got: t.nonce,
                }
                .into());
            }
        }
        NonceRule::Windowed { max_gap } => {
            if t.nonce > stored + max_gap {
                return Err(InvalidTxReason::NonceGap {
                    limit: stored + max_gap,
                    got: t.nonce,
                }
                .into());
            }
        }
    }

    // Fee is always payable in the native token. A native transfer must
    // cover amount and fee out of the same balance.
    let native = state.get_balance(&tx.sender, &Address::NATIVE_TOKEN)?.balance;
    let fee = U256::from(t.fee);
    let native_need = match (t.tx_type, t.token_address) {
        (TxType::Transfer, Some(token)) if token.is_native_token() => {
            fee.saturating_add(t.amount.unwrap_or_default())
        }
        _ => fee,
    };
    if native < native_need {
        return Err(InvalidTxReason::InsufficientFeeBalance {
            balance: native,
            required: native_need,
        }
        .into());
    }

    match t.tx_type {
        TxType::Transfer => {
            let token = t.token_address.unwrap_or(Address::NATIVE_TOKEN);
            if !token.is_native_token() {
                let amount = t.amount.unwrap_or_default();
                let balance = state.get_balance(&tx.sender, &token)?.balance;
                if balance < amount {
                    return Err(InvalidTxReason::InsufficientTokenBalance {
                        token,
                        balance,
                        amount,
                    }
                    .into());
                }
            }
        }
        TxType::BipCreate => {
            if let Some(TxPayload::BipProposal(action)) = &t.payload {
                validate_action_against_state(action, tx, state)?;
            }
        }
        TxType::BipVote => {
            if !state.is_authority(&tx.sender)? {
                return Err(InvalidTxReason::NotAuthority.into());
            }
            let reference = t
                .reference_hash
                .ok_or(InvalidTxReason::MissingReference)?;
            let bip = state
                .get_bip(&reference)?
                .ok_or(InvalidTxReason::UnknownBip(reference))?;
            if bip.status != shared_types::BipStatus::Pending {
                return Err(InvalidTxReason::BipNotPending.into());
            }
            if bip.is_expired_at(now_ms) {
                return Err(InvalidTxReason::BipExpired.into());
            }
            if bip.has_voted(&tx.sender) {
                return Err(InvalidTxReason::AlreadyVoted.into());
            }
        }
    }
    Ok(())
}

/// Uniqueness and existence rules for proposal actions, checked when the
/// proposal is created.
fn validate_action_against_state(
    action: &BipAction,
    tx: &SealedTransaction,
    state: &WorldState,
) -> Result<(), ChainError> {
    match action {
        BipAction::TokenCreate { .. } => {
            let derived = derive_token_address(&tx.hash);
            if state.get_token(&derived)?.is_some() {
                return Err(InvalidTxReason::TokenExists(derived).into());
            }
        }
        BipAction::TokenMint { token, amount, .. } => {
            let token_state = state
                .get_token(token)?
                .ok_or(InvalidTxReason::UnknownToken(*token))?;
            if let Some(max) = token_state.max_supply {
                if token_state.total_supply.saturating_add(*amount) > max {
                    return Err(InvalidTxReason::ExceedsMaxSupply.into());
                }
            }
        }
        BipAction::TokenBurn { token, .. } => {
            if state.get_token(token)?.is_none() {
                return Err(InvalidTxReason::UnknownToken(*token).into());
            }
        }
        BipAction::AuthorityAdd { address } => {
            if state.is_authority(address)? {
                return Err(InvalidTxReason::AuthorityExists.into());
            }
        }
        BipAction::AuthorityRemove { address } => {
            if !state.is_authority(address)? {
                return Err(InvalidTxReason::UnknownAuthority.into());
            }
        }
        BipAction::ValidatorAdd { address } => {
            if state.get_validator(address)?.is_some() {
                return Err(InvalidTxReason::ValidatorExists.into());
            }
        }
        BipAction::ValidatorRemove { address } => {
            if state.get_validator(address)?.is_none() {
                return Err(InvalidTxReason::UnknownValidator.into());
            }
        }
        BipAction::AliasRegister { alias, .. } => {
            if state.get_alias(alias)?.is_some() {
                return Err(InvalidTxReason::AliasTaken.into());
            }
        }
        BipAction::AliasRemove { alias } => {
            if state.get_alias(alias)?.is_none() {
                return Err(InvalidTxReason::UnknownAlias.into());
            }
        }
        BipAction::NetworkParamsSet(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{Signature, Transaction};

    fn settings() -> NetworkSettings {
        NetworkSettings::devnet()
    }

    fn sealed(tx: Transaction, sender: Address) -> SealedTransaction {
        SealedTransaction {
            size: 150,
            hash: shared_types::Hash([1; 32]),
            sender,
            transaction: tx,
        }
    }

    fn transfer() -> Transaction {
        Transaction {
            version: 1,
            tx_type: TxType::Transfer,
            network: settings().network_id,
            timestamp: 1,
            nonce: 1,
            recipient: Some(Address([2; 20])),
            amount: Some(U256::from(10u64)),
            fee: 1,
            token_address: Some(Address::NATIVE_TOKEN),
            payload: None,
            reference_hash: None,
            message: None,
            signature: Signature([1; 65]),
        }
    }

    #[test]
    fn test_valid_transfer_shape() {
        let tx = sealed(transfer(), Address([1; 20]));
        assert!(validate_stateless(&tx, &settings()).is_ok());
    }

    #[test]
    fn test_wrong_network_rejected() {
        let mut raw = transfer();
        raw.network = 999;
        let err = validate_stateless(&sealed(raw, Address([1; 20])), &settings()).unwrap_err();
        assert!(matches!(err, InvalidTxReason::WrongNetwork { .. }));
    }

    #[test]
    fn test_transfer_forbids_reference() {
        let mut raw = transfer();
        raw.reference_hash = Some(shared_types::Hash([9; 32]));
        let err = validate_stateless(&sealed(raw, Address([1; 20])), &settings()).unwrap_err();
        assert_eq!(err, InvalidTxReason::UnexpectedReference);
    }

    #[test]
    fn test_self_transfer_rejected() {
        let raw = transfer();
        let sender = raw.recipient.unwrap();
        let err = validate_stateless(&sealed(raw, sender), &settings()).unwrap_err();
        assert_eq!(err, InvalidTxReason::SelfTransfer);
    }

    #[test]
    fn test_oversized_rejected() {
        let tx = SealedTransaction {
            size: settings().max_tx_size + 1,
            ..sealed(transfer(), Address([1; 20]))
        };
        let err = validate_stateless(&tx, &settings()).unwrap_err();
        assert!(matches!(err, InvalidTxReason::TooLarge { .. }));
    }

    #[test]
    fn test_vote_requires_reference_and_payload() {
        let mut raw = transfer();
        raw.tx_type = TxType::BipVote;
        raw.recipient = None;
        raw.amount = None;
        raw.token_address = None;
        raw.payload = Some(TxPayload::BipVote { approve: true });
        raw.reference_hash = None;
        let err = validate_stateless(&sealed(raw, Address([1; 20])), &settings()).unwrap_err();
        assert_eq!(err, InvalidTxReason::MissingReference);
    }

    #[test]
    fn test_token_name_rules() {
        assert!(token_name_ok("EMBER"));
        assert!(token_name_ok("A1_B2"));
        assert!(!token_name_ok(""));
        assert!(!token_name_ok("_EMBER"));
        assert!(!token_name_ok("EMBER_"));
        assert!(!token_name_ok("ember"));
        assert!(!token_name_ok("TOOLONGTOKENNAME_X"));
    }

    #[test]
    fn test_alias_rules() {
        assert!(alias_ok("treasury_01"));
        assert!(!alias_ok(""));
        assert!(!alias_ok("Upper"));
        assert!(!alias_ok(&"a".repeat(65)));
    }

    #[test]
    fn test_params_update_bounds() {
        let err = validate_params_update(&NetworkParamsUpdate {
            target_mining_time_ms: Some(4_999),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, InvalidTxReason::BadParamsUpdate(_)));

        assert!(validate_params_update(&NetworkParamsUpdate {
            target_mining_time_ms: Some(5_000),
            ..Default::default()
        })
        .is_ok());
    }
}
