//! # Domain Invariants
//!
//! Business rules shared by the registry, ledger and gas estimator.

use super::errors::{Address, Amount, MessengerError};
use super::value_objects::{ChainId, MessageId};

/// Invariant: a message never targets the chain it was sent from.
pub fn invariant_distinct_chains(
    local_chain: ChainId,
    destination: ChainId,
) -> Result<(), MessengerError> {
    if local_chain == destination {
        return Err(MessengerError::InvalidDestination(destination));
    }
    Ok(())
}

/// Invariant: amounts are never negative.
pub fn invariant_non_negative(amount: Amount) -> Result<(), MessengerError> {
    if amount < 0 {
        return Err(MessengerError::NegativeAmount(amount));
    }
    Ok(())
}

/// Invariant: attestation verification needs at least one signer.
pub fn invariant_signer_count(num_signers: u32) -> Result<(), MessengerError> {
    if num_signers == 0 {
        return Err(MessengerError::InvalidSignerCount(num_signers));
    }
    Ok(())
}

/// Invariant: a fee top-up is strictly positive and in the original token.
pub fn invariant_fee_increase(
    message_id: MessageId,
    original_token: &Address,
    token: &Address,
    amount: Amount,
) -> Result<(), MessengerError> {
    if amount <= 0 {
        return Err(MessengerError::InvalidFeeAmount(amount));
    }
    if original_token != token {
        return Err(MessengerError::FeeTokenMismatch { message_id });
    }
    Ok(())
}
