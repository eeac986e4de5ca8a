//! # Domain Errors
//!
//! Error types for the cross-chain messenger.
//!
//! Caller mistakes (`InvalidDestination`, `InvalidSignerCount`,
//! `NegativeAmount`, ...) fail fast and are never retried. Environmental
//! delivery failures are not errors here: they surface as
//! [`crate::delivery::DeliveryOutcome::Failed`].

use super::value_objects::{ChainId, MessageId};
use thiserror::Error;

/// Hash type (32-byte SHA-256).
pub type Hash = [u8; 32];

/// Address type (20-byte).
pub type Address = [u8; 20];

/// Token amount. Signed so that negative inputs can be rejected explicitly.
pub type Amount = i128;

/// Messenger error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessengerError {
    /// Destination equals the local chain.
    #[error("Invalid destination: {0} is the local chain")]
    InvalidDestination(ChainId),

    /// Gas estimation requested with no signers.
    #[error("Invalid signer count: {0}")]
    InvalidSignerCount(u32),

    /// Negative token amount.
    #[error("Negative amount: {0}")]
    NegativeAmount(Amount),

    /// Additional fee must be strictly positive.
    #[error("Invalid fee amount: {0}")]
    InvalidFeeAmount(Amount),

    /// Fee token differs from the one the message was sent with.
    #[error("Fee token mismatch for message {message_id}")]
    FeeTokenMismatch {
        /// Message whose fee was being raised
        message_id: MessageId,
    },

    /// No record of the message.
    #[error("Unknown message {message_id} on lane {chain}")]
    UnknownMessage {
        /// Counterpart chain of the lane
        chain: ChainId,
        /// Message identifier
        message_id: MessageId,
    },

    /// Every identifier on the lane has been allocated.
    #[error("Lane to {0} exhausted")]
    LaneExhausted(ChainId),

    /// The receipt for this message was already received.
    #[error("Receipt already received for message {0}")]
    ReceiptAlreadyReceived(MessageId),

    /// Gas arithmetic overflowed.
    #[error("Gas overflow: {base} + {signers} signers + {required}")]
    GasOverflow {
        /// Base overhead
        base: u64,
        /// Signer count
        signers: u32,
        /// Required gas limit
        required: u64,
    },

    /// Ledger balance overflowed.
    #[error("Balance overflow")]
    BalanceOverflow,

    /// No failed execution is stored for this message.
    #[error("No failed execution for message {0}")]
    NoFailedExecution(MessageId),

    /// Supplied message does not match the stored one.
    #[error("Message mismatch for {0}")]
    MessageMismatch(MessageId),

    /// Application execution failed.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Wire encoding failure.
    #[error("Codec error: {0}")]
    Codec(String),

    /// Attestation service failure.
    #[error("Attestation error: {0}")]
    Attestation(String),

    /// Chain client failure.
    #[error("Chain error: {0}")]
    Chain(String),

    /// Invalid configuration value.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type for messenger operations.
pub type MessengerResult<T> = Result<T, MessengerError>;
