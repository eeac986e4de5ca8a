//! # Domain Entities
//!
//! Messages, receipts, attestations and the messenger configuration.

use super::errors::{Address, Hash, MessengerError, MessengerResult};
use super::value_objects::{ChainId, FeeInfo, MessageId};
use serde::{Deserialize, Serialize};

/// Acknowledgment that a message was delivered, shipped back to its origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Receipt {
    /// Message being acknowledged.
    pub received_message_id: MessageId,
    /// Account credited when the receipt is processed at the origin.
    pub relayer_reward_address: Address,
}

impl Receipt {
    /// Create a receipt.
    pub fn new(received_message_id: MessageId, relayer_reward_address: Address) -> Self {
        Self {
            received_message_id,
            relayer_reward_address,
        }
    }
}

/// A unit of cross-chain communication.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Emitting chain.
    pub source_chain_id: ChainId,
    /// Receiving chain.
    pub destination_chain_id: ChainId,
    /// Lane-unique identifier.
    pub message_id: MessageId,
    /// Account that called `send` on the source.
    pub sender_address: Address,
    /// Recipient on the destination.
    pub destination_address: Address,
    /// Minimum gas the destination execution must be given.
    pub required_gas_limit: u64,
    /// Executors allowed to deliver. Empty means anyone.
    pub allowed_executor_addresses: Vec<Address>,
    /// Reward for the delivering relayer.
    pub fee_info: FeeInfo,
    /// Application bytes.
    pub payload: Vec<u8>,
    /// Receipts piggybacked on this message.
    pub receipts: Vec<Receipt>,
}

impl Message {
    /// Whether `executor` may deliver this message.
    pub fn allows_executor(&self, executor: &Address) -> bool {
        self.allowed_executor_addresses.is_empty()
            || self.allowed_executor_addresses.contains(executor)
    }
}

/// Caller input for `send`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendRequest {
    /// Receiving chain.
    pub destination_chain_id: ChainId,
    /// Recipient on the destination.
    pub destination_address: Address,
    /// Reward for the delivering relayer.
    pub fee_info: FeeInfo,
    /// Minimum destination execution gas.
    pub required_gas_limit: u64,
    /// Allowed executors, empty for anyone.
    pub allowed_executors: Vec<Address>,
    /// Application bytes.
    pub payload: Vec<u8>,
}

/// Builder for [`SendRequest`].
#[derive(Clone, Debug)]
pub struct SendRequestBuilder {
    inner: SendRequest,
}

impl SendRequestBuilder {
    /// Start a request to `destination_chain_id`.
    pub fn new(destination_chain_id: ChainId, destination_address: Address) -> Self {
        Self {
            inner: SendRequest {
                destination_chain_id,
                destination_address,
                fee_info: FeeInfo::default(),
                required_gas_limit: 0,
                allowed_executors: Vec::new(),
                payload: Vec::new(),
            },
        }
    }

    /// Set fee.
    pub fn fee(mut self, fee_info: FeeInfo) -> Self {
        self.inner.fee_info = fee_info;
        self
    }

    /// Set required gas limit.
    pub fn required_gas_limit(mut self, gas: u64) -> Self {
        self.inner.required_gas_limit = gas;
        self
    }

    /// Restrict delivery to these executors.
    pub fn allowed_executors(mut self, executors: Vec<Address>) -> Self {
        self.inner.allowed_executors = executors;
        self
    }

    /// Set payload.
    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.inner.payload = payload;
        self
    }

    /// Build the request.
    pub fn build(self) -> SendRequest {
        self.inner
    }
}

/// Opaque proof that a message was signed by a quorum.
///
/// Produced by an external [`crate::ports::AttestationService`]. The engine
/// only reads [`Attestation::num_signers`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    /// Digest of the attested message.
    pub message_digest: Hash,
    /// Number of aggregated signers.
    pub num_signers: u32,
    /// Scheme-specific proof bytes.
    pub proof: Vec<u8>,
}

impl Attestation {
    /// Number of signers in the aggregate.
    pub fn num_signers(&self) -> u32 {
        self.num_signers
    }
}

/// Gas schedule for delivery calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasSchedule {
    /// Fixed cost of receiving a message.
    pub base_overhead: u64,
    /// Cost of verifying one aggregated signer.
    pub per_signer_cost: u64,
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self {
            base_overhead: crate::algorithms::gas::BASE_OVERHEAD,
            per_signer_cost: crate::algorithms::gas::PER_SIGNER_COST,
        }
    }
}

/// Messenger configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessengerConfig {
    /// Chain this messenger runs on.
    pub local_chain_id: ChainId,
    /// Upper bound of receipts piggybacked on one message.
    pub max_receipts_per_message: usize,
    /// Gas schedule.
    pub gas: GasSchedule,
    /// Signer count used on the gas retry when the caller gives none.
    pub retry_signer_count: u32,
    /// Default deadline for a delivery flow, in milliseconds.
    pub default_delivery_timeout_ms: u64,
}

impl MessengerConfig {
    /// Default configuration for `local_chain_id`.
    pub fn new(local_chain_id: ChainId) -> Self {
        Self {
            local_chain_id,
            max_receipts_per_message: 5,
            gas: GasSchedule::default(),
            retry_signer_count: 10,
            default_delivery_timeout_ms: 30_000,
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> MessengerResult<()> {
        if self.max_receipts_per_message == 0 {
            return Err(MessengerError::InvalidConfig(
                "max_receipts_per_message cannot be 0".to_string(),
            ));
        }
        if self.retry_signer_count == 0 {
            return Err(MessengerError::InvalidConfig(
                "retry_signer_count cannot be 0".to_string(),
            ));
        }
        if self.gas.base_overhead == 0 || self.gas.per_signer_cost == 0 {
            return Err(MessengerError::InvalidConfig(
                "gas schedule costs must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Builder-style method to set the receipt batch size.
    pub fn with_max_receipts_per_message(mut self, max: usize) -> Self {
        self.max_receipts_per_message = max;
        self
    }

    /// Builder-style method to set the gas schedule.
    pub fn with_gas(mut self, gas: GasSchedule) -> Self {
        self.gas = gas;
        self
    }

    /// Builder-style method to set the retry signer count.
    pub fn with_retry_signer_count(mut self, count: u32) -> Self {
        self.retry_signer_count = count;
        self
    }

    /// Builder-style method to set the default delivery timeout.
    pub fn with_default_delivery_timeout_ms(mut self, ms: u64) -> Self {
        self.default_delivery_timeout_ms = ms;
        self
    }
}
