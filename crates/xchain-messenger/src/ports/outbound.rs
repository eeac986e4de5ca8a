//! # Outbound Ports
//!
//! Traits for external dependencies: the attestation service, the
//! destination chain client, and the application receiver.

use crate::algorithms::message_digest;
use crate::domain::{Address, Attestation, ChainId, Message, MessengerError, MessengerResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

/// Attestation service - outbound port.
///
/// Produces an aggregate proof that a quorum of source validators signed the
/// message. The call may take arbitrarily long; callers bound it with their
/// own deadline.
#[async_trait]
pub trait AttestationService: Send + Sync {
    /// Request an attestation for `message`.
    async fn request_attestation(&self, message: &Message) -> MessengerResult<Attestation>;
}

/// Result of a delivery transaction on the destination chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionOutcome {
    /// Whether the transaction made it into a block.
    pub included: bool,
    /// Gas consumed.
    pub gas_used: u64,
    /// Whether execution reverted.
    pub reverted: bool,
    /// Revert reason, if any.
    pub reason: Option<String>,
}

impl TransactionOutcome {
    /// Included and executed.
    pub fn success(gas_used: u64) -> Self {
        Self {
            included: true,
            gas_used,
            reverted: false,
            reason: None,
        }
    }

    /// Included but reverted.
    pub fn reverted(gas_used: u64, reason: impl Into<String>) -> Self {
        Self {
            included: true,
            gas_used,
            reverted: true,
            reason: Some(reason.into()),
        }
    }

    /// Dropped before inclusion.
    pub fn not_included(reason: impl Into<String>) -> Self {
        Self {
            included: false,
            gas_used: 0,
            reverted: false,
            reason: Some(reason.into()),
        }
    }

    /// Whether the transaction was accepted.
    pub fn is_success(&self) -> bool {
        self.included && !self.reverted
    }

    /// Whether the revert was caused by running out of gas.
    pub fn is_out_of_gas(&self, gas_limit: u64) -> bool {
        self.reverted
            && (self.gas_used >= gas_limit
                || self
                    .reason
                    .as_deref()
                    .is_some_and(|r| r.contains("out of gas")))
    }
}

/// Destination chain client - outbound port.
#[async_trait]
pub trait DestinationChainClient: Send + Sync {
    /// Submit an encoded delivery to `destination` and wait for inclusion.
    async fn submit(
        &self,
        destination: ChainId,
        payload: Vec<u8>,
        gas_limit: u64,
    ) -> MessengerResult<TransactionOutcome>;
}

/// Application receiver on the destination chain - outbound port.
pub trait MessageReceiver: Send + Sync {
    /// Handle a delivered payload. An `Err` leaves the message retryable.
    fn receive_message(&self, origin: ChainId, sender: Address, payload: &[u8])
        -> Result<(), String>;
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// Mock attestation service.
///
/// Attests any message with a fixed signer count after an optional delay.
/// The proof is empty.
#[derive(Clone, Debug)]
pub struct MockAttestationService {
    /// Signer count reported in every attestation.
    pub num_signers: u32,
    /// Simulated latency.
    pub delay: Option<Duration>,
    /// Should fail?
    pub should_fail: bool,
}

impl Default for MockAttestationService {
    fn default() -> Self {
        Self {
            num_signers: 3,
            delay: None,
            should_fail: false,
        }
    }
}

#[async_trait]
impl AttestationService for MockAttestationService {
    async fn request_attestation(&self, message: &Message) -> MessengerResult<Attestation> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.should_fail {
            return Err(MessengerError::Attestation("Mock failure".to_string()));
        }
        Ok(Attestation {
            message_digest: message_digest(message)?,
            num_signers: self.num_signers,
            proof: Vec::new(),
        })
    }
}

/// Mock chain client replaying scripted outcomes.
///
/// Once the script is exhausted every submission succeeds.
#[derive(Default)]
pub struct MockChainClient {
    outcomes: Mutex<VecDeque<TransactionOutcome>>,
    submissions: Mutex<Vec<(ChainId, u64)>>,
    /// Simulated inclusion latency.
    pub delay: Option<Duration>,
}

impl MockChainClient {
    /// Client that answers with `outcomes` in order.
    pub fn scripted(outcomes: Vec<TransactionOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            ..Default::default()
        }
    }

    /// Builder-style method to set the inclusion latency.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// `(destination, gas_limit)` of every submission so far.
    pub fn submissions(&self) -> Vec<(ChainId, u64)> {
        self.submissions.lock().clone()
    }
}

#[async_trait]
impl DestinationChainClient for MockChainClient {
    async fn submit(
        &self,
        destination: ChainId,
        _payload: Vec<u8>,
        gas_limit: u64,
    ) -> MessengerResult<TransactionOutcome> {
        self.submissions.lock().push((destination, gas_limit));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.outcomes.lock().pop_front();
        Ok(scripted.unwrap_or_else(|| TransactionOutcome::success(gas_limit / 2)))
    }
}

/// Mock receiver recording every payload it accepts.
#[derive(Default)]
pub struct MockReceiver {
    received: Mutex<Vec<(ChainId, Address, Vec<u8>)>>,
    failing: Mutex<bool>,
}

impl MockReceiver {
    /// Receiver that rejects until [`MockReceiver::set_failing`] clears it.
    pub fn failing() -> Self {
        Self {
            failing: Mutex::new(true),
            ..Default::default()
        }
    }

    /// Toggle failure mode.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    /// Payloads accepted so far.
    pub fn received(&self) -> Vec<(ChainId, Address, Vec<u8>)> {
        self.received.lock().clone()
    }
}

impl MessageReceiver for MockReceiver {
    fn receive_message(
        &self,
        origin: ChainId,
        sender: Address,
        payload: &[u8],
    ) -> Result<(), String> {
        if *self.failing.lock() {
            return Err("receiver rejected payload".to_string());
        }
        self.received.lock().push((origin, sender, payload.to_vec()));
        Ok(())
    }
}
