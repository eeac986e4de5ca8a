//! Local Network Adapter
//!
//! Implements `DestinationChainClient` over in-process messengers. Every
//! submission runs the checks the destination contract would run and
//! answers with the matching transaction outcome. State is committed by
//! the delivery engine on confirmation, never here.

use super::attestation::InMemoryAttestationService;
use crate::algorithms::DeliveryPayload;
use crate::domain::{ChainId, MessengerError, MessengerResult};
use crate::ports::inbound::MessengerApi;
use crate::ports::outbound::{DestinationChainClient, TransactionOutcome};
use crate::service::Messenger;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// In-process chain client for a set of messengers.
pub struct LocalNetwork {
    chains: RwLock<HashMap<ChainId, Arc<Messenger>>>,
    verifier: Arc<InMemoryAttestationService>,
    /// Minimum signer count the destination charges verification for.
    signer_floor: u32,
    inclusion_delay: Option<Duration>,
}

impl LocalNetwork {
    /// Create a network that verifies attestations with `verifier`.
    pub fn new(verifier: Arc<InMemoryAttestationService>) -> Self {
        Self {
            chains: RwLock::new(HashMap::new()),
            verifier,
            signer_floor: 1,
            inclusion_delay: None,
        }
    }

    /// Builder-style method to charge verification for at least `floor` signers.
    pub fn with_signer_floor(mut self, floor: u32) -> Self {
        self.signer_floor = floor;
        self
    }

    /// Builder-style method to delay inclusion.
    pub fn with_inclusion_delay(mut self, delay: Duration) -> Self {
        self.inclusion_delay = Some(delay);
        self
    }

    /// Attach a chain.
    pub fn add_chain(&self, messenger: Arc<Messenger>) {
        self.chains.write().insert(messenger.chain_id(), messenger);
    }

    fn chain(&self, chain: ChainId) -> Option<Arc<Messenger>> {
        self.chains.read().get(&chain).cloned()
    }

    fn execute(
        &self,
        destination: &Messenger,
        body: &DeliveryPayload,
        gas_limit: u64,
    ) -> TransactionOutcome {
        let message = &body.message;
        let attestation = &body.attestation;
        let base = destination.estimator().schedule().base_overhead;

        let signers = attestation.num_signers().max(self.signer_floor);
        let required = match destination
            .estimator()
            .estimate(signers, message.required_gas_limit)
        {
            Ok(gas) => gas,
            Err(e) => return TransactionOutcome::reverted(base.min(gas_limit), e.to_string()),
        };
        if gas_limit < required {
            return TransactionOutcome::reverted(gas_limit, "out of gas");
        }
        let used = base.min(gas_limit);
        if !self.verifier.verify(message, attestation) {
            return TransactionOutcome::reverted(used, "invalid attestation");
        }
        if message.destination_chain_id != destination.chain_id() {
            return TransactionOutcome::reverted(used, "invalid destination chain");
        }
        if !message.allows_executor(&body.executor) {
            return TransactionOutcome::reverted(used, "unauthorized executor");
        }
        if destination.is_delivered(message.source_chain_id, message.message_id) {
            return TransactionOutcome::reverted(used, "message already delivered");
        }
        TransactionOutcome::success(required)
    }
}

#[async_trait]
impl DestinationChainClient for LocalNetwork {
    async fn submit(
        &self,
        destination: ChainId,
        payload: Vec<u8>,
        gas_limit: u64,
    ) -> MessengerResult<TransactionOutcome> {
        let messenger = self
            .chain(destination)
            .ok_or_else(|| MessengerError::Chain(format!("unknown chain {destination}")))?;
        if let Some(delay) = self.inclusion_delay {
            tokio::time::sleep(delay).await;
        }
        let outcome = match DeliveryPayload::decode(&payload) {
            Ok(body) => self.execute(&messenger, &body, gas_limit),
            Err(e) => TransactionOutcome::reverted(0, e.to_string()),
        };
        if outcome.is_success() {
            debug!(destination = %destination, gas_limit, gas_used = outcome.gas_used, "[network] included");
        } else {
            warn!(
                destination = %destination,
                gas_limit,
                reason = outcome.reason.as_deref().unwrap_or_default(),
                "[network] reverted"
            );
        }
        Ok(outcome)
    }
}
