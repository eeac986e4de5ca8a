//! # Delivery Engine
//!
//! Drives one message from its source messenger to the destination chain.
//!
//! ```text
//! Constructing -> Attesting -> Submitting -> Confirmed
//!                                  |  ^
//!                                  v  |
//!                                Retrying   (at most once)
//! ```
//!
//! Waiting for the attestation and waiting for inclusion both race the
//! caller's [`CancelToken`] and deadline. Nothing on the destination is
//! written before `Confirmed`.
//!
//! Caller mistakes come back as `Err`. Environmental failures come back as
//! `Ok(DeliveryOutcome::Failed(..))`.

use crate::algorithms::DeliveryPayload;
use crate::domain::{
    Address, Attestation, DeliveryState, Message, MessageId, MessengerConfig, MessengerError,
    MessengerResult, SendRequest,
};
use crate::ports::inbound::MessengerApi;
use crate::ports::outbound::{AttestationService, DestinationChainClient};
use crate::service::Messenger;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Cooperative cancellation signal shared between a caller and its flows.
#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Create an uncancelled token.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Cancel every flow holding a clone of this token.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether [`CancelToken::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // sender is held by `self`
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-call delivery parameters.
#[derive(Clone, Debug)]
pub struct DeliveryContext {
    /// Cancellation signal.
    pub cancel: CancelToken,
    /// Absolute deadline for the whole flow.
    pub deadline: Instant,
    /// Signer count for the gas retry. Falls back to
    /// [`MessengerConfig::retry_signer_count`].
    pub signer_override: Option<u32>,
}

impl DeliveryContext {
    /// Context expiring `timeout` from now.
    pub fn new(timeout: Duration) -> Self {
        Self {
            cancel: CancelToken::new(),
            deadline: Instant::now() + timeout,
            signer_override: None,
        }
    }

    /// Context using the configured default timeout.
    pub fn from_config(config: &MessengerConfig) -> Self {
        Self::new(Duration::from_millis(config.default_delivery_timeout_ms))
    }

    /// Builder-style method to share a cancel token.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Builder-style method to set the retry signer count.
    pub fn with_signer_override(mut self, num_signers: u32) -> Self {
        self.signer_override = Some(num_signers);
        self
    }
}

/// Why a delivery flow failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    /// The deadline passed before the attestation arrived.
    #[error("attestation timed out")]
    AttestationTimeout,

    /// The attestation service returned an error.
    #[error("attestation unavailable: {0}")]
    AttestationUnavailable(String),

    /// The destination rejected or never included the delivery.
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Terminal result of a delivery flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Accepted by the destination and committed.
    Confirmed {
        /// Delivered message.
        message_id: MessageId,
        /// Gas limit of the accepted submission.
        gas_limit: u64,
        /// Gas the destination charged.
        gas_used: u64,
        /// Submissions made, 1 or 2.
        attempts: u8,
    },
    /// Gave up.
    Failed(FailureReason),
    /// Cancelled by the caller.
    Cancelled,
}

impl DeliveryOutcome {
    /// Whether the message was delivered.
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }
}

/// How a raced wait ended.
enum Race<T> {
    Done(T),
    Cancelled,
    Expired,
}

async fn race<F: Future>(ctx: &DeliveryContext, fut: F) -> Race<F::Output> {
    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => Race::Cancelled,
        _ = tokio::time::sleep_until(ctx.deadline) => Race::Expired,
        out = fut => Race::Done(out),
    }
}

/// State of one running flow.
struct Flow {
    message_id: MessageId,
    state: DeliveryState,
}

impl Flow {
    fn starting_at(message_id: MessageId, state: DeliveryState) -> Self {
        debug!(message_id = message_id.0, state = ?state, "[delivery] flow started");
        Self { message_id, state }
    }

    fn advance(&mut self, next: DeliveryState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!(
            message_id = self.message_id.0,
            from = ?self.state,
            to = ?next,
            "[delivery] transition"
        );
        self.state = next;
    }

    fn fail(&mut self, reason: FailureReason) -> DeliveryOutcome {
        warn!(message_id = self.message_id.0, state = ?self.state, reason = %reason, "[delivery] failed");
        self.advance(DeliveryState::Failed);
        DeliveryOutcome::Failed(reason)
    }

    fn cancel(&mut self) -> DeliveryOutcome {
        info!(message_id = self.message_id.0, state = ?self.state, "[delivery] cancelled");
        self.advance(DeliveryState::Cancelled);
        DeliveryOutcome::Cancelled
    }
}

/// Delivery engine for one source -> destination lane.
pub struct DeliveryEngine<A, C>
where
    A: AttestationService,
    C: DestinationChainClient,
{
    source: Arc<Messenger>,
    destination: Arc<Messenger>,
    attestation: Arc<A>,
    chain: Arc<C>,
    /// Account submitting deliveries.
    executor: Address,
    /// Account named in the receipts of delivered messages.
    relayer_reward_address: Address,
}

impl<A, C> DeliveryEngine<A, C>
where
    A: AttestationService,
    C: DestinationChainClient,
{
    /// Create an engine relaying from `source` to `destination`.
    ///
    /// Deliveries are submitted as `executor`; receipts name
    /// `relayer_reward_address` as the account to credit.
    pub fn new(
        source: Arc<Messenger>,
        destination: Arc<Messenger>,
        attestation: Arc<A>,
        chain: Arc<C>,
        executor: Address,
        relayer_reward_address: Address,
    ) -> Self {
        Self {
            source,
            destination,
            attestation,
            chain,
            executor,
            relayer_reward_address,
        }
    }

    /// Account named in the receipts of delivered messages.
    pub fn relayer_reward_address(&self) -> Address {
        self.relayer_reward_address
    }

    /// Source messenger.
    pub fn source(&self) -> &Arc<Messenger> {
        &self.source
    }

    /// Destination messenger.
    pub fn destination(&self) -> &Arc<Messenger> {
        &self.destination
    }

    /// Send `request` on the source and relay it.
    pub async fn send_and_relay(
        &self,
        sender: Address,
        request: SendRequest,
        ctx: &DeliveryContext,
    ) -> MessengerResult<(Message, DeliveryOutcome)> {
        let (message_id, message) = self.source.send(sender, request)?;
        let mut flow = Flow::starting_at(message_id, DeliveryState::Constructing);
        flow.advance(DeliveryState::Attesting);
        let outcome = self.attest_and_deliver(&mut flow, &message, ctx).await?;
        Ok((message, outcome))
    }

    /// Attest an already sent `message` and deliver it.
    pub async fn relay(
        &self,
        message: &Message,
        ctx: &DeliveryContext,
    ) -> MessengerResult<DeliveryOutcome> {
        let mut flow = Flow::starting_at(message.message_id, DeliveryState::Attesting);
        self.attest_and_deliver(&mut flow, message, ctx).await
    }

    /// Deliver `message` with an existing `attestation`.
    pub async fn deliver(
        &self,
        message: &Message,
        attestation: &Attestation,
        ctx: &DeliveryContext,
    ) -> MessengerResult<DeliveryOutcome> {
        let mut flow = Flow::starting_at(message.message_id, DeliveryState::Submitting);
        self.submit(&mut flow, message, attestation, ctx).await
    }

    async fn attest_and_deliver(
        &self,
        flow: &mut Flow,
        message: &Message,
        ctx: &DeliveryContext,
    ) -> MessengerResult<DeliveryOutcome> {
        let attestation = match race(ctx, self.attestation.request_attestation(message)).await {
            Race::Cancelled => return Ok(flow.cancel()),
            Race::Expired => return Ok(flow.fail(FailureReason::AttestationTimeout)),
            Race::Done(Err(e)) => {
                return Ok(flow.fail(FailureReason::AttestationUnavailable(e.to_string())))
            }
            Race::Done(Ok(attestation)) => attestation,
        };
        if message.source_chain_id == self.source.chain_id() {
            self.source
                .registry()
                .mark_attested(message.destination_chain_id, message.message_id);
        }
        flow.advance(DeliveryState::Submitting);
        self.submit(flow, message, &attestation, ctx).await
    }

    async fn submit(
        &self,
        flow: &mut Flow,
        message: &Message,
        attestation: &Attestation,
        ctx: &DeliveryContext,
    ) -> MessengerResult<DeliveryOutcome> {
        let destination = self.destination.chain_id();
        if message.destination_chain_id != destination {
            return Err(MessengerError::Chain(format!(
                "engine delivers to {destination}, message targets {}",
                message.destination_chain_id
            )));
        }
        let payload = DeliveryPayload {
            message: message.clone(),
            attestation: attestation.clone(),
            executor: self.executor,
            relayer_reward_address: self.relayer_reward_address,
        }
        .encode()?;

        let estimator = self.destination.estimator();
        let mut num_signers = attestation.num_signers();
        let mut attempts: u8 = 0;
        loop {
            let gas_limit = estimator.estimate(num_signers, message.required_gas_limit)?;
            attempts += 1;
            debug!(
                message_id = message.message_id.0,
                gas_limit,
                num_signers,
                attempts,
                "[delivery] submitting"
            );

            let outcome = match race(ctx, self.chain.submit(destination, payload.clone(), gas_limit)).await
            {
                Race::Cancelled => return Ok(flow.cancel()),
                Race::Expired => {
                    return Ok(flow.fail(FailureReason::DeliveryFailed(
                        "inclusion deadline elapsed".to_string(),
                    )))
                }
                Race::Done(Err(e)) => {
                    return Ok(flow.fail(FailureReason::DeliveryFailed(e.to_string())))
                }
                Race::Done(Ok(outcome)) => outcome,
            };

            if outcome.is_success() {
                return self.confirm(flow, message, gas_limit, outcome.gas_used, attempts);
            }
            if attempts == 1 && outcome.is_out_of_gas(gas_limit) {
                flow.advance(DeliveryState::Retrying);
                num_signers = ctx
                    .signer_override
                    .unwrap_or(self.destination.config().retry_signer_count);
                warn!(
                    message_id = message.message_id.0,
                    gas_limit,
                    num_signers,
                    "[delivery] out of gas, retrying"
                );
                flow.advance(DeliveryState::Submitting);
                continue;
            }
            let reason = outcome
                .reason
                .unwrap_or_else(|| "transaction not included".to_string());
            return Ok(flow.fail(FailureReason::DeliveryFailed(reason)));
        }
    }

    fn confirm(
        &self,
        flow: &mut Flow,
        message: &Message,
        gas_limit: u64,
        gas_used: u64,
        attempts: u8,
    ) -> MessengerResult<DeliveryOutcome> {
        match self
            .destination
            .commit_delivery(message, self.relayer_reward_address)
        {
            Ok(true) => {}
            Ok(false) => {
                return Ok(flow.fail(FailureReason::DeliveryFailed(
                    "message already delivered".to_string(),
                )))
            }
            Err(e) => return Ok(flow.fail(FailureReason::DeliveryFailed(e.to_string()))),
        }
        flow.advance(DeliveryState::Confirmed);
        info!(
            message_id = message.message_id.0,
            destination = %message.destination_chain_id,
            gas_used,
            attempts,
            "[delivery] confirmed"
        );
        Ok(DeliveryOutcome::Confirmed {
            message_id: message.message_id,
            gas_limit,
            gas_used,
            attempts,
        })
    }
}
