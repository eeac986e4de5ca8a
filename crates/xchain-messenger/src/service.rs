//! Messenger Service - per-chain facade over the registry, batcher and ledger
//!
//! One `Messenger` runs on each chain. Sending, fee top-ups and receipt
//! crediting go through it; the [`crate::delivery::DeliveryEngine`] calls
//! [`Messenger::commit_delivery`] on the destination once a delivery is
//! confirmed.

use crate::algorithms::{message_digest, GasEstimator};
use crate::domain::{
    Address, Amount, ChainId, CreditedReceipt, FeeInfo, FeeLedger, Hash, LaneKey, Message,
    MessageId, MessageRegistry, MessageRow, MessageState, MessengerConfig, MessengerError,
    MessengerResult, Receipt, ReceiptBatcher, ReceiptSource, SendRequest,
};
use crate::ports::inbound::MessengerApi;
use crate::ports::outbound::MessageReceiver;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Row of the persisted `fee_balances` table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBalanceRow {
    /// Beneficiary.
    pub account: Address,
    /// Fee token.
    pub token: Address,
    /// Accumulated amount.
    pub amount: Amount,
}

/// Application call that failed and can be retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedExecution {
    /// Chain the message came from.
    pub origin_chain_id: ChainId,
    /// Message identifier.
    pub message_id: MessageId,
    /// Digest of the message as delivered.
    pub message_digest: Hash,
}

/// Durable state of one messenger.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessengerSnapshot {
    /// `messages` table.
    pub messages: Vec<MessageRow>,
    /// `receipts_credited` table.
    pub receipts_credited: Vec<CreditedReceipt>,
    /// `fee_balances` table.
    pub fee_balances: Vec<FeeBalanceRow>,
    /// Receipts not yet shipped, per destination, oldest first.
    pub pending_receipts: Vec<(ChainId, Vec<Receipt>)>,
    /// Retryable application calls.
    pub failed_executions: Vec<FailedExecution>,
}

impl MessengerSnapshot {
    /// Encode with bincode.
    pub fn to_bytes(&self) -> MessengerResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| MessengerError::Codec(e.to_string()))
    }

    /// Decode from bincode.
    pub fn from_bytes(bytes: &[u8]) -> MessengerResult<Self> {
        bincode::deserialize(bytes).map_err(|e| MessengerError::Codec(e.to_string()))
    }
}

/// Cross-chain messenger for one chain.
pub struct Messenger {
    config: MessengerConfig,
    registry: MessageRegistry,
    batcher: ReceiptBatcher,
    ledger: FeeLedger,
    estimator: GasEstimator,
    /// Application receivers by destination address.
    receivers: RwLock<HashMap<Address, Arc<dyn MessageReceiver>>>,
    /// Failed application calls: (origin, id) -> message digest.
    failed: DashMap<LaneKey, Hash>,
}

impl Messenger {
    /// Create a messenger with empty stores.
    pub fn new(config: MessengerConfig) -> MessengerResult<Self> {
        config.validate()?;
        info!(
            chain = %config.local_chain_id,
            max_receipts = config.max_receipts_per_message,
            "[messenger] started"
        );
        Ok(Self {
            registry: MessageRegistry::new(config.local_chain_id),
            batcher: ReceiptBatcher::new(config.max_receipts_per_message),
            ledger: FeeLedger::new(),
            estimator: GasEstimator::new(config.gas),
            receivers: RwLock::new(HashMap::new()),
            failed: DashMap::new(),
            config,
        })
    }

    /// Rebuild a messenger from a snapshot taken by [`Messenger::snapshot`].
    pub fn restore(config: MessengerConfig, snapshot: MessengerSnapshot) -> MessengerResult<Self> {
        let messenger = Self::new(config)?;
        for row in snapshot.messages {
            messenger.registry.restore_row(row);
        }
        for row in snapshot.receipts_credited {
            messenger.batcher.restore_credited(row);
        }
        for row in snapshot.fee_balances {
            messenger
                .ledger
                .restore_balance((row.account, row.token), row.amount)?;
        }
        for (destination, receipts) in snapshot.pending_receipts {
            for receipt in receipts {
                messenger.batcher.enqueue(destination, receipt);
            }
        }
        for row in snapshot.failed_executions {
            messenger
                .failed
                .insert((row.origin_chain_id, row.message_id), row.message_digest);
        }
        Ok(messenger)
    }

    /// Export every table.
    pub fn snapshot(&self) -> MessengerSnapshot {
        MessengerSnapshot {
            messages: self.registry.rows(),
            receipts_credited: self.batcher.credited(),
            fee_balances: self
                .ledger
                .balances()
                .into_iter()
                .map(|((account, token), amount)| FeeBalanceRow {
                    account,
                    token,
                    amount,
                })
                .collect(),
            pending_receipts: self.batcher.pending_queues(),
            failed_executions: self
                .failed
                .iter()
                .map(|entry| {
                    let (origin_chain_id, message_id) = *entry.key();
                    FailedExecution {
                        origin_chain_id,
                        message_id,
                        message_digest: *entry.value(),
                    }
                })
                .collect(),
        }
    }

    /// Chain this messenger runs on.
    pub fn chain_id(&self) -> ChainId {
        self.config.local_chain_id
    }

    /// Configuration.
    pub fn config(&self) -> &MessengerConfig {
        &self.config
    }

    /// Gas estimator built from the configured schedule.
    pub fn estimator(&self) -> &GasEstimator {
        &self.estimator
    }

    /// Message registry.
    pub fn registry(&self) -> &MessageRegistry {
        &self.registry
    }

    /// Receipt batcher.
    pub fn batcher(&self) -> &ReceiptBatcher {
        &self.batcher
    }

    /// Fee ledger.
    pub fn ledger(&self) -> &FeeLedger {
        &self.ledger
    }

    /// Route payloads for `address` to `receiver`.
    pub fn register_receiver(&self, address: Address, receiver: Arc<dyn MessageReceiver>) {
        self.receivers.write().insert(address, receiver);
    }

    /// Commit a confirmed delivery of `message` to this chain.
    ///
    /// Records the message as delivered, queues its receipt back to the
    /// origin, credits the receipts it carries and runs the application
    /// call. Returns `false` without side effects if it was already
    /// delivered.
    ///
    /// Every fallible check runs before the delivery is recorded: an `Err`
    /// means nothing was written, and once recorded the commit always
    /// completes.
    pub fn commit_delivery(
        &self,
        message: &Message,
        relayer_reward_address: Address,
    ) -> MessengerResult<bool> {
        if message.destination_chain_id != self.chain_id() {
            return Err(MessengerError::Chain(format!(
                "message for {} committed on {}",
                message.destination_chain_id,
                self.chain_id()
            )));
        }
        let origin = message.source_chain_id;
        let message_id = message.message_id;
        let digest = message_digest(message)?;
        if !self
            .registry
            .record_delivered(origin, message_id, relayer_reward_address)
        {
            return Ok(false);
        }

        self.batcher
            .enqueue(origin, Receipt::new(message_id, relayer_reward_address));
        let credited =
            self.batcher
                .process_receipts(origin, &message.receipts, &self.registry, &self.ledger);
        self.execute(message, digest);

        info!(
            origin = %origin,
            message_id = message_id.0,
            receipts = message.receipts.len(),
            credited,
            "[messenger] delivery committed"
        );
        Ok(true)
    }

    fn receiver_for(&self, address: &Address) -> Option<Arc<dyn MessageReceiver>> {
        self.receivers.read().get(address).cloned()
    }

    /// First application call. Failures are stored for retry.
    fn execute(&self, message: &Message, digest: Hash) {
        let Some(receiver) = self.receiver_for(&message.destination_address) else {
            debug!(
                message_id = message.message_id.0,
                "[messenger] no receiver registered"
            );
            return;
        };
        if let Err(reason) = receiver.receive_message(
            message.source_chain_id,
            message.sender_address,
            &message.payload,
        ) {
            warn!(
                origin = %message.source_chain_id,
                message_id = message.message_id.0,
                reason = %reason,
                "[messenger] execution failed, stored for retry"
            );
            self.failed
                .insert((message.source_chain_id, message.message_id), digest);
        }
    }

    /// Whether a failed application call is stored for `(origin, message_id)`.
    pub fn has_failed_execution(&self, origin: ChainId, message_id: MessageId) -> bool {
        self.failed.contains_key(&(origin, message_id))
    }
}

impl MessengerApi for Messenger {
    fn send(&self, sender: Address, request: SendRequest) -> MessengerResult<(MessageId, Message)> {
        self.registry.send(&self.batcher, sender, request)
    }

    fn send_specified_receipts(
        &self,
        sender: Address,
        origin: ChainId,
        message_ids: &[MessageId],
        fee_info: FeeInfo,
        allowed_executors: Vec<Address>,
    ) -> MessengerResult<(MessageId, Message)> {
        let receipts = message_ids
            .iter()
            .map(|&message_id| {
                self.registry
                    .relayer_reward_address(origin, message_id)
                    .map(|relayer| Receipt::new(message_id, relayer))
                    .ok_or(MessengerError::UnknownMessage {
                        chain: origin,
                        message_id,
                    })
            })
            .collect::<MessengerResult<Vec<_>>>()?;

        let request = SendRequest {
            destination_chain_id: origin,
            destination_address: [0u8; 20],
            fee_info,
            required_gas_limit: 0,
            allowed_executors,
            payload: Vec::new(),
        };
        self.registry
            .send_with(sender, request, ReceiptSource::Specified(receipts))
    }

    fn add_fee_amount(
        &self,
        destination: ChainId,
        message_id: MessageId,
        token: Address,
        amount: Amount,
    ) -> MessengerResult<FeeInfo> {
        self.registry
            .add_fee_amount(destination, message_id, token, amount)
    }

    fn retry_message_execution(&self, message: &Message) -> MessengerResult<()> {
        let key = (message.source_chain_id, message.message_id);
        let stored = self
            .failed
            .get(&key)
            .map(|digest| *digest)
            .ok_or(MessengerError::NoFailedExecution(message.message_id))?;
        if message_digest(message)? != stored {
            return Err(MessengerError::MessageMismatch(message.message_id));
        }
        let receiver = self
            .receiver_for(&message.destination_address)
            .ok_or_else(|| MessengerError::ExecutionFailed("no receiver registered".to_string()))?;
        receiver
            .receive_message(
                message.source_chain_id,
                message.sender_address,
                &message.payload,
            )
            .map_err(MessengerError::ExecutionFailed)?;
        self.failed.remove(&key);
        info!(
            origin = %message.source_chain_id,
            message_id = message.message_id.0,
            "[messenger] execution retried"
        );
        Ok(())
    }

    fn balance_of(&self, account: &Address, token: &Address) -> Amount {
        self.ledger.balance_of(account, token)
    }

    fn is_delivered(&self, origin: ChainId, message_id: MessageId) -> bool {
        self.registry.is_delivered(origin, message_id)
    }

    fn message_state(
        &self,
        source: ChainId,
        destination: ChainId,
        message_id: MessageId,
    ) -> Option<MessageState> {
        self.registry.state_of(source, destination, message_id)
    }
}
