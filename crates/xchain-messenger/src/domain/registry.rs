//! # Message Registry
//!
//! Allocates message identifiers and tracks the state of every message the
//! local chain has sent (outbound) or accepted (inbound).
//!
//! ## Lanes
//!
//! Identifiers are allocated per destination lane. Allocation and the receipt
//! batch snapshot happen under the lane mutex, so two concurrent sends to the
//! same destination can never share an id or a receipt.

use super::batcher::ReceiptBatcher;
use super::entities::{Message, Receipt, SendRequest};
use super::errors::{Address, Amount, MessengerError, MessengerResult};
use super::invariants::{invariant_distinct_chains, invariant_fee_increase, invariant_non_negative};
use super::value_objects::{ChainId, FeeInfo, MessageId, MessageState};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Lane key: (counterpart chain, message id).
pub type LaneKey = (ChainId, MessageId);

/// Bookkeeping for a message sent by the local chain.
#[derive(Clone, Debug, PartialEq, Eq)]
struct OutboundRecord {
    fee: FeeInfo,
    state: MessageState,
    receipt_received: bool,
}

/// Bookkeeping for a message accepted by the local chain.
#[derive(Clone, Debug, PartialEq, Eq)]
struct InboundRecord {
    relayer_reward_address: Address,
}

/// Where the receipts of an outgoing message come from.
pub enum ReceiptSource<'a> {
    /// Regular piggyback: drain the batcher queue for the destination.
    Batch(&'a ReceiptBatcher),
    /// Explicit list, leaves the batcher queue untouched.
    Specified(Vec<Receipt>),
}

/// Row of the persisted `messages` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRow {
    /// Emitting chain.
    pub source_chain_id: ChainId,
    /// Receiving chain.
    pub destination_chain_id: ChainId,
    /// Message identifier.
    pub message_id: MessageId,
    /// Registry state.
    pub state: MessageState,
    /// Current fee (outbound rows only).
    pub fee: Option<FeeInfo>,
    /// Whether the receipt came back (outbound rows only).
    pub receipt_received: bool,
    /// Relayer credited for delivery (inbound rows only).
    pub relayer_reward_address: Option<Address>,
}

/// Message registry for one chain.
pub struct MessageRegistry {
    local_chain_id: ChainId,
    /// Last allocated id per destination.
    lanes: DashMap<ChainId, Arc<Mutex<MessageId>>>,
    outbound: DashMap<LaneKey, OutboundRecord>,
    inbound: DashMap<LaneKey, InboundRecord>,
}

impl MessageRegistry {
    /// Create a registry for `local_chain_id`.
    pub fn new(local_chain_id: ChainId) -> Self {
        Self {
            local_chain_id,
            lanes: DashMap::new(),
            outbound: DashMap::new(),
            inbound: DashMap::new(),
        }
    }

    /// Chain this registry belongs to.
    pub fn local_chain_id(&self) -> ChainId {
        self.local_chain_id
    }

    fn lane(&self, destination: ChainId) -> Arc<Mutex<MessageId>> {
        Arc::clone(&self.lanes.entry(destination).or_default())
    }

    /// Allocate the next id for `request.destination_chain_id` and build the
    /// message, piggybacking a receipt batch from `batcher`.
    pub fn send(
        &self,
        batcher: &ReceiptBatcher,
        sender: Address,
        request: SendRequest,
    ) -> MessengerResult<(MessageId, Message)> {
        self.send_with(sender, request, ReceiptSource::Batch(batcher))
    }

    /// Allocate and build a message with receipts from `receipts`.
    pub fn send_with(
        &self,
        sender: Address,
        request: SendRequest,
        receipts: ReceiptSource<'_>,
    ) -> MessengerResult<(MessageId, Message)> {
        let destination = request.destination_chain_id;
        invariant_distinct_chains(self.local_chain_id, destination)?;
        invariant_non_negative(request.fee_info.amount)?;

        let lane = self.lane(destination);
        let mut last = lane.lock();
        let message_id = last
            .next()
            .ok_or(MessengerError::LaneExhausted(destination))?;

        let receipts = match receipts {
            ReceiptSource::Batch(batcher) => batcher.take_batch(destination),
            ReceiptSource::Specified(receipts) => receipts,
        };

        let message = Message {
            source_chain_id: self.local_chain_id,
            destination_chain_id: destination,
            message_id,
            sender_address: sender,
            destination_address: request.destination_address,
            required_gas_limit: request.required_gas_limit,
            allowed_executor_addresses: request.allowed_executors,
            fee_info: request.fee_info,
            payload: request.payload,
            receipts,
        };

        self.outbound.insert(
            (destination, message_id),
            OutboundRecord {
                fee: message.fee_info,
                state: MessageState::Sent,
                receipt_received: false,
            },
        );
        *last = message_id;
        drop(last);

        info!(
            destination = %destination,
            message_id = message_id.0,
            receipts = message.receipts.len(),
            fee = message.fee_info.amount,
            "[registry] message sent"
        );
        Ok((message_id, message))
    }

    /// Outbound `Sent -> Attested`. Other states are left alone.
    pub fn mark_attested(&self, destination: ChainId, message_id: MessageId) {
        if let Some(mut record) = self.outbound.get_mut(&(destination, message_id)) {
            if record.state.can_transition_to(MessageState::Attested) {
                record.state = MessageState::Attested;
            }
        }
    }

    /// Record that `(origin, message_id)` was delivered to the local chain.
    ///
    /// Idempotent. Returns `true` only for the first call.
    pub fn record_delivered(
        &self,
        origin: ChainId,
        message_id: MessageId,
        relayer_reward_address: Address,
    ) -> bool {
        let first = match self.inbound.entry((origin, message_id)) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(InboundRecord {
                    relayer_reward_address,
                });
                true
            }
        };
        if first {
            debug!(origin = %origin, message_id = message_id.0, "[registry] delivered");
        }
        first
    }

    /// Whether `(chain, message_id)` was delivered to the local chain.
    pub fn is_delivered(&self, chain: ChainId, message_id: MessageId) -> bool {
        self.inbound.contains_key(&(chain, message_id))
    }

    /// Relayer that delivered `(origin, message_id)` locally.
    pub fn relayer_reward_address(&self, origin: ChainId, message_id: MessageId) -> Option<Address> {
        self.inbound
            .get(&(origin, message_id))
            .map(|r| r.relayer_reward_address)
    }

    /// State of `(source, destination, message_id)` as seen by this chain.
    pub fn state_of(
        &self,
        source: ChainId,
        destination: ChainId,
        message_id: MessageId,
    ) -> Option<MessageState> {
        if source == self.local_chain_id {
            self.outbound
                .get(&(destination, message_id))
                .map(|r| r.state)
        } else if destination == self.local_chain_id && self.is_delivered(source, message_id) {
            Some(MessageState::Delivered)
        } else {
            None
        }
    }

    /// Current fee of an outbound message.
    pub fn fee_for(&self, destination: ChainId, message_id: MessageId) -> Option<FeeInfo> {
        self.outbound.get(&(destination, message_id)).map(|r| r.fee)
    }

    /// Whether the local chain sent `(destination, message_id)`.
    pub fn has_sent(&self, destination: ChainId, message_id: MessageId) -> bool {
        self.outbound.contains_key(&(destination, message_id))
    }

    /// Raise the fee of an outbound message that has not been acknowledged.
    pub fn add_fee_amount(
        &self,
        destination: ChainId,
        message_id: MessageId,
        token: Address,
        amount: Amount,
    ) -> MessengerResult<FeeInfo> {
        let mut record = self
            .outbound
            .get_mut(&(destination, message_id))
            .ok_or(MessengerError::UnknownMessage {
                chain: destination,
                message_id,
            })?;
        if record.receipt_received {
            return Err(MessengerError::ReceiptAlreadyReceived(message_id));
        }
        invariant_fee_increase(message_id, &record.fee.token, &token, amount)?;
        record.fee.amount = record
            .fee
            .amount
            .checked_add(amount)
            .ok_or(MessengerError::BalanceOverflow)?;
        let fee = record.fee;
        drop(record);
        info!(
            destination = %destination,
            message_id = message_id.0,
            fee = fee.amount,
            "[registry] fee raised"
        );
        Ok(fee)
    }

    /// Close an outbound message on receipt arrival and return its fee.
    ///
    /// Marks the message `Delivered`. Returns `None` for messages the local
    /// chain never sent. Once settled, the fee can no longer be raised.
    pub fn settle_receipt(&self, destination: ChainId, message_id: MessageId) -> Option<FeeInfo> {
        self.settle_receipt_with(destination, message_id, |_| Ok(()))
            .unwrap_or(None)
    }

    /// Settle like [`MessageRegistry::settle_receipt`], paying the fee through
    /// `pay` while the record is locked.
    ///
    /// If `pay` fails the record is left untouched and the error returned, so
    /// a fee top-up can never slip in between payment and settlement.
    pub fn settle_receipt_with(
        &self,
        destination: ChainId,
        message_id: MessageId,
        pay: impl FnOnce(FeeInfo) -> MessengerResult<()>,
    ) -> MessengerResult<Option<FeeInfo>> {
        let Some(mut record) = self.outbound.get_mut(&(destination, message_id)) else {
            return Ok(None);
        };
        pay(record.fee)?;
        record.receipt_received = true;
        record.state = MessageState::Delivered;
        Ok(Some(record.fee))
    }

    /// Export the `messages` table.
    pub fn rows(&self) -> Vec<MessageRow> {
        let mut rows: Vec<MessageRow> = self
            .outbound
            .iter()
            .map(|entry| {
                let (destination, message_id) = *entry.key();
                MessageRow {
                    source_chain_id: self.local_chain_id,
                    destination_chain_id: destination,
                    message_id,
                    state: entry.state,
                    fee: Some(entry.fee),
                    receipt_received: entry.receipt_received,
                    relayer_reward_address: None,
                }
            })
            .collect();
        rows.extend(self.inbound.iter().map(|entry| {
            let (origin, message_id) = *entry.key();
            MessageRow {
                source_chain_id: origin,
                destination_chain_id: self.local_chain_id,
                message_id,
                state: MessageState::Delivered,
                fee: None,
                receipt_received: false,
                relayer_reward_address: Some(entry.relayer_reward_address),
            }
        }));
        rows
    }

    /// Load a row exported by [`MessageRegistry::rows`].
    pub(crate) fn restore_row(&self, row: MessageRow) {
        if row.source_chain_id == self.local_chain_id {
            let key = (row.destination_chain_id, row.message_id);
            let lane = self.lane(row.destination_chain_id);
            let mut last = lane.lock();
            if row.message_id > *last {
                *last = row.message_id;
            }
            self.outbound.insert(
                key,
                OutboundRecord {
                    fee: row.fee.unwrap_or_default(),
                    state: row.state,
                    receipt_received: row.receipt_received,
                },
            );
        } else if let Some(relayer_reward_address) = row.relayer_reward_address {
            self.inbound.insert(
                (row.source_chain_id, row.message_id),
                InboundRecord {
                    relayer_reward_address,
                },
            );
        }
    }
}
