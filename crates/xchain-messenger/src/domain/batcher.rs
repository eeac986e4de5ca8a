//! # Receipt Batcher
//!
//! Decides which pending receipts ride on an outgoing message and makes sure
//! each receipt pays out at most once on its origin chain.
//!
//! Receipts reach the origin two ways: piggybacked on a regular message, or
//! listed explicitly in a receipt-only message. Either path may replay a
//! receipt that was already processed; `process_receipts` skips those.
//!
//! Crediting a receipt is all-or-nothing: the credited mark, the settlement
//! of the outbound record and the ledger credit happen together or not at
//! all. A receipt whose credit fails stays unsettled and can be replayed.

use super::entities::Receipt;
use super::ledger::FeeLedger;
use super::registry::{LaneKey, MessageRegistry};
use super::value_objects::{ChainId, MessageId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Row of the persisted `receipts_credited` table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditedReceipt {
    /// Chain the acknowledged message was sent to.
    pub origin_chain_id: ChainId,
    /// Acknowledged message.
    pub message_id: MessageId,
}

/// Receipt queues and the credited set.
pub struct ReceiptBatcher {
    max_receipts_per_message: usize,
    /// Per destination FIFO of receipts still to ship.
    pending: DashMap<ChainId, VecDeque<Receipt>>,
    /// Receipts already paid out, keyed by (chain that delivered, message id).
    credited: DashMap<LaneKey, ()>,
}

impl ReceiptBatcher {
    /// Create a batcher that attaches at most `max_receipts_per_message`.
    pub fn new(max_receipts_per_message: usize) -> Self {
        Self {
            max_receipts_per_message,
            pending: DashMap::new(),
            credited: DashMap::new(),
        }
    }

    /// Queue a receipt to ship back to `destination`.
    pub fn enqueue(&self, destination: ChainId, receipt: Receipt) {
        let depth = {
            let mut queue = self.pending.entry(destination).or_default();
            queue.push_back(receipt);
            queue.len()
        };
        debug!(
            destination = %destination,
            message_id = receipt.received_message_id.0,
            depth,
            "[batcher] receipt queued"
        );
    }

    /// Remove and return up to the batch limit of receipts, oldest first.
    pub fn take_batch(&self, destination: ChainId) -> Vec<Receipt> {
        let max = self.max_receipts_per_message;
        match self.pending.get_mut(&destination) {
            Some(mut queue) => {
                let n = queue.len().min(max);
                queue.drain(..n).collect()
            }
            None => Vec::new(),
        }
    }

    /// Receipts waiting for `destination`.
    pub fn pending(&self, destination: ChainId) -> usize {
        self.pending
            .get(&destination)
            .map(|queue| queue.len())
            .unwrap_or_default()
    }

    /// Whether the receipt for `(origin, message_id)` has been paid out.
    pub fn is_credited(&self, origin: ChainId, message_id: MessageId) -> bool {
        self.credited.contains_key(&(origin, message_id))
    }

    /// Credit every receipt from `origin` that has not been credited yet.
    ///
    /// `origin` is the chain that delivered the acknowledged messages, i.e.
    /// the destination of the local outbound lane. Receipts for messages the
    /// local chain never sent are skipped. A receipt whose ledger credit
    /// fails is logged and left uncredited; the rest of the batch still
    /// commits. Returns how many receipts paid out.
    pub fn process_receipts(
        &self,
        origin: ChainId,
        receipts: &[Receipt],
        registry: &MessageRegistry,
        ledger: &FeeLedger,
    ) -> usize {
        let mut credited = 0;
        for receipt in receipts {
            let message_id = receipt.received_message_id;
            if !registry.has_sent(origin, message_id) {
                debug!(
                    origin = %origin,
                    message_id = message_id.0,
                    "[batcher] receipt for unknown message skipped"
                );
                continue;
            }
            // the vacant slot holds the credited shard until the receipt is paid
            let Entry::Vacant(slot) = self.credited.entry((origin, message_id)) else {
                continue;
            };
            let relayer = receipt.relayer_reward_address;
            let settled = registry.settle_receipt_with(origin, message_id, |fee| {
                if fee.amount > 0 {
                    ledger.credit(relayer, fee.token, fee.amount)
                } else {
                    Ok(())
                }
            });
            let fee = match settled {
                Ok(Some(fee)) => fee,
                Ok(None) => continue,
                Err(e) => {
                    warn!(
                        origin = %origin,
                        message_id = message_id.0,
                        relayer = %hex::encode(relayer),
                        error = %e,
                        "[batcher] receipt credit failed, left unsettled"
                    );
                    continue;
                }
            };
            slot.insert(());
            credited += 1;
            info!(
                origin = %origin,
                message_id = message_id.0,
                relayer = %hex::encode(receipt.relayer_reward_address),
                amount = fee.amount,
                "[batcher] receipt credited"
            );
        }
        credited
    }

    /// Export the `receipts_credited` table.
    pub fn credited(&self) -> Vec<CreditedReceipt> {
        self.credited
            .iter()
            .map(|entry| {
                let (origin_chain_id, message_id) = *entry.key();
                CreditedReceipt {
                    origin_chain_id,
                    message_id,
                }
            })
            .collect()
    }

    /// Export pending queues, oldest receipt first.
    pub fn pending_queues(&self) -> Vec<(ChainId, Vec<Receipt>)> {
        self.pending
            .iter()
            .map(|entry| (*entry.key(), entry.value().iter().copied().collect()))
            .collect()
    }

    pub(crate) fn restore_credited(&self, row: CreditedReceipt) {
        self.credited
            .insert((row.origin_chain_id, row.message_id), ());
    }
}
