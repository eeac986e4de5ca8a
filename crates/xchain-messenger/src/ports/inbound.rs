//! # Inbound Ports
//!
//! API trait defining what a chain's messenger can do.

use crate::domain::{
    Address, Amount, ChainId, FeeInfo, Message, MessageId, MessageState, MessengerResult,
    SendRequest,
};

/// Messenger API - inbound port.
///
/// Delivery itself is driven by [`crate::delivery::DeliveryEngine`]; this
/// trait covers the per-chain operations.
pub trait MessengerApi: Send + Sync {
    /// Send a message, piggybacking pending receipts for the destination.
    fn send(&self, sender: Address, request: SendRequest) -> MessengerResult<(MessageId, Message)>;

    /// Send a receipt-only message back to `origin` acknowledging
    /// `message_ids`. The regular receipt queue is left untouched.
    fn send_specified_receipts(
        &self,
        sender: Address,
        origin: ChainId,
        message_ids: &[MessageId],
        fee_info: FeeInfo,
        allowed_executors: Vec<Address>,
    ) -> MessengerResult<(MessageId, Message)>;

    /// Raise the fee of an outbound message.
    fn add_fee_amount(
        &self,
        destination: ChainId,
        message_id: MessageId,
        token: Address,
        amount: Amount,
    ) -> MessengerResult<FeeInfo>;

    /// Re-run the application call of a delivered message whose execution failed.
    fn retry_message_execution(&self, message: &Message) -> MessengerResult<()>;

    /// Reward balance of `account` in `token`.
    fn balance_of(&self, account: &Address, token: &Address) -> Amount;

    /// Whether `(origin, message_id)` was delivered to this chain.
    fn is_delivered(&self, origin: ChainId, message_id: MessageId) -> bool;

    /// State of a message as seen by this chain.
    fn message_state(
        &self,
        source: ChainId,
        destination: ChainId,
        message_id: MessageId,
    ) -> Option<MessageState>;
}
