//! # Domain Value Objects
//!
//! Immutable value types for the cross-chain messenger.

use super::errors::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque 32-byte blockchain identifier.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainId(pub [u8; 32]);

impl ChainId {
    /// Create a chain id from raw bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Chain id filled with a single byte. Handy for local networks.
    pub const fn from_byte(b: u8) -> Self {
        Self([b; 32])
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0[..4]))
    }
}

impl fmt::Debug for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainId(0x{})", hex::encode(self.0))
    }
}

/// Message identifier, unique per (source, destination) lane.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct MessageId(pub u64);

impl MessageId {
    /// First identifier allocated on every lane.
    pub const FIRST: MessageId = MessageId(1);

    /// The identifier following this one, `None` once the lane is exhausted.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reward offered to whoever delivers a message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeInfo {
    /// Fee token contract.
    pub token: Address,
    /// Amount of `token`.
    pub amount: Amount,
}

impl FeeInfo {
    /// Create fee info.
    pub fn new(token: Address, amount: Amount) -> Self {
        Self { token, amount }
    }

    /// No reward.
    pub fn zero(token: Address) -> Self {
        Self { token, amount: 0 }
    }
}

/// Per-message bookkeeping state kept by the registry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageState {
    /// Allocated and emitted by the source.
    #[default]
    Sent,
    /// An attestation exists.
    Attested,
    /// Accepted by the destination chain.
    Delivered,
}

impl MessageState {
    /// Check if transition is valid.
    pub fn can_transition_to(&self, next: MessageState) -> bool {
        matches!(
            (self, next),
            (Self::Sent, Self::Attested)
                | (Self::Sent, Self::Delivered)
                | (Self::Attested, Self::Delivered)
        )
    }
}

/// Delivery flow state machine.
///
/// ```text
/// Constructing -> Attesting -> Submitting -> Confirmed
///                                  |  ^
///                                  v  |
///                                Retrying
/// any non-terminal -> Failed | Cancelled
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryState {
    /// Building the message at the source.
    #[default]
    Constructing,
    /// Waiting for the attestation service.
    Attesting,
    /// Delivery transaction in flight.
    Submitting,
    /// Re-estimating after an out-of-gas revert.
    Retrying,
    /// Accepted and committed.
    Confirmed,
    /// Terminal failure.
    Failed,
    /// Caller cancelled.
    Cancelled,
}

impl DeliveryState {
    /// Check if transition is valid.
    pub fn can_transition_to(&self, next: DeliveryState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Self::Failed) | (_, Self::Cancelled) => true,
            (Self::Constructing, Self::Attesting) => true,
            (Self::Attesting, Self::Submitting) => true,
            (Self::Submitting, Self::Retrying) => true,
            (Self::Submitting, Self::Confirmed) => true,
            (Self::Retrying, Self::Submitting) => true,
            _ => false,
        }
    }

    /// Check if terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed | Self::Cancelled)
    }
}
