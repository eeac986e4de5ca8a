//! # Wire Codec
//!
//! Bytes handed to the destination chain client, and the message digest the
//! attestation binds to. Any change to a message field changes the digest.

use crate::domain::{Address, Attestation, Hash, Message, MessengerError, MessengerResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Domain separator for message digests.
const DIGEST_DOMAIN: &[u8] = b"xchain-messenger/message/v1";

/// Delivery call body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryPayload {
    /// Message being delivered.
    pub message: Message,
    /// Attestation for `message`.
    pub attestation: Attestation,
    /// Account submitting the transaction.
    pub executor: Address,
    /// Account credited once the receipt reaches the origin.
    pub relayer_reward_address: Address,
}

impl DeliveryPayload {
    /// Serialize to bytes.
    pub fn encode(&self) -> MessengerResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| MessengerError::Codec(e.to_string()))
    }

    /// Deserialize from bytes.
    pub fn decode(bytes: &[u8]) -> MessengerResult<Self> {
        bincode::deserialize(bytes).map_err(|e| MessengerError::Codec(e.to_string()))
    }
}

/// SHA-256 digest of the canonical encoding of `message`.
pub fn message_digest(message: &Message) -> MessengerResult<Hash> {
    let encoded = bincode::serialize(message).map_err(|e| MessengerError::Codec(e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(DIGEST_DOMAIN);
    hasher.update(&encoded);
    Ok(hasher.finalize().into())
}
