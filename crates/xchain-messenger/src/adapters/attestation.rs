//! In-Memory Attestation Adapter
//!
//! Implements `AttestationService` with an HMAC-SHA256 proof over the
//! message digest, standing in for an aggregate validator signature.

use crate::algorithms::message_digest;
use crate::domain::{invariant_signer_count, Attestation, Hash, Message, MessengerError, MessengerResult};
use crate::ports::outbound::AttestationService;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Attestation service backed by a shared key.
///
/// In production, this would collect signatures from the source validator set.
pub struct InMemoryAttestationService {
    key: Vec<u8>,
    num_signers: u32,
    latency: Option<Duration>,
}

impl InMemoryAttestationService {
    /// Create a service signing with `key` on behalf of `num_signers`.
    pub fn new(key: impl Into<Vec<u8>>, num_signers: u32) -> MessengerResult<Self> {
        invariant_signer_count(num_signers)?;
        Ok(Self {
            key: key.into(),
            num_signers,
            latency: None,
        })
    }

    /// Builder-style method to simulate signature collection latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn mac(&self, digest: &Hash, num_signers: u32) -> MessengerResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| MessengerError::Attestation(e.to_string()))?;
        mac.update(digest);
        mac.update(&num_signers.to_be_bytes());
        Ok(mac)
    }

    /// Check that `attestation` was issued by this service for `message`.
    ///
    /// Constant-time proof comparison.
    pub fn verify(&self, message: &Message, attestation: &Attestation) -> bool {
        let Ok(digest) = message_digest(message) else {
            return false;
        };
        if digest != attestation.message_digest {
            return false;
        }
        match self.mac(&digest, attestation.num_signers) {
            Ok(mac) => mac.verify_slice(&attestation.proof).is_ok(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl AttestationService for InMemoryAttestationService {
    async fn request_attestation(&self, message: &Message) -> MessengerResult<Attestation> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let digest = message_digest(message)?;
        let proof = self.mac(&digest, self.num_signers)?.finalize().into_bytes().to_vec();
        debug!(
            message_id = message.message_id.0,
            digest = %hex::encode(digest),
            signers = self.num_signers,
            "[attestation] issued"
        );
        Ok(Attestation {
            message_digest: digest,
            num_signers: self.num_signers,
            proof,
        })
    }
}
