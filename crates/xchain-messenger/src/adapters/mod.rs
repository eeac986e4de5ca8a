//! # Adapters Layer (Hexagonal Architecture)
//!
//! In-process implementations of the outbound ports.

mod attestation;
mod local_network;

pub use attestation::InMemoryAttestationService;
pub use local_network::LocalNetwork;
