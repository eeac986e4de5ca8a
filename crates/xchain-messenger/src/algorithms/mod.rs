//! # Algorithms Module
//!
//! Pure functions: gas estimation and the wire codec.

pub mod codec;
pub mod gas;

pub use codec::{message_digest, DeliveryPayload};
pub use gas::{estimate, GasEstimator, BASE_OVERHEAD, PER_SIGNER_COST};
