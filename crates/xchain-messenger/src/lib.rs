//! # Cross-Chain Messenger
//!
//! Message and receipt lifecycle between independent chains.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! A source chain emits a message; an attestation service vouches for it; a
//! relayer submits it to the destination chain. The destination records the
//! delivery and queues a receipt that rides back to the source on a later
//! message, where it credits the relayer with the message fee exactly once.
//!
//! ## Guarantees
//!
//! | Property | Mechanism |
//! |----------|-----------|
//! | Unique ids per lane | Lane mutex around allocate + receipt batch |
//! | Receipt credited once | Atomic check-and-mark in the credited set |
//! | Atomic balances | `DashMap` entry lock per `(account, token)` |
//! | All-or-nothing credit | Mark, settle and pay under one entry lock |
//! | Bounded retry | One out-of-gas retry, then `Failed` |
//!
//! ## Module Structure
//!
//! ```text
//! xchain-messenger/
//! ├── domain/          # Message, Receipt, registry, batcher, ledger, errors
//! ├── algorithms/      # Gas estimation, wire codec
//! ├── ports/           # MessengerApi, AttestationService, DestinationChainClient
//! ├── adapters/        # In-memory attestation, local network
//! ├── service.rs       # Per-chain Messenger
//! └── delivery.rs      # Delivery state machine
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod delivery;
pub mod domain;
pub mod ports;
pub mod service;

// Re-exports
pub use adapters::{InMemoryAttestationService, LocalNetwork};
pub use algorithms::{estimate, message_digest, DeliveryPayload, GasEstimator};
pub use delivery::{CancelToken, DeliveryContext, DeliveryEngine, DeliveryOutcome, FailureReason};
pub use domain::{
    Address, Amount, Attestation, ChainId, DeliveryState, FeeInfo, FeeLedger, GasSchedule, Hash,
    Message, MessageId, MessageRegistry, MessageState, MessengerConfig, MessengerError,
    MessengerResult, Receipt, ReceiptBatcher, SendRequest, SendRequestBuilder,
};
pub use ports::{
    AttestationService, DestinationChainClient, MessageReceiver, MessengerApi, MockAttestationService,
    MockChainClient, MockReceiver, TransactionOutcome,
};
pub use service::{FailedExecution, FeeBalanceRow, Messenger, MessengerSnapshot};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
