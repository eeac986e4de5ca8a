//! # Domain Module
//!
//! Core domain types and the three stores (registry, batcher, ledger).

pub mod batcher;
pub mod entities;
pub mod errors;
pub mod invariants;
pub mod ledger;
pub mod registry;
pub mod value_objects;

pub use batcher::{CreditedReceipt, ReceiptBatcher};
pub use entities::*;
pub use errors::*;
pub use invariants::*;
pub use ledger::{BalanceKey, FeeLedger};
pub use registry::{LaneKey, MessageRegistry, MessageRow, ReceiptSource};
pub use value_objects::*;
