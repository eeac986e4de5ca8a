//! # Cross-Chain Telemetry
//!
//! Structured logging for the cross-chain messenger, built on
//! `tracing-subscriber`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use xchain_telemetry::{init_logging, TelemetryConfig};
//!
//! fn main() {
//!     let config = TelemetryConfig::from_env();
//!     init_logging(&config).expect("Failed to init logging");
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `XCHAIN_SERVICE_NAME` | `xchain-messenger` | Service name |
//! | `XCHAIN_LOG_LEVEL` | `info` | Log filter (falls back to `RUST_LOG`) |
//! | `XCHAIN_JSON_LOGS` | `false` | JSON output |
//! | `XCHAIN_CONSOLE_OUTPUT` | `true` | Console output |

#![warn(missing_docs)]

mod config;
mod logging;

pub use config::{TelemetryConfig, DEFAULT_SERVICE_NAME};
pub use logging::{build_filter, init_logging};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The filter directive could not be parsed.
    #[error("Invalid log filter: {0}")]
    InvalidFilter(String),

    /// A global subscriber is already installed.
    #[error("Subscriber already initialized: {0}")]
    AlreadyInitialized(String),
}
