//! # Gas Estimation
//!
//! Gas budget for a delivery call. Verifying the attestation on the
//! destination costs a fixed overhead plus a per-signer amount, and the
//! application itself needs `required_gas_limit` on top.
//!
//! ```text
//! gas_limit = BASE_OVERHEAD + PER_SIGNER_COST * num_signers + required_gas_limit
//! ```

use crate::domain::{invariant_signer_count, GasSchedule, MessengerError, MessengerResult};

/// Static cost of receiving a message.
pub const BASE_OVERHEAD: u64 = 2_000_000;

/// Cost per aggregated signer.
pub const PER_SIGNER_COST: u64 = 1_000;

/// Gas estimator over a [`GasSchedule`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GasEstimator {
    schedule: GasSchedule,
}

impl GasEstimator {
    /// Create an estimator.
    pub fn new(schedule: GasSchedule) -> Self {
        Self { schedule }
    }

    /// Schedule in use.
    pub fn schedule(&self) -> GasSchedule {
        self.schedule
    }

    /// Gas limit for a delivery attested by `num_signers`.
    pub fn estimate(&self, num_signers: u32, required_gas_limit: u64) -> MessengerResult<u64> {
        invariant_signer_count(num_signers)?;
        let overflow = || MessengerError::GasOverflow {
            base: self.schedule.base_overhead,
            signers: num_signers,
            required: required_gas_limit,
        };
        self.schedule
            .per_signer_cost
            .checked_mul(u64::from(num_signers))
            .and_then(|signers| signers.checked_add(self.schedule.base_overhead))
            .and_then(|gas| gas.checked_add(required_gas_limit))
            .ok_or_else(overflow)
    }
}

/// [`GasEstimator::estimate`] with the default schedule.
pub fn estimate(num_signers: u32, required_gas_limit: u64) -> MessengerResult<u64> {
    GasEstimator::default().estimate(num_signers, required_gas_limit)
}
