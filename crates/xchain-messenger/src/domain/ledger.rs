//! # Fee Ledger
//!
//! Per-token reward balances owed to relayers. Accounting only: withdrawals
//! are settled elsewhere by reading the ledger.

use super::errors::{Address, Amount, MessengerError, MessengerResult};
use super::invariants::invariant_non_negative;
use dashmap::DashMap;
use tracing::debug;

/// Ledger key: (beneficiary, token).
pub type BalanceKey = (Address, Address);

/// Relayer reward balances.
///
/// `credit` is atomic per `(account, token)`; distinct keys are credited
/// without coordination.
#[derive(Default)]
pub struct FeeLedger {
    balances: DashMap<BalanceKey, Amount>,
}

impl FeeLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `amount` of `token` to `account`.
    pub fn credit(&self, account: Address, token: Address, amount: Amount) -> MessengerResult<()> {
        invariant_non_negative(amount)?;
        let balance = {
            let mut balance = self.balances.entry((account, token)).or_default();
            *balance = balance
                .checked_add(amount)
                .ok_or(MessengerError::BalanceOverflow)?;
            *balance
        };
        debug!(
            account = %hex::encode(account),
            token = %hex::encode(token),
            amount,
            balance,
            "[ledger] credited"
        );
        Ok(())
    }

    /// Balance of `account` in `token`, zero if never credited.
    pub fn balance_of(&self, account: &Address, token: &Address) -> Amount {
        self.balances
            .get(&(*account, *token))
            .map(|balance| *balance)
            .unwrap_or_default()
    }

    /// All non-zero balances.
    pub fn balances(&self) -> Vec<(BalanceKey, Amount)> {
        self.balances
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }

    /// Load a balance verbatim, replacing any existing value.
    pub(crate) fn restore_balance(&self, key: BalanceKey, amount: Amount) -> MessengerResult<()> {
        invariant_non_negative(amount)?;
        self.balances.insert(key, amount);
        Ok(())
    }
}
