//! Collaborator abstractions: token contract, value custody and time.
//! All monetary side-effects go through these traits; any error is fatal to
//! the enclosing engine operation.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::{Address, Balance, Timestamp};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("insufficient balance")]
    Insufficient,
    #[error("insufficient allowance")]
    InsufficientAllowance,
    #[error("account {0} rejected the transfer")]
    Rejected(Address),
    #[error("backend failure: {0}")]
    Other(String),
}

/// Standard fungible-token interface. Every call succeeds or fails atomically.
pub trait TokenContract: Send + Sync + 'static {
    fn balance_of(&self, who: Address) -> Result<Balance, BackendError>;

    /// Move `amount` held by `from`. The caller acts as `from`.
    fn transfer(&self, from: Address, to: Address, amount: Balance) -> Result<(), BackendError>;

    /// Set the allowance `spender` may pull from `owner`.
    fn approve(&self, owner: Address, spender: Address, amount: Balance) -> Result<(), BackendError>;

    /// Pull `amount` from `from` to `to`, consuming `spender`'s allowance.
    fn transfer_from(
        &self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Balance,
    ) -> Result<(), BackendError>;
}

/// Native value-currency custody.
pub trait ValueBank: Send + Sync + 'static {
    fn balance_of(&self, who: Address) -> Result<Balance, BackendError>;

    /// Move `amount` of value from `from` to `to`.
    fn transfer(&self, from: Address, to: Address, amount: Balance) -> Result<(), BackendError>;
}

/// Provider for time source (UNIX seconds).
pub trait Clock: Send + Sync + 'static {
    fn now_unix(&self) -> Timestamp;
}

/// Default time source: system clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Bundle of collaborators the engine is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub token: Arc<dyn TokenContract>,
    pub value: Arc<dyn ValueBank>,
    pub clock: Arc<dyn Clock>,
    /// Receives closed-round proceeds and cancelled token reservations.
    pub treasury: Address,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_past_2020() {
        assert!(SystemClock.now_unix() > 1_577_836_800);
    }
}
