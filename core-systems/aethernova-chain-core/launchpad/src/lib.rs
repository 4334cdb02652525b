//! Aethernova Launchpad: investment-round custody and vesting engine
//! Features:
//! - Round lifecycle: create -> activate -> contribute -> completed -> finalized, or cancelled -> refund
//! - Allocation registry: per-participant contribution ceiling and promised token amount
//! - Exact-room contributions, per-round participant cap, global token reservation counter
//! - Vesting: one linear schedule per participant deployed by a factory at finalization
//! - Time-locked upgrade authorization reused by every privileged component
//! - Concurrency: re-entrant execution mutex + per-round in-flight flag, effects before transfers
//! - Events: tokio::broadcast
//!
//! Notes:
//! - Address/Balance are placeholders; integrate with chain primitives in your node.
//! - Collaborator traits in [`backend`] abstract the token contract, value custody and time.
//!
//! (c) Aethernova

#![forbid(unsafe_code)]
#![allow(clippy::too_many_arguments)]

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod access;
pub mod allocation;
pub mod backend;
pub mod config;
pub mod error;
pub mod events;
pub mod factory;
pub mod ledger;
pub mod manager;
pub mod memory;
pub mod round;
pub mod telemetry;
pub mod timelock;
pub mod vesting;

pub use access::{AccessControl, Role};
pub use allocation::Allocation;
pub use backend::{BackendError, Clock, Collaborators, SystemClock, TokenContract, ValueBank};
pub use config::{ConfigError, EngineConfig};
pub use error::{ErrorKind, LaunchpadError};
pub use events::LaunchpadEvent;
pub use factory::VestingFactory;
pub use ledger::RoundLedger;
pub use manager::InvestmentManager;
pub use round::{Round, RoundParams, RoundStatus};
pub use timelock::{PendingRequest, TimelockError, TimelockGuard};
pub use vesting::{LinearSchedule, VestingError, VestingWallet};

// ---------- Primitives ----------

/// 20-byte address placeholder; replace with chain primitive.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The zero identity. Never a valid participant, beneficiary or treasury.
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Address whose trailing eight bytes hold `n` big-endian.
    pub fn from_low_u64(n: u64) -> Self {
        let mut a = [0u8; 20];
        a[12..].copy_from_slice(&n.to_be_bytes());
        Address(a)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Smallest unit balance, used for both the value currency and the token.
pub type Balance = u128;

/// Seconds since Unix epoch.
pub type Timestamp = u64;

/// Round identifier: position in the append-only round arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct RoundId(pub u64);

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "round#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_helpers() {
        assert!(Address::ZERO.is_zero());
        let a = Address::from_low_u64(0x0102);
        assert!(!a.is_zero());
        assert_eq!(a.0[18], 0x01);
        assert_eq!(a.0[19], 0x02);
        assert_eq!(
            format!("{a}"),
            "0x0000000000000000000000000000000000000102"
        );
        assert_eq!(RoundId(7).to_string(), "round#7");
    }
}
