//! Linear token vesting for Launchpad grants.
//!
//! Features:
//! - Start + duration schedule; a cliff is expressed as a delayed start.
//! - Total allocation is read from the schedule's own token balance plus what
//!   was already released, so top-ups vest on the same curve.
//! - Truncating integer math: vesting may lag by a fraction, never lead.
//! - Creator-only revocation: releases everything vested, then sweeps the
//!   remaining balance back to the creator.
//! - A wallet may be created locked. Release and revoke are refused until the
//!   creator unlocks it; sweeping back to the creator still works.
//!
//! Time model: seconds since Unix epoch (u64), supplied by a [`Clock`].

#![deny(rust_2018_idioms)]

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{BackendError, Clock, TokenContract};
use crate::error::ErrorKind;
use crate::{Address, Balance, Timestamp};

/// Errors returned by vesting operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VestingError {
    /// Generic invalid argument with context.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// Overflow detected in arithmetic.
    #[error("arithmetic overflow")]
    Overflow,
    /// Operation is not permitted for this caller.
    #[error("not allowed: {0}")]
    NotAllowed(&'static str),
    /// Schedule not found in registry.
    #[error("schedule {0} not found")]
    NotFound(Address),
    /// Wallet is locked by its creator.
    #[error("schedule {0} is locked")]
    Locked(Address),
    /// Token transfer failed.
    #[error("token: {0}")]
    Token(#[from] BackendError),
}

impl VestingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VestingError::Invalid(_) => ErrorKind::Validation,
            VestingError::Overflow => ErrorKind::ResourceExhaustion,
            VestingError::NotAllowed(_) => ErrorKind::Authorization,
            VestingError::NotFound(_) | VestingError::Locked(_) => ErrorKind::StateConflict,
            VestingError::Token(_) => ErrorKind::External,
        }
    }
}

/// Linear release curve: nothing before `start`, everything from `start + duration`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearSchedule {
    pub start: Timestamp,
    pub duration: u64,
}

impl LinearSchedule {
    pub fn new(start: Timestamp, duration: u64) -> Result<Self, VestingError> {
        start.checked_add(duration).ok_or(VestingError::Overflow)?;
        Ok(Self { start, duration })
    }

    #[inline]
    pub fn end(&self) -> Timestamp {
        // Bounded by the check in `new`.
        self.start.saturating_add(self.duration)
    }

    /// Vested part of `total` at `now`.
    ///
    /// - `now < start`: 0
    /// - `now >= start + duration`: `total`
    /// - otherwise `floor(total * (now - start) / duration)`
    pub fn vested(&self, total: Balance, now: Timestamp) -> Result<Balance, VestingError> {
        if now < self.start {
            return Ok(0);
        }
        if now >= self.end() {
            return Ok(total);
        }
        let elapsed = now - self.start;
        mul_div_floor(total, elapsed as u128, self.duration as u128)
    }
}

/// Exact `floor(a * b / d)` for `b, d < 2^64`, without a 256-bit intermediate.
///
/// `a*b/d = (a/d)*b + (a%d)*b/d`; the second product is below `2^128`.
fn mul_div_floor(a: u128, b: u128, d: u128) -> Result<u128, VestingError> {
    if d == 0 {
        return Err(VestingError::Invalid("division by zero"));
    }
    if b > u64::MAX as u128 || d > u64::MAX as u128 {
        return Err(VestingError::Overflow);
    }
    let whole = (a / d).checked_mul(b).ok_or(VestingError::Overflow)?;
    let frac = (a % d) * b / d;
    whole.checked_add(frac).ok_or(VestingError::Overflow)
}

/// Serializable view of a wallet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VestingInfo {
    pub address: Address,
    pub creator: Address,
    pub beneficiary: Address,
    pub schedule: LinearSchedule,
    pub released: Balance,
}

/// One vesting grant. Owns the tokens held at `address`; the beneficiary only
/// has a claim on what has vested.
pub struct VestingWallet {
    address: Address,
    creator: Address,
    beneficiary: Address,
    schedule: LinearSchedule,
    released: Mutex<Balance>,
    locked: AtomicBool,
    token: Arc<dyn TokenContract>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for VestingWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VestingWallet")
            .field("address", &self.address)
            .field("creator", &self.creator)
            .field("beneficiary", &self.beneficiary)
            .field("schedule", &self.schedule)
            .field("released", &*self.released.lock())
            .field("locked", &self.is_locked())
            .finish()
    }
}

impl VestingWallet {
    pub fn new(
        address: Address,
        creator: Address,
        beneficiary: Address,
        schedule: LinearSchedule,
        token: Arc<dyn TokenContract>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, VestingError> {
        if beneficiary.is_zero() {
            return Err(VestingError::Invalid("beneficiary is the zero address"));
        }
        if address.is_zero() || creator.is_zero() {
            return Err(VestingError::Invalid("zero address"));
        }
        Ok(Self {
            address,
            creator,
            beneficiary,
            schedule,
            released: Mutex::new(0),
            locked: AtomicBool::new(false),
            token,
            clock,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn creator(&self) -> Address {
        self.creator
    }

    pub fn beneficiary(&self) -> Address {
        self.beneficiary
    }

    pub fn schedule(&self) -> LinearSchedule {
        self.schedule
    }

    pub fn released(&self) -> Balance {
        *self.released.lock()
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    pub(crate) fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::Release);
    }

    fn ensure_unlocked(&self) -> Result<(), VestingError> {
        if self.is_locked() {
            return Err(VestingError::Locked(self.address));
        }
        Ok(())
    }

    pub fn info(&self) -> VestingInfo {
        VestingInfo {
            address: self.address,
            creator: self.creator,
            beneficiary: self.beneficiary,
            schedule: self.schedule,
            released: self.released(),
        }
    }

    /// Held balance plus everything already released.
    pub fn total_allocation(&self) -> Result<Balance, VestingError> {
        let held = self.token.balance_of(self.address)?;
        held.checked_add(self.released()).ok_or(VestingError::Overflow)
    }

    pub fn vested_at(&self, now: Timestamp) -> Result<Balance, VestingError> {
        self.schedule.vested(self.total_allocation()?, now)
    }

    pub fn releasable_at(&self, now: Timestamp) -> Result<Balance, VestingError> {
        let vested = self.vested_at(now)?;
        Ok(vested.saturating_sub(self.released()))
    }

    pub fn releasable(&self) -> Result<Balance, VestingError> {
        self.releasable_at(self.clock.now_unix())
    }

    /// Transfer everything releasable now to the beneficiary. Zero is a no-op.
    pub fn release(&self) -> Result<Balance, VestingError> {
        let now = self.clock.now_unix();
        let amount = {
            let mut released = self.released.lock();
            self.ensure_unlocked()?;
            let held = self.token.balance_of(self.address)?;
            let total = held.checked_add(*released).ok_or(VestingError::Overflow)?;
            let amount = self.schedule.vested(total, now)?.saturating_sub(*released);
            if amount == 0 {
                return Ok(0);
            }
            *released += amount;
            amount
        };

        if let Err(e) = self.token.transfer(self.address, self.beneficiary, amount) {
            *self.released.lock() -= amount;
            return Err(e.into());
        }
        debug!(wallet = %self.address, beneficiary = %self.beneficiary, amount, "vesting released");
        Ok(amount)
    }

    /// Creator-only termination. Returns `(released, swept)`.
    pub fn revoke(&self, caller: Address) -> Result<(Balance, Balance), VestingError> {
        if caller != self.creator {
            return Err(VestingError::NotAllowed("only the creator may revoke"));
        }
        self.ensure_unlocked()?;
        let released = self.release()?;
        let swept = self.sweep_to_creator()?;
        debug!(wallet = %self.address, released, swept, "vesting revoked");
        Ok((released, swept))
    }

    /// Return the whole held balance to the creator without releasing anything.
    pub(crate) fn sweep_to_creator(&self) -> Result<Balance, VestingError> {
        let held = self.token.balance_of(self.address)?;
        if held > 0 {
            self.token.transfer(self.address, self.creator, held)?;
        }
        Ok(held)
    }
}

/* ---------------------------------- TESTS ---------------------------------- */
