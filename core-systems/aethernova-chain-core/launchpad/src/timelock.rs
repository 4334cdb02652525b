//! Two-phase, time-delayed capability grant.
//!
//! `schedule` records a target; `authorize` consumes it once `delay` seconds
//! have passed. The guarded action is whatever `T` identifies: a code
//! implementation, an operator identity, and so on. Privilege checks belong
//! to the owning component.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Timestamp;

/// Reference delay between scheduling and execution: three days.
pub const DEFAULT_DELAY_SECS: u64 = 3 * 24 * 60 * 60;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimelockError {
    #[error("no request pending")]
    NothingPending,
    #[error("attempted target does not match the pending request")]
    TargetMismatch,
    #[error("time lock not matured: ready at {ready_at}, now {now}")]
    NotMatured { ready_at: Timestamp, now: Timestamp },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest<T> {
    pub target: T,
    pub scheduled_at: Timestamp,
}

impl<T> PendingRequest<T> {
    pub fn ready_at(&self, delay: u64) -> Timestamp {
        self.scheduled_at.saturating_add(delay)
    }
}

#[derive(Clone, Debug)]
pub struct TimelockGuard<T> {
    delay: u64,
    pending: Option<PendingRequest<T>>,
}

impl<T: Clone + PartialEq> Default for TimelockGuard<T> {
    fn default() -> Self {
        Self::new(DEFAULT_DELAY_SECS)
    }
}

impl<T: Clone + PartialEq> TimelockGuard<T> {
    pub fn new(delay: u64) -> Self {
        Self { delay, pending: None }
    }

    pub fn delay(&self) -> u64 {
        self.delay
    }

    pub fn pending(&self) -> Option<&PendingRequest<T>> {
        self.pending.as_ref()
    }

    /// Always overwrites; returns the request it replaced, if any.
    pub fn schedule(&mut self, target: T, now: Timestamp) -> Option<PendingRequest<T>> {
        self.pending.replace(PendingRequest { target, scheduled_at: now })
    }

    /// Consume the pending request if `attempted` matches and the delay has elapsed.
    /// On failure the pending request is left untouched.
    pub fn authorize(&mut self, attempted: &T, now: Timestamp) -> Result<T, TimelockError> {
        let req = self.pending.as_ref().ok_or(TimelockError::NothingPending)?;
        if req.target != *attempted {
            return Err(TimelockError::TargetMismatch);
        }
        let ready_at = req.ready_at(self.delay);
        if now < ready_at {
            return Err(TimelockError::NotMatured { ready_at, now });
        }
        let req = self.pending.take().ok_or(TimelockError::NothingPending)?;
        Ok(req.target)
    }
}
