//! Round record and status state machine.

use serde::{Deserialize, Serialize};

use crate::error::LaunchpadError;
use crate::{Balance, RoundId, Timestamp};

/// Round status. Declaration order is the transition ordinal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoundStatus {
    Pending,
    Active,
    Completed,
    Finalized,
    Cancelled,
}

impl RoundStatus {
    pub fn ordinal(self) -> u8 {
        match self {
            RoundStatus::Pending => 0,
            RoundStatus::Active => 1,
            RoundStatus::Completed => 2,
            RoundStatus::Finalized => 3,
            RoundStatus::Cancelled => 4,
        }
    }

    /// Forward-only by ordinal. Cancelled is special-cased: reachable from
    /// Pending and Active only, although its ordinal is the highest.
    pub fn can_transition_to(self, next: RoundStatus) -> bool {
        match next {
            RoundStatus::Cancelled => matches!(self, RoundStatus::Pending | RoundStatus::Active),
            _ => self != RoundStatus::Cancelled && next.ordinal() > self.ordinal(),
        }
    }

    pub fn is_open(self) -> bool {
        matches!(self, RoundStatus::Pending | RoundStatus::Active)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RoundStatus::Finalized | RoundStatus::Cancelled)
    }
}

/// Creation parameters for a round. `duration` is the contribution window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundParams {
    pub start: Timestamp,
    pub duration: u64,
    pub value_target: Balance,
    pub token_allocation: Balance,
    pub vesting_cliff: u64,
    pub vesting_duration: u64,
}

/// Round parameters and aggregate counters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    /// Value currency to raise.
    pub target: Balance,
    /// Value currency contributed so far (sum of positions).
    pub invested: Balance,
    /// Tokens reserved for this round.
    pub token_allocation: Balance,
    /// Sum of allocation records' token amounts.
    pub allocated_tokens: Balance,
    /// Tokens moved into vesting wallets at finalization.
    pub distributed: Balance,
    pub start: Timestamp,
    pub end: Timestamp,
    /// Delay between finalization and vesting start.
    pub vesting_cliff: u64,
    /// Linear vesting length after the cliff.
    pub vesting_duration: u64,
    pub participants: u32,
    pub status: RoundStatus,
}

impl Round {
    pub fn in_window(&self, now: Timestamp) -> bool {
        self.start <= now && now < self.end
    }

    /// Remaining value-currency room before the target is hit.
    pub fn remaining_target(&self) -> Balance {
        self.target.saturating_sub(self.invested)
    }

    pub fn transition(&mut self, next: RoundStatus) -> Result<(), LaunchpadError> {
        if !self.status.can_transition_to(next) {
            return Err(LaunchpadError::IllegalTransition {
                round: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub(crate) fn expect_status(&self, expected: RoundStatus) -> Result<(), LaunchpadError> {
        if self.status != expected {
            return Err(LaunchpadError::UnexpectedStatus {
                round: self.id,
                expected: status_name(expected),
                actual: self.status,
            });
        }
        Ok(())
    }

    pub(crate) fn expect_open(&self) -> Result<(), LaunchpadError> {
        if !self.status.is_open() {
            return Err(LaunchpadError::UnexpectedStatus {
                round: self.id,
                expected: "Pending or Active",
                actual: self.status,
            });
        }
        Ok(())
    }
}

fn status_name(s: RoundStatus) -> &'static str {
    match s {
        RoundStatus::Pending => "Pending",
        RoundStatus::Active => "Active",
        RoundStatus::Completed => "Completed",
        RoundStatus::Finalized => "Finalized",
        RoundStatus::Cancelled => "Cancelled",
    }
}
