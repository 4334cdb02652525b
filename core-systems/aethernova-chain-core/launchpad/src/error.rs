//! Error taxonomy for the launchpad engine.

use thiserror::Error;

use crate::access::Role;
use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::round::RoundStatus;
use crate::timelock::TimelockError;
use crate::vesting::VestingError;
use crate::{Address, Balance, RoundId};

/// Coarse classification of a failure. Every class rejects before any ledger
/// mutation; `External` failures unwind whatever the operation had committed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input: zero address or amount, out-of-range window.
    Validation,
    /// Wrong status, duplicate or missing record, re-entrant call.
    StateConflict,
    /// Caller lacks the required privilege.
    Authorization,
    /// Supply or capacity exhausted.
    ResourceExhaustion,
    /// A collaborator transfer failed.
    External,
}

#[derive(Error, Debug)]
pub enum LaunchpadError {
    #[error("not authorized: {0:?} role required")]
    MissingRole(Role),
    #[error("not authorized: {0}")]
    NotAuthorized(&'static str),
    #[error("{0} not found")]
    RoundNotFound(RoundId),
    #[error("zero address")]
    ZeroAddress,
    #[error("amount must be > 0")]
    ZeroAmount,
    #[error("round duration {got}s outside [{min}s, {max}s]")]
    DurationOutOfRange { got: u64, min: u64, max: u64 },
    #[error("round start {start} precedes current time {now}")]
    StartInPast { start: u64, now: u64 },
    #[error("contribution must equal remaining allocation room {expected}, got {got}")]
    InexactContribution { expected: Balance, got: Balance },
    #[error("{round}: status {actual:?}, expected {expected}")]
    UnexpectedStatus { round: RoundId, expected: &'static str, actual: RoundStatus },
    #[error("{round}: illegal transition {from:?} -> {to:?}")]
    IllegalTransition { round: RoundId, from: RoundStatus, to: RoundStatus },
    #[error("{round}: outside contribution window at {now}")]
    OutsideWindow { round: RoundId, now: u64 },
    #[error("allocation already exists for {participant} in {round}")]
    AllocationExists { round: RoundId, participant: Address },
    #[error("no allocation for {participant} in {round}")]
    NoAllocation { round: RoundId, participant: Address },
    #[error("{participant} holds an active position in {round}")]
    PositionOutstanding { round: RoundId, participant: Address },
    #[error("{participant} has no active position in {round}")]
    NoPosition { round: RoundId, participant: Address },
    #[error("{participant} has no vesting schedule in {round}")]
    NoVestingSchedule { round: RoundId, participant: Address },
    #[error("{0}: participant cap reached")]
    RoundFull(RoundId),
    #[error("engine is paused")]
    Paused,
    #[error("re-entrant call on {0}")]
    Reentrancy(RoundId),
    #[error("insufficient token supply: required {required}, held {held}")]
    InsufficientSupply { required: Balance, held: Balance },
    #[error("{round}: allocation total {requested} exceeds token allocation {cap}")]
    AllocationExceeded { round: RoundId, requested: Balance, cap: Balance },
    #[error("{round}: contribution would exceed value target {target}")]
    Oversubscribed { round: RoundId, target: Balance },
    #[error("arithmetic overflow")]
    MathOverflow,
    #[error("{round}: finalization aborted, {stranded} locked vesting wallet(s) could not be reclaimed")]
    UnwindIncomplete { round: RoundId, stranded: usize },
    #[error("vesting: {0}")]
    Vesting(#[from] VestingError),
    #[error("timelock: {0}")]
    Timelock(#[from] TimelockError),
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("backend: {0}")]
    Backend(#[from] BackendError),
}

impl LaunchpadError {
    pub fn kind(&self) -> ErrorKind {
        use LaunchpadError::*;
        match self {
            MissingRole(_) | NotAuthorized(_) => ErrorKind::Authorization,
            ZeroAddress
            | ZeroAmount
            | DurationOutOfRange { .. }
            | StartInPast { .. }
            | InexactContribution { .. }
            | OutsideWindow { .. }
            | Config(_) => ErrorKind::Validation,
            RoundNotFound(_)
            | UnexpectedStatus { .. }
            | IllegalTransition { .. }
            | AllocationExists { .. }
            | NoAllocation { .. }
            | PositionOutstanding { .. }
            | NoPosition { .. }
            | NoVestingSchedule { .. }
            | RoundFull(_)
            | Paused
            | Reentrancy(_)
            | Timelock(_) => ErrorKind::StateConflict,
            InsufficientSupply { .. }
            | AllocationExceeded { .. }
            | Oversubscribed { .. }
            | MathOverflow => ErrorKind::ResourceExhaustion,
            Vesting(e) => e.kind(),
            Backend(_) | UnwindIncomplete { .. } => ErrorKind::External,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(
            LaunchpadError::MissingRole(Role::Allocator).kind(),
            ErrorKind::Authorization
        );
        assert_eq!(LaunchpadError::ZeroAmount.kind(), ErrorKind::Validation);
        assert_eq!(
            LaunchpadError::RoundFull(RoundId(0)).kind(),
            ErrorKind::StateConflict
        );
        assert_eq!(
            LaunchpadError::InsufficientSupply { required: 2, held: 1 }.kind(),
            ErrorKind::ResourceExhaustion
        );
        assert_eq!(
            LaunchpadError::from(BackendError::Insufficient).kind(),
            ErrorKind::External
        );
        assert_eq!(
            LaunchpadError::from(TimelockError::NothingPending).kind(),
            ErrorKind::StateConflict
        );
        assert_eq!(
            LaunchpadError::NoVestingSchedule { round: RoundId(0), participant: Address::from_low_u64(1) }.kind(),
            ErrorKind::StateConflict
        );
        assert_eq!(
            LaunchpadError::UnwindIncomplete { round: RoundId(0), stranded: 1 }.kind(),
            ErrorKind::External
        );
        assert_eq!(
            LaunchpadError::from(VestingError::Locked(Address::from_low_u64(1))).kind(),
            ErrorKind::StateConflict
        );
    }

    #[test]
    fn messages_carry_context() {
        let e = LaunchpadError::InexactContribution { expected: 100, got: 40 };
        assert_eq!(
            e.to_string(),
            "contribution must equal remaining allocation room 100, got 40"
        );
        let e = LaunchpadError::DurationOutOfRange { got: 1, min: 60, max: 120 };
        assert_eq!(e.to_string(), "round duration 1s outside [60s, 120s]");
        let e = LaunchpadError::UnwindIncomplete { round: RoundId(3), stranded: 2 };
        assert_eq!(
            e.to_string(),
            "round#3: finalization aborted, 2 locked vesting wallet(s) could not be reclaimed"
        );
    }
}
