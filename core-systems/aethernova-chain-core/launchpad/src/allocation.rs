//! Allocation registry: per-participant contribution ceiling and promised
//! token amount. Privilege checks are done by the manager.

use serde::{Deserialize, Serialize};

use crate::error::LaunchpadError;
use crate::ledger::RoundLedger;
use crate::{Address, Balance, RoundId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Allocation {
    /// Ceiling on value currency the participant may contribute.
    pub max_contribution: Balance,
    /// Tokens vested to the participant if the round finalizes.
    pub token_amount: Balance,
}

impl RoundLedger {
    pub fn set_allocation(
        &mut self,
        id: RoundId,
        participant: Address,
        allocation: Allocation,
    ) -> Result<(), LaunchpadError> {
        let round = self.round(id)?;
        round.expect_open()?;
        if participant.is_zero() {
            return Err(LaunchpadError::ZeroAddress);
        }
        if allocation.max_contribution == 0 || allocation.token_amount == 0 {
            return Err(LaunchpadError::ZeroAmount);
        }
        if self.allocations.contains_key(&(id, participant)) {
            return Err(LaunchpadError::AllocationExists { round: id, participant });
        }
        let requested = round
            .allocated_tokens
            .checked_add(allocation.token_amount)
            .ok_or(LaunchpadError::MathOverflow)?;
        if requested > round.token_allocation {
            return Err(LaunchpadError::AllocationExceeded {
                round: id,
                requested,
                cap: round.token_allocation,
            });
        }

        self.round_mut(id)?.allocated_tokens = requested;
        self.allocations.insert((id, participant), allocation);
        Ok(())
    }

    /// Drop an allocation that has no position behind it. Returns the record.
    pub fn remove_allocation(&mut self, id: RoundId, participant: Address) -> Result<Allocation, LaunchpadError> {
        self.round(id)?.expect_open()?;
        let allocation = *self
            .allocation(id, participant)
            .ok_or(LaunchpadError::NoAllocation { round: id, participant })?;
        if self.position(id, participant) != 0 {
            return Err(LaunchpadError::PositionOutstanding { round: id, participant });
        }
        let round = self.round_mut(id)?;
        round.allocated_tokens = round
            .allocated_tokens
            .checked_sub(allocation.token_amount)
            .ok_or(LaunchpadError::MathOverflow)?;
        self.allocations.remove(&(id, participant));
        Ok(allocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::round::{RoundParams, RoundStatus};

    fn addr(x: u8) -> Address {
        Address::from_low_u64(x as u64)
    }

    fn ledger() -> (RoundLedger, RoundId) {
        let mut l = RoundLedger::new();
        let id = l
            .open_round(&RoundParams {
                start: 0,
                duration: 10,
                value_target: 100,
                token_allocation: 1_000,
                vesting_cliff: 0,
                vesting_duration: 10,
            })
            .unwrap();
        (l, id)
    }

    fn alloc(max: Balance, tokens: Balance) -> Allocation {
        Allocation { max_contribution: max, token_amount: tokens }
    }

    #[test]
    fn cumulative_tokens_capped_by_round_allocation() {
        let (mut l, id) = ledger();
        l.set_allocation(id, addr(1), alloc(50, 600)).unwrap();
        assert!(matches!(
            l.set_allocation(id, addr(2), alloc(50, 401)),
            Err(LaunchpadError::AllocationExceeded { requested: 1_001, cap: 1_000, .. })
        ));
        l.set_allocation(id, addr(2), alloc(50, 400)).unwrap();
        assert_eq!(l.round(id).unwrap().allocated_tokens, 1_000);
    }

    #[test]
    fn rejects_bad_input_and_duplicates() {
        let (mut l, id) = ledger();
        assert!(matches!(l.set_allocation(id, Address::ZERO, alloc(1, 1)), Err(LaunchpadError::ZeroAddress)));
        assert!(matches!(l.set_allocation(id, addr(1), alloc(0, 1)), Err(LaunchpadError::ZeroAmount)));
        assert!(matches!(l.set_allocation(id, addr(1), alloc(1, 0)), Err(LaunchpadError::ZeroAmount)));
        assert!(matches!(
            l.set_allocation(RoundId(9), addr(1), alloc(1, 1)),
            Err(LaunchpadError::RoundNotFound(_))
        ));
        l.set_allocation(id, addr(1), alloc(1, 1)).unwrap();
        assert!(matches!(
            l.set_allocation(id, addr(1), alloc(2, 2)),
            Err(LaunchpadError::AllocationExists { .. })
        ));
    }

    #[test]
    fn remove_requires_no_position() {
        let (mut l, id) = ledger();
        l.set_allocation(id, addr(1), alloc(10, 100)).unwrap();
        l.credit_position(id, addr(1), 10).unwrap();
        assert!(matches!(
            l.remove_allocation(id, addr(1)),
            Err(LaunchpadError::PositionOutstanding { .. })
        ));
        l.debit_position(id, addr(1)).unwrap();
        assert_eq!(l.remove_allocation(id, addr(1)).unwrap(), alloc(10, 100));
        assert_eq!(l.round(id).unwrap().allocated_tokens, 0);
        assert!(l.allocation(id, addr(1)).is_none());
        assert!(matches!(l.remove_allocation(id, addr(1)), Err(LaunchpadError::NoAllocation { .. })));
    }

    #[test]
    fn closed_rounds_are_frozen() {
        let (mut l, id) = ledger();
        l.set_allocation(id, addr(1), alloc(10, 100)).unwrap();
        l.round_mut(id).unwrap().transition(RoundStatus::Cancelled).unwrap();
        assert!(matches!(
            l.set_allocation(id, addr(2), alloc(1, 1)),
            Err(LaunchpadError::UnexpectedStatus { .. })
        ));
        assert!(matches!(l.remove_allocation(id, addr(1)), Err(LaunchpadError::UnexpectedStatus { .. })));
    }
}
