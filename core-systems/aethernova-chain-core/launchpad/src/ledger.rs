//! Owned, single-writer round store.
//!
//! Rounds live in an append-only arena indexed by [`RoundId`]; allocations,
//! positions and vesting wallets are hash-keyed by `(round, participant)`.
//! The ledger performs bookkeeping only. Privilege, status and window checks
//! are the caller's job, except where a mutation would break an invariant.

use std::collections::HashMap;

use crate::allocation::Allocation;
use crate::error::LaunchpadError;
use crate::round::{Round, RoundParams, RoundStatus};
use crate::{Address, Balance, RoundId};

/// Unordered set of a round's active participants with O(1) removal.
///
/// Removal swaps the last entry into the vacated slot, so iteration order is
/// not stable across removals.
#[derive(Clone, Debug, Default)]
pub struct ParticipantIndex {
    order: Vec<Address>,
    slots: HashMap<Address, usize>,
}

impl ParticipantIndex {
    /// Returns false if already present.
    pub fn insert(&mut self, who: Address) -> bool {
        if self.slots.contains_key(&who) {
            return false;
        }
        self.slots.insert(who, self.order.len());
        self.order.push(who);
        true
    }

    /// Returns false if absent.
    pub fn remove(&mut self, who: Address) -> bool {
        let slot = match self.slots.remove(&who) {
            Some(s) => s,
            None => return false,
        };
        self.order.swap_remove(slot);
        if let Some(moved) = self.order.get(slot) {
            self.slots.insert(*moved, slot);
        }
        true
    }

    pub fn contains(&self, who: Address) -> bool {
        self.slots.contains_key(&who)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn as_slice(&self) -> &[Address] {
        &self.order
    }
}

#[derive(Clone, Debug, Default)]
pub struct RoundLedger {
    pub(crate) rounds: Vec<Round>,
    pub(crate) participants: Vec<ParticipantIndex>,
    pub(crate) allocations: HashMap<(RoundId, Address), Allocation>,
    pub(crate) positions: HashMap<(RoundId, Address), Balance>,
    pub(crate) vesting: HashMap<(RoundId, Address), Address>,
    /// Locked wallets an aborted finalization could not reclaim.
    pub(crate) stranded: HashMap<RoundId, Vec<Address>>,
    reserved_supply: Balance,
}

impl RoundLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    pub fn round(&self, id: RoundId) -> Result<&Round, LaunchpadError> {
        usize::try_from(id.0)
            .ok()
            .and_then(|i| self.rounds.get(i))
            .ok_or(LaunchpadError::RoundNotFound(id))
    }

    pub fn round_mut(&mut self, id: RoundId) -> Result<&mut Round, LaunchpadError> {
        usize::try_from(id.0)
            .ok()
            .and_then(|i| self.rounds.get_mut(i))
            .ok_or(LaunchpadError::RoundNotFound(id))
    }

    /// Tokens reserved across every round that still holds its reservation.
    pub fn reserved_supply(&self) -> Balance {
        self.reserved_supply
    }

    /// Append a Pending round and reserve its token allocation.
    pub fn open_round(&mut self, params: &RoundParams) -> Result<RoundId, LaunchpadError> {
        let end = params
            .start
            .checked_add(params.duration)
            .ok_or(LaunchpadError::MathOverflow)?;
        let reserved = self
            .reserved_supply
            .checked_add(params.token_allocation)
            .ok_or(LaunchpadError::MathOverflow)?;
        let id = RoundId(self.rounds.len() as u64);
        self.rounds.push(Round {
            id,
            target: params.value_target,
            invested: 0,
            token_allocation: params.token_allocation,
            allocated_tokens: 0,
            distributed: 0,
            start: params.start,
            end,
            vesting_cliff: params.vesting_cliff,
            vesting_duration: params.vesting_duration,
            participants: 0,
            status: RoundStatus::Pending,
        });
        self.participants.push(ParticipantIndex::default());
        self.reserved_supply = reserved;
        Ok(id)
    }

    pub(crate) fn reserve(&mut self, amount: Balance) -> Result<(), LaunchpadError> {
        self.reserved_supply = self
            .reserved_supply
            .checked_add(amount)
            .ok_or(LaunchpadError::MathOverflow)?;
        Ok(())
    }

    pub(crate) fn release_reservation(&mut self, amount: Balance) -> Result<(), LaunchpadError> {
        self.reserved_supply = self
            .reserved_supply
            .checked_sub(amount)
            .ok_or(LaunchpadError::MathOverflow)?;
        Ok(())
    }

    /// Status write that bypasses the transition guard; only for unwinding.
    pub(crate) fn restore_status(&mut self, id: RoundId, status: RoundStatus) -> Result<(), LaunchpadError> {
        self.round_mut(id)?.status = status;
        Ok(())
    }

    pub fn allocation(&self, id: RoundId, who: Address) -> Option<&Allocation> {
        self.allocations.get(&(id, who))
    }

    pub fn position(&self, id: RoundId, who: Address) -> Balance {
        self.positions.get(&(id, who)).copied().unwrap_or(0)
    }

    pub fn participants(&self, id: RoundId) -> Result<&[Address], LaunchpadError> {
        self.round(id)?;
        Ok(self.participants[id.0 as usize].as_slice())
    }

    pub fn vesting_wallet(&self, id: RoundId, who: Address) -> Option<Address> {
        self.vesting.get(&(id, who)).copied()
    }

    /// Sum of every position in the round; equals `invested` at all times.
    pub fn positions_sum(&self, id: RoundId) -> Balance {
        self.positions
            .iter()
            .filter(|((r, _), _)| *r == id)
            .fold(0, |acc, (_, v)| acc.saturating_add(*v))
    }

    /// Increase `who`'s position and the round's invested total. A first
    /// position registers the participant. Returns true if it was the first.
    pub(crate) fn credit_position(
        &mut self,
        id: RoundId,
        who: Address,
        amount: Balance,
    ) -> Result<bool, LaunchpadError> {
        if amount == 0 {
            return Err(LaunchpadError::ZeroAmount);
        }
        let current = self.position(id, who);
        let round = self.round(id)?;
        let invested = round
            .invested
            .checked_add(amount)
            .ok_or(LaunchpadError::MathOverflow)?;
        let position = current.checked_add(amount).ok_or(LaunchpadError::MathOverflow)?;
        let first = current == 0;
        let participants = if first {
            round.participants.checked_add(1).ok_or(LaunchpadError::MathOverflow)?
        } else {
            round.participants
        };

        let round = self.round_mut(id)?;
        round.invested = invested;
        round.participants = participants;
        self.positions.insert((id, who), position);
        if first {
            self.participants[id.0 as usize].insert(who);
        }
        Ok(first)
    }

    /// Zero `who`'s position, deregister them and shrink the round's totals.
    /// Returns the amount that was held.
    pub(crate) fn debit_position(&mut self, id: RoundId, who: Address) -> Result<Balance, LaunchpadError> {
        let amount = self.position(id, who);
        if amount == 0 {
            return Err(LaunchpadError::NoPosition { round: id, participant: who });
        }
        let round = self.round_mut(id)?;
        round.invested = round
            .invested
            .checked_sub(amount)
            .ok_or(LaunchpadError::MathOverflow)?;
        round.participants = round.participants.saturating_sub(1);
        self.positions.remove(&(id, who));
        self.participants[id.0 as usize].remove(who);
        Ok(amount)
    }

    /// Exact inverse of a `credit_position` that returned `first`.
    pub(crate) fn revert_credit(
        &mut self,
        id: RoundId,
        who: Address,
        amount: Balance,
        first: bool,
    ) -> Result<(), LaunchpadError> {
        if first {
            self.debit_position(id, who)?;
            return Ok(());
        }
        let position = self
            .position(id, who)
            .checked_sub(amount)
            .ok_or(LaunchpadError::MathOverflow)?;
        let round = self.round_mut(id)?;
        round.invested = round
            .invested
            .checked_sub(amount)
            .ok_or(LaunchpadError::MathOverflow)?;
        self.positions.insert((id, who), position);
        Ok(())
    }

    pub(crate) fn record_vesting(&mut self, id: RoundId, who: Address, wallet: Address) {
        self.vesting.insert((id, who), wallet);
    }

    pub fn stranded_wallets(&self, id: RoundId) -> &[Address] {
        self.stranded.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn strand(&mut self, id: RoundId, wallets: Vec<Address>) {
        if !wallets.is_empty() {
            self.stranded.entry(id).or_default().extend(wallets);
        }
    }

    pub(crate) fn take_stranded(&mut self, id: RoundId) -> Vec<Address> {
        self.stranded.remove(&id).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(x: u8) -> Address {
        Address::from_low_u64(x as u64)
    }

    fn params() -> RoundParams {
        RoundParams {
            start: 100,
            duration: 50,
            value_target: 1_000,
            token_allocation: 10_000,
            vesting_cliff: 0,
            vesting_duration: 10,
        }
    }

    #[test]
    fn participant_index_swap_remove() {
        let mut ix = ParticipantIndex::default();
        for x in 1..=4 {
            assert!(ix.insert(addr(x)));
        }
        assert!(!ix.insert(addr(2)));
        assert!(ix.remove(addr(1)));
        assert!(!ix.remove(addr(1)));
        assert_eq!(ix.len(), 3);
        // No ordering contract: compare as sets.
        let mut got: Vec<_> = ix.as_slice().to_vec();
        got.sort();
        assert_eq!(got, vec![addr(2), addr(3), addr(4)]);
        // Slots stay consistent after the swap.
        assert!(ix.remove(addr(4)));
        assert!(ix.remove(addr(2)));
        assert_eq!(ix.as_slice(), &[addr(3)]);
        assert!(ix.contains(addr(3)));
    }

    #[test]
    fn rounds_are_sequential_and_reserve_supply() {
        let mut l = RoundLedger::new();
        assert_eq!(l.open_round(&params()).unwrap(), RoundId(0));
        assert_eq!(l.open_round(&params()).unwrap(), RoundId(1));
        assert_eq!(l.reserved_supply(), 20_000);
        let r = l.round(RoundId(1)).unwrap();
        assert_eq!((r.start, r.end, r.status), (100, 150, RoundStatus::Pending));
        assert!(matches!(l.round(RoundId(2)), Err(LaunchpadError::RoundNotFound(RoundId(2)))));
        l.release_reservation(10_000).unwrap();
        assert_eq!(l.reserved_supply(), 10_000);
        assert!(l.release_reservation(10_001).is_err());
    }

    #[test]
    fn credit_and_debit_keep_conservation() {
        let mut l = RoundLedger::new();
        let id = l.open_round(&params()).unwrap();
        assert!(l.credit_position(id, addr(1), 100).unwrap());
        assert!(l.credit_position(id, addr(2), 50).unwrap());
        assert!(!l.credit_position(id, addr(1), 25).unwrap());
        let r = l.round(id).unwrap();
        assert_eq!((r.invested, r.participants), (175, 2));
        assert_eq!(l.positions_sum(id), 175);

        assert_eq!(l.debit_position(id, addr(1)).unwrap(), 125);
        assert!(matches!(l.debit_position(id, addr(1)), Err(LaunchpadError::NoPosition { .. })));
        let r = l.round(id).unwrap();
        assert_eq!((r.invested, r.participants), (50, 1));
        assert_eq!(l.participants(id).unwrap(), &[addr(2)]);
        assert_eq!(l.positions_sum(id), 50);
    }

    #[test]
    fn revert_credit_is_exact() {
        let mut l = RoundLedger::new();
        let id = l.open_round(&params()).unwrap();
        let first = l.credit_position(id, addr(1), 40).unwrap();
        l.revert_credit(id, addr(1), 40, first).unwrap();
        assert_eq!(l.position(id, addr(1)), 0);
        assert!(l.participants(id).unwrap().is_empty());
        assert_eq!(l.round(id).unwrap().participants, 0);

        l.credit_position(id, addr(1), 40).unwrap();
        let first = l.credit_position(id, addr(1), 10).unwrap();
        l.revert_credit(id, addr(1), 10, first).unwrap();
        assert_eq!(l.position(id, addr(1)), 40);
        let r = l.round(id).unwrap();
        assert_eq!((r.invested, r.participants), (40, 1));
    }

    #[test]
    fn stranded_wallets_accumulate_until_taken() {
        let mut l = RoundLedger::new();
        let id = l.open_round(&params()).unwrap();
        l.strand(id, vec![]);
        assert!(l.stranded.is_empty());
        l.strand(id, vec![addr(0xA0)]);
        l.strand(id, vec![addr(0xA1)]);
        assert_eq!(l.stranded_wallets(id), &[addr(0xA0), addr(0xA1)]);
        assert_eq!(l.take_stranded(id), vec![addr(0xA0), addr(0xA1)]);
        assert!(l.stranded_wallets(id).is_empty());
    }
}
