//! In-memory collaborators with time and balances.
//!
//! Used by simulations and tests. Accounts can be frozen to make every
//! transfer touching them fail, which is how callers exercise unwinding.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::backend::{BackendError, Clock, TokenContract, ValueBank};
use crate::{Address, Balance, Timestamp};

/// Balance book shared by the token and value implementations.
#[derive(Default)]
struct Accounts {
    balances: RwLock<HashMap<Address, Balance>>,
    frozen: RwLock<HashSet<Address>>,
}

impl Accounts {
    fn mint(&self, to: Address, amount: Balance) {
        let mut m = self.balances.write();
        let b = m.entry(to).or_default();
        *b = b.saturating_add(amount);
    }

    fn balance(&self, who: Address) -> Balance {
        *self.balances.read().get(&who).unwrap_or(&0)
    }

    fn set_frozen(&self, who: Address, frozen: bool) {
        let mut f = self.frozen.write();
        if frozen {
            f.insert(who);
        } else {
            f.remove(&who);
        }
    }

    fn check_frozen(&self, from: Address, to: Address) -> Result<(), BackendError> {
        let f = self.frozen.read();
        if f.contains(&from) {
            return Err(BackendError::Rejected(from));
        }
        if f.contains(&to) {
            return Err(BackendError::Rejected(to));
        }
        Ok(())
    }

    fn move_balance(&self, from: Address, to: Address, amount: Balance) -> Result<(), BackendError> {
        self.check_frozen(from, to)?;
        let mut m = self.balances.write();
        let fb = m.entry(from).or_default();
        if *fb < amount {
            return Err(BackendError::Insufficient);
        }
        *fb -= amount;
        let tb = m.entry(to).or_default();
        *tb = tb.checked_add(amount).ok_or_else(|| BackendError::Other("balance overflow".into()))?;
        Ok(())
    }
}

/// Fungible token with allowances.
#[derive(Default)]
pub struct MemoryToken {
    accounts: Accounts,
    allowances: RwLock<HashMap<(Address, Address), Balance>>,
}

impl MemoryToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&self, to: Address, amount: Balance) {
        self.accounts.mint(to, amount);
    }

    pub fn balance(&self, who: Address) -> Balance {
        self.accounts.balance(who)
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> Balance {
        *self.allowances.read().get(&(owner, spender)).unwrap_or(&0)
    }

    /// Frozen accounts reject every incoming and outgoing transfer.
    pub fn freeze(&self, who: Address, frozen: bool) {
        self.accounts.set_frozen(who, frozen);
    }
}

impl TokenContract for MemoryToken {
    fn balance_of(&self, who: Address) -> Result<Balance, BackendError> {
        Ok(self.accounts.balance(who))
    }

    fn transfer(&self, from: Address, to: Address, amount: Balance) -> Result<(), BackendError> {
        self.accounts.move_balance(from, to, amount)
    }

    fn approve(&self, owner: Address, spender: Address, amount: Balance) -> Result<(), BackendError> {
        self.allowances.write().insert((owner, spender), amount);
        Ok(())
    }

    fn transfer_from(
        &self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Balance,
    ) -> Result<(), BackendError> {
        let mut al = self.allowances.write();
        let allowed = al.get(&(from, spender)).copied().unwrap_or(0);
        if allowed < amount {
            return Err(BackendError::InsufficientAllowance);
        }
        self.accounts.move_balance(from, to, amount)?;
        al.insert((from, spender), allowed - amount);
        Ok(())
    }
}

/// Native value-currency ledger.
#[derive(Default)]
pub struct MemoryBank {
    accounts: Accounts,
}

impl MemoryBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&self, to: Address, amount: Balance) {
        self.accounts.mint(to, amount);
    }

    pub fn balance(&self, who: Address) -> Balance {
        self.accounts.balance(who)
    }

    pub fn freeze(&self, who: Address, frozen: bool) {
        self.accounts.set_frozen(who, frozen);
    }
}

impl ValueBank for MemoryBank {
    fn balance_of(&self, who: Address) -> Result<Balance, BackendError> {
        Ok(self.accounts.balance(who))
    }

    fn transfer(&self, from: Address, to: Address, amount: Balance) -> Result<(), BackendError> {
        self.accounts.move_balance(from, to, amount)
    }
}

/// Clock advanced by hand.
#[derive(Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self { now: AtomicU64::new(now) }
    }

    pub fn set(&self, t: Timestamp) {
        self.now.store(t, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_unix(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(x: u8) -> Address {
        Address::from_low_u64(x as u64)
    }

    #[test]
    fn token_transfer_and_allowance() {
        let t = MemoryToken::new();
        t.mint(addr(1), 100);
        t.transfer(addr(1), addr(2), 40).unwrap();
        assert_eq!(t.balance(addr(1)), 60);
        assert_eq!(t.balance(addr(2)), 40);
        assert_eq!(t.transfer(addr(2), addr(3), 41), Err(BackendError::Insufficient));

        assert_eq!(
            t.transfer_from(addr(9), addr(1), addr(3), 10),
            Err(BackendError::InsufficientAllowance)
        );
        t.approve(addr(1), addr(9), 25).unwrap();
        t.transfer_from(addr(9), addr(1), addr(3), 10).unwrap();
        assert_eq!(t.allowance(addr(1), addr(9)), 15);
        assert_eq!(t.balance(addr(3)), 10);
    }

    #[test]
    fn frozen_account_rejects_both_directions() {
        let b = MemoryBank::new();
        b.mint(addr(1), 10);
        b.freeze(addr(2), true);
        assert_eq!(b.transfer(addr(1), addr(2), 1), Err(BackendError::Rejected(addr(2))));
        assert_eq!(b.balance(addr(1)), 10);
        b.freeze(addr(2), false);
        b.transfer(addr(1), addr(2), 1).unwrap();
        b.freeze(addr(2), true);
        assert_eq!(b.transfer(addr(2), addr(1), 1), Err(BackendError::Rejected(addr(2))));
    }

    #[test]
    fn manual_clock() {
        let c = ManualClock::new(100);
        c.advance(5);
        assert_eq!(c.now_unix(), 105);
        c.set(7);
        assert_eq!(c.now_unix(), 7);
    }
}
