//! Role registry for privileged launchpad operations.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::LaunchpadError;
use crate::Address;

/// Roles.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Role {
    /// Grants roles, pauses, schedules upgrades and operator changes.
    Admin,
    /// Governance executor allowed to open rounds.
    Authorizer,
    /// Maintains the allocation registry.
    Allocator,
    /// Cancels and finalizes rounds, revokes vesting grants.
    Manager,
}

#[derive(Clone, Debug, Default)]
pub struct AccessControl {
    members: HashMap<Role, BTreeSet<Address>>,
}

impl AccessControl {
    pub fn with_admin(admin: Address) -> Self {
        let mut ac = Self::default();
        ac.members.entry(Role::Admin).or_default().insert(admin);
        ac
    }

    pub fn has(&self, role: Role, who: Address) -> bool {
        self.members.get(&role).is_some_and(|m| m.contains(&who))
    }

    pub fn require(&self, role: Role, who: Address) -> Result<(), LaunchpadError> {
        if self.has(role, who) {
            Ok(())
        } else {
            Err(LaunchpadError::MissingRole(role))
        }
    }

    /// Returns false if `who` already held the role.
    pub fn grant(&mut self, caller: Address, role: Role, who: Address) -> Result<bool, LaunchpadError> {
        self.require(Role::Admin, caller)?;
        if who.is_zero() {
            return Err(LaunchpadError::ZeroAddress);
        }
        Ok(self.members.entry(role).or_default().insert(who))
    }

    /// Returns false if `who` did not hold the role. The last admin cannot be removed.
    pub fn revoke(&mut self, caller: Address, role: Role, who: Address) -> Result<bool, LaunchpadError> {
        self.require(Role::Admin, caller)?;
        let set = match self.members.get_mut(&role) {
            Some(s) => s,
            None => return Ok(false),
        };
        if role == Role::Admin && set.len() == 1 && set.contains(&who) {
            return Err(LaunchpadError::NotAuthorized("cannot revoke the last admin"));
        }
        Ok(set.remove(&who))
    }

    pub fn members(&self, role: Role) -> Vec<Address> {
        self.members
            .get(&role)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(x: u8) -> Address {
        Address::from_low_u64(x as u64)
    }

    #[test]
    fn grant_requires_admin() {
        let mut ac = AccessControl::with_admin(addr(1));
        assert!(matches!(
            ac.grant(addr(2), Role::Allocator, addr(3)),
            Err(LaunchpadError::MissingRole(Role::Admin))
        ));
        assert!(ac.grant(addr(1), Role::Allocator, addr(3)).unwrap());
        assert!(!ac.grant(addr(1), Role::Allocator, addr(3)).unwrap());
        assert!(ac.has(Role::Allocator, addr(3)));
        assert!(!ac.has(Role::Manager, addr(3)));
        assert!(matches!(
            ac.grant(addr(1), Role::Manager, Address::ZERO),
            Err(LaunchpadError::ZeroAddress)
        ));
    }

    #[test]
    fn last_admin_is_sticky() {
        let mut ac = AccessControl::with_admin(addr(1));
        assert!(ac.revoke(addr(1), Role::Admin, addr(1)).is_err());
        ac.grant(addr(1), Role::Admin, addr(2)).unwrap();
        assert!(ac.revoke(addr(2), Role::Admin, addr(1)).unwrap());
        assert_eq!(ac.members(Role::Admin), vec![addr(2)]);
        assert!(!ac.revoke(addr(2), Role::Manager, addr(9)).unwrap());
    }
}
