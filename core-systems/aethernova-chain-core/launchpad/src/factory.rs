// aethernova-chain-core/launchpad/src/factory.rs
//! Vesting factory: one [`VestingWallet`] per grant, funded atomically with
//! its construction.
//!
//! Wallet addresses are derived as the last 20 bytes of
//! `sha256("aethernova.vesting" || factory || nonce)`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::backend::{Clock, TokenContract};
use crate::error::LaunchpadError;
use crate::timelock::{PendingRequest, TimelockGuard};
use crate::vesting::{LinearSchedule, VestingError, VestingWallet};
use crate::{Address, Balance};

struct FactoryState {
    admin: Address,
    nonce: u64,
    implementation: Address,
    upgrade: TimelockGuard<Address>,
    wallets: HashMap<Address, Arc<VestingWallet>>,
    by_beneficiary: HashMap<Address, Vec<Address>>,
}

pub struct VestingFactory {
    address: Address,
    token: Arc<dyn TokenContract>,
    clock: Arc<dyn Clock>,
    state: RwLock<FactoryState>,
}

impl std::fmt::Debug for VestingFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VestingFactory")
            .field("address", &self.address)
            .field("wallets", &self.state.read().wallets.len())
            .finish()
    }
}

fn derive_wallet_address(factory: Address, nonce: u64) -> Address {
    let mut h = Sha256::new();
    h.update(b"aethernova.vesting");
    h.update(factory.0);
    h.update(nonce.to_be_bytes());
    let digest = h.finalize();
    let mut a = [0u8; 20];
    a.copy_from_slice(&digest[12..32]);
    Address(a)
}

impl VestingFactory {
    /// Address of the factory owned by `owner`: last 20 bytes of
    /// `sha256("aethernova.factory" || owner)`.
    pub fn address_for(owner: Address) -> Address {
        let digest = Sha256::new()
            .chain_update(b"aethernova.factory")
            .chain_update(owner.0)
            .finalize();
        let mut a = [0u8; 20];
        a.copy_from_slice(&digest[12..32]);
        Address(a)
    }

    pub fn new(
        address: Address,
        admin: Address,
        implementation: Address,
        upgrade_delay: u64,
        token: Arc<dyn TokenContract>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            address,
            token,
            clock,
            state: RwLock::new(FactoryState {
                admin,
                nonce: 0,
                implementation,
                upgrade: TimelockGuard::new(upgrade_delay),
                wallets: HashMap::new(),
                by_beneficiary: HashMap::new(),
            }),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Create a wallet for `beneficiary` vesting `amount` linearly over
    /// `duration` seconds, starting `cliff` seconds from now. The tokens are
    /// pulled from `creator`, who must have approved this factory.
    pub fn deploy(
        &self,
        creator: Address,
        beneficiary: Address,
        amount: Balance,
        cliff: u64,
        duration: u64,
    ) -> Result<Address, VestingError> {
        self.deploy_with(creator, beneficiary, amount, cliff, duration, false)
    }

    /// Like [`deploy`](Self::deploy), but the wallet refuses release and
    /// revoke until the creator calls [`unlock`](Self::unlock).
    pub fn deploy_locked(
        &self,
        creator: Address,
        beneficiary: Address,
        amount: Balance,
        cliff: u64,
        duration: u64,
    ) -> Result<Address, VestingError> {
        self.deploy_with(creator, beneficiary, amount, cliff, duration, true)
    }

    fn deploy_with(
        &self,
        creator: Address,
        beneficiary: Address,
        amount: Balance,
        cliff: u64,
        duration: u64,
        locked: bool,
    ) -> Result<Address, VestingError> {
        if amount == 0 {
            return Err(VestingError::Invalid("amount must be > 0"));
        }
        let start = self
            .clock
            .now_unix()
            .checked_add(cliff)
            .ok_or(VestingError::Overflow)?;
        let schedule = LinearSchedule::new(start, duration)?;

        let wallet_addr = {
            let mut st = self.state.write();
            let n = st.nonce;
            st.nonce = st.nonce.checked_add(1).ok_or(VestingError::Overflow)?;
            derive_wallet_address(self.address, n)
        };
        let wallet = VestingWallet::new(
            wallet_addr,
            creator,
            beneficiary,
            schedule,
            self.token.clone(),
            self.clock.clone(),
        )?;
        wallet.set_locked(locked);

        self.token
            .transfer_from(self.address, creator, wallet_addr, amount)?;

        let mut st = self.state.write();
        st.wallets.insert(wallet_addr, Arc::new(wallet));
        st.by_beneficiary.entry(beneficiary).or_default().push(wallet_addr);
        debug!(wallet = %wallet_addr, %beneficiary, amount, start, duration, locked, "vesting deployed");
        Ok(wallet_addr)
    }

    pub fn wallet(&self, address: Address) -> Option<Arc<VestingWallet>> {
        self.state.read().wallets.get(&address).cloned()
    }

    pub fn wallets_of(&self, beneficiary: Address) -> Vec<Address> {
        self.state
            .read()
            .by_beneficiary
            .get(&beneficiary)
            .cloned()
            .unwrap_or_default()
    }

    fn require_wallet(&self, address: Address) -> Result<Arc<VestingWallet>, VestingError> {
        self.wallet(address).ok_or(VestingError::NotFound(address))
    }

    /// Permissionless: pays out whatever has vested to the beneficiary.
    pub fn release(&self, wallet: Address) -> Result<Balance, VestingError> {
        self.require_wallet(wallet)?.release()
    }

    /// Creator-only early termination, see [`VestingWallet::revoke`].
    pub fn revoke(&self, caller: Address, wallet: Address) -> Result<(Balance, Balance), VestingError> {
        self.require_wallet(wallet)?.revoke(caller)
    }

    /// Creator-only: lift the lock set by [`deploy_locked`](Self::deploy_locked).
    pub fn unlock(&self, caller: Address, wallet: Address) -> Result<(), VestingError> {
        let w = self.require_wallet(wallet)?;
        if caller != w.creator() {
            return Err(VestingError::NotAllowed("only the creator may unlock"));
        }
        w.set_locked(false);
        Ok(())
    }

    /// Creator-only compensation for an aborted batch: returns the whole
    /// balance to the creator without releasing and forgets the wallet.
    pub fn discard(&self, caller: Address, wallet: Address) -> Result<Balance, VestingError> {
        let w = self.require_wallet(wallet)?;
        if caller != w.creator() {
            return Err(VestingError::NotAllowed("only the creator may discard"));
        }
        let swept = w.sweep_to_creator()?;
        let mut st = self.state.write();
        st.wallets.remove(&wallet);
        if let Some(list) = st.by_beneficiary.get_mut(&w.beneficiary()) {
            list.retain(|a| *a != wallet);
        }
        debug!(%wallet, swept, "vesting discarded");
        Ok(swept)
    }

    // ---------- Upgrade authorization ----------

    pub fn implementation(&self) -> Address {
        self.state.read().implementation
    }

    pub fn pending_upgrade(&self) -> Option<PendingRequest<Address>> {
        self.state.read().upgrade.pending().cloned()
    }

    pub fn schedule_upgrade(&self, caller: Address, implementation: Address) -> Result<(), LaunchpadError> {
        let mut st = self.state.write();
        if caller != st.admin {
            return Err(LaunchpadError::NotAuthorized("factory admin required"));
        }
        if implementation.is_zero() {
            return Err(LaunchpadError::ZeroAddress);
        }
        let now = self.clock.now_unix();
        st.upgrade.schedule(implementation, now);
        info!(factory = %self.address, %implementation, now, "factory upgrade scheduled");
        Ok(())
    }

    pub fn upgrade_to(&self, caller: Address, implementation: Address) -> Result<(), LaunchpadError> {
        let mut st = self.state.write();
        if caller != st.admin {
            return Err(LaunchpadError::NotAuthorized("factory admin required"));
        }
        let now = self.clock.now_unix();
        st.implementation = st.upgrade.authorize(&implementation, now)?;
        info!(factory = %self.address, %implementation, "factory upgraded");
        Ok(())
    }
}
