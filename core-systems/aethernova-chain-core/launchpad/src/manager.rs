// aethernova-chain-core/launchpad/src/manager.rs
//! Investment manager: the privileged front of the launchpad.
//!
//! Concurrency:
//! - `exec` is a re-entrant mutex held for the whole of every mutating call,
//!   so calls from different threads run one after another.
//! - A collaborator that calls back into the manager from inside a transfer
//!   passes `exec` but hits the per-round in-flight set and is rejected with
//!   [`LaunchpadError::Reentrancy`].
//! - Ledger effects are committed before any outbound transfer and the state
//!   lock is never held across a collaborator call. A failed transfer applies
//!   the exact inverse of what was committed.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::access::{AccessControl, Role};
use crate::allocation::Allocation;
use crate::backend::Collaborators;
use crate::config::EngineConfig;
use crate::error::LaunchpadError;
use crate::events::LaunchpadEvent;
use crate::factory::VestingFactory;
use crate::ledger::RoundLedger;
use crate::round::{Round, RoundParams, RoundStatus};
use crate::timelock::{PendingRequest, TimelockGuard};
use crate::{Address, Balance, RoundId, Timestamp};

struct ManagerState {
    ledger: RoundLedger,
    access: AccessControl,
    paused: bool,
    implementation: Address,
    upgrade: TimelockGuard<Address>,
    emergency_operator: Address,
    operator_change: TimelockGuard<Address>,
}

/// Removes the round from the in-flight set on drop.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<RoundId>>,
    round: RoundId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.round);
    }
}

pub struct InvestmentManager {
    address: Address,
    cfg: EngineConfig,
    collab: Collaborators,
    factory: VestingFactory,
    exec: ReentrantMutex<()>,
    in_flight: Mutex<HashSet<RoundId>>,
    state: RwLock<ManagerState>,
    events_tx: broadcast::Sender<LaunchpadEvent>,
}

impl fmt::Debug for InvestmentManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.state.read();
        f.debug_struct("InvestmentManager")
            .field("address", &self.address)
            .field("rounds", &st.ledger.len())
            .field("reserved_supply", &st.ledger.reserved_supply())
            .field("paused", &st.paused)
            .finish()
    }
}

impl InvestmentManager {
    /// `address` is the engine's own custody identity for both currencies.
    /// `emergency_operator` may be zero (none).
    pub fn new(
        cfg: EngineConfig,
        address: Address,
        admin: Address,
        emergency_operator: Address,
        collab: Collaborators,
    ) -> Result<Arc<Self>, LaunchpadError> {
        cfg.validate()?;
        if address.is_zero() || admin.is_zero() || collab.treasury.is_zero() {
            return Err(LaunchpadError::ZeroAddress);
        }
        let delay = cfg.upgrade_delay.as_secs();
        let factory = VestingFactory::new(
            VestingFactory::address_for(address),
            admin,
            Address::ZERO,
            delay,
            collab.token.clone(),
            collab.clock.clone(),
        );
        let (tx, _) = broadcast::channel(cfg.event_capacity);
        info!(engine = %address, %admin, treasury = %collab.treasury, "launchpad engine created");

        Ok(Arc::new(Self {
            address,
            cfg,
            collab,
            factory,
            exec: ReentrantMutex::new(()),
            in_flight: Mutex::new(HashSet::new()),
            state: RwLock::new(ManagerState {
                ledger: RoundLedger::new(),
                access: AccessControl::with_admin(admin),
                paused: false,
                implementation: Address::ZERO,
                upgrade: TimelockGuard::new(delay),
                emergency_operator,
                operator_change: TimelockGuard::new(delay),
            }),
            events_tx: tx,
        }))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LaunchpadEvent> {
        self.events_tx.subscribe()
    }

    fn emit(&self, ev: LaunchpadEvent) {
        let _ = self.events_tx.send(ev);
    }

    fn now(&self) -> Timestamp {
        self.collab.clock.now_unix()
    }

    fn enter(&self, round: RoundId) -> Result<InFlight<'_>, LaunchpadError> {
        if !self.in_flight.lock().insert(round) {
            return Err(LaunchpadError::Reentrancy(round));
        }
        Ok(InFlight { set: &self.in_flight, round })
    }

    fn require_role(&self, role: Role, caller: Address) -> Result<(), LaunchpadError> {
        self.state.read().access.require(role, caller)
    }

    /// Role holder or the emergency operator.
    fn require_role_or_operator(&self, role: Role, caller: Address) -> Result<(), LaunchpadError> {
        let st = self.state.read();
        if !st.emergency_operator.is_zero() && st.emergency_operator == caller {
            return Ok(());
        }
        st.access.require(role, caller)
    }

    // ---------- Roles ----------

    pub fn grant_role(&self, caller: Address, role: Role, who: Address) -> Result<(), LaunchpadError> {
        let _x = self.exec.lock();
        if self.state.write().access.grant(caller, role, who)? {
            info!(%who, ?role, "role granted");
            self.emit(LaunchpadEvent::RoleChanged { who, role, grant: true });
        }
        Ok(())
    }

    pub fn revoke_role(&self, caller: Address, role: Role, who: Address) -> Result<(), LaunchpadError> {
        let _x = self.exec.lock();
        if self.state.write().access.revoke(caller, role, who)? {
            info!(%who, ?role, "role revoked");
            self.emit(LaunchpadEvent::RoleChanged { who, role, grant: false });
        }
        Ok(())
    }

    pub fn has_role(&self, role: Role, who: Address) -> bool {
        self.state.read().access.has(role, who)
    }

    /// Admin or emergency operator. Blocks `contribute` and `create_round`.
    pub fn set_paused(&self, caller: Address, paused: bool) -> Result<(), LaunchpadError> {
        let _x = self.exec.lock();
        self.require_role_or_operator(Role::Admin, caller)?;
        self.state.write().paused = paused;
        info!(by = %caller, paused, "pause flag set");
        self.emit(LaunchpadEvent::Paused(paused));
        Ok(())
    }

    // ---------- Rounds ----------

    pub fn create_round(&self, caller: Address, params: RoundParams) -> Result<RoundId, LaunchpadError> {
        let _x = self.exec.lock();
        self.require_role(Role::Authorizer, caller)?;
        if self.state.read().paused {
            return Err(LaunchpadError::Paused);
        }
        let (min, max) = self.cfg.duration_bounds();
        if params.duration < min || params.duration > max {
            return Err(LaunchpadError::DurationOutOfRange { got: params.duration, min, max });
        }
        if params.value_target == 0 || params.token_allocation == 0 {
            return Err(LaunchpadError::ZeroAmount);
        }
        let now = self.now();
        if params.start < now {
            return Err(LaunchpadError::StartInPast { start: params.start, now });
        }
        let held = self.collab.token.balance_of(self.address)?;

        let mut st = self.state.write();
        let required = st
            .ledger
            .reserved_supply()
            .checked_add(params.token_allocation)
            .ok_or(LaunchpadError::MathOverflow)?;
        if held < required {
            return Err(LaunchpadError::InsufficientSupply { required, held });
        }
        let id = st.ledger.open_round(&params)?;
        drop(st);

        info!(round = %id, target = params.value_target, tokens = params.token_allocation, start = params.start, "round created");
        self.emit(LaunchpadEvent::RoundCreated { round: id, params });
        Ok(id)
    }

    /// Permissionless: Pending -> Active once the window has opened.
    pub fn activate_round(&self, round: RoundId) -> Result<(), LaunchpadError> {
        let _x = self.exec.lock();
        let now = self.now();
        let mut st = self.state.write();
        let r = st.ledger.round_mut(round)?;
        r.expect_status(RoundStatus::Pending)?;
        if !r.in_window(now) {
            return Err(LaunchpadError::OutsideWindow { round, now });
        }
        r.transition(RoundStatus::Active)?;
        drop(st);

        info!(%round, now, "round activated");
        self.emit(LaunchpadEvent::RoundActivated { round });
        Ok(())
    }

    /// Manager or emergency operator. Returns the reserved tokens to the treasury.
    pub fn cancel_round(&self, caller: Address, round: RoundId) -> Result<(), LaunchpadError> {
        let _x = self.exec.lock();
        self.require_role_or_operator(Role::Manager, caller)?;
        let _g = self.enter(round)?;

        let (previous, tokens) = {
            let mut st = self.state.write();
            let r = st.ledger.round_mut(round)?;
            r.expect_open()?;
            let previous = r.status;
            let tokens = r.token_allocation;
            r.transition(RoundStatus::Cancelled)?;
            st.ledger.release_reservation(tokens)?;
            (previous, tokens)
        };

        if let Err(e) = self.collab.token.transfer(self.address, self.collab.treasury, tokens) {
            warn!(%round, error = %e, "token return failed; cancellation unwound");
            let mut st = self.state.write();
            st.ledger.restore_status(round, previous)?;
            st.ledger.reserve(tokens)?;
            return Err(e.into());
        }

        info!(%round, by = %caller, returned_tokens = tokens, "round cancelled");
        self.emit(LaunchpadEvent::RoundCancelled { round, returned_tokens: tokens });
        Ok(())
    }

    /// Manager only. Deploys one locked vesting wallet per contributing
    /// participant, forwards the raised value to the treasury, then unlocks
    /// the wallets. Any failure unwinds every deployed wallet and leaves the
    /// round Completed. Wallets that cannot be reclaimed stay locked, are
    /// recorded as stranded and are reclaimed first by the next attempt.
    #[instrument(skip_all, fields(round = %round))]
    pub fn finalize_round(&self, caller: Address, round: RoundId) -> Result<(), LaunchpadError> {
        let _x = self.exec.lock();
        self.require_role(Role::Manager, caller)?;
        let _g = self.enter(round)?;

        self.state.read().ledger.round(round)?.expect_status(RoundStatus::Completed)?;
        self.reclaim_stranded(round)?;

        let (grants, invested, token_allocation, distributed, cliff, duration) = {
            let mut st = self.state.write();
            let r = st.ledger.round(round)?;
            r.expect_status(RoundStatus::Completed)?;
            let (invested, token_allocation, cliff, duration) =
                (r.invested, r.token_allocation, r.vesting_cliff, r.vesting_duration);

            let mut grants: Vec<(Address, Balance)> = Vec::new();
            let mut distributed: Balance = 0;
            for who in st.ledger.participants(round)? {
                // Zero positions are treated as already handled.
                if st.ledger.position(round, *who) == 0 {
                    debug!(participant = %who, "zero position skipped");
                    continue;
                }
                let tokens = st
                    .ledger
                    .allocation(round, *who)
                    .ok_or(LaunchpadError::NoAllocation { round, participant: *who })?
                    .token_amount;
                distributed = distributed.checked_add(tokens).ok_or(LaunchpadError::MathOverflow)?;
                grants.push((*who, tokens));
            }

            let r = st.ledger.round_mut(round)?;
            r.transition(RoundStatus::Finalized)?;
            r.distributed = distributed;
            st.ledger.release_reservation(token_allocation)?;
            (grants, invested, token_allocation, distributed, cliff, duration)
        };

        let mut deployed: Vec<(Address, Address, Balance)> = Vec::with_capacity(grants.len());
        let outcome = (|| -> Result<(), LaunchpadError> {
            for (who, tokens) in &grants {
                self.collab.token.approve(self.address, self.factory.address(), *tokens)?;
                let wallet = self.factory.deploy_locked(self.address, *who, *tokens, cliff, duration)?;
                deployed.push((*who, wallet, *tokens));
            }
            if invested > 0 {
                self.collab.value.transfer(self.address, self.collab.treasury, invested)?;
            }
            Ok(())
        })();

        if let Err(e) = outcome {
            warn!(error = %e, deployed = deployed.len(), "finalization failed; unwinding");
            let mut stranded = Vec::new();
            for (_, wallet, _) in &deployed {
                if let Err(de) = self.factory.discard(self.address, *wallet) {
                    warn!(%wallet, error = %de, "discarding vesting wallet failed; left locked");
                    stranded.push(*wallet);
                }
            }
            if let Err(ae) = self.collab.token.approve(self.address, self.factory.address(), 0) {
                warn!(error = %ae, "allowance reset failed");
            }
            let mut st = self.state.write();
            st.ledger.restore_status(round, RoundStatus::Completed)?;
            st.ledger.round_mut(round)?.distributed = 0;
            st.ledger.reserve(token_allocation)?;
            if !stranded.is_empty() {
                let n = stranded.len();
                st.ledger.strand(round, stranded);
                return Err(LaunchpadError::UnwindIncomplete { round, stranded: n });
            }
            return Err(e);
        }

        {
            let mut st = self.state.write();
            for (who, wallet, _) in &deployed {
                st.ledger.record_vesting(round, *who, *wallet);
            }
        }
        for (_, wallet, _) in &deployed {
            self.factory.unlock(self.address, *wallet)?;
        }
        for (who, wallet, amount) in deployed {
            self.emit(LaunchpadEvent::VestingDeployed { round, participant: who, wallet, amount });
        }
        info!(invested, distributed, treasury = %self.collab.treasury, "round finalized");
        self.emit(LaunchpadEvent::RoundFinalized { round, invested, distributed });
        Ok(())
    }

    /// Sweep wallets left locked by an earlier aborted finalization back to
    /// the engine. Whatever still fails stays recorded.
    fn reclaim_stranded(&self, round: RoundId) -> Result<(), LaunchpadError> {
        let stranded = self.state.write().ledger.take_stranded(round);
        if stranded.is_empty() {
            return Ok(());
        }
        let mut left = Vec::new();
        let mut first_err = None;
        for wallet in stranded {
            match self.factory.discard(self.address, wallet) {
                Ok(swept) => debug!(%wallet, swept, "stranded wallet reclaimed"),
                Err(e) => {
                    warn!(%wallet, error = %e, "stranded wallet still unreclaimable");
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                    left.push(wallet);
                }
            }
        }
        self.state.write().ledger.strand(round, left);
        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    // ---------- Allocations ----------

    pub fn set_allocation(
        &self,
        caller: Address,
        round: RoundId,
        participant: Address,
        allocation: Allocation,
    ) -> Result<(), LaunchpadError> {
        let _x = self.exec.lock();
        self.require_role(Role::Allocator, caller)?;
        self.state.write().ledger.set_allocation(round, participant, allocation)?;
        debug!(%round, %participant, max = allocation.max_contribution, tokens = allocation.token_amount, "allocation set");
        self.emit(LaunchpadEvent::AllocationSet { round, participant, allocation });
        Ok(())
    }

    pub fn remove_allocation(&self, caller: Address, round: RoundId, participant: Address) -> Result<(), LaunchpadError> {
        let _x = self.exec.lock();
        self.require_role(Role::Allocator, caller)?;
        self.state.write().ledger.remove_allocation(round, participant)?;
        debug!(%round, %participant, "allocation removed");
        self.emit(LaunchpadEvent::AllocationRemoved { round, participant });
        Ok(())
    }

    // ---------- Investments & refunds ----------

    /// `amount` must equal the participant's remaining allocation room exactly.
    /// Reaching the value target completes the round in the same call.
    pub fn contribute(&self, participant: Address, round: RoundId, amount: Balance) -> Result<(), LaunchpadError> {
        let _x = self.exec.lock();
        if self.state.read().paused {
            return Err(LaunchpadError::Paused);
        }
        if participant.is_zero() {
            return Err(LaunchpadError::ZeroAddress);
        }
        if amount == 0 {
            return Err(LaunchpadError::ZeroAmount);
        }
        let _g = self.enter(round)?;
        let now = self.now();

        let (first, completed, invested) = {
            let mut st = self.state.write();
            let r = st.ledger.round(round)?;
            r.expect_status(RoundStatus::Active)?;
            if now >= r.end {
                return Err(LaunchpadError::OutsideWindow { round, now });
            }
            let (target, invested, participants) = (r.target, r.invested, r.participants);
            let position = st.ledger.position(round, participant);
            if position == 0 && participants >= self.cfg.max_participants {
                return Err(LaunchpadError::RoundFull(round));
            }
            let ceiling = st
                .ledger
                .allocation(round, participant)
                .map(|a| a.max_contribution)
                .filter(|c| *c > 0)
                .ok_or(LaunchpadError::NoAllocation { round, participant })?;
            let room = ceiling.saturating_sub(position);
            if amount != room {
                return Err(LaunchpadError::InexactContribution { expected: room, got: amount });
            }
            let invested = invested.checked_add(amount).ok_or(LaunchpadError::MathOverflow)?;
            if invested > target {
                return Err(LaunchpadError::Oversubscribed { round, target });
            }

            let first = st.ledger.credit_position(round, participant, amount)?;
            let completed = invested == target;
            if completed {
                st.ledger.round_mut(round)?.transition(RoundStatus::Completed)?;
            }
            (first, completed, invested)
        };

        if let Err(e) = self.collab.value.transfer(participant, self.address, amount) {
            warn!(%round, %participant, error = %e, "value collection failed; contribution unwound");
            let mut st = self.state.write();
            if completed {
                st.ledger.restore_status(round, RoundStatus::Active)?;
            }
            st.ledger.revert_credit(round, participant, amount, first)?;
            return Err(e.into());
        }

        debug!(%round, %participant, amount, invested, "contribution accepted");
        self.emit(LaunchpadEvent::Contributed { round, participant, amount });
        if completed {
            info!(%round, invested, "round target reached");
            self.emit(LaunchpadEvent::RoundCompleted { round, invested });
        }
        Ok(())
    }

    /// Withdraw a position while the round is still Active.
    pub fn cancel_investment(&self, participant: Address, round: RoundId) -> Result<Balance, LaunchpadError> {
        let amount = self.refund(participant, round, RoundStatus::Active)?;
        debug!(%round, %participant, amount, "investment cancelled");
        self.emit(LaunchpadEvent::InvestmentCancelled { round, participant, amount });
        Ok(amount)
    }

    /// Reclaim a position from a Cancelled round. Succeeds at most once.
    pub fn claim_refund(&self, participant: Address, round: RoundId) -> Result<Balance, LaunchpadError> {
        let amount = self.refund(participant, round, RoundStatus::Cancelled)?;
        debug!(%round, %participant, amount, "refund claimed");
        self.emit(LaunchpadEvent::Refunded { round, participant, amount });
        Ok(amount)
    }

    fn refund(&self, participant: Address, round: RoundId, required: RoundStatus) -> Result<Balance, LaunchpadError> {
        let _x = self.exec.lock();
        let _g = self.enter(round)?;

        let amount = {
            let mut st = self.state.write();
            st.ledger.round(round)?.expect_status(required)?;
            st.ledger.debit_position(round, participant)?
        };

        if let Err(e) = self.collab.value.transfer(self.address, participant, amount) {
            warn!(%round, %participant, error = %e, "refund transfer failed; position restored");
            self.state.write().ledger.credit_position(round, participant, amount)?;
            return Err(e.into());
        }
        Ok(amount)
    }

    // ---------- Vesting ----------

    /// Manager only. Terminates one participant's grant; the unvested rest
    /// returns to the engine's free balance.
    pub fn revoke_vesting(&self, caller: Address, round: RoundId, participant: Address) -> Result<(Balance, Balance), LaunchpadError> {
        let _x = self.exec.lock();
        self.require_role(Role::Manager, caller)?;
        let wallet = self
            .state
            .read()
            .ledger
            .vesting_wallet(round, participant)
            .ok_or(LaunchpadError::NoVestingSchedule { round, participant })?;
        let (released, swept) = self.factory.revoke(self.address, wallet)?;
        info!(%round, %participant, %wallet, released, swept, "vesting revoked");
        self.emit(LaunchpadEvent::VestingRevoked { round, participant, released, swept });
        Ok((released, swept))
    }

    pub fn factory(&self) -> &VestingFactory {
        &self.factory
    }

    // ---------- Time-locked changes ----------

    pub fn schedule_upgrade(&self, caller: Address, implementation: Address) -> Result<(), LaunchpadError> {
        let _x = self.exec.lock();
        let now = self.now();
        let mut st = self.state.write();
        st.access.require(Role::Admin, caller)?;
        if implementation.is_zero() {
            return Err(LaunchpadError::ZeroAddress);
        }
        st.upgrade.schedule(implementation, now);
        drop(st);
        info!(%implementation, now, "upgrade scheduled");
        self.emit(LaunchpadEvent::UpgradeScheduled { implementation });
        Ok(())
    }

    pub fn upgrade_to(&self, caller: Address, implementation: Address) -> Result<(), LaunchpadError> {
        let _x = self.exec.lock();
        let now = self.now();
        let mut st = self.state.write();
        st.access.require(Role::Admin, caller)?;
        st.implementation = st.upgrade.authorize(&implementation, now)?;
        drop(st);
        info!(%implementation, "upgrade applied");
        self.emit(LaunchpadEvent::Upgraded { implementation });
        Ok(())
    }

    pub fn propose_emergency_operator(&self, caller: Address, operator: Address) -> Result<(), LaunchpadError> {
        let _x = self.exec.lock();
        let now = self.now();
        let mut st = self.state.write();
        st.access.require(Role::Admin, caller)?;
        if operator.is_zero() {
            return Err(LaunchpadError::ZeroAddress);
        }
        st.operator_change.schedule(operator, now);
        drop(st);
        info!(%operator, now, "emergency operator proposed");
        self.emit(LaunchpadEvent::OperatorProposed { operator });
        Ok(())
    }

    pub fn accept_emergency_operator(&self, caller: Address, operator: Address) -> Result<(), LaunchpadError> {
        let _x = self.exec.lock();
        let now = self.now();
        let mut st = self.state.write();
        st.access.require(Role::Admin, caller)?;
        st.emergency_operator = st.operator_change.authorize(&operator, now)?;
        drop(st);
        info!(%operator, "emergency operator changed");
        self.emit(LaunchpadEvent::OperatorChanged { operator });
        Ok(())
    }

    // ---------- Views ----------

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn round(&self, round: RoundId) -> Result<Round, LaunchpadError> {
        self.state.read().ledger.round(round).cloned()
    }

    pub fn rounds_len(&self) -> usize {
        self.state.read().ledger.len()
    }

    pub fn allocation(&self, round: RoundId, participant: Address) -> Option<Allocation> {
        self.state.read().ledger.allocation(round, participant).copied()
    }

    pub fn position(&self, round: RoundId, participant: Address) -> Balance {
        self.state.read().ledger.position(round, participant)
    }

    /// Active participants, in no particular order.
    pub fn participants(&self, round: RoundId) -> Result<Vec<Address>, LaunchpadError> {
        Ok(self.state.read().ledger.participants(round)?.to_vec())
    }

    /// Sum of all positions in the round.
    pub fn positions_sum(&self, round: RoundId) -> Balance {
        self.state.read().ledger.positions_sum(round)
    }

    pub fn vesting_schedule(&self, round: RoundId, participant: Address) -> Option<Address> {
        self.state.read().ledger.vesting_wallet(round, participant)
    }

    /// Locked wallets from an aborted finalization still awaiting reclaim.
    pub fn stranded_wallets(&self, round: RoundId) -> Vec<Address> {
        self.state.read().ledger.stranded_wallets(round).to_vec()
    }

        pub fn reserved_supply(&self) -> Balance {
        self.state.read().ledger.reserved_supply()
    }

    pub fn implementation(&self) -> Address {
        self.state.read().implementation
    }

    pub fn pending_upgrade(&self) -> Option<PendingRequest<Address>> {
        self.state.read().upgrade.pending().cloned()
    }

    pub fn emergency_operator(&self) -> Address {
        self.state.read().emergency_operator
    }

    pub fn pending_emergency_operator(&self) -> Option<PendingRequest<Address>> {
        self.state.read().operator_change.pending().cloned()
    }

    pub fn is_paused(&self) -> bool {
        self.state.read().paused
    }
}

/* ---------------------------------- TESTS ---------------------------------- */
