use std::sync::Arc;
use std::time::Duration;

use aethernova_launchpad::memory::{ManualClock, MemoryBank, MemoryToken};
use aethernova_launchpad::{
    Address, Allocation, Collaborators, EngineConfig, InvestmentManager, LaunchpadError, LaunchpadEvent,
    LinearSchedule, Role, RoundParams, RoundStatus,
};

const ENGINE: u64 = 0xE0;
const ADMIN: u64 = 0xAD;
const TREASURY: u64 = 0x7E;
const GOVERNANCE: u64 = 0x60;
const PARTICIPANT: u64 = 0x01;

fn a(x: u64) -> Address {
    Address::from_low_u64(x)
}

struct Env {
    token: Arc<MemoryToken>,
    bank: Arc<MemoryBank>,
    clock: Arc<ManualClock>,
    engine: Arc<InvestmentManager>,
}

fn env() -> Env {
    let token = Arc::new(MemoryToken::new());
    let bank = Arc::new(MemoryBank::new());
    let clock = Arc::new(ManualClock::new(0));
    let cfg = EngineConfig {
        min_round_duration: Duration::from_secs(1),
        max_round_duration: Duration::from_secs(30 * 24 * 3600),
        ..EngineConfig::default()
    };
    let engine = InvestmentManager::new(
        cfg,
        a(ENGINE),
        a(ADMIN),
        Address::ZERO,
        Collaborators {
            token: token.clone(),
            value: bank.clone(),
            clock: clock.clone(),
            treasury: a(TREASURY),
        },
    )
    .unwrap();
    for role in [Role::Authorizer, Role::Allocator, Role::Manager] {
        engine.grant_role(a(ADMIN), role, a(GOVERNANCE)).unwrap();
    }
    token.mint(a(ENGINE), 1_000);
    bank.mint(a(PARTICIPANT), 500);
    Env { token, bank, clock, engine }
}

fn round_params(target: u128, tokens: u128) -> RoundParams {
    RoundParams {
        start: 0,
        duration: 7,
        value_target: target,
        token_allocation: tokens,
        vesting_cliff: 0,
        vesting_duration: 100,
    }
}

#[test]
fn completed_round_finalizes_into_vesting() {
    let e = env();
    let mut events = e.engine.subscribe();
    let id = e.engine.create_round(a(GOVERNANCE), round_params(100, 1_000)).unwrap();
    e.engine
        .set_allocation(
            a(GOVERNANCE),
            id,
            a(PARTICIPANT),
            Allocation { max_contribution: 100, token_amount: 1_000 },
        )
        .unwrap();
    e.engine.activate_round(id).unwrap();
    e.engine.contribute(a(PARTICIPANT), id, 100).unwrap();
    assert_eq!(e.engine.round(id).unwrap().status, RoundStatus::Completed);

    e.engine.finalize_round(a(GOVERNANCE), id).unwrap();
    let round = e.engine.round(id).unwrap();
    assert_eq!(round.status, RoundStatus::Finalized);
    assert_eq!(round.distributed, 1_000);
    assert_eq!(e.bank.balance(a(TREASURY)), 100);

    let wallet_addr = e.engine.vesting_schedule(id, a(PARTICIPANT)).unwrap();
    assert_eq!(e.token.balance(wallet_addr), 1_000);
    let wallet = e.engine.factory().wallet(wallet_addr).unwrap();
    assert_eq!(wallet.beneficiary(), a(PARTICIPANT));
    assert_eq!(wallet.schedule(), LinearSchedule { start: 0, duration: 100 });

    // Anyone may trigger a release; tokens go to the beneficiary.
    e.clock.set(50);
    assert_eq!(e.engine.factory().release(wallet_addr).unwrap(), 500);
    assert_eq!(e.token.balance(a(PARTICIPANT)), 500);

    let kinds: Vec<LaunchpadEvent> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert!(kinds.iter().any(|ev| matches!(ev, LaunchpadEvent::RoundCompleted { .. })));
    assert!(kinds
        .iter()
        .any(|ev| matches!(ev, LaunchpadEvent::VestingDeployed { amount: 1_000, .. })));
    assert!(matches!(
        kinds.last(),
        Some(LaunchpadEvent::RoundFinalized { invested: 100, distributed: 1_000, .. })
    ));
}

#[test]
fn cancelled_round_refunds_once() {
    let e = env();
    let id = e.engine.create_round(a(GOVERNANCE), round_params(50, 100)).unwrap();
    e.engine
        .set_allocation(
            a(GOVERNANCE),
            id,
            a(PARTICIPANT),
            Allocation { max_contribution: 10, token_amount: 100 },
        )
        .unwrap();
    e.engine.activate_round(id).unwrap();
    e.engine.contribute(a(PARTICIPANT), id, 10).unwrap();
    assert_eq!(e.bank.balance(a(PARTICIPANT)), 490);

    e.engine.cancel_round(a(GOVERNANCE), id).unwrap();
    assert_eq!(e.engine.reserved_supply(), 0);
    assert_eq!(e.token.balance(a(TREASURY)), 100);

    assert_eq!(e.engine.claim_refund(a(PARTICIPANT), id).unwrap(), 10);
    assert_eq!(e.bank.balance(a(PARTICIPANT)), 500);
    assert!(matches!(
        e.engine.claim_refund(a(PARTICIPANT), id),
        Err(LaunchpadError::NoPosition { .. })
    ));
}

#[test]
fn partial_contribution_is_rejected() {
    let e = env();
    let id = e.engine.create_round(a(GOVERNANCE), round_params(100, 1_000)).unwrap();
    e.engine
        .set_allocation(
            a(GOVERNANCE),
            id,
            a(PARTICIPANT),
            Allocation { max_contribution: 100, token_amount: 1_000 },
        )
        .unwrap();
    e.engine.activate_round(id).unwrap();
    let err = e.engine.contribute(a(PARTICIPANT), id, 99).unwrap_err();
    assert!(matches!(err, LaunchpadError::InexactContribution { expected: 100, got: 99 }));
    assert_eq!(e.engine.position(id, a(PARTICIPANT)), 0);
    assert_eq!(e.bank.balance(a(PARTICIPANT)), 500);
}

#[test]
fn leftover_tokens_return_to_free_pool_on_finalize() {
    let e = env();
    let id = e.engine.create_round(a(GOVERNANCE), round_params(100, 800)).unwrap();
    e.engine
        .set_allocation(
            a(GOVERNANCE),
            id,
            a(PARTICIPANT),
            Allocation { max_contribution: 100, token_amount: 300 },
        )
        .unwrap();
    e.engine.activate_round(id).unwrap();
    e.engine.contribute(a(PARTICIPANT), id, 100).unwrap();
    e.engine.finalize_round(a(GOVERNANCE), id).unwrap();
    assert_eq!(e.engine.reserved_supply(), 0);
    assert_eq!(e.token.balance(a(ENGINE)), 700);

    // The freed supply backs the next round.
    e.clock.set(10);
    let mut next = round_params(10, 700);
    next.start = 10;
    e.engine.create_round(a(GOVERNANCE), next).unwrap();
    assert_eq!(e.engine.reserved_supply(), 700);
}
