//! Engine event stream payloads (delivered over `tokio::sync::broadcast`).

use serde::{Deserialize, Serialize};

use crate::access::Role;
use crate::allocation::Allocation;
use crate::round::RoundParams;
use crate::{Address, Balance, RoundId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaunchpadEvent {
    RoundCreated { round: RoundId, params: RoundParams },
    RoundActivated { round: RoundId },
    RoundCompleted { round: RoundId, invested: Balance },
    RoundFinalized { round: RoundId, invested: Balance, distributed: Balance },
    RoundCancelled { round: RoundId, returned_tokens: Balance },
    AllocationSet { round: RoundId, participant: Address, allocation: Allocation },
    AllocationRemoved { round: RoundId, participant: Address },
    Contributed { round: RoundId, participant: Address, amount: Balance },
    InvestmentCancelled { round: RoundId, participant: Address, amount: Balance },
    Refunded { round: RoundId, participant: Address, amount: Balance },
    VestingDeployed { round: RoundId, participant: Address, wallet: Address, amount: Balance },
    VestingRevoked { round: RoundId, participant: Address, released: Balance, swept: Balance },
    Paused(bool),
    RoleChanged { who: Address, role: Role, grant: bool },
    UpgradeScheduled { implementation: Address },
    Upgraded { implementation: Address },
    OperatorProposed { operator: Address },
    OperatorChanged { operator: Address },
}
