//! Governance-initiated transfer proposal types.

use serde::{Deserialize, Serialize};
use tradegov_common::Decimal;

use super::programs::AccountType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GovernanceTransferType {
    AllOrNothing,
    BestEffort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    /// Delivered once, at `deliver_on` unix seconds (zero for enactment).
    OneOff { deliver_on: i64 },
    Recurring { start_epoch: u64, end_epoch: Option<u64> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceTransfer {
    pub source_type: AccountType,
    pub source: String,
    pub destination_type: AccountType,
    pub destination: String,
    pub asset: String,
    pub transfer_type: GovernanceTransferType,
    pub amount: u128,
    pub fraction_of_balance: Decimal,
    pub kind: TransferKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransfer {
    pub changes: GovernanceTransfer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelTransfer {
    pub transfer_id: String,
}
