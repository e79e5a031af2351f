use alloy_primitives::{B256, TxHash};
use serde::{Deserialize, Serialize};

/// Opaque L2-assigned identifier for a proof bundle. Bundles are processed
/// in strictly increasing `TaskId` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Settlement lifecycle of a [`SettlementRecord`].
///
/// `Unsubmitted -> Submitted -> (Confirmed | Failed)`, with
/// `Failed -> Submitted` permitted on retry. `Confirmed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SettlementStatus {
    /// Not yet submitted to the L1 settlement contract.
    Unsubmitted,
    /// Submitted; awaiting receipt.
    Submitted,
    /// Included and succeeded on L1. Terminal.
    Confirmed,
    /// Submitted but reverted; eligible for retry.
    Failed,
}

/// One record per L2 proof bundle, keyed by [`TaskId`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRecord {
    /// Primary key.
    pub task_id: TaskId,
    /// Previous state root, derived from the proof's instance array.
    pub merkle_root: B256,
    /// L1 transaction hash once submitted.
    pub settle_tx_hash: Option<TxHash>,
    /// Current lifecycle state.
    pub settle_status: SettlementStatus,
    /// Ordered withdraw payload chunks.
    pub withdraw_array: Vec<B256>,
}

impl SettlementRecord {
    /// Builds a fresh, unsubmitted record for a newly observed bundle.
    pub fn new_unsubmitted(task_id: TaskId, merkle_root: B256, withdraw_array: Vec<B256>) -> Self {
        Self {
            task_id,
            merkle_root,
            settle_tx_hash: None,
            settle_status: SettlementStatus::Unsubmitted,
            withdraw_array,
        }
    }
}
