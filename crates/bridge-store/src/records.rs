//! [`TrackedRecord`] impls binding the two concrete record kinds to the
//! generic store.

use crate::TrackedRecord;
use alloy_primitives::B256;
use bridge_types::{DepositRecord, DepositState, SettlementRecord, SettlementStatus, TaskId};

impl TrackedRecord for DepositRecord {
    type Key = B256;
    type State = DepositState;

    fn key(&self) -> Self::Key {
        self.tx_hash
    }

    fn state(&self) -> Self::State {
        self.state
    }

    fn set_state(&mut self, state: Self::State) {
        self.state = state;
    }
}

impl TrackedRecord for SettlementRecord {
    type Key = TaskId;
    type State = SettlementStatus;

    fn key(&self) -> Self::Key {
        self.task_id
    }

    fn state(&self) -> Self::State {
        self.settle_status
    }

    fn set_state(&mut self, state: Self::State) {
        self.settle_status = state;
    }
}
