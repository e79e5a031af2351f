//! Shared types for the L1<->L2 bridging engine: the two durable record
//! kinds tracked by the bridge (`DepositRecord`, `SettlementRecord`), the
//! decoded `TopUp` event, and the opcodes used to build L2 command buffers.

mod deposit;
mod event;
mod opcode;
mod settlement;

pub use deposit::{DepositRecord, DepositState};
pub use event::TopUpEvent;
pub use opcode::{Opcode, TOPUP_EVENT_SIGNATURE};
pub use settlement::{SettlementRecord, SettlementStatus, TaskId};

use alloy_primitives::{Address, B256};

/// An L1 transaction hash, the primary key of [`DepositRecord`].
pub type TxHash = B256;

/// An L1 or L2 account address.
pub type L1Address = Address;
