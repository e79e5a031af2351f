//! The three stateful cores of the bridging engine: the L1 log scanner, the
//! per-deposit state machine, and the settlement poller. Each is generic
//! over the [`bridge_chain::L1Chain`]/[`bridge_chain::L2Rpc`] traits and a
//! [`bridge_store::TrackingStore`] implementation, so the orchestrator can
//! wire live `alloy`/`reqwest`/MongoDB clients in production and
//! in-process doubles in tests.

mod deposit;
mod errors;
mod scanner;
mod settlement;

pub use deposit::DepositStateMachine;
pub use errors::{EngineError, FatalError};
pub use scanner::L1Scanner;
pub use settlement::SettlementPoller;
