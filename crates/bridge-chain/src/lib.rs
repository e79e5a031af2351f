//! Clients for the two external chains the bridging engine talks to: the L1
//! JSON-RPC provider (events, token list, settlement submission) and the L2
//! application RPC (nonces, deposit commands, bundle queries).
//!
//! Both surfaces are exposed as traits so the engine crate can be tested
//! against hand-written `async_trait` doubles instead of live chains.

mod errors;
mod l1;
mod l2;

pub use errors::{L1Error, L2Error};
pub use l1::{AllTokensEntry, AlloyL1Chain, L1Chain, SettlementSubmission};
pub use l2::{Bundle, DepositReceipt, L2Rpc, NonceSource, ReqwestL2Rpc, create_player_cmd_buf, with_retry};
