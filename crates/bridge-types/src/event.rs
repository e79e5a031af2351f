use alloy_primitives::{Address, TxHash, U256};

/// A decoded L1 `TopUp(address l1token, address user, uint256 pid_1, uint256
/// pid_2, uint256 amount)` event, plus the transaction hash it was observed
/// in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopUpEvent {
    /// Hash of the L1 transaction that emitted this event.
    pub tx_hash: TxHash,
    /// The L1 token contract credited.
    pub l1_token: Address,
    /// The beneficiary address on L1.
    pub address: Address,
    /// First half of the L2 player identity.
    pub pid_1: u64,
    /// Second half of the L2 player identity.
    pub pid_2: u64,
    /// Raw wei amount from the event, prior to precision conversion.
    pub amount_wei: U256,
}
