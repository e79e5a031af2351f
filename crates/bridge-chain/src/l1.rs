use crate::L1Error;
use alloy_network::EthereumWallet;
use alloy_primitives::{Address, B256, Bytes, keccak256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder, RootProvider};
use alloy_rpc_types_eth::Filter;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{SolEvent, sol};
use async_trait::async_trait;
use bridge_types::TopUpEvent;
use std::str::FromStr;
use tracing::warn;
use url::Url;

sol! {
    #[derive(Debug)]
    event TopUp(address l1token, address user, uint256 pid_1, uint256 pid_2, uint256 amount);

    #[derive(Debug)]
    struct TokenEntry {
        address token_uid;
    }

    #[sol(rpc)]
    interface IBridgeSettlement {
        function allTokens() external view returns (TokenEntry[] memory);
        function settle(
            bytes calldata txData,
            bytes calldata proofArr,
            bytes calldata verifyInstanceArr,
            bytes calldata auxArr,
            bytes calldata instArr
        ) external returns (bytes32);
    }
}

/// One entry of the settlement contract's token list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllTokensEntry {
    /// L1 address of the token contract.
    pub token_uid: Address,
}

/// The raw byte payloads a settlement submission is built from, per the
/// bridging engine specification's external interfaces section.
#[derive(Debug, Clone)]
pub struct SettlementSubmission {
    /// Opaque transaction data blob.
    pub tx_data: Bytes,
    /// Serialized proof.
    pub proof_arr: Bytes,
    /// Serialized verifier instance array.
    pub verify_instance_arr: Bytes,
    /// Auxiliary data.
    pub aux_arr: Bytes,
    /// Raw proof instance words (see the 256-bit extraction rule in
    /// `bridge-engine`).
    pub inst_arr: Bytes,
}

/// The L1 chain surface the bridging engine depends on: historical/tail log
/// scanning for `TopUp`, the settlement contract's token list, and
/// settlement submission plus receipt awaiting.
#[async_trait]
pub trait L1Chain: Send + Sync {
    /// Current L1 head block number.
    async fn head_block(&self) -> Result<u64, L1Error>;

    /// Fetches `TopUp` logs in the inclusive range `[from, to]`, ordered by
    /// block number then log index.
    async fn get_topup_logs(&self, from: u64, to: u64) -> Result<Vec<TopUpEvent>, L1Error>;

    /// Reads the settlement contract's registered token list.
    async fn all_tokens(&self) -> Result<Vec<AllTokensEntry>, L1Error>;

    /// Submits a settlement transaction, returning its L1 transaction hash.
    async fn submit_settlement(&self, submission: SettlementSubmission) -> Result<B256, L1Error>;

    /// Awaits the receipt for a previously submitted transaction, returning
    /// `true` on success and `false` on revert.
    async fn await_receipt(&self, tx_hash: B256) -> Result<bool, L1Error>;
}

/// `alloy`-backed [`L1Chain`] implementation over a plain HTTP JSON-RPC
/// endpoint.
#[derive(Clone)]
pub struct AlloyL1Chain {
    provider: DynProvider,
    contract: Address,
}

impl AlloyL1Chain {
    /// Connects to `rpc_url` and targets `contract` as the settlement
    /// contract address. Read-only: sufficient for log scanning and token
    /// list reads, but `submit_settlement` will fail since there is no
    /// signer attached.
    pub fn connect(rpc_url: &str, contract: Address) -> Result<Self, L1Error> {
        let url = Url::from_str(rpc_url).map_err(|e| L1Error::Transport(e.to_string()))?;
        let provider: RootProvider = ProviderBuilder::new().connect_http(url);
        Ok(Self { provider: provider.erased(), contract })
    }

    /// Connects to `rpc_url` with a local wallet signer derived from
    /// `private_key`, for the settlement service's write path.
    pub fn connect_with_signer(rpc_url: &str, contract: Address, private_key: &str) -> Result<Self, L1Error> {
        let url = Url::from_str(rpc_url).map_err(|e| L1Error::Transport(e.to_string()))?;
        let signer: PrivateKeySigner =
            private_key.parse().map_err(|e| L1Error::Transport(format!("invalid settler private key: {e}")))?;
        let wallet = EthereumWallet::from(signer);
        let provider = ProviderBuilder::new().wallet(wallet).connect_http(url);
        Ok(Self { provider: provider.erased(), contract })
    }
}

impl std::fmt::Debug for AlloyL1Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlloyL1Chain").field("contract", &self.contract).finish_non_exhaustive()
    }
}

#[async_trait]
impl L1Chain for AlloyL1Chain {
    async fn head_block(&self) -> Result<u64, L1Error> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| L1Error::Transport(e.to_string()))
    }

    async fn get_topup_logs(&self, from: u64, to: u64) -> Result<Vec<TopUpEvent>, L1Error> {
        let topic = keccak256(TopUp::SIGNATURE.as_bytes());
        debug_assert_eq!(topic, TopUp::SIGNATURE_HASH);
        let filter = Filter::new()
            .address(self.contract)
            .event_signature(TopUp::SIGNATURE_HASH)
            .from_block(from)
            .to_block(to);

        let logs = self.provider.get_logs(&filter).await.map_err(|e| L1Error::GetLogs {
            from,
            to,
            source: Box::new(L1Error::Transport(e.to_string())),
        })?;

        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            let tx_hash = log.transaction_hash.unwrap_or_default();
            let decoded = match log.log_decode::<TopUp>() {
                Ok(decoded) => decoded,
                Err(e) => {
                    let err = L1Error::DecodeEvent { tx_hash: tx_hash.to_string(), reason: e.to_string() };
                    warn!(error = %err, "skipping log");
                    continue;
                }
            };
            let inner = decoded.inner.data;
            let pid_1 = match u64::try_from(inner.pid_1) {
                Ok(v) => v,
                Err(_) => {
                    let err = L1Error::DecodeEvent {
                        tx_hash: tx_hash.to_string(),
                        reason: "pid_1 does not fit in u64".into(),
                    };
                    warn!(error = %err, "skipping log");
                    continue;
                }
            };
            let pid_2 = match u64::try_from(inner.pid_2) {
                Ok(v) => v,
                Err(_) => {
                    let err = L1Error::DecodeEvent {
                        tx_hash: tx_hash.to_string(),
                        reason: "pid_2 does not fit in u64".into(),
                    };
                    warn!(error = %err, "skipping log");
                    continue;
                }
            };
            events.push(TopUpEvent {
                tx_hash,
                l1_token: inner.l1token,
                address: inner.user,
                pid_1,
                pid_2,
                amount_wei: inner.amount,
            });
        }
        Ok(events)
    }

    async fn all_tokens(&self) -> Result<Vec<AllTokensEntry>, L1Error> {
        let contract = IBridgeSettlement::new(self.contract, self.provider.clone());
        let tokens = contract
            .allTokens()
            .call()
            .await
            .map_err(|e| L1Error::TokenList(e.to_string()))?;
        Ok(tokens.into_iter().map(|t| AllTokensEntry { token_uid: t.token_uid }).collect())
    }

    async fn submit_settlement(&self, submission: SettlementSubmission) -> Result<B256, L1Error> {
        let contract = IBridgeSettlement::new(self.contract, self.provider.clone());
        let pending = contract
            .settle(
                submission.tx_data,
                submission.proof_arr,
                submission.verify_instance_arr,
                submission.aux_arr,
                submission.inst_arr,
            )
            .send()
            .await
            .map_err(|e| L1Error::Settlement(e.to_string()))?;
        Ok(*pending.tx_hash())
    }

    async fn await_receipt(&self, tx_hash: B256) -> Result<bool, L1Error> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| L1Error::Settlement(e.to_string()))?
            .ok_or_else(|| L1Error::Settlement(format!("receipt not found for {tx_hash}")))?;
        Ok(receipt.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topup_topic_matches_signature_hash() {
        assert_eq!(keccak256(TopUp::SIGNATURE.as_bytes()), TopUp::SIGNATURE_HASH);
    }
}
