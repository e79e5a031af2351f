use crate::L2Error;
use async_trait::async_trait;
use backon::{ConstantBuilder, Retryable};
use bridge_types::{Opcode, TaskId, pack_command_header};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Receipt returned by `deposit`/`sendTransaction`. Only the success flag
/// and echoed nonce matter to the state machine; anything else the L2
/// application returns is opaque here.
#[derive(Debug, Clone, Deserialize)]
pub struct DepositReceipt {
    /// Whether the L2 application accepted the command.
    pub success: bool,
    /// The nonce the command was submitted with.
    pub nonce: u64,
}

/// One task bundle as returned by the L2 application's bundle query.
#[derive(Debug, Clone, Deserialize)]
pub struct Bundle {
    /// Opaque L2-assigned task identifier.
    pub task_id: TaskId,
    /// Previous state root, hex-encoded.
    pub merkle_root: String,
    /// Ordered withdraw payload chunks, hex-encoded.
    pub withdraw_array: Vec<String>,
    /// Opaque transaction data blob, hex-encoded.
    pub tx_data: String,
    /// Serialized proof, hex-encoded.
    pub proof_arr: String,
    /// Serialized verifier instance array, hex-encoded.
    pub verify_instance_arr: String,
    /// Auxiliary data, hex-encoded.
    pub aux_arr: String,
    /// Raw proof instance words, hex-encoded.
    pub inst_arr: String,
}

/// Monotonic nonce oracle for the admin identity. Treated as advisory: a
/// stale nonce causes submission to fail, handled by the caller's retry
/// policy rather than here.
#[async_trait]
pub trait NonceSource: Send + Sync {
    /// Fetches the next nonce the L2 RPC will accept for the admin
    /// identity's next submitted command.
    async fn next_nonce(&self) -> Result<u64, L2Error>;
}

/// The L2 application RPC surface the bridging engine depends on.
#[async_trait]
pub trait L2Rpc: NonceSource {
    /// Submits a raw command buffer signed by the admin identity.
    async fn send_transaction(&self, cmd_buf: &[u64], admin_key: &str) -> Result<DepositReceipt, L2Error>;

    /// Submits a deposit command for `(pid_1, pid_2, token_index, amount)`
    /// at `nonce`.
    async fn deposit(
        &self,
        nonce: u64,
        pid_1: u64,
        pid_2: u64,
        token_index: u64,
        amount: u64,
    ) -> Result<DepositReceipt, L2Error>;

    /// Checks whether a deposit at `nonce` was credited; `Ok(None)` means
    /// not found (submission never landed or was rejected).
    async fn check_deposit(
        &self,
        nonce: u64,
        pid_1: u64,
        pid_2: u64,
        token_index: u64,
        amount: u64,
    ) -> Result<Option<serde_json::Value>, L2Error>;

    /// Fetches the current set of ready-to-settle task bundles.
    async fn ready_bundles(&self) -> Result<Vec<Bundle>, L2Error>;
}

/// Bounded retry policy shared by every L2 RPC call site: 3 attempts, 2
/// seconds apart.
pub async fn with_retry<T, F, Fut>(op: F) -> Result<T, L2Error>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, L2Error>>,
{
    op.retry(ConstantBuilder::default().with_delay(Duration::from_secs(2)).with_max_times(3))
        .await
}

/// `reqwest`-backed [`L2Rpc`] implementation over the L2 application's JSON
/// HTTP RPC.
#[derive(Debug, Clone)]
pub struct ReqwestL2Rpc {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestL2Rpc {
    /// Connects to `base_url` (e.g. `http://localhost:3000`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, L2Error> {
        let response = self
            .client
            .post(format!("{}/{path}", self.base_url))
            .json(body)
            .send()
            .await?
            .error_for_status()
            .map_err(L2Error::Transport)?;
        response.json::<R>().await.map_err(|e| L2Error::Decode(e.to_string()))
    }
}

#[async_trait]
impl NonceSource for ReqwestL2Rpc {
    async fn next_nonce(&self) -> Result<u64, L2Error> {
        #[derive(Deserialize)]
        struct NonceResponse {
            nonce: u64,
        }
        let resp: NonceResponse = self.post("getNonce", &serde_json::json!({})).await?;
        Ok(resp.nonce)
    }
}

#[async_trait]
impl L2Rpc for ReqwestL2Rpc {
    async fn send_transaction(&self, cmd_buf: &[u64], admin_key: &str) -> Result<DepositReceipt, L2Error> {
        self.post("sendTransaction", &serde_json::json!({ "cmdBuf": cmd_buf, "adminKey": admin_key }))
            .await
    }

    async fn deposit(
        &self,
        nonce: u64,
        pid_1: u64,
        pid_2: u64,
        token_index: u64,
        amount: u64,
    ) -> Result<DepositReceipt, L2Error> {
        self.post(
            "deposit",
            &serde_json::json!({
                "nonce": nonce,
                "pid_1": pid_1,
                "pid_2": pid_2,
                "tokenIndex": token_index,
                "amount": amount,
            }),
        )
        .await
    }

    async fn check_deposit(
        &self,
        nonce: u64,
        pid_1: u64,
        pid_2: u64,
        token_index: u64,
        amount: u64,
    ) -> Result<Option<serde_json::Value>, L2Error> {
        #[derive(Deserialize)]
        struct CheckResponse {
            data: Option<serde_json::Value>,
        }
        let resp: CheckResponse = self
            .post(
                "checkDeposit",
                &serde_json::json!({
                    "nonce": nonce,
                    "pid_1": pid_1,
                    "pid_2": pid_2,
                    "tokenIndex": token_index,
                    "amount": amount,
                }),
            )
            .await?;
        Ok(resp.data)
    }

    async fn ready_bundles(&self) -> Result<Vec<Bundle>, L2Error> {
        self.post("bundles", &serde_json::json!({})).await
    }
}

/// Builds the `cmdBuf` for installing the admin player: `CREATE_PLAYER` at
/// nonce 0 with no parameters.
pub fn create_player_cmd_buf() -> [u64; 1] {
    [pack_command_header(0, 0, Opcode::CreatePlayer)]
}
