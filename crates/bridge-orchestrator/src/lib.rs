//! Wires [`bridge_engine`]'s three stateful cores into the two serviceable
//! daemon roles described by the bridging engine's configuration: a
//! deposit service (`L1Scanner` + `DepositStateMachine`) and a settlement
//! service (`SettlementPoller`). Owns admin-player installation, the
//! historical-sweep-then-tail-poll sequencing, and cooperative shutdown.

use bridge_chain::{L1Chain, L2Rpc, create_player_cmd_buf};
use bridge_config::Config;
use bridge_engine::{DepositStateMachine, EngineError, FatalError, L1Scanner, SettlementPoller};
use bridge_store::TrackingStore;
use bridge_types::{DepositRecord, SettlementRecord};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Attempts to install the L2 admin player via `CREATE_PLAYER` at nonce 0.
/// An "already exists" response from a prior run is expected and not an
/// error; any other failure is logged and does not block startup, since
/// admin-player installation is not in the fatal-abort set of §4.4/§7.
pub async fn install_admin_player(l2: &impl L2Rpc, admin_key: &str) {
    let cmd_buf = create_player_cmd_buf();
    match l2.send_transaction(&cmd_buf, admin_key).await {
        Ok(receipt) if receipt.success => info!("admin player installed"),
        Ok(_) => info!("admin player already installed, continuing"),
        Err(e) if e.to_string().to_lowercase().contains("already") => {
            info!("admin player already installed, continuing");
        }
        Err(e) => warn!(error = %e, "admin player installation failed, continuing anyway"),
    }
}

/// Cooperative shutdown handle: stops scheduling new rounds and waits for
/// the current one to finish. The in-flight submission inside that round
/// is never cancelled, matching §5's cancellation model.
pub struct ShutdownHandle {
    sender: Option<tokio::sync::oneshot::Sender<()>>,
}

impl ShutdownHandle {
    /// Signals the running orchestrator to stop after its current round.
    pub fn shutdown(mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(());
        }
    }
}

fn shutdown_pair() -> (ShutdownHandle, tokio::sync::oneshot::Receiver<()>) {
    let (tx, rx) = tokio::sync::oneshot::channel();
    (ShutdownHandle { sender: Some(tx) }, rx)
}

/// Runs the deposit daemon: installs the admin player, performs one
/// historical sweep, then runs the tail-poll loop until shutdown.
pub struct DepositOrchestrator<L1, L2, S> {
    config: Config,
    l2: Arc<L2>,
    scanner: Arc<L1Scanner<L1, L2, S>>,
}

impl<L1, L2, S> DepositOrchestrator<L1, L2, S>
where
    L1: L1Chain + 'static,
    L2: L2Rpc + 'static,
    S: TrackingStore<DepositRecord> + 'static,
{
    /// Builds a deposit orchestrator over the given clients and store.
    pub fn new(config: Config, l1: Arc<L1>, l2: Arc<L2>, store: Arc<S>) -> Self {
        let state_machine = Arc::new(DepositStateMachine::new(l1.clone(), l2.clone(), store, config.clone()));
        let scanner = Arc::new(L1Scanner::new(l1, state_machine));
        Self { config, l2, scanner }
    }

    /// Runs the deposit service to completion: admin player install,
    /// historical sweep, then the tail-poll loop until `shutdown` resolves
    /// or a fatal error aborts the process.
    pub async fn run(self) -> (ShutdownHandle, tokio::task::JoinHandle<Result<(), FatalError>>) {
        let (handle, shutdown_rx) = shutdown_pair();
        let join = tokio::spawn(async move {
            install_admin_player(self.l2.as_ref(), &self.config.server_admin_key).await;

            match self.scanner.historical_sweep(&self.config).await {
                Ok(()) => {}
                Err(EngineError::Fatal(fatal)) => return Err(fatal),
                // Non-fatal sweep failures (head unreachable, transport
                // errors) are logged here and otherwise swallowed: the
                // tail poller re-reads the current head on its own next
                // tick and resumes forward from wherever `lastProcessed`
                // was left.
                Err(e) => warn!(error = %e, "historical sweep did not complete, falling through to tail poll"),
            }

            self.scanner.run_tail_poll_loop(shutdown_rx).await
        });
        (handle, join)
    }
}

/// Runs the settlement daemon: periodic `SettlementPoller` rounds every
/// `settlement_retry_delay_secs`, until shutdown.
pub struct SettlementOrchestrator<L1, L2, S> {
    config: Config,
    poller: Arc<SettlementPoller<L1, L2, S>>,
}

impl<L1, L2, S> SettlementOrchestrator<L1, L2, S>
where
    L1: L1Chain + 'static,
    L2: L2Rpc + 'static,
    S: TrackingStore<SettlementRecord> + 'static,
{
    /// Builds a settlement orchestrator over the given clients and store.
    pub fn new(config: Config, l1: Arc<L1>, l2: Arc<L2>, store: Arc<S>) -> Self {
        let poller = Arc::new(SettlementPoller::new(l1, l2, store));
        Self { config, poller }
    }

    /// Runs the settlement service to completion: repeated poll rounds at
    /// the configured fixed delay, until `shutdown` resolves or a fatal
    /// error aborts the process.
    pub async fn run(self) -> (ShutdownHandle, tokio::task::JoinHandle<Result<(), FatalError>>) {
        let (handle, mut shutdown_rx) = shutdown_pair();
        let delay = Duration::from_secs(self.config.settlement_retry_delay_secs);
        let join = tokio::spawn(async move {
            let mut interval = tokio::time::interval(delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match self.poller.poll_once().await {
                            Ok(()) => {}
                            Err(EngineError::Fatal(fatal)) => return Err(fatal),
                            Err(e) => warn!(error = %e, "settlement round failed, retrying next tick"),
                        }
                    }
                    _ = &mut shutdown_rx => {
                        info!("shutdown requested, stopping settlement loop");
                        return Ok(());
                    }
                }
            }
        });
        (handle, join)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256};
    use async_trait::async_trait;
    use bridge_chain::{AllTokensEntry, Bundle, DepositReceipt, L1Error, L2Error, SettlementSubmission};
    use bridge_store::MemoryStore;
    use bridge_types::TopUpEvent;
    use std::sync::Mutex as StdMutex;

    struct FakeL1;

    #[async_trait]
    impl L1Chain for FakeL1 {
        async fn head_block(&self) -> Result<u64, L1Error> {
            Ok(0)
        }
        async fn get_topup_logs(&self, _: u64, _: u64) -> Result<Vec<TopUpEvent>, L1Error> {
            Ok(vec![])
        }
        async fn all_tokens(&self) -> Result<Vec<AllTokensEntry>, L1Error> {
            Ok(vec![])
        }
        async fn submit_settlement(&self, _: SettlementSubmission) -> Result<B256, L1Error> {
            unimplemented!()
        }
        async fn await_receipt(&self, _: B256) -> Result<bool, L1Error> {
            unimplemented!()
        }
    }

    #[derive(Default)]
    struct FakeL2 {
        install_calls: StdMutex<u32>,
        fail_with_already_exists: bool,
    }

    #[async_trait]
    impl bridge_chain::NonceSource for FakeL2 {
        async fn next_nonce(&self) -> Result<u64, L2Error> {
            Ok(1)
        }
    }

    #[async_trait]
    impl L2Rpc for FakeL2 {
        async fn send_transaction(&self, _: &[u64], _: &str) -> Result<DepositReceipt, L2Error> {
            *self.install_calls.lock().unwrap() += 1;
            if self.fail_with_already_exists {
                return Err(L2Error::Rpc("player already exists".into()));
            }
            Ok(DepositReceipt { success: true, nonce: 0 })
        }
        async fn deposit(&self, _: u64, _: u64, _: u64, _: u64, _: u64) -> Result<DepositReceipt, L2Error> {
            unimplemented!()
        }
        async fn check_deposit(
            &self,
            _: u64,
            _: u64,
            _: u64,
            _: u64,
            _: u64,
        ) -> Result<Option<serde_json::Value>, L2Error> {
            unimplemented!()
        }
        async fn ready_bundles(&self) -> Result<Vec<Bundle>, L2Error> {
            Ok(vec![])
        }
    }

    fn config() -> Config {
        Config::from_toml_str(
            r#"
            rpc_provider = "http://localhost:8545"
            server_admin_key = "admin"
            settlement_contract_address = "0x0000000000000000000000000000000000000001"
            mongo_uri = "mongodb://localhost:27017"
            withdraw_opcode = 3
            deposit_opcode = 2
            mode = "deposit"
            "#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn installs_admin_player_once() {
        let l2 = FakeL2::default();
        install_admin_player(&l2, "admin").await;
        assert_eq!(*l2.install_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn already_exists_install_error_is_not_fatal() {
        let l2 = FakeL2 { fail_with_already_exists: true, ..Default::default() };
        install_admin_player(&l2, "admin").await;
        assert_eq!(*l2.install_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn deposit_orchestrator_shuts_down_cleanly() {
        let l1 = Arc::new(FakeL1);
        let l2 = Arc::new(FakeL2::default());
        let store = Arc::new(MemoryStore::<DepositRecord>::new());
        let orchestrator = DepositOrchestrator::new(config(), l1, l2, store);

        let (handle, join) = orchestrator.run().await;
        // Give the spawned task a chance to clear the historical sweep and
        // enter the tail-poll loop before requesting shutdown.
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.shutdown();
        let result = join.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn settlement_orchestrator_shuts_down_cleanly() {
        let l1 = Arc::new(FakeL1);
        let l2 = Arc::new(FakeL2::default());
        let store = Arc::new(MemoryStore::<SettlementRecord>::new());
        let mut cfg = config();
        cfg.settlement_retry_delay_secs = 3600;
        let orchestrator = SettlementOrchestrator::new(cfg, l1, l2, store);

        let (handle, join) = orchestrator.run().await;
        handle.shutdown();
        let result = join.await.unwrap();
        assert!(result.is_ok());
    }
}
