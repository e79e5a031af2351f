use crate::deposit::DepositStateMachine;
use crate::errors::{EngineError, FatalError};
use bridge_chain::{L1Chain, L2Rpc};
use bridge_config::Config;
use bridge_store::TrackingStore;
use bridge_types::{DepositRecord, TopUpEvent};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{info, warn};

const MAX_BATCH_BLOCKS: u64 = 25_000;
const DEFAULT_LOOKBACK_BLOCKS: u64 = 200_000;
const TAIL_POLL_INTERVAL: Duration = Duration::from_secs(30);
const TAIL_POLL_RETRIES: usize = 3;
const TAIL_POLL_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Paginated historical sweep plus periodic tail poll over L1 `TopUp` logs,
/// handing each decoded event to a [`DepositStateMachine`] in block order.
///
/// `lastProcessed` only advances past a block range once every event in
/// that range has returned from the state machine, so a crash mid-sweep
/// replays from the last fully-handled block rather than skipping ahead.
pub struct L1Scanner<L1, L2, S> {
    l1: Arc<L1>,
    state_machine: Arc<DepositStateMachine<L1, L2, S>>,
    last_processed: AtomicU64,
    busy: AtomicBool,
}

impl<L1, L2, S> L1Scanner<L1, L2, S>
where
    L1: L1Chain,
    L2: L2Rpc,
    S: TrackingStore<DepositRecord>,
{
    /// Builds a scanner that starts its historical sweep at
    /// `config.start_block` if set, else `head.saturating_sub(200_000)`.
    pub fn new(l1: Arc<L1>, state_machine: Arc<DepositStateMachine<L1, L2, S>>) -> Self {
        Self { l1, state_machine, last_processed: AtomicU64::new(0), busy: AtomicBool::new(false) }
    }

    /// Runs the one-shot historical sweep from the configured or default
    /// start block up to the current head, in ≤25,000-block batches.
    /// Per-batch and per-event failures are logged and skipped rather than
    /// aborting the sweep.
    pub async fn historical_sweep(&self, config: &Config) -> Result<(), EngineError> {
        let head = self.l1.head_block().await?;
        let start = match config.start_block {
            Some(s) if s <= head => s,
            _ => head.saturating_sub(DEFAULT_LOOKBACK_BLOCKS),
        };
        info!(start, head, "starting historical sweep");

        let mut from = start;
        while from <= head {
            let to = (from + MAX_BATCH_BLOCKS - 1).min(head);
            match self.l1.get_topup_logs(from, to).await {
                Ok(events) => self.dispatch(events).await?,
                Err(e) => warn!(from, to, error = %e, "historical batch failed, continuing"),
            }
            self.last_processed.store(to, Ordering::SeqCst);
            from = to + 1;
        }
        info!(head, "historical sweep complete");
        Ok(())
    }

    /// Runs one tail-poll round: reads the current head and scans
    /// `(lastProcessed, head]`, skipping entirely if a round is already in
    /// flight. Retries transient fetch failures up to 3 times, 2 s apart,
    /// before giving up on this round (resumed on the next timer tick).
    pub async fn tail_poll_once(&self) -> Result<(), EngineError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            info!("tail poll round already in flight, skipping");
            return Ok(());
        }
        let result = self.tail_poll_inner().await;
        self.busy.store(false, Ordering::SeqCst);
        result
    }

    async fn tail_poll_inner(&self) -> Result<(), EngineError> {
        let head = self.l1.head_block().await?;
        let mut from = self.last_processed.load(Ordering::SeqCst) + 1;
        while from <= head {
            let to = (from + MAX_BATCH_BLOCKS - 1).min(head);
            let events = self.fetch_with_retry(from, to).await?;
            self.dispatch(events).await?;
            self.last_processed.store(to, Ordering::SeqCst);
            from = to + 1;
        }
        Ok(())
    }

    async fn fetch_with_retry(&self, from: u64, to: u64) -> Result<Vec<TopUpEvent>, EngineError> {
        let mut attempt = 0;
        loop {
            match self.l1.get_topup_logs(from, to).await {
                Ok(events) => return Ok(events),
                Err(e) if attempt + 1 < TAIL_POLL_RETRIES => {
                    attempt += 1;
                    warn!(from, to, attempt, error = %e, "tail poll batch failed, retrying");
                    tokio::time::sleep(TAIL_POLL_RETRY_DELAY).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn dispatch(&self, events: Vec<TopUpEvent>) -> Result<(), EngineError> {
        for event in events {
            let tx_hash = event.tx_hash;
            if let Err(e) = self.state_machine.process_event(event).await {
                match e {
                    EngineError::Fatal(fatal) => return Err(fatal.into()),
                    other => warn!(tx_hash = %tx_hash, error = %other, "deposit processing failed, will retry next round"),
                }
            }
        }
        Ok(())
    }

    /// Runs the tail poll loop forever at a fixed 30 s cadence, until
    /// `shutdown` resolves or a fatal error is hit. Non-fatal round
    /// failures (transport errors surviving `fetch_with_retry`'s 3
    /// attempts) are logged and retried on the next tick rather than
    /// ending the loop, since `lastProcessed` never advanced past them.
    pub async fn run_tail_poll_loop(&self, mut shutdown: tokio::sync::oneshot::Receiver<()>) -> Result<(), FatalError> {
        let mut interval = tokio::time::interval(TAIL_POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tail_poll_once().await {
                        Ok(()) => {}
                        Err(EngineError::Fatal(fatal)) => {
                            warn!(error = %fatal, "tail poll round ended in a fatal error");
                            return Err(fatal);
                        }
                        Err(e) => warn!(error = %e, "tail poll round failed, retrying next tick"),
                    }
                }
                _ = &mut shutdown => {
                    info!("shutdown requested, stopping tail poll loop");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;
    use async_trait::async_trait;
    use bridge_chain::{AllTokensEntry, Bundle, DepositReceipt, L1Error, L2Error, SettlementSubmission};
    use bridge_store::MemoryStore;
    use bridge_types::DepositState;
    use std::sync::Mutex as StdMutex;

    struct FakeL1 {
        head: u64,
        batches_seen: StdMutex<Vec<(u64, u64)>>,
        fail_ranges: Vec<(u64, u64)>,
    }

    #[async_trait]
    impl L1Chain for FakeL1 {
        async fn head_block(&self) -> Result<u64, L1Error> {
            Ok(self.head)
        }
        async fn get_topup_logs(&self, from: u64, to: u64) -> Result<Vec<TopUpEvent>, L1Error> {
            self.batches_seen.lock().unwrap().push((from, to));
            if self.fail_ranges.contains(&(from, to)) {
                return Err(L1Error::Transport("boom".into()));
            }
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
    struct NoopL2;

    #[async_trait]
    impl bridge_chain::NonceSource for NoopL2 {
        async fn next_nonce(&self) -> Result<u64, L2Error> {
            Ok(1)
        }
    }

    #[async_trait]
    impl L2Rpc for NoopL2 {
        async fn send_transaction(&self, _: &[u64], _: &str) -> Result<DepositReceipt, L2Error> {
            unimplemented!()
        }
        async fn deposit(&self, nonce: u64, _: u64, _: u64, _: u64, _: u64) -> Result<DepositReceipt, L2Error> {
            Ok(DepositReceipt { success: true, nonce })
        }
        async fn check_deposit(
            &self,
            _: u64,
            _: u64,
            _: u64,
            _: u64,
            _: u64,
        ) -> Result<Option<serde_json::Value>, L2Error> {
            Ok(None)
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

    fn make_scanner(l1: Arc<FakeL1>) -> L1Scanner<FakeL1, NoopL2, MemoryStore<DepositRecord>> {
        let l2 = Arc::new(NoopL2);
        let store = Arc::new(MemoryStore::<DepositRecord>::new());
        let sm = Arc::new(DepositStateMachine::new(l1.clone(), l2, store, config()));
        L1Scanner::new(l1, sm)
    }

    #[tokio::test]
    async fn historical_sweep_batches_in_25000_block_chunks() {
        let l1 = Arc::new(FakeL1 { head: 60_000, batches_seen: StdMutex::new(vec![]), fail_ranges: vec![] });
        let scanner = make_scanner(l1.clone());
        let mut config = config();
        config.start_block = Some(0);

        scanner.historical_sweep(&config).await.unwrap();

        let batches = l1.batches_seen.lock().unwrap().clone();
        assert_eq!(batches, vec![(0, 24_999), (25_000, 49_999), (50_000, 60_000)]);
        assert_eq!(scanner.last_processed.load(Ordering::SeqCst), 60_000);
    }

    #[tokio::test]
    async fn historical_sweep_continues_past_a_failed_batch() {
        let l1 = Arc::new(FakeL1 {
            head: 30_000,
            batches_seen: StdMutex::new(vec![]),
            fail_ranges: vec![(0, 24_999)],
        });
        let scanner = make_scanner(l1.clone());
        let mut config = config();
        config.start_block = Some(0);

        scanner.historical_sweep(&config).await.unwrap();

        let batches = l1.batches_seen.lock().unwrap().clone();
        assert_eq!(batches, vec![(0, 24_999), (25_000, 30_000)]);
        assert_eq!(scanner.last_processed.load(Ordering::SeqCst), 30_000);
    }

    #[tokio::test]
    async fn historical_sweep_defaults_to_200k_lookback() {
        let l1 = Arc::new(FakeL1 { head: 500_000, batches_seen: StdMutex::new(vec![]), fail_ranges: vec![] });
        let scanner = make_scanner(l1.clone());

        scanner.historical_sweep(&config()).await.unwrap();

        let batches = l1.batches_seen.lock().unwrap().clone();
        assert_eq!(batches.first().unwrap().0, 300_000);
    }

    #[tokio::test]
    async fn tail_poll_busy_guard_skips_overlapping_round() {
        let l1 = Arc::new(FakeL1 { head: 100, batches_seen: StdMutex::new(vec![]), fail_ranges: vec![] });
        let scanner = Arc::new(make_scanner(l1.clone()));
        scanner.busy.store(true, Ordering::SeqCst);

        scanner.tail_poll_once().await.unwrap();

        assert!(l1.batches_seen.lock().unwrap().is_empty(), "busy guard must skip the round entirely");
    }

    #[tokio::test(start_paused = true)]
    async fn tail_poll_loop_stops_on_shutdown_without_running_a_round() {
        let l1 = Arc::new(FakeL1 { head: 0, batches_seen: StdMutex::new(vec![]), fail_ranges: vec![] });
        let scanner = make_scanner(l1.clone());
        let (tx, rx) = tokio::sync::oneshot::channel();
        tx.send(()).unwrap();

        let result = scanner.run_tail_poll_loop(rx).await;

        assert!(result.is_ok());
        assert!(l1.batches_seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn tail_poll_loop_propagates_a_fatal_error_instead_of_looping_forever() {
        let tx_hash = B256::repeat_byte(3);
        let token = alloy_primitives::Address::repeat_byte(9);
        let l1 = Arc::new(FakeL1WithEvent { head: 10, tx_hash, token });
        let l2 = Arc::new(NoopL2);
        let store = Arc::new(MemoryStore::<DepositRecord>::new());
        // A record stuck in-progress with no nonce is the fatal invariant
        // violation the state machine refuses to resume from.
        store
            .insert_if_absent(DepositRecord {
                state: DepositState::InProgress,
                nonce: None,
                ..DepositRecord::new_pending(
                    tx_hash,
                    token,
                    alloy_primitives::Address::ZERO,
                    1,
                    2,
                    1,
                    std::time::SystemTime::UNIX_EPOCH,
                )
            })
            .await
            .unwrap();
        let sm = Arc::new(DepositStateMachine::new(l1.clone(), l2, store, config()));
        let scanner = L1Scanner::new(l1, sm);
        let (_tx, rx) = tokio::sync::oneshot::channel();

        let result = scanner.run_tail_poll_loop(rx).await;

        assert!(result.is_err());
    }

    struct FakeL1WithEvent {
        head: u64,
        tx_hash: B256,
        token: alloy_primitives::Address,
    }

    #[async_trait]
    impl L1Chain for FakeL1WithEvent {
        async fn head_block(&self) -> Result<u64, L1Error> {
            Ok(self.head)
        }
        async fn get_topup_logs(&self, from: u64, _to: u64) -> Result<Vec<TopUpEvent>, L1Error> {
            if from == 1 {
                Ok(vec![TopUpEvent {
                    tx_hash: self.tx_hash,
                    l1_token: self.token,
                    address: alloy_primitives::Address::ZERO,
                    pid_1: 1,
                    pid_2: 2,
                    amount_wei: alloy_primitives::U256::from(1u64),
                }])
            } else {
                Ok(vec![])
            }
        }
        async fn all_tokens(&self) -> Result<Vec<AllTokensEntry>, L1Error> {
            Ok(vec![AllTokensEntry { token_uid: self.token }])
        }
        async fn submit_settlement(&self, _: SettlementSubmission) -> Result<B256, L1Error> {
            unimplemented!()
        }
        async fn await_receipt(&self, _: B256) -> Result<bool, L1Error> {
            unimplemented!()
        }
    }
}
