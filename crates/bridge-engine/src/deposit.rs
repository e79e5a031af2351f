use crate::errors::{EngineError, FatalError};
use alloy_primitives::U256;
use bridge_chain::{L1Chain, L2Rpc};
use bridge_config::Config;
use bridge_store::TrackingStore;
use bridge_types::{DepositRecord, DepositState, TopUpEvent};
use std::sync::{Arc, atomic::{AtomicBool, Ordering}};
use std::time::SystemTime;
use tracing::{info, info_span, warn};

/// Per-transaction finite-state processor for observed `TopUp` events.
///
/// Holds the single-writer guard described in the bridging engine's
/// concurrency model: at most one deposit submission may be in flight at
/// any instant. A reentrant call while one is already in flight is a fatal
/// invariant violation, not a queued retry.
pub struct DepositStateMachine<L1, L2, S> {
    l1: Arc<L1>,
    l2: Arc<L2>,
    store: Arc<S>,
    config: Config,
    submitting: AtomicBool,
}

impl<L1, L2, S> DepositStateMachine<L1, L2, S>
where
    L1: L1Chain,
    L2: L2Rpc,
    S: TrackingStore<DepositRecord>,
{
    /// Builds a new state machine over the given chain clients and store.
    pub fn new(l1: Arc<L1>, l2: Arc<L2>, store: Arc<S>, config: Config) -> Self {
        Self { l1, l2, store, config, submitting: AtomicBool::new(false) }
    }

    /// Converts a raw wei amount to the whole-unit `amount` field, per the
    /// configured token precision.
    fn to_whole_units(&self, amount_wei: U256) -> u64 {
        let whole = amount_wei / self.config.wei_divisor();
        // Saturates rather than panics: a deposit large enough to overflow
        // u64 whole units is implausible for any real token and would
        // indicate a misconfigured `token_precision`, not a value the
        // engine should crash processing.
        u64::try_from(whole).unwrap_or(u64::MAX)
    }

    /// Processes one decoded `TopUp` event end to end: token resolution,
    /// dust handling, and the full state-machine dispatch of §4.4.
    pub async fn process_event(&self, event: TopUpEvent) -> Result<(), EngineError> {
        let span = info_span!("deposit", tx_hash = %event.tx_hash);
        let _enter = span.enter();

        let tokens = self.l1.all_tokens().await?;
        let Some(token_index) = tokens.iter().position(|t| t.token_uid == event.l1_token) else {
            info!(l1_token = %event.l1_token, "unknown token, ignoring TopUp");
            return Ok(());
        };
        let token_index = token_index as u64;
        let amount = self.to_whole_units(event.amount_wei);
        let now = SystemTime::now();

        match self.store.find_by_key(&event.tx_hash).await? {
            None if amount < 1 => {
                info!("dust deposit, recording as completed without crediting");
                self.store
                    .insert_if_absent(DepositRecord::new_dust(
                        event.tx_hash,
                        event.l1_token,
                        event.address,
                        event.pid_1,
                        event.pid_2,
                        now,
                    ))
                    .await?;
                Ok(())
            }
            None => {
                let record = DepositRecord::new_pending(
                    event.tx_hash,
                    event.l1_token,
                    event.address,
                    event.pid_1,
                    event.pid_2,
                    amount,
                    now,
                );
                if self.store.insert_if_absent(record).await? {
                    self.advance_pending(event.tx_hash, token_index, amount).await
                } else {
                    // Lost the insert race to a concurrent observation of
                    // the same tx hash (e.g. replayed scanner round);
                    // resume from whatever state is now on disk.
                    self.resume(event.tx_hash, token_index).await
                }
            }
            Some(record) => self.resume_from(record, token_index).await,
        }
    }

    async fn resume(&self, tx_hash: alloy_primitives::TxHash, token_index: u64) -> Result<(), EngineError> {
        match self.store.find_by_key(&tx_hash).await? {
            Some(record) => self.resume_from(record, token_index).await,
            None => Ok(()),
        }
    }

    async fn resume_from(&self, record: DepositRecord, token_index: u64) -> Result<(), EngineError> {
        match record.state {
            DepositState::Completed => Ok(()),
            DepositState::Pending => self.advance_pending(record.tx_hash, token_index, record.amount).await,
            DepositState::InProgress | DepositState::Failed => {
                let Some(nonce) = record.nonce else {
                    return Err(FatalError::MissingNonce(record.tx_hash.to_string()).into());
                };
                self.verify_then_retry(record, token_index, nonce).await
            }
        }
    }

    /// `pending -> (completed | in-progress -> completed/failed)`: assign a
    /// nonce, handle dust found only after token resolution, then submit.
    async fn advance_pending(
        &self,
        tx_hash: alloy_primitives::TxHash,
        token_index: u64,
        amount: u64,
    ) -> Result<(), EngineError> {
        if amount < 1 {
            bridge_store::mark_completed(self.store.as_ref(), &tx_hash, DepositState::Completed).await?;
            return Ok(());
        }

        let nonce = self.fetch_nonce_with_retry().await?;
        let applied = self
            .store
            .update_where(
                &tx_hash,
                DepositState::Pending,
                Box::new(move |r| {
                    r.nonce = Some(nonce);
                    r.state = DepositState::InProgress;
                }),
            )
            .await?;
        if !applied {
            // Someone else already advanced this record past `pending`;
            // resume from whatever is there now instead of double-submitting.
            return self.resume(tx_hash, token_index).await;
        }

        let Some(record) = self.store.find_by_key(&tx_hash).await? else {
            return Err(FatalError::UnexpectedState(tx_hash.to_string()).into());
        };
        self.submit_and_settle(tx_hash, record.pid_1, record.pid_2, token_index, amount, nonce, 0)
            .await
    }

    /// `in-progress | failed -> (completed | failed)`: verify first, since a
    /// crash between "submitted" and "state updated" is indistinguishable
    /// from a failed submission, and `checkDeposit` is the ground truth.
    async fn verify_then_retry(
        &self,
        record: DepositRecord,
        token_index: u64,
        nonce: u64,
    ) -> Result<(), EngineError> {
        let verified = self
            .l2
            .check_deposit(nonce, record.pid_1, record.pid_2, token_index, record.amount)
            .await?;
        if verified.is_some() {
            bridge_store::mark_completed(self.store.as_ref(), &record.tx_hash, DepositState::Completed)
                .await?;
            return Ok(());
        }

        warn!(retry_count = record.retry_count, "deposit not verified on L2, retrying");
        let fresh_nonce = self.fetch_nonce_with_retry().await?;
        let from_state = record.state;
        let next_retry_count = record.retry_count + 1;
        let applied = self
            .store
            .update_where(
                &record.tx_hash,
                from_state,
                Box::new(move |r| {
                    r.nonce = Some(fresh_nonce);
                    r.retry_count = next_retry_count;
                    r.last_retry_time = Some(SystemTime::now());
                    r.state = DepositState::InProgress;
                }),
            )
            .await?;
        if !applied {
            return Ok(());
        }

        self.submit_and_settle(
            record.tx_hash,
            record.pid_1,
            record.pid_2,
            token_index,
            record.amount,
            fresh_nonce,
            next_retry_count,
        )
        .await
    }

    async fn submit_and_settle(
        &self,
        tx_hash: alloy_primitives::TxHash,
        pid_1: u64,
        pid_2: u64,
        token_index: u64,
        amount: u64,
        nonce: u64,
        retry_count: u32,
    ) -> Result<(), EngineError> {
        if self.submitting.swap(true, Ordering::SeqCst) {
            return Err(FatalError::ReentrantSubmission.into());
        }
        let result = self.submit_once(pid_1, pid_2, token_index, amount, nonce).await;
        self.submitting.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => {
                bridge_store::mark_completed(self.store.as_ref(), &tx_hash, DepositState::Completed).await?;
                #[cfg(feature = "metrics")]
                metrics::counter!("bridge_deposits_credited_total").increment(1);
                info!(retry_count, "deposit credited");
            }
            Err(e) => {
                warn!(error = %e, retry_count, "deposit submission failed, marking failed for retry");
                self.store
                    .update_where(
                        &tx_hash,
                        DepositState::InProgress,
                        Box::new(|r| r.state = DepositState::Failed),
                    )
                    .await?;
                #[cfg(feature = "metrics")]
                metrics::counter!("bridge_deposits_retried_total").increment(1);
            }
        }
        Ok(())
    }

    async fn submit_once(
        &self,
        pid_1: u64,
        pid_2: u64,
        token_index: u64,
        amount: u64,
        nonce: u64,
    ) -> Result<(), bridge_chain::L2Error> {
        let receipt = self.l2.deposit(nonce, pid_1, pid_2, token_index, amount).await?;
        if receipt.success {
            Ok(())
        } else {
            Err(bridge_chain::L2Error::Rpc("L2 rejected deposit command".into()))
        }
    }

    async fn fetch_nonce_with_retry(&self) -> Result<u64, bridge_chain::L2Error> {
        bridge_chain::with_retry(|| async { self.l2.next_nonce().await }).await
    }
}
