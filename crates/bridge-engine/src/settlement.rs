use crate::errors::{EngineError, FatalError};
use alloy_primitives::{B256, Bytes, U256};
use bridge_chain::{Bundle, L1Chain, L2Rpc, SettlementSubmission};
use bridge_store::TrackingStore;
use bridge_types::{SettlementRecord, SettlementStatus, TaskId};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, info_span, warn};

/// The three 256-bit values derived from a proof's instance array.
struct DerivedRoots {
    merkle_root: B256,
    new_merkle_root: B256,
    sha_hash: B256,
}

/// Extracts [`DerivedRoots`] from the big-endian 64-bit limbs of a proof
/// instance array. Requires at least 12 limbs.
fn derive_roots(inst_arr: &[u64]) -> Result<DerivedRoots, EngineError> {
    if inst_arr.len() < 12 {
        return Err(EngineError::Decode(format!(
            "instance array has {} limbs, need at least 12",
            inst_arr.len()
        )));
    }
    let word = |base: usize| -> B256 {
        let value = (U256::from(inst_arr[base]) << 192)
            | (U256::from(inst_arr[base + 1]) << 128)
            | (U256::from(inst_arr[base + 2]) << 64)
            | U256::from(inst_arr[base + 3]);
        B256::from(value.to_be_bytes())
    };
    Ok(DerivedRoots { merkle_root: word(0), new_merkle_root: word(4), sha_hash: word(8) })
}

fn parse_hex_u64s(hex: &str) -> Result<Vec<u64>, EngineError> {
    let bytes = hex::decode(hex.trim_start_matches("0x"))
        .map_err(|e| EngineError::Decode(format!("invalid hex instance array: {e}")))?;
    if bytes.len() % 8 != 0 {
        return Err(EngineError::Decode("instance array length is not a multiple of 8 bytes".into()));
    }
    Ok(bytes.chunks_exact(8).map(|c| u64::from_be_bytes(c.try_into().unwrap())).collect())
}

fn decode_bytes(hex: &str) -> Result<Bytes, EngineError> {
    Bytes::from_str(hex).map_err(|e| EngineError::Decode(format!("invalid hex payload: {e}")))
}

fn decode_withdraw_array(chunks: &[String]) -> Result<Vec<B256>, EngineError> {
    chunks
        .iter()
        .map(|c| B256::from_str(c).map_err(|e| EngineError::Decode(format!("invalid withdraw chunk: {e}"))))
        .collect()
}

/// Periodic scanner over ready-to-settle L2 proof bundles: derives the
/// merkle roots from each bundle's instance array and drives bundles
/// through `unsubmitted -> submitted -> (confirmed | failed)` in strict
/// `taskId` order.
pub struct SettlementPoller<L1, L2, S> {
    l1: Arc<L1>,
    l2: Arc<L2>,
    store: Arc<S>,
}

impl<L1, L2, S> SettlementPoller<L1, L2, S>
where
    L1: L1Chain,
    L2: L2Rpc,
    S: TrackingStore<SettlementRecord>,
{
    /// Builds a poller over the given chain clients and store.
    pub fn new(l1: Arc<L1>, l2: Arc<L2>, store: Arc<S>) -> Self {
        Self { l1, l2, store }
    }

    /// Runs one polling round: fetches ready bundles, registers any unseen
    /// ones, then drives every non-`confirmed` bundle forward in ascending
    /// `taskId` order. A blocked bundle blocks everything after it, since
    /// the settlement contract requires a specific previous root.
    pub async fn poll_once(&self) -> Result<(), EngineError> {
        let mut bundles = self.l2.ready_bundles().await?;
        bundles.sort_by_key(|b| b.task_id);

        for bundle in bundles {
            let span = info_span!("settlement", task_id = %bundle.task_id);
            let _enter = span.enter();

            let record = self.ensure_registered(&bundle).await?;
            if record.settle_status == SettlementStatus::Confirmed {
                continue;
            }

            match self.advance(bundle).await {
                Ok(()) => {}
                Err(e @ EngineError::Fatal(_)) => return Err(e),
                Err(e) => {
                    warn!(error = %e, "settlement round halted at a blocked bundle");
                    break;
                }
            }
        }
        Ok(())
    }

    async fn ensure_registered(&self, bundle: &Bundle) -> Result<SettlementRecord, EngineError> {
        let merkle_root = B256::from_str(&bundle.merkle_root)
            .map_err(|e| EngineError::Decode(format!("invalid merkle root: {e}")))?;
        let withdraw_array = decode_withdraw_array(&bundle.withdraw_array)?;
        let defaults = SettlementRecord::new_unsubmitted(bundle.task_id, merkle_root, withdraw_array);
        Ok(self.store.insert_or_get_by_key(&bundle.task_id, defaults).await?)
    }

    async fn advance(&self, bundle: Bundle) -> Result<(), EngineError> {
        let task_id = bundle.task_id;
        let record = self.store.find_by_key(&task_id).await?.ok_or_else(|| {
            EngineError::from(FatalError::UnexpectedState(format!("{task_id} vanished mid-round")))
        })?;

        match record.settle_status {
            SettlementStatus::Confirmed => Ok(()),
            SettlementStatus::Unsubmitted | SettlementStatus::Failed => self.submit(bundle, record).await,
            SettlementStatus::Submitted => {
                let Some(tx_hash) = record.settle_tx_hash else {
                    return Err(FatalError::MissingNonce(task_id.to_string()).into());
                };
                self.await_and_finalize(task_id, tx_hash).await
            }
        }
    }

    async fn submit(&self, bundle: Bundle, record: SettlementRecord) -> Result<(), EngineError> {
        let inst_limbs = parse_hex_u64s(&bundle.inst_arr)?;
        let roots = derive_roots(&inst_limbs)?;
        info!(
            merkle_root = %roots.merkle_root,
            new_merkle_root = %roots.new_merkle_root,
            sha_hash = %roots.sha_hash,
            "submitting settlement"
        );

        let submission = SettlementSubmission {
            tx_data: decode_bytes(&bundle.tx_data)?,
            proof_arr: decode_bytes(&bundle.proof_arr)?,
            verify_instance_arr: decode_bytes(&bundle.verify_instance_arr)?,
            aux_arr: decode_bytes(&bundle.aux_arr)?,
            inst_arr: decode_bytes(&bundle.inst_arr)?,
        };

        let tx_hash = self.l1.submit_settlement(submission).await?;
        let from_state = record.settle_status;
        let applied = self
            .store
            .update_where(
                &record.task_id,
                from_state,
                Box::new(move |r| {
                    r.settle_tx_hash = Some(tx_hash);
                    r.settle_status = SettlementStatus::Submitted;
                }),
            )
            .await?;
        if !applied {
            return Ok(());
        }
        self.await_and_finalize(record.task_id, tx_hash).await
    }

    async fn await_and_finalize(&self, task_id: TaskId, tx_hash: B256) -> Result<(), EngineError> {
        let success = self.l1.await_receipt(tx_hash).await?;
        let next_state = if success { SettlementStatus::Confirmed } else { SettlementStatus::Failed };
        self.store
            .update_where(
                &task_id,
                SettlementStatus::Submitted,
                Box::new(move |r| r.settle_status = next_state),
            )
            .await?;
        if success {
            info!("settlement confirmed");
            #[cfg(feature = "metrics")]
            metrics::counter!("bridge_settlements_confirmed_total").increment(1);
        } else {
            warn!("settlement reverted, eligible for retry");
            #[cfg(feature = "metrics")]
            metrics::counter!("bridge_settlements_reverted_total").increment(1);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_three_roots_from_twelve_limbs() {
        let mut limbs = vec![0u64; 12];
        limbs[3] = 0xAA;
        limbs[7] = 0xBB;
        limbs[11] = 0xCC;
        let roots = derive_roots(&limbs).unwrap();
        let expected = |b: u8| {
            let mut bytes = [0u8; 32];
            bytes[31] = b;
            B256::from(bytes)
        };
        assert_eq!(roots.merkle_root, expected(0xAA));
        assert_eq!(roots.new_merkle_root, expected(0xBB));
        assert_eq!(roots.sha_hash, expected(0xCC));
    }

    #[test]
    fn rejects_short_instance_arrays() {
        let limbs = vec![0u64; 11];
        assert!(derive_roots(&limbs).is_err());
    }

    #[test]
    fn parses_hex_instance_array_into_limbs() {
        let hex = format!("0x{}", "00".repeat(8 * 12));
        let limbs = parse_hex_u64s(&hex).unwrap();
        assert_eq!(limbs.len(), 12);
    }

    use async_trait::async_trait;
    use bridge_chain::{AllTokensEntry, DepositReceipt, L1Error, L2Error};
    use bridge_store::MemoryStore;
    use bridge_types::TopUpEvent;

    fn b256_hex() -> String {
        format!("0x{}", "00".repeat(32))
    }

    fn inst_hex() -> String {
        format!("0x{}", "00".repeat(8 * 12))
    }

    fn bundle(task_id: u64) -> Bundle {
        Bundle {
            task_id: TaskId(task_id),
            merkle_root: b256_hex(),
            withdraw_array: vec![b256_hex()],
            tx_data: "0x00".into(),
            proof_arr: "0x00".into(),
            verify_instance_arr: "0x00".into(),
            aux_arr: "0x00".into(),
            inst_arr: inst_hex(),
        }
    }

    struct FakeL1 {
        fail_tx: Option<B256>,
    }

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
            Ok(B256::repeat_byte(1))
        }
        async fn await_receipt(&self, tx_hash: B256) -> Result<bool, L1Error> {
            Ok(self.fail_tx != Some(tx_hash))
        }
    }

    #[derive(Default)]
    struct FakeL2 {
        bundles: Vec<Bundle>,
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
            unimplemented!()
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
            Ok(self.bundles.clone())
        }
    }

    #[tokio::test]
    async fn confirms_bundles_in_ascending_task_id_order() {
        let l1 = Arc::new(FakeL1 { fail_tx: None });
        let l2 = Arc::new(FakeL2 { bundles: vec![bundle(2), bundle(1)] });
        let store = Arc::new(MemoryStore::<SettlementRecord>::new());
        let poller = SettlementPoller::new(l1, l2, store.clone());

        poller.poll_once().await.unwrap();

        let r1 = store.find_by_key(&TaskId(1)).await.unwrap().unwrap();
        let r2 = store.find_by_key(&TaskId(2)).await.unwrap().unwrap();
        assert_eq!(r1.settle_status, SettlementStatus::Confirmed);
        assert_eq!(r2.settle_status, SettlementStatus::Confirmed);
    }

    #[tokio::test]
    async fn malformed_bundle_halts_the_round_without_aborting_the_process() {
        let l1 = Arc::new(FakeL1 { fail_tx: None });
        let mut bad = bundle(1);
        bad.inst_arr = "0x00".into(); // too short: fewer than 12 limbs
        let l2 = Arc::new(FakeL2 { bundles: vec![bad] });
        let store = Arc::new(MemoryStore::<SettlementRecord>::new());
        let poller = SettlementPoller::new(l1, l2, store.clone());

        let result = poller.poll_once().await;

        assert!(result.is_ok(), "a decode failure must not abort the poll round");
        let record = store.find_by_key(&TaskId(1)).await.unwrap().unwrap();
        assert_eq!(record.settle_status, SettlementStatus::Unsubmitted, "blocked bundle stays unsubmitted for retry");
    }
}
