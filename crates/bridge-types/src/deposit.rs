use alloy_primitives::{Address, TxHash};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// The state of a [`DepositRecord`]'s processing.
///
/// Transitions form a DAG: `pending -> in_progress -> (completed | failed)`,
/// with `failed -> in_progress -> (completed | failed)` cycles permitted.
/// `completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DepositState {
    /// Observed, not yet assigned a nonce.
    Pending,
    /// Nonce assigned, submission attempted or in flight.
    InProgress,
    /// Credited on L2 (or acknowledged as dust). Terminal.
    Completed,
    /// Submission or verification failed; eligible for retry.
    Failed,
}

/// One record per observed L1 `TopUp` event, keyed uniquely by `tx_hash`.
///
/// See the invariants in the bridging engine specification: a `Completed`
/// record never changes again, any record in `InProgress`/`Failed` must
/// carry a `nonce`, and `retry_count` strictly increases across
/// `Failed -> InProgress` transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRecord {
    /// Primary key: the L1 transaction hash this deposit was observed in.
    pub tx_hash: TxHash,
    /// Current lifecycle state.
    pub state: DepositState,
    /// The L1 token contract credited.
    pub l1_token: Address,
    /// Beneficiary address on L1.
    pub address: Address,
    /// First half of the L2 player identity.
    pub pid_1: u64,
    /// Second half of the L2 player identity.
    pub pid_2: u64,
    /// Whole-unit amount credited on L2 (converted from wei by the
    /// configured precision divisor).
    pub amount: u64,
    /// The L2 command nonce assigned to this deposit, once allocated.
    pub nonce: Option<u64>,
    /// Number of retry attempts since the first submission.
    pub retry_count: u32,
    /// Timestamp of the most recent retry, if any.
    #[serde(with = "time_opt")]
    pub last_retry_time: Option<SystemTime>,
    /// Creation timestamp.
    #[serde(with = "time")]
    pub timestamp: SystemTime,
}

impl DepositRecord {
    /// Builds the initial record for a freshly observed event, not yet
    /// inserted into the store.
    pub fn new_pending(
        tx_hash: TxHash,
        l1_token: Address,
        address: Address,
        pid_1: u64,
        pid_2: u64,
        amount: u64,
        now: SystemTime,
    ) -> Self {
        Self {
            tx_hash,
            state: DepositState::Pending,
            l1_token,
            address,
            pid_1,
            pid_2,
            amount,
            nonce: None,
            retry_count: 0,
            last_retry_time: None,
            timestamp: now,
        }
    }

    /// Builds a terminal dust record: observed, never credited.
    pub fn new_dust(
        tx_hash: TxHash,
        l1_token: Address,
        address: Address,
        pid_1: u64,
        pid_2: u64,
        now: SystemTime,
    ) -> Self {
        Self {
            tx_hash,
            state: DepositState::Completed,
            l1_token,
            address,
            pid_1,
            pid_2,
            amount: 0,
            nonce: None,
            retry_count: 0,
            last_retry_time: None,
            timestamp: now,
        }
    }
}

mod time {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S: Serializer>(t: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
        let secs = t.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        secs.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SystemTime, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(UNIX_EPOCH + Duration::from_secs(secs))
    }
}

mod time_opt {
    use super::time;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::SystemTime;

    pub fn serialize<S: Serializer>(t: &Option<SystemTime>, s: S) -> Result<S::Ok, S::Error> {
        match t {
            Some(t) => time::serialize(t, s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<SystemTime>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?
            .map(|secs| std::time::UNIX_EPOCH + std::time::Duration::from_secs(secs)))
    }
}
