//! Durable record store keyed by L1 tx hash (deposits) or L2 task id
//! (settlements), with the conditional-update primitive the state machines
//! use as their sole protection against concurrent writers and
//! restart-races.

mod memory;
#[cfg(feature = "mongo")]
mod mongo;
mod records;

pub use memory::MemoryStore;
#[cfg(feature = "mongo")]
pub use mongo::MongoStore;

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a [`TrackingStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not complete the operation.
    #[error("tracking store backend error: {0}")]
    Backend(String),
    /// A record was read back with a state the trait contract does not
    /// allow. Not retried: this is a fatal invariant violation upstream.
    #[error("record in unexpected state: {0}")]
    UnexpectedState(String),
}

/// Any record kind tracked by the store must expose its primary key and the
/// state field the conditional-update primitive synchronizes on.
pub trait TrackedRecord {
    /// The record's primary key type (`TxHash` for deposits, `TaskId` for
    /// settlements).
    type Key: Eq + std::hash::Hash + Clone + Send + Sync;
    /// The record kind's lifecycle state type.
    type State: PartialEq + Send + Sync + Copy;

    /// This record's primary key.
    fn key(&self) -> Self::Key;

    /// The current lifecycle state of this record.
    fn state(&self) -> Self::State;

    /// Overwrites the lifecycle state in place.
    fn set_state(&mut self, state: Self::State);
}

/// Durable record store holding records of type `R`, keyed by `R::Key`.
///
/// `update_where` is the sole primitive used by the deposit state machine
/// and settlement poller to guard against concurrent writers and restart
/// races: a transition is applied if, and only if, the persisted state
/// still matches `expected_state` at the moment of the write.
#[async_trait]
pub trait TrackingStore<R>: Send + Sync
where
    R: TrackedRecord + Clone + Send + Sync,
{
    /// Looks up a record by its primary key.
    async fn find_by_key(&self, key: &R::Key) -> Result<Option<R>, StoreError>;

    /// Inserts a record if no record with this key exists yet. Returns
    /// `true` if the insert happened, `false` if a record already existed.
    async fn insert_if_absent(&self, record: R) -> Result<bool, StoreError>;

    /// Atomically applies `mutate` to the record at `key` if, and only if,
    /// its persisted state equals `expected_state`. Returns whether the
    /// update applied.
    async fn update_where(
        &self,
        key: &R::Key,
        expected_state: R::State,
        mutate: Box<dyn FnOnce(&mut R) + Send>,
    ) -> Result<bool, StoreError>;

    /// Returns the existing record at `key`, or inserts `defaults` and
    /// returns that instead.
    async fn insert_or_get_by_key(&self, key: &R::Key, defaults: R) -> Result<R, StoreError>;
}

/// Idempotent closing helper built on top of [`TrackingStore::update_where`]:
/// marks `key` as `completed_state` unless it already is. A second call is
/// a no-op, matching the `markCompleted` contract.
pub async fn mark_completed<R>(
    store: &(impl TrackingStore<R> + ?Sized),
    key: &R::Key,
    completed_state: R::State,
) -> Result<bool, StoreError>
where
    R: TrackedRecord + Clone + Send + Sync,
{
    match store.find_by_key(key).await? {
        None => Ok(false),
        Some(existing) if existing.state() == completed_state => Ok(false),
        Some(existing) => {
            let from = existing.state();
            store
                .update_where(
                    key,
                    from,
                    Box::new(move |record| record.set_state(completed_state)),
                )
                .await
        }
    }
}
