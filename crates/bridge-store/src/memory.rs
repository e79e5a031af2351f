use crate::{StoreError, TrackedRecord, TrackingStore};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// An in-memory [`TrackingStore`], backed by a mutex-guarded `HashMap`.
///
/// Used by unit tests and local/dev runs; does not persist across process
/// restart, so it must not back a production deployment (the whole point of
/// the tracking store is restart-durability).
#[derive(Debug)]
pub struct MemoryStore<R: TrackedRecord> {
    records: Mutex<HashMap<R::Key, R>>,
}

impl<R: TrackedRecord> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: TrackedRecord> MemoryStore<R> {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self { records: Mutex::new(HashMap::new()) }
    }
}

#[async_trait]
impl<R> TrackingStore<R> for MemoryStore<R>
where
    R: TrackedRecord + Clone + Send + Sync,
{
    async fn find_by_key(&self, key: &R::Key) -> Result<Option<R>, StoreError> {
        Ok(self.records.lock().await.get(key).cloned())
    }

    async fn insert_if_absent(&self, record: R) -> Result<bool, StoreError> {
        let mut records = self.records.lock().await;
        if records.contains_key(&record.key()) {
            return Ok(false);
        }
        records.insert(record.key(), record);
        Ok(true)
    }

    async fn update_where(
        &self,
        key: &R::Key,
        expected_state: R::State,
        mutate: Box<dyn FnOnce(&mut R) + Send>,
    ) -> Result<bool, StoreError> {
        let mut records = self.records.lock().await;
        match records.get_mut(key) {
            Some(record) if record.state() == expected_state => {
                mutate(record);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_or_get_by_key(&self, key: &R::Key, defaults: R) -> Result<R, StoreError> {
        let mut records = self.records.lock().await;
        Ok(records.entry(key.clone()).or_insert(defaults).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_types::{DepositRecord, DepositState};

    fn sample(tx_hash: u8) -> DepositRecord {
        DepositRecord::new_pending(
            alloy_primitives::B256::repeat_byte(tx_hash),
            Default::default(),
            Default::default(),
            1,
            2,
            5,
            std::time::SystemTime::UNIX_EPOCH,
        )
    }

    #[tokio::test]
    async fn insert_if_absent_is_one_shot() {
        let store = MemoryStore::<DepositRecord>::new();
        assert!(store.insert_if_absent(sample(1)).await.unwrap());
        assert!(!store.insert_if_absent(sample(1)).await.unwrap());
    }

    #[tokio::test]
    async fn update_where_requires_matching_state() {
        let store = MemoryStore::<DepositRecord>::new();
        let key = alloy_primitives::B256::repeat_byte(1);
        store.insert_if_absent(sample(1)).await.unwrap();

        let applied = store
            .update_where(
                &key,
                DepositState::InProgress,
                Box::new(|r| r.nonce = Some(1)),
            )
            .await
            .unwrap();
        assert!(!applied, "state was Pending, not InProgress");

        let applied = store
            .update_where(&key, DepositState::Pending, Box::new(|r| r.nonce = Some(1)))
            .await
            .unwrap();
        assert!(applied);
        assert_eq!(store.find_by_key(&key).await.unwrap().unwrap().nonce, Some(1));
    }

    #[tokio::test]
    async fn mark_completed_is_idempotent() {
        let store = MemoryStore::<DepositRecord>::new();
        let key = alloy_primitives::B256::repeat_byte(1);
        store.insert_if_absent(sample(1)).await.unwrap();

        assert!(crate::mark_completed(&store, &key, DepositState::Completed).await.unwrap());
        assert!(!crate::mark_completed(&store, &key, DepositState::Completed).await.unwrap());
    }
}
