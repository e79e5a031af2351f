use crate::{StoreError, TrackedRecord, TrackingStore};
use async_trait::async_trait;
use mongodb::bson::{Document, doc, to_bson};
use mongodb::{Collection, options::FindOneAndUpdateOptions};
use serde::{Serialize, de::DeserializeOwned};
use std::marker::PhantomData;

/// A [`TrackingStore`] backed by a MongoDB collection, using
/// `findOneAndUpdate` with a filter on the persisted state to realize
/// `update_where` atomically.
///
/// The collection's document schema is exactly the record type `R`
/// serialized with `serde`; `R::Key` must serialize to a value suitable as
/// the `_id` field.
pub struct MongoStore<R> {
    collection: Collection<Document>,
    _marker: PhantomData<R>,
}

impl<R> MongoStore<R> {
    /// Wraps an existing collection handle.
    pub const fn new(collection: Collection<Document>) -> Self {
        Self { collection, _marker: PhantomData }
    }
}

fn key_filter<K: Serialize>(key: &K) -> Result<Document, StoreError> {
    let id = to_bson(key).map_err(|e| StoreError::Backend(e.to_string()))?;
    Ok(doc! { "_id": id })
}

#[async_trait]
impl<R> TrackingStore<R> for MongoStore<R>
where
    R: TrackedRecord + Serialize + DeserializeOwned + Clone + Send + Sync,
    R::Key: Serialize,
    R::State: Serialize + DeserializeOwned,
{
    async fn find_by_key(&self, key: &R::Key) -> Result<Option<R>, StoreError> {
        let filter = key_filter(key)?;
        let doc = self
            .collection
            .find_one(filter)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        doc.map(|d| mongodb::bson::from_document(d).map_err(|e| StoreError::Backend(e.to_string())))
            .transpose()
    }

    async fn insert_if_absent(&self, record: R) -> Result<bool, StoreError> {
        let mut doc = mongodb::bson::to_document(&record)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        doc.insert("_id", to_bson(&record.key()).map_err(|e| StoreError::Backend(e.to_string()))?);
        match self.collection.insert_one(doc).await {
            Ok(_) => Ok(true),
            // Duplicate key on `_id` means a record already exists for this key.
            Err(e) if e.to_string().contains("E11000") => Ok(false),
            Err(e) => Err(StoreError::Backend(e.to_string())),
        }
    }

    async fn update_where(
        &self,
        key: &R::Key,
        expected_state: R::State,
        mutate: Box<dyn FnOnce(&mut R) + Send>,
    ) -> Result<bool, StoreError> {
        // Read-modify-write guarded by the exact document previously read,
        // not just its state field: the record types don't share a state
        // field name (`state` on `DepositRecord`, `settle_status` on
        // `SettlementRecord`), so the whole snapshot doubles as the
        // optimistic-concurrency filter `findOneAndUpdate` matches against.
        let filter = key_filter(key)?;
        let Some(snapshot) = self
            .collection
            .find_one(filter)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?
        else {
            return Ok(false);
        };
        let mut current: R = mongodb::bson::from_document(snapshot.clone())
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if current.state() != expected_state {
            return Ok(false);
        }
        mutate(&mut current);
        let new_doc =
            mongodb::bson::to_document(&current).map_err(|e| StoreError::Backend(e.to_string()))?;
        let result = self
            .collection
            .find_one_and_update(snapshot, doc! { "$set": new_doc })
            .with_options(FindOneAndUpdateOptions::default())
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(result.is_some())
    }

    async fn insert_or_get_by_key(&self, key: &R::Key, defaults: R) -> Result<R, StoreError> {
        if let Some(existing) = self.find_by_key(key).await? {
            return Ok(existing);
        }
        self.insert_if_absent(defaults.clone()).await?;
        Ok(defaults)
    }
}
