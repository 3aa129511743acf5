//! In-memory entity store for testing, development, and replay targets.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{CortexError, Result};
use crate::model::{EntityRecord, ItemType};

use super::{decode_index_cursor, encode_index_cursor, EntityStore, QueryPage};

type RecordKey = (String, String);

#[derive(Default)]
struct StoreInner {
    /// Primary records keyed `(namespace, sort_key)`.
    records: BTreeMap<RecordKey, EntityRecord>,
    /// Secondary index keyed `(index_pk, index_sk, sort_key)` -> record key.
    index: BTreeMap<(String, String, String), RecordKey>,
}

impl StoreInner {
    fn drop_index_entry(&mut self, key: &RecordKey) {
        if let Some(existing) = self.records.get(key) {
            if let Some((pk, sk)) = existing.index_key() {
                self.index.remove(&(pk, sk, key.1.clone()));
            }
        }
    }

    fn insert(&mut self, record: &EntityRecord) {
        let key = (record.namespace().to_string(), record.sort_key());
        self.drop_index_entry(&key);
        if let Some((pk, sk)) = record.index_key() {
            self.index.insert((pk, sk, key.1.clone()), key.clone());
        }
        self.records.insert(key, record.clone());
    }
}

/// In-memory entity store backed by ordered maps.
///
/// Implements the full contract, including the conditional write and the
/// secondary index; replay runs use it as a fresh target store.
pub struct InMemoryEntityStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner::default())),
        }
    }

    /// Number of records currently held (all namespaces).
    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn put(&self, record: &EntityRecord) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.insert(record);
        Ok(())
    }

    async fn put_if_status(&self, record: &EntityRecord, expected_status: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let key = (record.namespace().to_string(), record.sort_key());

        let actual = match inner.records.get(&key) {
            Some(existing) => existing.status_label(),
            None => {
                return Err(CortexError::conflict(&key.1, expected_status, "<absent>"));
            }
        };

        if actual != expected_status {
            return Err(CortexError::conflict(&key.1, expected_status, &actual));
        }

        inner.insert(record);
        Ok(())
    }

    async fn get(&self, namespace: &str, sort_key: &str) -> Result<Option<EntityRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .get(&(namespace.to_string(), sort_key.to_string()))
            .cloned())
    }

    async fn query_prefix(
        &self,
        namespace: &str,
        item_type: ItemType,
        after: Option<&str>,
        limit: usize,
    ) -> Result<QueryPage> {
        let prefix = item_type.sort_prefix();
        let start = match after {
            // Resume strictly after the cursor.
            Some(cursor) => format!("{}\u{0}", cursor),
            None => prefix.to_string(),
        };

        let inner = self.inner.read().await;
        let mut items = Vec::new();
        let range_start = (namespace.to_string(), start);
        for ((ns, sk), record) in inner.records.range(range_start..) {
            if ns != namespace || !sk.starts_with(prefix) {
                break;
            }
            items.push(record.clone());
            if items.len() >= limit {
                break;
            }
        }

        let next = if items.len() >= limit {
            items.last().map(|r| r.sort_key())
        } else {
            None
        };
        Ok(QueryPage { items, next })
    }

    async fn query_index(
        &self,
        index_partition: &str,
        after: Option<&str>,
        limit: usize,
    ) -> Result<QueryPage> {
        let (start_sk, start_record) = match after {
            Some(cursor) => {
                let (sk, record) = decode_index_cursor(cursor);
                (sk, format!("{}\u{0}", record))
            }
            None => (String::new(), String::new()),
        };

        let inner = self.inner.read().await;
        let mut items = Vec::new();
        let mut last_cursor = None;
        let range_start = (index_partition.to_string(), start_sk, start_record);
        for ((pk, sk, _), record_key) in inner.index.range(range_start..) {
            if pk != index_partition {
                break;
            }
            if let Some(record) = inner.records.get(record_key) {
                last_cursor = Some(encode_index_cursor(sk, &record_key.1));
                items.push(record.clone());
                if items.len() >= limit {
                    break;
                }
            }
        }

        let next = if items.len() >= limit { last_cursor } else { None };
        Ok(QueryPage { items, next })
    }

    async fn purge_expired(&self, namespace: &str, now: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.write().await;
        let expired: Vec<RecordKey> = inner
            .records
            .iter()
            .filter(|((ns, _), record)| {
                ns == namespace
                    && matches!(record, EntityRecord::Message(m) if m.expires_at < now)
            })
            .map(|(key, _)| key.clone())
            .collect();

        let count = expired.len() as u64;
        for key in expired {
            inner.drop_index_entry(&key);
            inner.records.remove(&key);
        }
        Ok(count)
    }
}
