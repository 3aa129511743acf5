//! In-memory journal for testing, development, and replay fixtures.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{CortexError, Result};

use super::{key_timestamp, DurableJournal, JournalRef, RawEvent, TimeRange};

/// In-memory journal backed by an ordered map.
pub struct InMemoryJournal {
    /// Records keyed `(namespace, key)`; BTreeMap iteration gives the
    /// ascending time order the contract requires.
    records: Arc<RwLock<BTreeMap<(String, String), Vec<u8>>>>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryJournal {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableJournal for InMemoryJournal {
    async fn append(&self, event: &RawEvent) -> Result<JournalRef> {
        let reference = event.journal_ref();
        let bytes = event.to_bytes()?;
        let map_key = (reference.namespace.clone(), reference.key.clone());

        let mut records = self.records.write().await;
        if let Some(existing) = records.get(&map_key) {
            if *existing != bytes {
                return Err(CortexError::journal_immutable(&reference.key));
            }
            return Ok(reference);
        }
        records.insert(map_key, bytes);
        Ok(reference)
    }

    async fn read(&self, reference: &JournalRef) -> Result<Vec<u8>> {
        let records = self.records.read().await;
        records
            .get(&(reference.namespace.clone(), reference.key.clone()))
            .cloned()
            .ok_or_else(|| CortexError::not_found("journal_record", reference.to_string()))
    }

    async fn list(
        &self,
        namespace: &str,
        range: TimeRange,
        after: Option<&JournalRef>,
        limit: usize,
    ) -> Result<Vec<JournalRef>> {
        let start_key = match after {
            // Resume strictly after the cursor.
            Some(reference) => format!("{}\u{0}", reference.key),
            None => String::new(),
        };

        let records = self.records.read().await;
        let mut refs = Vec::new();
        let range_start = (namespace.to_string(), start_key);
        for ((ns, key), _) in records.range(range_start..) {
            if ns != namespace {
                break;
            }
            if let Some(ts) = key_timestamp(key) {
                if let Some(end) = range.end {
                    if ts >= end {
                        break;
                    }
                }
                if !range.contains(ts) {
                    continue;
                }
            }
            refs.push(JournalRef::from_key(namespace, key.clone()));
            if refs.len() >= limit {
                break;
            }
        }
        Ok(refs)
    }
}
