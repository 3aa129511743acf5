//! Filesystem journal backend.
//!
//! Records are laid out `<root>/<namespace>/<YYYY>/<MM>/<DD>/
//! <timestamp>_<message_id>.json`, one immutable JSON payload per file,
//! so a day's raw events can be inspected (or shipped elsewhere) with
//! ordinary tools. File names sort chronologically within a day.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{CortexError, Result};

use super::{key_timestamp, DurableJournal, JournalRef, RawEvent, TimeRange};

/// Compact, lexicographically sortable timestamp used in file names.
const FILE_TS_FORMAT: &str = "%Y%m%dT%H%M%S%6fZ";

/// Filesystem-backed durable journal.
pub struct FileJournal {
    root: PathBuf,
}

impl FileJournal {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn day_dir(&self, namespace: &str, date: NaiveDate) -> PathBuf {
        self.root
            .join(namespace)
            .join(format!("{:04}", date.year()))
            .join(format!("{:02}", date.month()))
            .join(format!("{:02}", date.day()))
    }

    fn path_for(&self, reference: &JournalRef) -> Result<PathBuf> {
        let ts = key_timestamp(&reference.key).ok_or_else(|| {
            CortexError::internal(format!("malformed journal key: {}", reference.key))
        })?;
        let file = file_name_for_key(&reference.key).ok_or_else(|| {
            CortexError::internal(format!("malformed journal key: {}", reference.key))
        })?;
        Ok(self.day_dir(&reference.namespace, ts.date_naive()).join(file))
    }

    async fn sorted_entries(dir: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Dates that have a directory for this namespace, ascending.
    async fn existing_days(&self, namespace: &str) -> Result<Vec<NaiveDate>> {
        let mut days = Vec::new();
        let ns_dir = self.root.join(namespace);
        for year in Self::sorted_entries(&ns_dir).await? {
            let Ok(y) = year.parse::<i32>() else { continue };
            for month in Self::sorted_entries(&ns_dir.join(&year)).await? {
                let Ok(m) = month.parse::<u32>() else { continue };
                for day in Self::sorted_entries(&ns_dir.join(&year).join(&month)).await? {
                    let Ok(d) = day.parse::<u32>() else { continue };
                    if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                        days.push(date);
                    }
                }
            }
        }
        Ok(days)
    }
}

#[async_trait]
impl DurableJournal for FileJournal {
    async fn append(&self, event: &RawEvent) -> Result<JournalRef> {
        let reference = event.journal_ref();
        let bytes = event.to_bytes()?;
        let path = self.path_for(&reference)?;

        if let Ok(existing) = tokio::fs::read(&path).await {
            if existing != bytes {
                return Err(CortexError::journal_immutable(&reference.key));
            }
            return Ok(reference);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write-then-rename so a crashed append never leaves a partial record.
        let tmp = path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &path).await?;

        Ok(reference)
    }

    async fn read(&self, reference: &JournalRef) -> Result<Vec<u8>> {
        let path = self.path_for(reference)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(CortexError::not_found("journal_record", reference.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(
        &self,
        namespace: &str,
        range: TimeRange,
        after: Option<&JournalRef>,
        limit: usize,
    ) -> Result<Vec<JournalRef>> {
        let after_key = after.map(|r| r.key.as_str());
        let floor_date = [
            range.start.map(|t| t.date_naive()),
            after.and_then(|r| key_timestamp(&r.key)).map(|t| t.date_naive()),
        ]
        .into_iter()
        .flatten()
        .max();
        let ceil_date = range.end.map(|t| t.date_naive());

        let mut refs = Vec::new();
        for date in self.existing_days(namespace).await? {
            if floor_date.is_some_and(|floor| date < floor) {
                continue;
            }
            if ceil_date.is_some_and(|ceil| date > ceil) {
                break;
            }

            for name in Self::sorted_entries(&self.day_dir(namespace, date)).await? {
                let Some(key) = key_for_file_name(&name) else {
                    continue;
                };
                if after_key.is_some_and(|cursor| key.as_str() <= cursor) {
                    continue;
                }
                match key_timestamp(&key) {
                    Some(ts) if range.contains(ts) => {}
                    _ => continue,
                }
                refs.push(JournalRef::from_key(namespace, key));
                if refs.len() >= limit {
                    return Ok(refs);
                }
            }
        }
        Ok(refs)
    }
}

/// `<timestamp>#<id>` -> `<compact_timestamp>_<id>.json`
fn file_name_for_key(key: &str) -> Option<String> {
    let (_, id) = key.split_once('#')?;
    let ts = key_timestamp(key)?;
    Some(format!("{}_{}.json", ts.format(FILE_TS_FORMAT), id))
}

/// `<compact_timestamp>_<id>.json` -> `<timestamp>#<id>`
fn key_for_file_name(name: &str) -> Option<String> {
    let stem = name.strip_suffix(".json")?;
    let (ts_part, id_part) = stem.split_once('_')?;
    let id: Uuid = id_part.parse().ok()?;
    let naive = NaiveDateTime::parse_from_str(ts_part, FILE_TS_FORMAT).ok()?;
    let ts: DateTime<Utc> = DateTime::from_naive_utc_and_offset(naive, Utc);
    Some(
        JournalRef::new("", ts, id).key,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn event(namespace: &str, text: &str, at: DateTime<Utc>) -> RawEvent {
        RawEvent::new(namespace, Uuid::new_v4(), at, text, "test")
    }

    #[test]
    fn test_file_name_round_trip() {
        let now = Utc::now();
        let reference = JournalRef::new("ns1", now, Uuid::new_v4());
        let name = file_name_for_key(&reference.key).unwrap();
        let key = key_for_file_name(&name).unwrap();
        assert_eq!(key, reference.key);
    }

    #[tokio::test]
    async fn test_append_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let journal = FileJournal::new(dir.path());
        let event = event("ns1", "buy milk tomorrow", Utc::now());

        let reference = journal.append(&event).await.unwrap();
        let bytes = journal.read(&reference).await.unwrap();
        assert_eq!(bytes, event.to_bytes().unwrap());
        assert_eq!(journal.read_event(&reference).await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_append_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let journal = FileJournal::new(dir.path());
        let mut event = event("ns1", "buy milk", Utc::now());

        journal.append(&event).await.unwrap();
        journal.append(&event).await.unwrap();

        event.raw_text = "something else".to_string();
        assert!(journal.append(&event).await.is_err());
    }

    #[tokio::test]
    async fn test_list_across_days() {
        let dir = TempDir::new().unwrap();
        let journal = FileJournal::new(dir.path());
        let base = Utc::now();

        for i in 0..3 {
            journal
                .append(&event("ns1", &format!("day {}", i), base + Duration::days(i)))
                .await
                .unwrap();
        }

        let refs = journal
            .list("ns1", TimeRange::all(), None, 10)
            .await
            .unwrap();
        assert_eq!(refs.len(), 3);
        let keys: Vec<_> = refs.iter().map(|r| r.key.clone()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[tokio::test]
    async fn test_list_restartable_from_cursor() {
        let dir = TempDir::new().unwrap();
        let journal = FileJournal::new(dir.path());
        let base = Utc::now();

        for i in 0..5 {
            journal
                .append(&event("ns1", &format!("note {}", i), base + Duration::seconds(i)))
                .await
                .unwrap();
        }

        let first = journal
            .list("ns1", TimeRange::all(), None, 2)
            .await
            .unwrap();
        let rest = journal
            .list("ns1", TimeRange::all(), first.last(), 10)
            .await
            .unwrap();
        assert_eq!(first.len() + rest.len(), 5);
        assert!(rest.iter().all(|r| r.key > first.last().unwrap().key));
    }

    #[tokio::test]
    async fn test_list_prunes_by_range() {
        let dir = TempDir::new().unwrap();
        let journal = FileJournal::new(dir.path());
        let base = Utc::now();

        for i in 0..4 {
            journal
                .append(&event("ns1", &format!("note {}", i), base + Duration::hours(i)))
                .await
                .unwrap();
        }

        let range = TimeRange::between(base + Duration::hours(1), base + Duration::hours(3));
        let refs = journal.list("ns1", range, None, 10).await.unwrap();
        assert_eq!(refs.len(), 2);
    }
}
