//! Event log persisted as a single JSON document.
//!
//! Layout: `{ "format": 1, "events": [ StoredEvent, ... ] }`. Every append
//! rewrites the document through a sibling temp file (write, `sync_all`,
//! rename), so the file on disk is always a complete log.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use stockroom_core::{AggregateId, ExpectedVersion, StoreId};

use super::in_memory::EventLog;
use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// Document format written by this version.
pub const LOG_FORMAT: u32 = 1;

#[derive(Serialize)]
struct LogDocumentRef<'a> {
    format: u32,
    events: &'a [StoredEvent],
}

#[derive(Deserialize)]
struct LogDocument {
    format: u32,
    events: Vec<StoredEvent>,
}

/// Durable event store backed by one JSON file.
#[derive(Debug)]
pub struct JsonFileEventStore {
    path: PathBuf,
    log: RwLock<EventLog>,
}

impl JsonFileEventStore {
    /// Open the log at `path`. A missing file is an empty log; an unreadable
    /// or malformed one is an error and is left untouched.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, EventStoreError> {
        let path = path.into();
        let log = match fs::read_to_string(&path) {
            Ok(contents) => Self::parse(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no event log yet, starting empty");
                EventLog::default()
            }
            Err(e) => return Err(EventStoreError::Io(e)),
        };

        tracing::debug!(
            path = %path.display(),
            events = log.events().len(),
            "event log opened"
        );
        Ok(Self {
            path,
            log: RwLock::new(log),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(contents: &str) -> Result<EventLog, EventStoreError> {
        let doc: LogDocument = serde_json::from_str(contents)
            .map_err(|e| EventStoreError::Corrupt(format!("malformed log document: {e}")))?;
        if doc.format != LOG_FORMAT {
            return Err(EventStoreError::Corrupt(format!(
                "unsupported log format {} (expected {LOG_FORMAT})",
                doc.format
            )));
        }
        EventLog::from_events(doc.events)
    }

    fn write_document(&self, events: &[StoredEvent]) -> Result<(), EventStoreError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let bytes = serde_json::to_vec(&LogDocumentRef {
            format: LOG_FORMAT,
            events,
        })
        .map_err(|e| EventStoreError::InvalidAppend(format!("log serialization failed: {e}")))?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.as_file_mut().write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| EventStoreError::Io(e.error))?;
        Ok(())
    }
}

impl EventStore for JsonFileEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let mut log = self
            .log
            .write()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;

        let committed = log.prepare(events, expected_version)?;
        if committed.is_empty() {
            return Ok(committed);
        }

        // Persist first; memory only moves once the document is on disk.
        let mut next = Vec::with_capacity(log.events().len() + committed.len());
        next.extend_from_slice(log.events());
        next.extend_from_slice(&committed);
        if let Err(e) = self.write_document(&next) {
            tracing::error!(path = %self.path.display(), error = %e, "event log write failed");
            return Err(e);
        }

        log.commit(&committed);
        Ok(committed)
    }

    fn load_stream(
        &self,
        store_id: StoreId,
        aggregate_type: &str,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let log = self
            .log
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;
        Ok(log.stream(store_id, aggregate_type, aggregate_id))
    }

    fn load_all(&self) -> Result<Vec<StoredEvent>, EventStoreError> {
        let log = self
            .log
            .read()
            .map_err(|_| EventStoreError::InvalidAppend("lock poisoned".to_string()))?;
        Ok(log.events().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn event(store_id: StoreId, aggregate_id: AggregateId, n: u32) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            store_id,
            aggregate_id,
            aggregate_type: "inventory.stock".to_string(),
            event_type: "inventory.stock.entered".to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: json!({ "n": n }),
        }
    }

    #[test]
    fn missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileEventStore::open(dir.path().join("nested").join("log.json")).unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn appended_events_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        let store_id = StoreId::new();
        let id = AggregateId::new();

        {
            let store = JsonFileEventStore::open(&path).unwrap();
            store.append(vec![event(store_id, id, 1)], ExpectedVersion::Exact(0)).unwrap();
            store.append(vec![event(store_id, id, 2)], ExpectedVersion::Exact(1)).unwrap();
        }

        let reopened = JsonFileEventStore::open(&path).unwrap();
        let stream = reopened.load_stream(store_id, "inventory.stock", id).unwrap();
        assert_eq!(stream.len(), 2);
        assert_eq!(stream[1].payload, json!({ "n": 2 }));
        assert_eq!(stream[1].sequence_number, 2);

        let err = reopened
            .append(vec![event(store_id, id, 3)], ExpectedVersion::Exact(1))
            .unwrap_err();
        assert!(matches!(err, EventStoreError::Concurrency(_)));
    }

    #[test]
    fn document_carries_format_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        let store = JsonFileEventStore::open(&path).unwrap();
        store.append(vec![event(StoreId::new(), AggregateId::new(), 1)], ExpectedVersion::Any).unwrap();

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["format"], json!(1));
        assert_eq!(raw["events"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn corrupt_file_is_an_error_and_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        fs::write(&path, "{ not json").unwrap();

        let err = JsonFileEventStore::open(&path).unwrap_err();
        assert!(matches!(err, EventStoreError::Corrupt(_)));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn unknown_format_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        fs::write(&path, r#"{ "format": 99, "events": [] }"#).unwrap();

        assert!(matches!(
            JsonFileEventStore::open(&path).unwrap_err(),
            EventStoreError::Corrupt(_)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn failed_write_leaves_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        let store = JsonFileEventStore::open(sub.join("log.json")).unwrap();
        // The parent "directory" becomes a regular file, so every write fails.
        fs::write(&sub, "").unwrap();

        let store_id = StoreId::new();
        let id = AggregateId::new();
        assert!(store.append(vec![event(store_id, id, 1)], ExpectedVersion::Exact(0)).is_err());
        assert!(store.load_all().unwrap().is_empty());
    }
}
