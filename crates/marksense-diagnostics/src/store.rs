// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Directory snapshot store: one `<event_id>.jpg` and `<event_id>.json` per
// failure, indexed in a journal database inside the same directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use marksense_core::{DiagnosticEvent, DiagnosticSink, OmrError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, instrument};

use crate::fingerprint::verify_fingerprint;
use crate::journal::{Journal, JournalEntry};

/// File name of the journal database inside the store directory.
pub const JOURNAL_FILE: &str = "journal.sqlite3";

/// Sidecar record written next to each snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Unix seconds.
    pub timestamp: i64,
    pub message: String,
    pub context: Map<String, Value>,
    pub image_file: String,
}

/// Paths written for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSnapshot {
    pub image_path: PathBuf,
    pub record_path: PathBuf,
}

/// Diagnostic sink persisting snapshots to a directory.
pub struct DirectorySink {
    dir: PathBuf,
    journal: Mutex<Journal>,
}

impl DirectorySink {
    /// Open (or create) a store rooted at `dir`.
    #[instrument(skip_all, fields(dir = %dir.as_ref().display()))]
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let journal = Journal::open(dir.join(JOURNAL_FILE))?;
        Ok(Self {
            dir,
            journal: Mutex::new(journal),
        })
    }

    /// Write the snapshot and its sidecar record, then journal the event.
    #[instrument(skip(self, event), fields(event_id = %event.event_id))]
    pub fn store(&self, event: &DiagnosticEvent) -> Result<StoredSnapshot> {
        let image_file = format!("{}.jpg", event.event_id);
        let image_path = self.dir.join(&image_file);
        let record_path = self.dir.join(format!("{}.json", event.event_id));

        fs::write(&image_path, &event.image_jpeg)?;
        let record = SnapshotRecord {
            timestamp: event.timestamp.timestamp(),
            message: event.message.clone(),
            context: event.context.clone(),
            image_file: image_file.clone(),
        };
        fs::write(&record_path, serde_json::to_vec_pretty(&record)?)?;

        self.journal().record(event, Some(&image_file))?;
        info!(path = %image_path.display(), "Diagnostic snapshot saved");
        Ok(StoredSnapshot {
            image_path,
            record_path,
        })
    }

    /// Read back a sidecar record.
    pub fn load_record(&self, event_id: &str) -> Result<SnapshotRecord> {
        let text = fs::read_to_string(self.dir.join(format!("{event_id}.json")))?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn recent(&self, limit: u32) -> Result<Vec<JournalEntry>> {
        self.journal().recent(limit)
    }

    /// Check a stored snapshot against the fingerprint taken when it was
    /// journaled.
    pub fn verify(&self, event_id: &str) -> Result<()> {
        let entry = self
            .journal()
            .find(event_id)?
            .ok_or_else(|| OmrError::Diagnostics(format!("no journaled event {event_id}")))?;
        let file = entry
            .image_file
            .ok_or_else(|| OmrError::Diagnostics(format!("event {event_id} has no snapshot file")))?;
        let data = fs::read(self.dir.join(file))?;
        verify_fingerprint(&data, &entry.image_sha256)
    }

    fn journal(&self) -> std::sync::MutexGuard<'_, Journal> {
        self.journal.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DiagnosticSink for DirectorySink {
    fn record(&self, event: &DiagnosticEvent) -> Result<()> {
        self.store(event).map(|_| ())
    }
}

impl std::fmt::Debug for DirectorySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectorySink").field("dir", &self.dir).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event() -> DiagnosticEvent {
        let mut context = Map::new();
        context.insert("anchors_found".into(), json!(2));
        context.insert("layout_version".into(), json!("v1"));
        DiagnosticEvent::new("Only 2 of the 4 corner markers were found.", context, vec![0xFF, 0xD8, 0xFF, 0xD9])
    }

    #[test]
    fn stores_snapshot_record_and_journal_row() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let sink = DirectorySink::open(tmp.path().join("debug")).expect("open store");
        let ev = event();
        let stored = sink.store(&ev).expect("store");

        assert_eq!(fs::read(&stored.image_path).expect("image"), ev.image_jpeg);
        let record = sink.load_record(&ev.event_id).expect("record");
        assert_eq!(record.image_file, format!("{}.jpg", ev.event_id));
        assert_eq!(record.timestamp, ev.timestamp.timestamp());
        assert_eq!(record.context["anchors_found"], 2);

        let recent = sink.recent(10).expect("recent");
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].event_id, ev.event_id);
        assert!(tmp.path().join("debug").join(JOURNAL_FILE).exists());
    }

    #[test]
    fn verify_detects_tampering() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let sink = DirectorySink::open(tmp.path()).expect("open store");
        let ev = event();
        let stored = sink.store(&ev).expect("store");
        sink.verify(&ev.event_id).expect("untouched snapshot verifies");

        fs::write(&stored.image_path, b"edited").expect("overwrite");
        assert!(matches!(
            sink.verify(&ev.event_id),
            Err(OmrError::IntegrityMismatch { .. })
        ));
        assert!(matches!(sink.verify("fail_0_unknown"), Err(OmrError::Diagnostics(_))));
    }

    #[test]
    fn works_as_a_shared_sink() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let sink: std::sync::Arc<dyn DiagnosticSink> =
            std::sync::Arc::new(DirectorySink::open(tmp.path()).expect("open store"));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let sink = std::sync::Arc::clone(&sink);
                std::thread::spawn(move || sink.record(&event()))
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread").expect("record");
        }
        let journal = Journal::open(tmp.path().join(JOURNAL_FILE)).expect("reopen");
        assert_eq!(journal.count().expect("count"), 4);
    }
}
