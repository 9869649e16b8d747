// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Diagnostic journal: append-only SQLite index of failure events.
//
// Schema:
//   diagnostic_events(
//     id            INTEGER PRIMARY KEY AUTOINCREMENT,
//     event_id      TEXT    NOT NULL UNIQUE,  -- fail_<unix>_<hex>
//     timestamp     TEXT    NOT NULL,         -- RFC 3339
//     message       TEXT    NOT NULL,
//     context       TEXT    NOT NULL,         -- JSON object
//     image_file    TEXT,                     -- snapshot file name, if stored
//     image_sha256  TEXT    NOT NULL,
//     image_bytes   INTEGER NOT NULL
//   )

use std::path::Path;

use marksense_core::{DiagnosticEvent, OmrError, Result};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::fingerprint::fingerprint;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS diagnostic_events (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id      TEXT    NOT NULL UNIQUE,
    timestamp     TEXT    NOT NULL,
    message       TEXT    NOT NULL,
    context       TEXT    NOT NULL,
    image_file    TEXT,
    image_sha256  TEXT    NOT NULL,
    image_bytes   INTEGER NOT NULL
);";

const COLUMNS: &str = "id, event_id, timestamp, message, context, image_file, image_sha256, image_bytes";

fn db_err(e: rusqlite::Error) -> OmrError {
    OmrError::Database(e.to_string())
}

/// One journaled failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: i64,
    pub event_id: String,
    pub timestamp: String,
    pub message: String,
    pub context: Map<String, Value>,
    pub image_file: Option<String>,
    pub image_sha256: String,
    pub image_bytes: u64,
}

impl JournalEntry {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let context: String = row.get(4)?;
        Ok(Self {
            id: row.get(0)?,
            event_id: row.get(1)?,
            timestamp: row.get(2)?,
            message: row.get(3)?,
            context: serde_json::from_str(&context)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?,
            image_file: row.get(5)?,
            image_sha256: row.get(6)?,
            image_bytes: row.get::<_, i64>(7)? as u64,
        })
    }
}

/// Append-only journal of diagnostic events backed by SQLite.
pub struct Journal {
    conn: Connection,
}

impl Journal {
    /// Open (or create) the journal database at `path` in WAL mode.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;").map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        debug!("diagnostic journal opened");
        Ok(Self { conn })
    }

    /// In-memory journal, for tests and throwaway sessions.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self { conn })
    }

    /// Append `event`. The snapshot is fingerprinted from `event.image_jpeg`;
    /// `image_file` names where it was written, if anywhere. Returns the row id.
    #[instrument(skip(self, event), fields(event_id = %event.event_id, image_bytes = event.image_jpeg.len()))]
    pub fn record(&self, event: &DiagnosticEvent, image_file: Option<&str>) -> Result<i64> {
        let context = serde_json::to_string(&event.context)?;
        self.conn
            .execute(
                "INSERT INTO diagnostic_events
                    (event_id, timestamp, message, context, image_file, image_sha256, image_bytes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    event.event_id,
                    event.timestamp.to_rfc3339(),
                    event.message,
                    context,
                    image_file,
                    fingerprint(&event.image_jpeg),
                    event.image_jpeg.len() as i64,
                ],
            )
            .map_err(db_err)?;
        debug!("diagnostic event journaled");
        Ok(self.conn.last_insert_rowid())
    }

    /// Look up one event by its id.
    pub fn find(&self, event_id: &str) -> Result<Option<JournalEntry>> {
        self.conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM diagnostic_events WHERE event_id = ?1"),
                params![event_id],
                JournalEntry::from_row,
            )
            .optional()
            .map_err(db_err)
    }

    /// The most recent `limit` events, newest first.
    pub fn recent(&self, limit: u32) -> Result<Vec<JournalEntry>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM diagnostic_events ORDER BY id DESC LIMIT ?1"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![limit], JournalEntry::from_row)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    pub fn count(&self) -> Result<u64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM diagnostic_events", [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn journal() -> Journal {
        Journal::open_in_memory().expect("open in-memory journal")
    }

    fn event(message: &str) -> DiagnosticEvent {
        let mut context = Map::new();
        context.insert("anchors_found".into(), json!(3));
        DiagnosticEvent::new(message, context, b"jpeg bytes".to_vec())
    }

    #[test]
    fn record_and_count() {
        let journal = journal();
        assert_eq!(journal.count().expect("count"), 0);
        journal.record(&event("first"), Some("a.jpg")).expect("record");
        journal.record(&event("second"), None).expect("record");
        assert_eq!(journal.count().expect("count"), 2);
    }

    #[test]
    fn find_returns_stored_fields() {
        let journal = journal();
        let ev = event("only three anchors");
        journal.record(&ev, Some("x.jpg")).expect("record");

        let entry = journal.find(&ev.event_id).expect("query").expect("present");
        assert_eq!(entry.message, "only three anchors");
        assert_eq!(entry.context["anchors_found"], 3);
        assert_eq!(entry.image_file.as_deref(), Some("x.jpg"));
        assert_eq!(entry.image_sha256, fingerprint(b"jpeg bytes"));
        assert_eq!(entry.image_bytes, 10);
        assert!(journal.find("fail_0_missing").expect("query").is_none());
    }

    #[test]
    fn recent_is_newest_first() {
        let journal = journal();
        for i in 0..5 {
            journal.record(&event(&format!("event {i}")), None).expect("record");
        }
        let recent = journal.recent(3).expect("recent");
        assert_eq!(recent.len(), 3);
        assert!(recent[0].id > recent[1].id && recent[1].id > recent[2].id);
        assert_eq!(recent[0].message, "event 4");
    }

    #[test]
    fn duplicate_event_ids_are_refused() {
        let journal = journal();
        let ev = event("dup");
        journal.record(&ev, None).expect("record");
        assert!(matches!(journal.record(&ev, None), Err(OmrError::Database(_))));
    }

    #[test]
    fn unreadable_context_is_an_error() {
        let journal = journal();
        journal
            .conn
            .execute(
                "INSERT INTO diagnostic_events
                    (event_id, timestamp, message, context, image_file, image_sha256, image_bytes)
                 VALUES ('fail_1_bad', '2026-01-01T00:00:00+00:00', 'm', '{not json', NULL, '', 0)",
                [],
            )
            .expect("insert raw row");
        assert!(matches!(journal.find("fail_1_bad"), Err(OmrError::Database(_))));
        assert!(matches!(journal.recent(5), Err(OmrError::Database(_))));
    }
}
