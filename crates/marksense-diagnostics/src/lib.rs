// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// marksense-diagnostics: persistence for failing captures.
//
// `DirectorySink` implements the engine's `DiagnosticSink`: each failure is
// written as a JPEG snapshot plus a JSON sidecar and indexed in an
// append-only SQLite journal with the snapshot's SHA-256 fingerprint.

pub mod fingerprint;
pub mod journal;
pub mod store;

pub use fingerprint::{fingerprint, verify_fingerprint};
pub use journal::{Journal, JournalEntry};
pub use store::{DirectorySink, SnapshotRecord, StoredSnapshot};
