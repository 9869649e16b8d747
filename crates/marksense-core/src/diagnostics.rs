// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Diagnostic sink collaborator. Failing captures are offered here for
// offline triage. Recording is best-effort and never part of a scan's result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::Result;

/// A failing capture plus structured context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    /// Timestamp-derived key, `fail_<unix-seconds>_<8 hex>`.
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub context: Map<String, Value>,
    /// JPEG-encoded capture.
    #[serde(skip)]
    pub image_jpeg: Vec<u8>,
}

impl DiagnosticEvent {
    pub fn new(message: impl Into<String>, context: Map<String, Value>, image_jpeg: Vec<u8>) -> Self {
        let timestamp = Utc::now();
        let suffix = Uuid::new_v4().simple().to_string();
        Self {
            event_id: format!("fail_{}_{}", timestamp.timestamp(), &suffix[..8]),
            timestamp,
            message: message.into(),
            context,
            image_jpeg,
        }
    }
}

/// Persistence collaborator for failure snapshots.
pub trait DiagnosticSink: Send + Sync {
    /// Store one event. Errors are logged by the caller and otherwise ignored.
    fn record(&self, event: &DiagnosticEvent) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ids_are_timestamp_keyed_and_unique() {
        let a = DiagnosticEvent::new("a", Map::new(), Vec::new());
        let b = DiagnosticEvent::new("b", Map::new(), Vec::new());
        assert!(a.event_id.starts_with(&format!("fail_{}", a.timestamp.timestamp())));
        assert_eq!(a.event_id.len(), b.event_id.len());
        assert_ne!(a.event_id, b.event_id);
    }
}
