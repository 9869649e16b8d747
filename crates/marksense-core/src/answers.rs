// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Answer keys and grading of a scan against one.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{OmrError, Result};
use crate::scan::ScanResult;

/// Expected answers, one entry per question. `None` marks a question that is
/// not graded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerKey(pub Vec<Option<String>>);

/// Outcome of comparing a scan with an answer key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub correct: usize,
    /// Questions present in both the key and the scan.
    pub compared: usize,
    /// `correct / compared`, zero when nothing was compared.
    pub fraction: f32,
}

impl AnswerKey {
    /// Parse a key given as a JSON array, a comma-separated list or a single
    /// token. Blank input yields an empty key.
    pub fn parse(raw: &str) -> Result<Self> {
        let s = raw.trim();
        if s.is_empty() {
            return Ok(Self::default());
        }
        if s.starts_with('[') {
            if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(s) {
                return items.iter().map(json_entry).collect::<Result<Vec<_>>>().map(Self);
            }
        }
        if s.contains(',') {
            return Ok(Self(s.split(',').map(token).collect()));
        }
        Ok(Self(vec![token(s)]))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Count matches over the prefix shared by the key and the scan's answers.
    pub fn compare(&self, result: &ScanResult) -> Grade {
        let compared = self.0.len().min(result.answers.len());
        let correct = self
            .0
            .iter()
            .zip(&result.answers)
            .filter(|(expected, got)| expected.is_some() && expected == got)
            .count();
        let fraction = if compared > 0 {
            correct as f32 / compared as f32
        } else {
            0.0
        };
        Grade {
            correct,
            compared,
            fraction,
        }
    }
}

fn token(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_uppercase())
}

fn json_entry(v: &Value) -> Result<Option<String>> {
    match v {
        Value::Null => Ok(None),
        Value::String(s) => Ok(token(s)),
        Value::Number(n) => Ok(token(&n.to_string())),
        other => Err(OmrError::InvalidRequest(format!(
            "answer key entry must be a string, got {other}"
        ))),
    }
}
