// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Marksense.
//
// Geometric rejections and ambiguous marks are not errors: they travel inside
// `ScanResult` as `RejectReason` / `ReviewReason`. This enum is reserved for
// malformed input and genuinely unexpected failures.

use thiserror::Error;

/// Top-level error type for all Marksense operations.
#[derive(Debug, Error)]
pub enum OmrError {
    // -- Input errors --
    #[error("image is empty or corrupt: {0}")]
    InvalidImage(String),

    #[error("invalid scan request: {0}")]
    InvalidRequest(String),

    // -- Layout errors --
    #[error("invalid layout {version}: {reason}")]
    Layout { version: String, reason: String },

    // -- Processing errors --
    #[error("image encoding failed: {0}")]
    ImageEncoding(String),

    // -- Diagnostics / persistence --
    #[error("diagnostic sink failed: {0}")]
    Diagnostics(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, OmrError>;
