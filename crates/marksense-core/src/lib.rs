// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Marksense: core types, configuration and error definitions shared across
// all crates.

pub mod answers;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod human_errors;
pub mod layout;
pub mod scan;
pub mod types;

pub use answers::{AnswerKey, Grade};
pub use config::EngineConfig;
pub use diagnostics::{DiagnosticEvent, DiagnosticSink};
pub use error::{OmrError, Result};
pub use layout::LayoutSpec;
pub use scan::{ImageInput, PreviewResult, ScanRequest, ScanResult};
pub use types::*;
