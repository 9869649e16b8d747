// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plain-language failure messages for the person holding the camera.
//
// Every rejection and error maps to a short message plus one concrete thing
// to try. The message is what a failed `ScanResult` carries in `error`.

use crate::error::OmrError;
use crate::types::RejectReason;

/// Severity of a failure from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Taking the photo again will probably work.
    Recapture,
    /// The input or setup has to change first.
    ActionRequired,
    /// Not something the user can fix.
    Internal,
}

/// A human-readable failure with an actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    pub severity: Severity,
}

impl HumanError {
    fn recapture(message: String, suggestion: &str) -> Self {
        Self {
            message,
            suggestion: suggestion.into(),
            severity: Severity::Recapture,
        }
    }

    /// Message and suggestion joined into one line.
    pub fn to_line(&self) -> String {
        format!("{} {}", self.message, self.suggestion)
    }
}

/// Explain a geometric rejection.
pub fn humanize_reject(reason: &RejectReason) -> HumanError {
    match reason {
        RejectReason::AnchorsNotFound { found } => HumanError::recapture(
            format!("Only {found} of the 4 corner markers were found."),
            "Align the four black markers with the corners of the frame and keep the whole sheet in view.",
        ),
        RejectReason::DegenerateQuadrilateral => HumanError::recapture(
            "The corner markers don't form a usable shape.".into(),
            "Hold the phone directly above the sheet and make sure nothing covers a corner.",
        ),
        RejectReason::Skewed { ratio } => HumanError::recapture(
            format!("The sheet is photographed at too steep an angle (edge ratio {ratio:.2})."),
            "Hold the phone parallel to the sheet, not tilted.",
        ),
        RejectReason::AlignmentInvalid { passing } => HumanError::recapture(
            format!("The sheet couldn't be straightened reliably ({passing} of 4 corners confirmed)."),
            "Lay the sheet flat, avoid shadows over the corners and try again.",
        ),
    }
}

/// Explain an error.
pub fn humanize_error(err: &OmrError) -> HumanError {
    match err {
        OmrError::InvalidImage(_) => HumanError {
            message: "The photo couldn't be read.".into(),
            suggestion: "It may be empty or in an unusual format. Take the photo again as a JPEG or PNG.".into(),
            severity: Severity::Recapture,
        },

        OmrError::InvalidRequest(detail) => HumanError {
            message: "The scan request is incomplete.".into(),
            suggestion: format!("Check the number of questions and the sheet version. ({detail})"),
            severity: Severity::ActionRequired,
        },

        OmrError::Layout { version, .. } => HumanError {
            message: format!("The answer sheet version \"{version}\" is not set up correctly."),
            suggestion: "Ask an administrator to check the layout file for this sheet.".into(),
            severity: Severity::ActionRequired,
        },

        OmrError::IntegrityMismatch { .. } => HumanError {
            message: "A stored snapshot has changed since it was saved.".into(),
            suggestion: "The copy on disk doesn't match its fingerprint. Don't rely on it for review.".into(),
            severity: Severity::ActionRequired,
        },

        OmrError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => HumanError {
            message: "A file couldn't be found.".into(),
            suggestion: "It may have been moved or deleted. Check the path and try again.".into(),
            severity: Severity::ActionRequired,
        },

        OmrError::ImageEncoding(_)
        | OmrError::Diagnostics(_)
        | OmrError::Database(_)
        | OmrError::Io(_)
        | OmrError::Serialization(_) => HumanError {
            message: "Something went wrong while reading the sheet.".into(),
            suggestion: "Try again. If this keeps happening, please report it.".into(),
            severity: Severity::Internal,
        },
    }
}
