// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Quality gate for readable scans: ok or needs-review, with reasons.

use marksense_core::config::GatePolicy;
use marksense_core::scan::mean;
use marksense_core::{Quality, QuestionResult, ReviewReason, StatusCounts};
use tracing::debug;

/// Verdict for a sheet whose geometry was accepted. Reasons are reported in
/// a fixed order: invalid marks, too many ambiguous, low confidence.
pub fn gate(questions: &[QuestionResult], policy: &GatePolicy) -> (Quality, Vec<ReviewReason>) {
    let counts = StatusCounts::tally(questions);
    let confidences: Vec<f32> = questions.iter().map(|q| q.confidence).collect();
    let avg = mean(&confidences);

    let mut reasons = Vec::new();
    if counts.invalid > 0 {
        reasons.push(ReviewReason::InvalidMarks);
    }
    if counts.ambiguous > policy.max_ambiguous {
        reasons.push(ReviewReason::TooManyAmbiguous);
    }
    if avg < policy.min_avg_confidence {
        reasons.push(ReviewReason::LowConfidence);
    }

    let quality = if reasons.is_empty() {
        Quality::Ok
    } else {
        Quality::NeedsReview
    };
    debug!(?counts, avg, ?quality, "Quality gate");
    (quality, reasons)
}
