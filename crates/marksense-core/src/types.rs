// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Marksense OMR engine.

use serde::{Deserialize, Serialize};

/// Corner quadrant of the sheet a fiducial belongs to, in clockwise order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

impl Corner {
    /// All four corners, clockwise from top-left.
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomRight,
        Corner::BottomLeft,
    ];

    /// Classify a point against the image midpoint.
    pub fn of_point(x: f32, y: f32, width: f32, height: f32) -> Self {
        let left = x < width / 2.0;
        let top = y < height / 2.0;
        match (left, top) {
            (true, true) => Self::TopLeft,
            (false, true) => Self::TopRight,
            (false, false) => Self::BottomRight,
            (true, false) => Self::BottomLeft,
        }
    }
}

/// A fiducial mark located in source-image pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub x: f32,
    pub y: f32,
    /// Shape score of the winning candidate (circularity or the quadrilateral score).
    pub score: f32,
    pub corner: Corner,
}

impl Anchor {
    /// Rescale the anchor position, e.g. from working resolution back to the
    /// full-resolution capture.
    pub fn scaled(self, sx: f32, sy: f32) -> Self {
        Self {
            x: self.x * sx,
            y: self.y * sy,
            ..self
        }
    }
}

/// Pixel rectangle in canonical space. `x2`/`y2` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl CellRect {
    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Density measurements for one option of one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BubbleSample {
    /// Option label, e.g. `"C"`.
    pub option: String,
    /// Foreground fraction inside the central disc.
    pub fill: f32,
    /// Foreground fraction inside the surrounding annulus.
    pub background: f32,
    /// `max(0, fill - background)`.
    pub score: f32,
    /// Sampled rectangle, kept for audit rendering.
    pub rect: CellRect,
}

impl BubbleSample {
    pub fn new(option: impl Into<String>, fill: f32, background: f32, rect: CellRect) -> Self {
        Self {
            option: option.into(),
            fill,
            background,
            score: (fill - background).max(0.0),
            rect,
        }
    }
}

/// Per-question classification outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    /// Nothing resembles a mark.
    Blank,
    /// One clear mark.
    Valid,
    /// One mark with a faint contender too close in score.
    Ambiguous,
    /// Two or more options look genuinely filled.
    Invalid,
}

impl QuestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blank => "blank",
            Self::Valid => "valid",
            Self::Ambiguous => "ambiguous",
            Self::Invalid => "invalid",
        }
    }
}

/// A classified question. Immutable once produced by the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResult {
    /// Zero-based question index.
    pub index: usize,
    pub samples: Vec<BubbleSample>,
    pub status: QuestionStatus,
    /// Index into `samples` of the chosen option, if any.
    pub chosen: Option<usize>,
    /// Confidence in [0, 1].
    pub confidence: f32,
}

impl QuestionResult {
    /// Label of the chosen option.
    pub fn answer(&self) -> Option<&str> {
        self.chosen
            .and_then(|idx| self.samples.get(idx))
            .map(|sample| sample.option.as_str())
    }
}

/// Aggregate status counts across a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub valid: usize,
    pub blank: usize,
    pub invalid: usize,
    pub ambiguous: usize,
}

impl StatusCounts {
    pub fn tally(results: &[QuestionResult]) -> Self {
        let mut counts = Self::default();
        for result in results {
            counts.record(result.status);
        }
        counts
    }

    pub fn record(&mut self, status: QuestionStatus) {
        match status {
            QuestionStatus::Valid => self.valid += 1,
            QuestionStatus::Blank => self.blank += 1,
            QuestionStatus::Invalid => self.invalid += 1,
            QuestionStatus::Ambiguous => self.ambiguous += 1,
        }
    }

    pub fn get(&self, status: QuestionStatus) -> usize {
        match status {
            QuestionStatus::Valid => self.valid,
            QuestionStatus::Blank => self.blank,
            QuestionStatus::Invalid => self.invalid,
            QuestionStatus::Ambiguous => self.ambiguous,
        }
    }

    pub fn total(&self) -> usize {
        self.valid + self.blank + self.invalid + self.ambiguous
    }
}

/// Overall trust verdict for a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Quality {
    /// Safe to accept automatically.
    Ok,
    /// Readable, but a person should confirm the flagged questions.
    NeedsReview,
    /// Geometry could not be trusted; no answers were read.
    Reject,
}

/// Why a readable scan was routed to human review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewReason {
    InvalidMarks,
    TooManyAmbiguous,
    LowConfidence,
}

impl ReviewReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidMarks => "invalid_marks",
            Self::TooManyAmbiguous => "too_many_ambiguous",
            Self::LowConfidence => "low_confidence",
        }
    }
}

/// Why the sheet geometry was rejected before any bubble was read.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    /// Fewer than four anchors after both detection passes.
    AnchorsNotFound { found: usize },
    /// An edge or diagonal of the anchor quadrilateral collapsed to ~0.
    DegenerateQuadrilateral,
    /// Opposite edges disagree too much for a usable homography.
    Skewed { ratio: f32 },
    /// Fewer than the required canonical corners were dark after the warp.
    AlignmentInvalid { passing: usize },
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnchorsNotFound { .. } => "anchors_not_found",
            Self::DegenerateQuadrilateral => "degenerate_quadrilateral",
            Self::Skewed { .. } => "skewed",
            Self::AlignmentInvalid { .. } => "alignment_invalid",
        }
    }
}

/// A reference embedded in the identity code. Sheets print numeric ids, but
/// free-form strings are accepted too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdentityRef {
    Number(i64),
    Text(String),
}

/// Structured identity record carried by the sheet's QR code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    #[serde(default, rename = "student_ref", alias = "aid")]
    pub student_ref: Option<IdentityRef>,
    #[serde(default, rename = "answer_key_ref", alias = "gid")]
    pub answer_key_ref: Option<IdentityRef>,
}

/// Decoded identity code: structured when the payload is a JSON object,
/// otherwise the raw text verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdentityPayload {
    Structured(IdentityRecord),
    Text(String),
}

impl IdentityPayload {
    /// Interpret a decoded code payload.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with('{') {
            if let Ok(record) = serde_json::from_str::<IdentityRecord>(trimmed) {
                return Self::Structured(record);
            }
        }
        Self::Text(raw.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corner_of_point_uses_midpoint() {
        assert_eq!(Corner::of_point(10.0, 10.0, 100.0, 200.0), Corner::TopLeft);
        assert_eq!(Corner::of_point(90.0, 10.0, 100.0, 200.0), Corner::TopRight);
        assert_eq!(Corner::of_point(90.0, 150.0, 100.0, 200.0), Corner::BottomRight);
        assert_eq!(Corner::of_point(10.0, 150.0, 100.0, 200.0), Corner::BottomLeft);
    }

    #[test]
    fn bubble_score_never_negative() {
        let rect = CellRect { x1: 0, y1: 0, x2: 4, y2: 4 };
        let smudged = BubbleSample::new("A", 0.10, 0.30, rect);
        assert_eq!(smudged.score, 0.0);
        let filled = BubbleSample::new("B", 0.80, 0.05, rect);
        assert!((filled.score - 0.75).abs() < 1e-6);
    }

    #[test]
    fn identity_parses_compact_keys() {
        let payload = IdentityPayload::parse(r#"{"aid": 42, "gid": 7}"#);
        assert_eq!(
            payload,
            IdentityPayload::Structured(IdentityRecord {
                student_ref: Some(IdentityRef::Number(42)),
                answer_key_ref: Some(IdentityRef::Number(7)),
            })
        );
    }

    #[test]
    fn identity_parses_long_keys_and_strings() {
        let payload = IdentityPayload::parse(r#"{"student_ref": "s-9"}"#);
        match payload {
            IdentityPayload::Structured(record) => {
                assert_eq!(record.student_ref, Some(IdentityRef::Text("s-9".into())));
                assert_eq!(record.answer_key_ref, None);
            }
            other => panic!("expected structured payload, got {other:?}"),
        }
    }

    #[test]
    fn identity_falls_back_to_text() {
        assert_eq!(
            IdentityPayload::parse("TURMA-3B/PROVA-2"),
            IdentityPayload::Text("TURMA-3B/PROVA-2".into())
        );
        // Valid JSON but not an object stays opaque.
        assert_eq!(IdentityPayload::parse("[1,2]"), IdentityPayload::Text("[1,2]".into()));
    }

    #[test]
    fn status_counts_tally() {
        let make = |status| QuestionResult {
            index: 0,
            samples: Vec::new(),
            status,
            chosen: None,
            confidence: 0.0,
        };
        let results = vec![
            make(QuestionStatus::Valid),
            make(QuestionStatus::Valid),
            make(QuestionStatus::Blank),
            make(QuestionStatus::Invalid),
        ];
        let counts = StatusCounts::tally(&results);
        assert_eq!(counts.valid, 2);
        assert_eq!(counts.get(QuestionStatus::Blank), 1);
        assert_eq!(counts.invalid, 1);
        assert_eq!(counts.ambiguous, 0);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn quality_serializes_kebab_case() {
        let json = serde_json::to_string(&Quality::NeedsReview).unwrap();
        assert_eq!(json, "\"needs-review\"");
    }
}
