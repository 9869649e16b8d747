// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Request and result records of the two public operations: the full scan and
// the alignment preview.

use serde::{Deserialize, Serialize};

use crate::answers::{AnswerKey, Grade};
use crate::types::{
    Anchor, IdentityPayload, Quality, QuestionResult, QuestionStatus, RejectReason, ReviewReason,
    StatusCounts,
};

/// An encoded image payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageInput {
    /// Base64 text; a `data:image/...;base64,` prefix is permitted.
    Base64(String),
    /// Raw encoded bytes (JPEG, PNG, ...).
    Bytes(Vec<u8>),
}

/// Input of a full scan.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub image: ImageInput,
    /// Number of questions to read. Falls back to the layout's count.
    pub question_count: Option<u32>,
    /// Layout version; the engine default when `None`.
    pub layout_version: Option<String>,
    pub include_rectified: bool,
    pub include_audit: bool,
    pub include_original: bool,
    /// Expected answers. When present the result is graded, and its length
    /// stands in for a missing question count.
    pub answer_key: Option<AnswerKey>,
}

impl ScanRequest {
    pub fn new(image: ImageInput) -> Self {
        Self {
            image,
            question_count: None,
            layout_version: None,
            include_rectified: false,
            include_audit: false,
            include_original: false,
            answer_key: None,
        }
    }

    pub fn with_question_count(mut self, count: u32) -> Self {
        self.question_count = Some(count);
        self
    }

    pub fn with_layout_version(mut self, version: impl Into<String>) -> Self {
        self.layout_version = Some(version.into());
        self
    }

    pub fn with_images(mut self, rectified: bool, audit: bool) -> Self {
        self.include_rectified = rectified;
        self.include_audit = audit;
        self
    }

    pub fn with_original(mut self, include: bool) -> Self {
        self.include_original = include;
        self
    }

    pub fn with_answer_key(mut self, key: AnswerKey) -> Self {
        self.answer_key = Some(key);
        self
    }
}

/// Terminal artifact of a scan, serialized as a flat record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub success: bool,
    pub quality: Quality,
    pub review_reasons: Vec<ReviewReason>,
    /// Human-readable failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<RejectReason>,
    pub layout_version: String,
    pub answers: Vec<Option<String>>,
    pub confidence_scores: Vec<f32>,
    pub question_status: Vec<QuestionStatus>,
    pub status_counts: StatusCounts,
    pub avg_confidence: f32,
    pub anchors_found: usize,
    pub anchors: Vec<Anchor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityPayload>,
    /// Rectified sheet as a JPEG data URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_image: Option<String>,
    /// Audit overlay as a JPEG data URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_map: Option<String>,
    /// Decoded capture re-encoded as a JPEG data URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<Grade>,
    pub duration_ms: u64,
    /// Full per-question detail; not part of the flat wire record.
    #[serde(skip)]
    pub questions: Vec<QuestionResult>,
}

impl ScanResult {
    fn empty(layout_version: String) -> Self {
        Self {
            success: false,
            quality: Quality::Reject,
            review_reasons: Vec::new(),
            error: None,
            reject_reason: None,
            layout_version,
            answers: Vec::new(),
            confidence_scores: Vec::new(),
            question_status: Vec::new(),
            status_counts: StatusCounts::default(),
            avg_confidence: 0.0,
            anchors_found: 0,
            anchors: Vec::new(),
            identity: None,
            processed_image: None,
            audit_map: None,
            original_image: None,
            grade: None,
            duration_ms: 0,
            questions: Vec::new(),
        }
    }

    /// Malformed input or an unexpected internal error.
    pub fn failure(layout_version: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::empty(layout_version.into())
        }
    }

    /// Geometry was rejected before any bubble was read.
    pub fn rejected(
        layout_version: impl Into<String>,
        reason: RejectReason,
        anchors: Vec<Anchor>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: Some(message.into()),
            reject_reason: Some(reason),
            anchors_found: anchors.len(),
            anchors,
            ..Self::empty(layout_version.into())
        }
    }

    /// A readable scan with its gate verdict.
    pub fn read(
        layout_version: impl Into<String>,
        questions: Vec<QuestionResult>,
        quality: Quality,
        review_reasons: Vec<ReviewReason>,
        anchors: Vec<Anchor>,
    ) -> Self {
        let answers = questions
            .iter()
            .map(|q| q.answer().map(str::to_owned))
            .collect();
        let confidence_scores: Vec<f32> = questions.iter().map(|q| q.confidence).collect();
        let question_status = questions.iter().map(|q| q.status).collect();
        let avg_confidence = mean(&confidence_scores);
        Self {
            success: true,
            quality,
            review_reasons,
            answers,
            confidence_scores,
            question_status,
            status_counts: StatusCounts::tally(&questions),
            avg_confidence,
            anchors_found: anchors.len(),
            anchors,
            questions,
            ..Self::empty(layout_version.into())
        }
    }
}

/// Mean of a slice, zero when empty.
pub fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

/// Output of the alignment preview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewResult {
    pub success: bool,
    pub anchors_found: usize,
    /// Anchor centres normalised to 0..1 of the (possibly rotated) preview image.
    pub anchors: Vec<[f32; 2]>,
    /// Coarse confidence in [0, 1].
    pub confidence: f32,
    /// The capture was landscape and was rotated to portrait first.
    pub rotated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PreviewResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            anchors_found: 0,
            anchors: Vec::new(),
            confidence: 0.0,
            rotated: false,
            error: Some(message.into()),
        }
    }
}
