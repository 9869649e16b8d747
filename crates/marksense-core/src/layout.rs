// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Sheet layout specification: canonical warp size, bubble grid geometry and
// the density thresholds that travel with each printed template version.
//
// On disk a layout is a `layout_<version>.json` file using the keys
// `warped_size {w,h}`, `thresholds {marked, ambiguous, margin}`,
// `roi_size_pct_of_width`, `options`, `x_centers_pct`, `y_start_pct`,
// `y_end_pct`, `num_questions`. Any key a file omits is taken from
// `LayoutSpec::baseline()`.

use serde::{Deserialize, Serialize};

use crate::error::{OmrError, Result};

/// Density thresholds used by the question classifier, in score units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkThresholds {
    /// A score at or above this looks genuinely filled.
    pub marked: f32,
    /// Below this nothing resembles a mark.
    pub ambiguous: f32,
    /// Minimum lead of the best option over the runner-up.
    #[serde(default = "default_margin")]
    pub margin: f32,
}

fn default_margin() -> f32 {
    0.06
}

impl Default for MarkThresholds {
    fn default() -> Self {
        Self {
            marked: 0.15,
            ambiguous: 0.08,
            margin: default_margin(),
        }
    }
}

/// Width/height pair as written in layout files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarpedSize {
    pub w: u32,
    pub h: u32,
}

/// Immutable geometry and thresholds for one sheet template version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "LayoutFile", try_from = "LayoutFile")]
pub struct LayoutSpec {
    pub version: String,
    /// Canonical (rectified) width in pixels.
    pub warped_width: u32,
    /// Canonical (rectified) height in pixels.
    pub warped_height: u32,
    /// Ordered option labels, e.g. `A`..`E`.
    pub options: Vec<String>,
    /// Horizontal bubble centres as fractions of the canonical width, one per option.
    pub x_centers: Vec<f32>,
    /// Vertical band spanned by all questions, as fractions of the canonical height.
    pub y_start: f32,
    pub y_end: f32,
    /// Side of the sampled square cell as a fraction of the canonical width.
    pub roi_size_frac: f32,
    pub thresholds: MarkThresholds,
    /// Question count printed on the template; used when a request omits one.
    pub question_count: u32,
}

impl LayoutSpec {
    /// Version string of the built-in baseline.
    pub const BASELINE_VERSION: &'static str = "default";

    /// Built-in layout used when no configured layout can be found.
    pub fn baseline() -> Self {
        Self {
            version: Self::BASELINE_VERSION.to_owned(),
            warped_width: 1120,
            warped_height: 1600,
            options: ["A", "B", "C", "D", "E"].iter().map(|s| s.to_string()).collect(),
            x_centers: vec![0.245, 0.318, 0.392, 0.465, 0.538],
            y_start: 0.21,
            y_end: 0.88,
            roi_size_frac: 0.030,
            thresholds: MarkThresholds::default(),
            question_count: 25,
        }
    }

    /// Check the structural invariants of the layout.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| {
            Err(OmrError::Layout {
                version: self.version.clone(),
                reason,
            })
        };

        if self.warped_width == 0 || self.warped_height == 0 {
            return fail("warped size must be non-zero".into());
        }
        if self.options.is_empty() {
            return fail("options list is empty".into());
        }
        if self.x_centers.len() != self.options.len() {
            return fail(format!(
                "{} x-centres for {} options",
                self.x_centers.len(),
                self.options.len()
            ));
        }
        if self.x_centers.iter().any(|x| !(0.0..=1.0).contains(x)) {
            return fail("x-centres must lie in [0, 1]".into());
        }
        if !(0.0..=1.0).contains(&self.y_start) || !(0.0..=1.0).contains(&self.y_end) {
            return fail("y range must lie in [0, 1]".into());
        }
        if self.y_end <= self.y_start {
            return fail(format!(
                "y_end ({}) must exceed y_start ({})",
                self.y_end, self.y_start
            ));
        }
        if self.roi_size() == 0 {
            return fail("ROI size rounds to zero pixels".into());
        }
        if self.question_count as usize > self.max_questions() {
            return fail(format!(
                "{} questions do not fit the band (at most {})",
                self.question_count,
                self.max_questions()
            ));
        }
        let t = &self.thresholds;
        if t.ambiguous < 0.0 || t.margin <= 0.0 || t.marked < t.ambiguous {
            return fail(format!(
                "thresholds must satisfy 0 <= ambiguous <= marked and margin > 0 (got {t:?})"
            ));
        }
        Ok(())
    }

    /// Side of the sampled cell in canonical pixels.
    pub fn roi_size(&self) -> u32 {
        (self.warped_width as f32 * self.roi_size_frac) as u32
    }

    /// Most questions the band can hold before adjacent rows of cells
    /// overlap.
    pub fn max_questions(&self) -> usize {
        let band = (self.y_end - self.y_start) * self.warped_height as f32;
        (band / self.roi_size().max(1) as f32).floor().max(0.0) as usize
    }

    /// Centre of the cell for `(question, option)` in canonical pixels, when
    /// the band is divided into `question_count` rows.
    pub fn cell_center(&self, question: usize, option: usize, question_count: usize) -> (f32, f32) {
        let step = (self.y_end - self.y_start) / question_count.max(1) as f32;
        let y = (self.y_start + question as f32 * step + step / 2.0) * self.warped_height as f32;
        let x = self.x_centers[option] * self.warped_width as f32;
        (x, y)
    }
}

impl Default for LayoutSpec {
    fn default() -> Self {
        Self::baseline()
    }
}

/// Normalise a requested version: a bare number `"1"` becomes `"v1"`.
pub fn normalize_version(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        format!("v{trimmed}")
    } else {
        trimmed.to_owned()
    }
}

/// On-disk layout representation. Every key is optional; missing keys are
/// filled from the baseline by [`LayoutFile::merge_over`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayoutFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warped_size: Option<WarpedSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<MarkThresholds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roi_size_pct_of_width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_centers_pct: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_start_pct: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_end_pct: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_questions: Option<u32>,
}

impl LayoutFile {
    /// Top-level merge of this file over `base`.
    pub fn merge_over(self, base: LayoutSpec) -> LayoutSpec {
        let (warped_width, warped_height) = match self.warped_size {
            Some(size) => (size.w, size.h),
            None => (base.warped_width, base.warped_height),
        };
        LayoutSpec {
            version: self.version.unwrap_or(base.version),
            warped_width,
            warped_height,
            options: self.options.unwrap_or(base.options),
            x_centers: self.x_centers_pct.unwrap_or(base.x_centers),
            y_start: self.y_start_pct.unwrap_or(base.y_start),
            y_end: self.y_end_pct.unwrap_or(base.y_end),
            roi_size_frac: self.roi_size_pct_of_width.unwrap_or(base.roi_size_frac),
            thresholds: self.thresholds.unwrap_or(base.thresholds),
            question_count: self.num_questions.unwrap_or(base.question_count),
        }
    }
}

impl From<LayoutSpec> for LayoutFile {
    fn from(spec: LayoutSpec) -> Self {
        Self {
            version: Some(spec.version),
            warped_size: Some(WarpedSize {
                w: spec.warped_width,
                h: spec.warped_height,
            }),
            thresholds: Some(spec.thresholds),
            roi_size_pct_of_width: Some(spec.roi_size_frac),
            options: Some(spec.options),
            x_centers_pct: Some(spec.x_centers),
            y_start_pct: Some(spec.y_start),
            y_end_pct: Some(spec.y_end),
            num_questions: Some(spec.question_count),
        }
    }
}

impl TryFrom<LayoutFile> for LayoutSpec {
    type Error = OmrError;

    fn try_from(file: LayoutFile) -> Result<Self> {
        let spec = file.merge_over(LayoutSpec::baseline());
        spec.validate()?;
        Ok(spec)
    }
}
