// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine configuration and tunable pipeline policies.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::layout::{LayoutSpec, MarkThresholds};

/// Settings for the illumination-normalisation and binarization stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessParams {
    /// Radius of the square max-filter applied before the background median.
    pub flat_field_dilate_radius: u32,
    /// Radius of the large median blur that estimates the background.
    pub flat_field_median_radius: u32,
    /// CLAHE clip limit, as a multiple of the uniform bin height.
    pub clahe_clip_limit: f32,
    /// CLAHE tiles per axis.
    pub clahe_tiles: u32,
    /// Gaussian sigma of the noise-suppression blur.
    pub blur_sigma: f32,
    /// Local-mean window radius of the general adaptive binarization.
    pub adaptive_radius: u32,
    /// Offset subtracted from the local mean.
    pub adaptive_offset: i32,
}

impl Default for PreprocessParams {
    fn default() -> Self {
        Self {
            flat_field_dilate_radius: 3,
            flat_field_median_radius: 10,
            clahe_clip_limit: 2.0,
            clahe_tiles: 8,
            blur_sigma: 0.8,
            adaptive_radius: 10,
            adaptive_offset: 5,
        }
    }
}

/// Fiducial candidate filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorPolicy {
    /// Local-mean radius of the strict binarization used for candidates.
    pub strict_radius: u32,
    pub strict_offset: i32,
    /// Accepted contour area band as fractions of the image area.
    pub min_area_frac: f32,
    pub max_area_frac: f32,
    /// Circularity `4*pi*A/P^2` above which a contour counts as round.
    pub min_circularity: f32,
    /// Polygon approximation tolerance as a fraction of the perimeter.
    pub poly_epsilon_frac: f32,
    /// Shape score credited to a convex quadrilateral.
    pub quad_score: f32,
    /// Candidates must lie within this fraction of width/height of an edge.
    pub corner_margin_frac: f32,
}

impl Default for AnchorPolicy {
    fn default() -> Self {
        Self {
            strict_radius: 15,
            strict_offset: 10,
            min_area_frac: 0.0003,
            max_area_frac: 0.03,
            min_circularity: 0.50,
            poly_epsilon_frac: 0.04,
            quad_score: 0.9,
            corner_margin_frac: 0.25,
        }
    }
}

/// Quadrilateral sanity checks and the post-warp corner test.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RectifyPolicy {
    /// Edges or diagonals shorter than this (pixels) are degenerate.
    pub min_edge_px: f32,
    /// Accepted band for top/bottom edge and diagonal ratios.
    pub min_edge_ratio: f32,
    pub max_edge_ratio: f32,
    /// Side of the corner sample square as a fraction of the shorter canonical side.
    pub corner_roi_frac: f32,
    /// Dark-pixel ratio a corner square must exceed.
    pub corner_min_dark: f32,
    /// How many of the four corners must pass.
    pub corner_min_passing: usize,
}

impl Default for RectifyPolicy {
    fn default() -> Self {
        Self {
            min_edge_px: 1.0,
            min_edge_ratio: 0.75,
            max_edge_ratio: 1.25,
            corner_roi_frac: 0.045,
            corner_min_dark: 0.10,
            corner_min_passing: 3,
        }
    }
}

/// Bubble sampling masks and binarization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BubblePolicy {
    /// Diameter of the fill disc as a fraction of the cell's minor side.
    pub disc_frac: f32,
    /// Outer diameter of the background annulus as a fraction of the minor side.
    pub annulus_frac: f32,
    /// Adaptive-threshold radius as a multiple of the cell size.
    pub adaptive_radius_factor: f32,
    pub adaptive_offset: i32,
}

impl Default for BubblePolicy {
    fn default() -> Self {
        Self {
            disc_frac: 0.70,
            annulus_frac: 0.96,
            adaptive_radius_factor: 1.0,
            adaptive_offset: 10,
        }
    }
}

/// Question classifier thresholds, in score units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierPolicy {
    pub ambiguous: f32,
    pub marked: f32,
    pub margin: f32,
}

impl ClassifierPolicy {
    pub fn from_layout(layout: &LayoutSpec) -> Self {
        Self::from(layout.thresholds)
    }
}

impl From<MarkThresholds> for ClassifierPolicy {
    fn from(t: MarkThresholds) -> Self {
        Self {
            ambiguous: t.ambiguous,
            marked: t.marked,
            margin: t.margin,
        }
    }
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self::from(MarkThresholds::default())
    }
}

/// Review thresholds of the quality gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatePolicy {
    /// More ambiguous questions than this routes the scan to review.
    pub max_ambiguous: usize,
    /// Mean confidence below this routes the scan to review.
    pub min_avg_confidence: f32,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            max_ambiguous: 2,
            min_avg_confidence: 0.75,
        }
    }
}

/// Full engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Layout used when a request names none, and the fallback for unknown versions.
    pub default_layout_version: String,
    /// Directory containing `layout_<version>.json` files.
    pub layout_dir: Option<PathBuf>,
    /// Attempt to read the identity QR code.
    pub decode_identity: bool,
    pub preprocess: PreprocessParams,
    pub anchors: AnchorPolicy,
    pub rectify: RectifyPolicy,
    pub bubbles: BubblePolicy,
    pub gate: GatePolicy,
    /// Working size of the alignment preview.
    pub preview_width: u32,
    pub preview_height: u32,
    /// JPEG quality of the rectified image and audit overlay.
    pub render_jpeg_quality: u8,
    /// JPEG quality of the echoed original and diagnostic snapshots.
    pub original_jpeg_quality: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_layout_version: "v1".into(),
            layout_dir: None,
            decode_identity: true,
            preprocess: PreprocessParams::default(),
            anchors: AnchorPolicy::default(),
            rectify: RectifyPolicy::default(),
            bubbles: BubblePolicy::default(),
            gate: GatePolicy::default(),
            preview_width: 560,
            preview_height: 800,
            render_jpeg_quality: 70,
            original_jpeg_quality: 85,
        }
    }
}
