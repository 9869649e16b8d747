// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Geometric rectification: anchor ordering, quadrilateral sanity checks,
// perspective warp into canonical space, and the post-warp corner test.

use image::{GrayImage, Rgb, RgbImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use marksense_core::config::RectifyPolicy;
use marksense_core::{Anchor, LayoutSpec, RejectReason};
use tracing::{debug, instrument, warn};

use super::geometry::{Pt, distance};
use super::preprocess::otsu_inv;

/// A sheet warped into canonical space.
#[derive(Debug, Clone)]
pub struct Rectified {
    /// Exactly `warped_width` x `warped_height` of the layout.
    pub image: RgbImage,
    /// Source quadrilateral, clockwise from top-left.
    pub quad: [Pt; 4],
    /// Dark-pixel ratio of each canonical corner square.
    pub corner_ratios: [f32; 4],
}

/// Clockwise order around the centroid starting top-left, rotated by one when
/// needed so that the first edge is the shorter one (portrait reading).
pub fn order_corners(points: [Pt; 4]) -> [Pt; 4] {
    let cx = points.iter().map(|p| p.0).sum::<f32>() / 4.0;
    let cy = points.iter().map(|p| p.1).sum::<f32>() / 4.0;
    let mut sorted = points;
    // Image y grows downwards, so ascending atan2 runs TL, TR, BR, BL.
    sorted.sort_by(|a, b| {
        (a.1 - cy)
            .atan2(a.0 - cx)
            .total_cmp(&(b.1 - cy).atan2(b.0 - cx))
    });
    if distance(sorted[0], sorted[1]) > distance(sorted[1], sorted[2]) {
        sorted.rotate_left(1);
    }
    sorted
}

/// Validates anchor quadrilaterals and warps captures into canonical space.
pub struct Rectifier<'a> {
    policy: &'a RectifyPolicy,
}

impl<'a> Rectifier<'a> {
    pub fn new(policy: &'a RectifyPolicy) -> Self {
        Self { policy }
    }

    /// Reject quadrilaterals a homography cannot sensibly be built from.
    ///
    /// Top and bottom edges, and the two diagonals, must be longer than the
    /// minimum edge and agree in length within the configured ratio band.
    pub fn check_quad(&self, quad: &[Pt; 4]) -> Result<(), RejectReason> {
        let top = distance(quad[0], quad[1]);
        let bottom = distance(quad[3], quad[2]);
        let diag_a = distance(quad[0], quad[2]);
        let diag_b = distance(quad[1], quad[3]);
        let min = self.policy.min_edge_px;
        if top < min || bottom < min || diag_a < min || diag_b < min {
            return Err(RejectReason::DegenerateQuadrilateral);
        }
        let band = self.policy.min_edge_ratio..=self.policy.max_edge_ratio;
        let edge_ratio = top / bottom;
        if !band.contains(&edge_ratio) {
            return Err(RejectReason::Skewed { ratio: edge_ratio });
        }
        let diag_ratio = diag_a / diag_b;
        if !band.contains(&diag_ratio) {
            return Err(RejectReason::Skewed { ratio: diag_ratio });
        }
        Ok(())
    }

    /// Map `quad` onto the corners of a `width` x `height` canvas.
    pub fn warp(&self, image: &RgbImage, quad: &[Pt; 4], width: u32, height: u32) -> Result<RgbImage, RejectReason> {
        let (w, h) = ((width - 1) as f32, (height - 1) as f32);
        let target = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];
        let projection = Projection::from_control_points(*quad, target).ok_or_else(|| {
            warn!(?quad, "Projective transform could not be solved");
            RejectReason::DegenerateQuadrilateral
        })?;
        let mut out = RgbImage::new(width, height);
        warp_into(image, &projection, Interpolation::Bilinear, Rgb([255, 255, 255]), &mut out);
        Ok(out)
    }

    /// Dark-pixel ratio of a square sampled at each canonical corner of an
    /// Otsu-binarized image, clockwise from top-left.
    pub fn corner_ratios(&self, warped: &GrayImage) -> [f32; 4] {
        let (w, h) = warped.dimensions();
        let side = ((w.min(h) as f32 * self.policy.corner_roi_frac) as u32).clamp(1, w.min(h));
        let binary = otsu_inv(warped);
        let origins = [(0, 0), (w - side, 0), (w - side, h - side), (0, h - side)];
        origins.map(|(x0, y0)| {
            let mut dark = 0u32;
            for y in y0..y0 + side {
                for x in x0..x0 + side {
                    if binary.get_pixel(x, y).0[0] > 0 {
                        dark += 1;
                    }
                }
            }
            dark as f32 / (side * side) as f32
        })
    }

    /// Order, validate, warp and verify.
    #[instrument(skip_all, fields(anchors = anchors.len(), layout = %layout.version))]
    pub fn rectify(&self, image: &RgbImage, anchors: &[Anchor], layout: &LayoutSpec) -> Result<Rectified, RejectReason> {
        let points: [Pt; 4] = match anchors {
            [a, b, c, d] => [(a.x, a.y), (b.x, b.y), (c.x, c.y), (d.x, d.y)],
            _ => return Err(RejectReason::AnchorsNotFound { found: anchors.len() }),
        };
        let quad = order_corners(points);
        self.check_quad(&quad)?;

        let warped = self.warp(image, &quad, layout.warped_width, layout.warped_height)?;
        let gray = image::DynamicImage::ImageRgb8(warped.clone()).into_luma8();
        let corner_ratios = self.corner_ratios(&gray);
        let passing = corner_ratios
            .iter()
            .filter(|&&r| r > self.policy.corner_min_dark)
            .count();
        debug!(?corner_ratios, passing, "Post-warp corner check");
        if passing < self.policy.corner_min_passing {
            return Err(RejectReason::AlignmentInvalid { passing });
        }

        Ok(Rectified {
            image: warped,
            quad,
            corner_ratios,
        })
    }
}
