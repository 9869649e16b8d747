// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fiducial anchor detection: contour candidates from a strict binarization,
// filtered by area, shape and corner position, one winner per quadrant, with
// a single global-threshold retry.

use image::GrayImage;
use imageproc::contours::{BorderType, find_contours};
use marksense_core::config::AnchorPolicy;
use marksense_core::{Anchor, Corner};
use tracing::{debug, instrument};

use super::geometry::{self, ContourShape};
use super::preprocess::{adaptive_threshold_inv, otsu_inv};

/// Shape tests applied to a contour. A candidate is anchor-shaped when it is
/// round enough or simplifies to a convex quadrilateral.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeEvidence {
    pub circularity: f32,
    pub convex_quad: bool,
}

impl ShapeEvidence {
    pub fn accepts(&self, policy: &AnchorPolicy) -> bool {
        self.circularity >= policy.min_circularity || self.convex_quad
    }

    /// Ranking score within a quadrant.
    pub fn score(&self, policy: &AnchorPolicy) -> f32 {
        if self.convex_quad {
            self.circularity.max(policy.quad_score)
        } else {
            self.circularity
        }
    }
}

/// A contour that passed the area, shape and corner-band filters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub x: f32,
    pub y: f32,
    pub area: f32,
    pub shape: ShapeEvidence,
    pub score: f32,
}

/// Locates the four corner fiducials of a sheet.
pub struct AnchorDetector<'a> {
    policy: &'a AnchorPolicy,
}

impl<'a> AnchorDetector<'a> {
    pub fn new(policy: &'a AnchorPolicy) -> Self {
        Self { policy }
    }

    /// Two-pass detection.
    ///
    /// The primary pass binarizes `gray` with the strict local threshold. If
    /// that does not yield one anchor per quadrant, `fallback` is binarized
    /// with Otsu's global threshold and searched once more; whichever pass
    /// found more anchors wins. Anchors come back in clockwise corner order
    /// and may number fewer than four.
    #[instrument(skip_all, fields(width = gray.width(), height = gray.height()))]
    pub fn find_anchors(&self, gray: &GrayImage, fallback: &GrayImage) -> Vec<Anchor> {
        let strict = adaptive_threshold_inv(gray, self.policy.strict_radius, self.policy.strict_offset);
        let primary = self.select(&self.candidates(&strict), gray.width(), gray.height());
        if primary.len() == 4 {
            debug!("Anchors found by strict pass");
            return primary;
        }
        drop(strict);

        debug!(found = primary.len(), "Strict pass incomplete, retrying with global threshold");
        let global = otsu_inv(fallback);
        let retry = self.select(&self.candidates(&global), fallback.width(), fallback.height());
        debug!(primary = primary.len(), retry = retry.len(), "Fallback pass complete");
        if retry.len() > primary.len() {
            retry
        } else {
            primary
        }
    }

    /// Anchor-shaped contours of a binary image whose centroids lie in a
    /// corner band.
    pub fn candidates(&self, binary: &GrayImage) -> Vec<Candidate> {
        let (w, h) = (binary.width() as f32, binary.height() as f32);
        let image_area = w * h;
        let min_area = self.policy.min_area_frac * image_area;
        let max_area = self.policy.max_area_frac * image_area;
        let margin_x = self.policy.corner_margin_frac * w;
        let margin_y = self.policy.corner_margin_frac * h;

        let mut out = Vec::new();
        for contour in find_contours::<i32>(binary) {
            if contour.border_type != BorderType::Outer || contour.points.len() < 4 {
                continue;
            }
            let points = &contour.points;
            let measured = ContourShape::measure(points, self.policy.poly_epsilon_frac);
            let area = measured.area;
            if area < min_area || area > max_area {
                continue;
            }

            let shape = ShapeEvidence {
                circularity: measured.circularity(),
                convex_quad: measured.is_convex_quad(),
            };
            if !shape.accepts(self.policy) {
                continue;
            }

            let (x, y) = if shape.convex_quad {
                geometry::bbox_center(points)
            } else {
                geometry::centroid(points).unwrap_or_else(|| geometry::bbox_center(points))
            };

            let near_x = x < margin_x || x > w - margin_x;
            let near_y = y < margin_y || y > h - margin_y;
            if !(near_x && near_y) {
                continue;
            }

            out.push(Candidate {
                x,
                y,
                area,
                shape,
                score: shape.score(self.policy),
            });
        }
        out
    }

    /// Best-scoring candidate per quadrant, in clockwise order. Empty
    /// quadrants are skipped, so the result may hold fewer than four anchors.
    pub fn select(&self, candidates: &[Candidate], width: u32, height: u32) -> Vec<Anchor> {
        let (w, h) = (width as f32, height as f32);
        Corner::ALL
            .iter()
            .filter_map(|&corner| {
                candidates
                    .iter()
                    .filter(|c| Corner::of_point(c.x, c.y, w, h) == corner)
                    .max_by(|a, b| a.score.total_cmp(&b.score).then(a.area.total_cmp(&b.area)))
                    .map(|best| Anchor {
                        x: best.x,
                        y: best.y,
                        score: best.score,
                        corner,
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
    use imageproc::rect::Rect;

    const W: u32 = 400;
    const H: u32 = 560;

    fn page() -> GrayImage {
        GrayImage::from_pixel(W, H, Luma([235]))
    }

    fn square(img: &mut GrayImage, cx: i32, cy: i32, side: u32) {
        let half = side as i32 / 2;
        draw_filled_rect_mut(img, Rect::at(cx - half, cy - half).of_size(side, side), Luma([15]));
    }

    fn four_squares() -> GrayImage {
        let mut img = page();
        for (x, y) in [(30, 30), (370, 30), (370, 530), (30, 530)] {
            square(&mut img, x, y, 18);
        }
        img
    }

    #[test]
    fn finds_four_square_anchors_in_order() {
        let img = four_squares();
        let policy = AnchorPolicy::default();
        let anchors = AnchorDetector::new(&policy).find_anchors(&img, &img);
        assert_eq!(anchors.len(), 4);
        let corners: Vec<Corner> = anchors.iter().map(|a| a.corner).collect();
        assert_eq!(corners, Corner::ALL.to_vec());
        assert!((anchors[0].x - 30.0).abs() < 2.0 && (anchors[0].y - 30.0).abs() < 2.0);
        assert!((anchors[2].x - 370.0).abs() < 2.0 && (anchors[2].y - 530.0).abs() < 2.0);
        assert!(anchors.iter().all(|a| a.score >= 0.9));
    }

    #[test]
    fn accepts_circular_anchors() {
        let mut img = page();
        for (x, y) in [(30, 30), (370, 30), (370, 530), (30, 530)] {
            draw_filled_circle_mut(&mut img, (x, y), 10, Luma([15]));
        }
        let policy = AnchorPolicy::default();
        let anchors = AnchorDetector::new(&policy).find_anchors(&img, &img);
        assert_eq!(anchors.len(), 4);
    }

    #[test]
    fn missing_quadrant_yields_partial_list() {
        let mut img = page();
        for (x, y) in [(30, 30), (370, 30), (370, 530)] {
            square(&mut img, x, y, 18);
        }
        let policy = AnchorPolicy::default();
        let anchors = AnchorDetector::new(&policy).find_anchors(&img, &img);
        assert_eq!(anchors.len(), 3);
        assert!(anchors.iter().all(|a| a.corner != Corner::BottomLeft));
    }

    #[test]
    fn interior_and_out_of_band_marks_are_ignored() {
        let mut img = four_squares();
        // A well-formed square in the middle of the sheet.
        square(&mut img, 200, 280, 18);
        // A speck and an oversized block inside the top-right corner band.
        square(&mut img, 60, 20, 3);
        draw_filled_rect_mut(&mut img, Rect::at(305, 45).of_size(85, 85), Luma([15]));
        let policy = AnchorPolicy::default();
        let detector = AnchorDetector::new(&policy);
        let strict = adaptive_threshold_inv(&img, policy.strict_radius, policy.strict_offset);
        let candidates = detector.candidates(&strict);
        assert_eq!(candidates.len(), 4, "{candidates:?}");
        assert!(candidates.iter().all(|c| (c.x - 200.0).abs() > 50.0));
        assert_eq!(detector.find_anchors(&img, &img).len(), 4);
    }

    #[test]
    fn best_score_wins_within_a_quadrant() {
        let policy = AnchorPolicy::default();
        let detector = AnchorDetector::new(&policy);
        let shape = |circ: f32, quad: bool| ShapeEvidence { circularity: circ, convex_quad: quad };
        let cand = |x: f32, y: f32, s: ShapeEvidence| Candidate { x, y, area: 100.0, shape: s, score: s.score(&policy) };
        let picked = detector.select(
            &[
                cand(10.0, 10.0, shape(0.6, false)),
                cand(20.0, 20.0, shape(0.7, true)),
                cand(90.0, 90.0, shape(0.8, false)),
            ],
            100,
            100,
        );
        assert_eq!(picked.len(), 2);
        assert_eq!((picked[0].x, picked[0].corner), (20.0, Corner::TopLeft));
        assert!((picked[0].score - 0.9).abs() < 1e-6);
        assert_eq!(picked[1].corner, Corner::BottomRight);
    }

    #[test]
    fn shape_acceptance_combines_both_tests() {
        let policy = AnchorPolicy::default();
        assert!(ShapeEvidence { circularity: 0.3, convex_quad: true }.accepts(&policy));
        assert!(ShapeEvidence { circularity: 0.55, convex_quad: false }.accepts(&policy));
        assert!(!ShapeEvidence { circularity: 0.3, convex_quad: false }.accepts(&policy));
    }
}
