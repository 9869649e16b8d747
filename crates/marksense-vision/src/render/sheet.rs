// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Answer-sheet renderer. Produces printable templates for a layout and the
// synthetic captures used to exercise the pipeline.
//
// The canonical sheet sits inside a white margin. The centre of each square
// fiducial coincides with a canonical corner, so warping the four anchor
// centres onto the canonical rectangle recovers the layout coordinates
// exactly.

use std::collections::BTreeSet;

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut};
use imageproc::rect::Rect;
use marksense_core::{Corner, LayoutSpec};
use tracing::{debug, instrument};

use crate::scan::cell_rect;

const PAPER: Rgb<u8> = Rgb([255, 255, 255]);
const INK: Rgb<u8> = Rgb([0, 0, 0]);
const OUTLINE: Rgb<u8> = Rgb([200, 200, 200]);

/// Builder for a rendered answer sheet.
#[derive(Debug, Clone)]
pub struct SheetRenderer {
    layout: LayoutSpec,
    margin: u32,
    anchor_size_frac: f32,
    question_count: usize,
    marks: BTreeSet<(usize, usize)>,
    outlines: bool,
    missing: Vec<Corner>,
}

impl SheetRenderer {
    // -- Construction ---------------------------------------------------------

    pub fn new(layout: LayoutSpec) -> Self {
        let question_count = layout.question_count as usize;
        Self {
            layout,
            margin: 40,
            anchor_size_frac: 0.04,
            question_count,
            marks: BTreeSet::new(),
            outlines: false,
            missing: Vec::new(),
        }
    }

    /// White border around the canonical area, in pixels.
    pub fn with_margin(mut self, margin: u32) -> Self {
        self.margin = margin;
        self
    }

    /// Fiducial side as a fraction of the canonical width.
    pub fn with_anchor_size_frac(mut self, frac: f32) -> Self {
        self.anchor_size_frac = frac;
        self
    }

    pub fn with_question_count(mut self, count: usize) -> Self {
        self.question_count = count;
        self
    }

    /// Fill the bubble of `option` on `question` (both zero-based).
    pub fn mark(mut self, question: usize, option: usize) -> Self {
        self.marks.insert((question, option));
        self
    }

    /// Print light bubble outlines, as a blank template would.
    pub fn with_outlines(mut self, outlines: bool) -> Self {
        self.outlines = outlines;
        self
    }

    /// Leave the fiducial of `corner` unprinted.
    pub fn without_anchor(mut self, corner: Corner) -> Self {
        self.missing.push(corner);
        self
    }

    // -- Geometry -------------------------------------------------------------

    /// Full canvas size including the margin.
    pub fn canvas_size(&self) -> (u32, u32) {
        (
            self.layout.warped_width + 2 * self.margin,
            self.layout.warped_height + 2 * self.margin,
        )
    }

    /// Centre of each fiducial on the canvas, clockwise from top-left.
    pub fn anchor_centers(&self) -> [(f32, f32); 4] {
        let m = self.margin as f32;
        let right = m + self.layout.warped_width as f32 - 1.0;
        let bottom = m + self.layout.warped_height as f32 - 1.0;
        [(m, m), (right, m), (right, bottom), (m, bottom)]
    }

    // -- Rendering ------------------------------------------------------------

    #[instrument(skip(self), fields(layout = %self.layout.version, marks = self.marks.len()))]
    pub fn render(&self) -> RgbImage {
        let (w, h) = self.canvas_size();
        let mut img = RgbImage::from_pixel(w, h, PAPER);

        let side = ((self.layout.warped_width as f32 * self.anchor_size_frac).round() as u32).max(1);
        for (corner, (cx, cy)) in Corner::ALL.iter().zip(self.anchor_centers()) {
            if self.missing.contains(corner) {
                continue;
            }
            let left = (cx - side as f32 / 2.0).round() as i32;
            let top = (cy - side as f32 / 2.0).round() as i32;
            draw_filled_rect_mut(&mut img, Rect::at(left, top).of_size(side, side), INK);
        }

        let roi = self.layout.roi_size() as f32;
        let m = self.margin as i32;
        for q in 0..self.question_count {
            for j in 0..self.layout.options.len() {
                let rect = cell_rect(&self.layout, q, j, self.question_count);
                let center = (
                    m + ((rect.x1 + rect.x2) / 2) as i32,
                    m + ((rect.y1 + rect.y2) / 2) as i32,
                );
                if self.outlines {
                    draw_hollow_circle_mut(&mut img, center, (roi * 0.55).round() as i32, OUTLINE);
                }
                if self.marks.contains(&(q, j)) {
                    draw_filled_circle_mut(&mut img, center, (roi * 0.33).round() as i32, INK);
                }
            }
        }
        debug!(width = w, height = h, "Sheet rendered");
        img
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> LayoutSpec {
        LayoutSpec {
            warped_width: 560,
            warped_height: 800,
            question_count: 10,
            ..LayoutSpec::baseline()
        }
    }

    #[test]
    fn canvas_includes_margin_on_every_side() {
        let renderer = SheetRenderer::new(layout()).with_margin(30);
        assert_eq!(renderer.canvas_size(), (620, 860));
        assert_eq!(renderer.render().dimensions(), (620, 860));
    }

    #[test]
    fn anchors_are_centred_on_canonical_corners() {
        let renderer = SheetRenderer::new(layout());
        let img = renderer.render();
        for (cx, cy) in renderer.anchor_centers() {
            assert_eq!(*img.get_pixel(cx as u32, cy as u32), INK);
        }
        assert_eq!(*img.get_pixel(5, 5), PAPER);
    }

    #[test]
    fn missing_anchor_leaves_corner_blank() {
        let renderer = SheetRenderer::new(layout()).without_anchor(Corner::BottomLeft);
        let img = renderer.render();
        let (x, y) = renderer.anchor_centers()[3];
        assert_eq!(*img.get_pixel(x as u32, y as u32), PAPER);
        let (x, y) = renderer.anchor_centers()[2];
        assert_eq!(*img.get_pixel(x as u32, y as u32), INK);
    }

    #[test]
    fn marks_land_on_cell_centres() {
        let layout = layout();
        let img = SheetRenderer::new(layout.clone()).mark(4, 2).render();
        let rect = cell_rect(&layout, 4, 2, 10);
        let (x, y) = (40 + (rect.x1 + rect.x2) / 2, 40 + (rect.y1 + rect.y2) / 2);
        assert_eq!(*img.get_pixel(x, y), INK);
        let other = cell_rect(&layout, 4, 1, 10);
        let (x, y) = (40 + (other.x1 + other.x2) / 2, 40 + (other.y1 + other.y2) / 2);
        assert_eq!(*img.get_pixel(x, y), PAPER);
    }

    #[test]
    fn outlines_are_optional() {
        let layout = layout();
        let bare = SheetRenderer::new(layout.clone()).render();
        let outlined = SheetRenderer::new(layout).with_outlines(true).render();
        assert!(bare.pixels().all(|p| *p == PAPER || *p == INK));
        assert!(outlined.pixels().any(|p| *p == OUTLINE));
    }
}
