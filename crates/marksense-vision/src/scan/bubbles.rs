// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bubble reader: samples every (question, option) cell of a rectified sheet
// with a central fill disc and a surrounding background annulus.

use image::{GrayImage, RgbImage};
use marksense_core::config::{BubblePolicy, PreprocessParams};
use marksense_core::{BubbleSample, CellRect, LayoutSpec};
use tracing::{debug, instrument};

use super::preprocess::{adaptive_threshold_inv, blur, clahe};

/// Square sampling cell of side `roi_size` around the layout centre of
/// `(question, option)`, clipped to the canonical image.
pub fn cell_rect(layout: &LayoutSpec, question: usize, option: usize, question_count: usize) -> CellRect {
    let roi = layout.roi_size();
    let (cx, cy) = layout.cell_center(question, option, question_count);
    let half = roi as f32 / 2.0;
    let x1 = ((cx - half).max(0.0) as u32).min(layout.warped_width);
    let y1 = ((cy - half).max(0.0) as u32).min(layout.warped_height);
    CellRect {
        x1,
        y1,
        x2: (x1 + roi).min(layout.warped_width),
        y2: (y1 + roi).min(layout.warped_height),
    }
}

/// Foreground fractions of the disc and annulus masks inside `rect`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellDensity {
    pub fill: f32,
    pub background: f32,
}

pub struct BubbleReader<'a> {
    policy: &'a BubblePolicy,
    preprocess: &'a PreprocessParams,
}

impl<'a> BubbleReader<'a> {
    pub fn new(policy: &'a BubblePolicy, preprocess: &'a PreprocessParams) -> Self {
        Self { policy, preprocess }
    }

    /// Binarize a canonical grayscale image for sampling. The local window
    /// scales with the cell size so a filled bubble never dominates its own
    /// neighbourhood mean.
    pub fn binarize(&self, gray: &GrayImage, roi_size: u32) -> GrayImage {
        let equalised = clahe(gray, self.preprocess.clahe_clip_limit, self.preprocess.clahe_tiles);
        let smoothed = blur(&equalised, self.preprocess.blur_sigma);
        let radius = ((roi_size as f32 * self.policy.adaptive_radius_factor) as u32).max(1);
        adaptive_threshold_inv(&smoothed, radius, self.policy.adaptive_offset)
    }

    /// Disc and annulus densities of one cell of a binary image.
    pub fn sample(&self, binary: &GrayImage, rect: CellRect) -> CellDensity {
        if rect.is_empty() {
            return CellDensity { fill: 0.0, background: 0.0 };
        }
        let minor = rect.width().min(rect.height()) as f32;
        let r_disc = minor * self.policy.disc_frac / 2.0;
        let r_ring = minor * self.policy.annulus_frac / 2.0;
        let cx = (rect.x1 + rect.x2) as f32 / 2.0;
        let cy = (rect.y1 + rect.y2) as f32 / 2.0;

        let (mut disc_on, mut disc_n, mut ring_on, mut ring_n) = (0u32, 0u32, 0u32, 0u32);
        for y in rect.y1..rect.y2.min(binary.height()) {
            for x in rect.x1..rect.x2.min(binary.width()) {
                let d = ((x as f32 + 0.5 - cx).powi(2) + (y as f32 + 0.5 - cy).powi(2)).sqrt();
                let on = u32::from(binary.get_pixel(x, y).0[0] > 0);
                if d <= r_disc {
                    disc_n += 1;
                    disc_on += on;
                } else if d <= r_ring {
                    ring_n += 1;
                    ring_on += on;
                }
            }
        }
        let ratio = |on: u32, n: u32| if n == 0 { 0.0 } else { on as f32 / n as f32 };
        CellDensity {
            fill: ratio(disc_on, disc_n),
            background: ratio(ring_on, ring_n),
        }
    }

    /// Raw samples for every question, one entry per option in layout order.
    #[instrument(skip_all, fields(questions = question_count, layout = %layout.version))]
    pub fn read(&self, canonical: &RgbImage, layout: &LayoutSpec, question_count: usize) -> Vec<Vec<BubbleSample>> {
        let gray = image::DynamicImage::ImageRgb8(canonical.clone()).into_luma8();
        let binary = self.binarize(&gray, layout.roi_size());
        drop(gray);

        let samples: Vec<Vec<BubbleSample>> = (0..question_count)
            .map(|q| {
                layout
                    .options
                    .iter()
                    .enumerate()
                    .map(|(j, label)| {
                        let rect = cell_rect(layout, q, j, question_count);
                        let density = self.sample(&binary, rect);
                        BubbleSample::new(label.clone(), density.fill, density.background, rect)
                    })
                    .collect()
            })
            .collect();
        debug!(cells = question_count * layout.options.len(), "Bubbles sampled");
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};
    use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut};
    use imageproc::rect::Rect;

    fn layout() -> LayoutSpec {
        LayoutSpec {
            warped_width: 560,
            warped_height: 800,
            ..LayoutSpec::baseline()
        }
    }

    fn center(rect: CellRect) -> (i32, i32) {
        (((rect.x1 + rect.x2) / 2) as i32, ((rect.y1 + rect.y2) / 2) as i32)
    }

    #[test]
    fn cells_have_roi_size_and_stay_inside() {
        let layout = layout();
        let roi = layout.roi_size();
        for q in [0, 9] {
            for j in 0..layout.options.len() {
                let rect = cell_rect(&layout, q, j, 10);
                assert_eq!((rect.width(), rect.height()), (roi, roi));
            }
        }
        let mut edge = layout.clone();
        edge.x_centers[0] = 0.0;
        let rect = cell_rect(&edge, 0, 0, 10);
        assert_eq!(rect.x1, 0);
        assert!(rect.x2 <= edge.warped_width);
    }

    #[test]
    fn disc_and_annulus_are_separated() {
        let policy = BubblePolicy::default();
        let params = PreprocessParams::default();
        let reader = BubbleReader::new(&policy, &params);
        let rect = CellRect { x1: 10, y1: 10, x2: 30, y2: 30 };

        let mut filled = GrayImage::new(40, 40);
        draw_filled_circle_mut(&mut filled, (20, 20), 6, Luma([255]));
        let d = reader.sample(&filled, rect);
        assert!(d.fill > 0.6, "{d:?}");
        assert_eq!(d.background, 0.0);

        // Only the ring area is dirty.
        let mut ring = GrayImage::new(40, 40);
        draw_hollow_rect_mut(&mut ring, Rect::at(12, 12).of_size(16, 16), Luma([255]));
        let d = reader.sample(&ring, rect);
        assert_eq!(d.fill, 0.0);
        assert!(d.background > 0.2, "{d:?}");
    }

    #[test]
    fn empty_cell_reads_as_zero() {
        let policy = BubblePolicy::default();
        let params = PreprocessParams::default();
        let reader = BubbleReader::new(&policy, &params);
        let d = reader.sample(&GrayImage::new(4, 4), CellRect { x1: 4, y1: 4, x2: 4, y2: 9 });
        assert_eq!(d, CellDensity { fill: 0.0, background: 0.0 });
    }

    #[test]
    fn filled_bubble_scores_high_and_neighbours_low() {
        let layout = layout();
        let roi = layout.roi_size() as f32;
        let mut sheet = RgbImage::from_pixel(560, 800, Rgb([240, 240, 240]));
        let (x, y) = center(cell_rect(&layout, 2, 3, 10));
        draw_filled_circle_mut(&mut sheet, (x, y), (roi * 0.33) as i32, Rgb([20, 20, 20]));

        let policy = BubblePolicy::default();
        let params = PreprocessParams::default();
        let samples = BubbleReader::new(&policy, &params).read(&sheet, &layout, 10);
        assert_eq!(samples.len(), 10);
        assert_eq!(samples[2].len(), 5);
        assert_eq!(samples[2][3].option, "D");
        assert!(samples[2][3].score > 0.4, "{:?}", samples[2][3]);
        for (j, sample) in samples[2].iter().enumerate() {
            if j != 3 {
                assert!(sample.score < 0.05, "{sample:?}");
            }
        }
        assert!(samples[5].iter().all(|s| s.score == 0.0));
    }
}
