// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Audit overlay: outlines the cells that drove each question's verdict on a
// copy of the rectified sheet. Presentation only.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use marksense_core::config::ClassifierPolicy;
use marksense_core::{CellRect, QuestionResult, QuestionStatus};

const BLANK_COLOR: Rgb<u8> = Rgb([0, 100, 255]);
const INVALID_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const VALID_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
const AMBIGUOUS_COLOR: Rgb<u8> = Rgb([255, 191, 0]);

/// Draw the per-question outlines over `rectified`.
///
/// Blank questions outline every cell, invalid questions the cells at or
/// above the marked threshold, valid and ambiguous questions their chosen
/// cell.
pub fn render_audit(rectified: &RgbImage, questions: &[QuestionResult], policy: &ClassifierPolicy) -> RgbImage {
    let mut out = rectified.clone();
    for question in questions {
        match question.status {
            QuestionStatus::Blank => {
                for sample in &question.samples {
                    outline(&mut out, sample.rect, BLANK_COLOR, 2);
                }
            }
            QuestionStatus::Invalid => {
                for sample in question.samples.iter().filter(|s| s.score >= policy.marked) {
                    outline(&mut out, sample.rect, INVALID_COLOR, 3);
                }
            }
            QuestionStatus::Valid | QuestionStatus::Ambiguous => {
                let color = if question.status == QuestionStatus::Valid {
                    VALID_COLOR
                } else {
                    AMBIGUOUS_COLOR
                };
                if let Some(sample) = question.chosen.and_then(|i| question.samples.get(i)) {
                    outline(&mut out, sample.rect, color, 2);
                }
            }
        }
    }
    out
}

/// Hollow rectangle grown outwards `thickness` times; rings that would leave
/// the image are skipped.
fn outline(img: &mut RgbImage, cell: CellRect, color: Rgb<u8>, thickness: i32) {
    if cell.is_empty() {
        return;
    }
    let (w, h) = (img.width() as i32, img.height() as i32);
    for t in 0..thickness {
        let left = cell.x1 as i32 - t;
        let top = cell.y1 as i32 - t;
        let width = cell.width() + 2 * t as u32;
        let height = cell.height() + 2 * t as u32;
        if left < 0 || top < 0 || left + width as i32 > w || top + height as i32 > h {
            continue;
        }
        draw_hollow_rect_mut(img, Rect::at(left, top).of_size(width, height), color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marksense_core::BubbleSample;

    const PAPER: Rgb<u8> = Rgb([255, 255, 255]);

    fn cell(x: u32) -> CellRect {
        CellRect { x1: x, y1: 10, x2: x + 10, y2: 20 }
    }

    fn question(status: QuestionStatus, scores: [f32; 3], chosen: Option<usize>) -> QuestionResult {
        QuestionResult {
            index: 0,
            samples: scores
                .iter()
                .enumerate()
                .map(|(i, &s)| BubbleSample::new(i.to_string(), s, 0.0, cell(10 + 20 * i as u32)))
                .collect(),
            status,
            chosen,
            confidence: 0.0,
        }
    }

    fn canvas() -> RgbImage {
        RgbImage::from_pixel(80, 40, PAPER)
    }

    #[test]
    fn valid_outlines_only_the_chosen_cell() {
        let q = question(QuestionStatus::Valid, [0.0, 0.6, 0.0], Some(1));
        let out = render_audit(&canvas(), &[q], &ClassifierPolicy::default());
        assert_eq!(*out.get_pixel(30, 10), VALID_COLOR);
        assert_eq!(*out.get_pixel(10, 10), PAPER);
        assert_eq!(*out.get_pixel(50, 10), PAPER);
        // Interior untouched.
        assert_eq!(*out.get_pixel(35, 15), PAPER);
    }

    #[test]
    fn blank_outlines_every_cell() {
        let q = question(QuestionStatus::Blank, [0.0, 0.0, 0.0], None);
        let out = render_audit(&canvas(), &[q], &ClassifierPolicy::default());
        for x in [10, 30, 50] {
            assert_eq!(*out.get_pixel(x, 10), BLANK_COLOR);
        }
    }

    #[test]
    fn invalid_outlines_marked_cells() {
        let q = question(QuestionStatus::Invalid, [0.5, 0.05, 0.4], None);
        let out = render_audit(&canvas(), &[q], &ClassifierPolicy::default());
        assert_eq!(*out.get_pixel(10, 10), INVALID_COLOR);
        assert_eq!(*out.get_pixel(50, 10), INVALID_COLOR);
        assert_eq!(*out.get_pixel(30, 10), PAPER);
        // Third ring of the thick outline.
        assert_eq!(*out.get_pixel(8, 8), INVALID_COLOR);
    }

    #[test]
    fn ambiguous_uses_caution_color_and_input_is_untouched() {
        let source = canvas();
        let q = question(QuestionStatus::Ambiguous, [0.12, 0.10, 0.0], Some(0));
        let out = render_audit(&source, &[q], &ClassifierPolicy::default());
        assert_eq!(*out.get_pixel(10, 10), AMBIGUOUS_COLOR);
        assert!(source.pixels().all(|p| *p == PAPER));
    }
}
