// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the OMR pipeline: the question classifier and
// anchor detection on a synthetic sheet.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::DynamicImage;

use marksense_core::config::{AnchorPolicy, ClassifierPolicy, PreprocessParams};
use marksense_core::{BubbleSample, CellRect, LayoutSpec};
use marksense_vision::SheetRenderer;
use marksense_vision::scan::{AnchorDetector, classify_all, preprocess};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn layout() -> LayoutSpec {
    LayoutSpec {
        warped_width: 560,
        warped_height: 800,
        question_count: 25,
        ..LayoutSpec::baseline()
    }
}

/// 100 questions of five options with one strong mark and some noise.
fn samples() -> Vec<Vec<BubbleSample>> {
    let rect = CellRect { x1: 0, y1: 0, x2: 16, y2: 16 };
    (0..100)
        .map(|q| {
            (0..5)
                .map(|j| {
                    let fill = if j == q % 5 { 0.8 } else { (q * j % 7) as f32 * 0.02 };
                    BubbleSample::new(j.to_string(), fill, 0.03, rect)
                })
                .collect()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_classifier(c: &mut Criterion) {
    let policy = ClassifierPolicy::default();
    let questions = samples();
    c.bench_function("classify_all (100 questions)", |b| {
        b.iter(|| black_box(classify_all(black_box(questions.clone()), &policy)));
    });
}

/// Preprocessing plus both anchor passes on a rendered 560x800 sheet.
fn bench_anchor_detection(c: &mut Criterion) {
    let layout = layout();
    let sheet = (0..25).fold(SheetRenderer::new(layout.clone()), |s, q| s.mark(q, q % 5));
    let gray = DynamicImage::ImageRgb8(sheet.render())
        .resize_exact(560, 800, image::imageops::FilterType::Triangle)
        .into_luma8();
    let params = PreprocessParams::default();
    let policy = AnchorPolicy::default();

    c.bench_function("preprocess + find_anchors (560x800)", |b| {
        b.iter(|| {
            let pre = preprocess(black_box(gray.clone()), &params);
            let anchors = AnchorDetector::new(&policy).find_anchors(&pre.gray, &pre.enhanced);
            black_box(anchors);
        });
    });
}

criterion_group!(benches, bench_classifier, bench_anchor_detection);
criterion_main!(benches);
