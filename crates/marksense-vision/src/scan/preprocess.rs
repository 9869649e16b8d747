// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Preprocessing: flat-field illumination correction, tiled contrast
// equalisation (CLAHE), noise blur and inverted adaptive binarization, plus
// the thresholding primitives shared by the later stages.
//
// Binary images use 255 for foreground (dark ink) and 0 for background.

use image::{GrayImage, Luma};
use imageproc::filter::{gaussian_blur_f32, median_filter};
use imageproc::morphology::{Mask, grayscale_dilate};
use marksense_core::config::PreprocessParams;
use tracing::{debug, instrument};

/// Outputs of the preprocessing pipeline for one working image.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// Plain grayscale; source of the strict anchor binarization.
    pub gray: GrayImage,
    /// Illumination-corrected, equalised and blurred grayscale.
    pub enhanced: GrayImage,
    /// Inverted adaptive binarization of `enhanced`.
    pub binary: GrayImage,
}

impl Preprocessed {
    /// Fraction of foreground pixels in the general binary image.
    pub fn foreground_ratio(&self) -> f32 {
        foreground_ratio(&self.binary)
    }
}

/// Run the full pipeline on a grayscale working image.
#[instrument(skip_all, fields(width = gray.width(), height = gray.height()))]
pub fn preprocess(gray: GrayImage, params: &PreprocessParams) -> Preprocessed {
    let corrected = flat_field(
        &gray,
        params.flat_field_dilate_radius,
        params.flat_field_median_radius,
    );
    let equalised = clahe(&corrected, params.clahe_clip_limit, params.clahe_tiles);
    drop(corrected);
    let enhanced = blur(&equalised, params.blur_sigma);
    let binary = adaptive_threshold_inv(&enhanced, params.adaptive_radius, params.adaptive_offset);
    debug!(foreground = foreground_ratio(&binary), "Preprocessing complete");
    Preprocessed {
        gray,
        enhanced,
        binary,
    }
}

/// Gaussian blur, skipped for non-positive sigma.
pub fn blur(gray: &GrayImage, sigma: f32) -> GrayImage {
    if sigma > 0.0 {
        gaussian_blur_f32(gray, sigma)
    } else {
        gray.clone()
    }
}

// -- Illumination correction --------------------------------------------------

/// Remove slow illumination gradients.
///
/// The background is estimated with a dilation (which erases thin dark ink)
/// followed by a large median. The absolute difference from the background is
/// inverted so that ink stays dark, then stretched to the full 0..255 range.
pub fn flat_field(gray: &GrayImage, dilate_radius: u32, median_radius: u32) -> GrayImage {
    let background = median_filter(&dilate(gray, dilate_radius), median_radius, median_radius);
    let mut out = GrayImage::new(gray.width(), gray.height());
    for (o, (g, b)) in out
        .pixels_mut()
        .zip(gray.pixels().zip(background.pixels()))
    {
        o.0[0] = 255 - g.0[0].abs_diff(b.0[0]);
    }
    normalize_min_max(&mut out);
    out
}

/// Square grayscale dilation, which erases dark strokes thinner than the
/// window.
pub fn dilate(gray: &GrayImage, radius: u32) -> GrayImage {
    if radius == 0 {
        return gray.clone();
    }
    let radius = u8::try_from(radius).unwrap_or(u8::MAX);
    grayscale_dilate(gray, &Mask::square(radius))
}

/// Linearly stretch pixel values to span 0..=255. Constant images become white.
pub fn normalize_min_max(gray: &mut GrayImage) {
    let (lo, hi) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
    if hi <= lo {
        for p in gray.pixels_mut() {
            p.0[0] = 255;
        }
        return;
    }
    let span = (hi - lo) as f32;
    for p in gray.pixels_mut() {
        p.0[0] = (((p.0[0] - lo) as f32 * 255.0 / span).round()) as u8;
    }
}

// -- Contrast-limited adaptive histogram equalisation -------------------------

/// CLAHE over a `tiles` x `tiles` grid with bilinear blending of the per-tile
/// lookup tables. `clip_limit` is a multiple of the uniform bin height.
pub fn clahe(gray: &GrayImage, clip_limit: f32, tiles: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return gray.clone();
    }
    let tile_w = w.div_ceil(tiles.clamp(1, w));
    let tile_h = h.div_ceil(tiles.clamp(1, h));
    let tiles_x = w.div_ceil(tile_w);
    let tiles_y = h.div_ceil(tile_h);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);
            luts.push(tile_lut(gray, x0, y0, x1, y1, clip_limit));
        }
    }

    let lut_at = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        let gy = ((y as f32 + 0.5) / tile_h as f32 - 0.5).max(0.0);
        let ty0 = (gy.floor() as u32).min(tiles_y - 1);
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let fy = (gy - ty0 as f32).clamp(0.0, 1.0);
        for x in 0..w {
            let gx = ((x as f32 + 0.5) / tile_w as f32 - 0.5).max(0.0);
            let tx0 = (gx.floor() as u32).min(tiles_x - 1);
            let tx1 = (tx0 + 1).min(tiles_x - 1);
            let fx = (gx - tx0 as f32).clamp(0.0, 1.0);

            let v = gray.get_pixel(x, y).0[0] as usize;
            let top = lut_at(tx0, ty0)[v] as f32 * (1.0 - fx) + lut_at(tx1, ty0)[v] as f32 * fx;
            let bottom = lut_at(tx0, ty1)[v] as f32 * (1.0 - fx) + lut_at(tx1, ty1)[v] as f32 * fx;
            let blended = top * (1.0 - fy) + bottom * fy;
            out.put_pixel(x, y, Luma([blended.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}

/// Clipped-histogram equalisation table for one tile.
fn tile_lut(gray: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip_limit: f32) -> [u8; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[gray.get_pixel(x, y).0[0] as usize] += 1;
        }
    }
    let count = (x1 - x0) * (y1 - y0);
    let limit = ((clip_limit * count as f32 / 256.0) as u32).max(1);

    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let bonus = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += bonus + u32::from(i < remainder);
    }

    let mut lut = [0u8; 256];
    let mut cdf = 0u64;
    for (i, &bin) in hist.iter().enumerate() {
        cdf += bin as u64;
        lut[i] = ((cdf * 255 + count as u64 / 2) / count.max(1) as u64).min(255) as u8;
    }
    lut
}

// -- Thresholding -------------------------------------------------------------

/// Summed-area table of a grayscale image, padded with a zero row and column.
pub struct IntegralImage {
    width: u32,
    height: u32,
    table: Vec<u64>,
}

impl IntegralImage {
    pub fn new(gray: &GrayImage) -> Self {
        let (w, h) = gray.dimensions();
        let stride = (w + 1) as usize;
        let mut table = vec![0u64; stride * (h + 1) as usize];
        for y in 0..h {
            let mut row_sum = 0u64;
            for x in 0..w {
                row_sum += gray.get_pixel(x, y).0[0] as u64;
                let idx = (y + 1) as usize * stride + (x + 1) as usize;
                table[idx] = row_sum + table[idx - stride];
            }
        }
        Self {
            width: w,
            height: h,
            table,
        }
    }

    /// Mean over the square of `radius` around `(cx, cy)`, clipped to the image.
    pub fn mean(&self, cx: u32, cy: u32, radius: u32) -> f64 {
        let stride = (self.width + 1) as usize;
        let x1 = cx.saturating_sub(radius) as usize;
        let y1 = cy.saturating_sub(radius) as usize;
        let x2 = (cx as usize + radius as usize + 1).min(self.width as usize);
        let y2 = (cy as usize + radius as usize + 1).min(self.height as usize);
        let area = ((x2 - x1) * (y2 - y1)) as f64;
        if area == 0.0 {
            return 128.0;
        }
        let sum = self.table[y2 * stride + x2] as f64 - self.table[y1 * stride + x2] as f64
            - self.table[y2 * stride + x1] as f64
            + self.table[y1 * stride + x1] as f64;
        sum / area
    }
}

/// Local-mean binarization, inverted: a pixel is foreground when it is at
/// least `offset` darker than the mean of its `radius` neighbourhood.
pub fn adaptive_threshold_inv(gray: &GrayImage, radius: u32, offset: i32) -> GrayImage {
    let integral = IntegralImage::new(gray);
    let (w, h) = gray.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let threshold = integral.mean(x, y, radius) - offset as f64;
        let v = gray.get_pixel(x, y).0[0] as f64;
        Luma([if v <= threshold { 255 } else { 0 }])
    })
}

/// Otsu's threshold: the level maximising between-class variance.
pub fn otsu_level(gray: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for p in gray.pixels() {
        histogram[p.0[0] as usize] += 1;
    }
    let total = gray.width() as u64 * gray.height() as u64;
    if total == 0 {
        return 128;
    }
    let sum_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum();

    let mut sum_bg = 0.0f64;
    let mut weight_bg = 0u64;
    let mut best = (0.0f64, 0u8);
    for (t, &count) in histogram.iter().enumerate() {
        weight_bg += count;
        if weight_bg == 0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0 {
            break;
        }
        sum_bg += t as f64 * count as f64;
        let mean_bg = sum_bg / weight_bg as f64;
        let mean_fg = (sum_total - sum_bg) / weight_fg as f64;
        let between = weight_bg as f64 * weight_fg as f64 * (mean_bg - mean_fg).powi(2);
        if between > best.0 {
            best = (between, t as u8);
        }
    }
    best.1
}

/// Global inverted binarization: foreground where the pixel is `<= level`.
pub fn threshold_inv(gray: &GrayImage, level: u8) -> GrayImage {
    let (w, h) = gray.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        Luma([if gray.get_pixel(x, y).0[0] <= level { 255 } else { 0 }])
    })
}

/// Inverted Otsu binarization.
pub fn otsu_inv(gray: &GrayImage) -> GrayImage {
    threshold_inv(gray, otsu_level(gray))
}

/// Fraction of non-zero pixels.
pub fn foreground_ratio(binary: &GrayImage) -> f32 {
    let total = binary.width() as usize * binary.height() as usize;
    if total == 0 {
        return 0.0;
    }
    binary.pixels().filter(|p| p.0[0] > 0).count() as f32 / total as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Light page with a left-to-right illumination ramp and a dark block.
    fn shaded_page() -> GrayImage {
        GrayImage::from_fn(120, 80, |x, y| {
            let base = 150 + (x as u32 * 90 / 120) as u8;
            if (50..70).contains(&x) && (30..50).contains(&y) {
                Luma([base / 5])
            } else {
                Luma([base])
            }
        })
    }

    #[test]
    fn otsu_splits_bimodal_histogram() {
        let img = GrayImage::from_fn(10, 10, |x, _| Luma([if x < 5 { 40 } else { 210 }]));
        let level = otsu_level(&img);
        assert!((40..210).contains(&level), "level {level}");
        let bin = otsu_inv(&img);
        assert_eq!(bin.get_pixel(0, 0).0[0], 255);
        assert_eq!(bin.get_pixel(9, 9).0[0], 0);
    }

    #[test]
    fn integral_mean_matches_brute_force() {
        let img = GrayImage::from_fn(9, 7, |x, y| Luma([(x * 20 + y * 3) as u8]));
        let integral = IntegralImage::new(&img);
        let mut sum = 0u32;
        let mut n = 0u32;
        for y in 1..=5 {
            for x in 2..=6 {
                sum += img.get_pixel(x, y).0[0] as u32;
                n += 1;
            }
        }
        assert!((integral.mean(4, 3, 2) - sum as f64 / n as f64).abs() < 1e-9);
        // Clipped at the border.
        assert!((integral.mean(0, 0, 0) - img.get_pixel(0, 0).0[0] as f64).abs() < 1e-9);
    }

    #[test]
    fn adaptive_threshold_marks_only_ink() {
        let page = shaded_page();
        let bin = adaptive_threshold_inv(&page, 15, 10);
        assert_eq!(bin.get_pixel(55, 35).0[0], 255);
        // The ramp alone is not ink.
        assert_eq!(bin.get_pixel(5, 5).0[0], 0);
        assert_eq!(bin.get_pixel(115, 75).0[0], 0);
    }

    #[test]
    fn dilation_erases_thin_lines() {
        let mut img = GrayImage::from_pixel(20, 20, Luma([200]));
        for y in 0..20 {
            img.put_pixel(10, y, Luma([0]));
        }
        let dilated = dilate(&img, 1);
        assert!(dilated.pixels().all(|p| p.0[0] == 200));
    }

    #[test]
    fn flat_field_removes_ramp_and_keeps_polarity() {
        let corrected = flat_field(&shaded_page(), 3, 10);
        let left = corrected.get_pixel(5, 5).0[0] as i32;
        let right = corrected.get_pixel(115, 5).0[0] as i32;
        assert!((left - right).abs() < 20, "left {left} right {right}");
        let ink = corrected.get_pixel(52, 32).0[0] as i32;
        assert!(ink < left - 100, "ink {ink} paper {left}");
    }

    #[test]
    fn clahe_keeps_dark_regions_darker() {
        let halves = GrayImage::from_fn(64, 64, |x, _| Luma([if x < 32 { 40 } else { 200 }]));
        let out = clahe(&halves, 2.0, 8);
        assert_eq!(out.dimensions(), (64, 64));
        assert!(out.get_pixel(2, 30).0[0] < out.get_pixel(60, 30).0[0]);
    }

    #[test]
    fn clahe_handles_tiny_images() {
        let img = GrayImage::from_pixel(3, 2, Luma([90]));
        assert_eq!(clahe(&img, 2.0, 8).dimensions(), (3, 2));
    }

    #[test]
    fn pipeline_produces_matching_buffers() {
        let out = preprocess(shaded_page(), &PreprocessParams::default());
        assert_eq!(out.gray.dimensions(), (120, 80));
        assert_eq!(out.enhanced.dimensions(), (120, 80));
        assert_eq!(out.binary.dimensions(), (120, 80));
        let ratio = out.foreground_ratio();
        assert!(ratio > 0.0 && ratio < 0.5, "foreground {ratio}");
    }

    #[test]
    fn constant_image_normalises_to_white() {
        let mut img = GrayImage::from_pixel(4, 4, Luma([17]));
        normalize_min_max(&mut img);
        assert!(img.pixels().all(|p| p.0[0] == 255));
    }
}
