// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Identity decoder: reads the QR code printed on the sheet. Best-effort;
// a missing or unreadable code never affects the scan.

use std::panic::{AssertUnwindSafe, catch_unwind};

use image::GrayImage;
use marksense_core::IdentityPayload;
use rqrr::PreparedImage;
use tracing::{debug, instrument, warn};

use crate::scan::preprocess::otsu_level;

/// Decode the identity code, trying the full-resolution capture first, then
/// the working image, then a globally binarized working image.
#[instrument(skip_all, fields(width = full.width(), height = full.height()))]
pub fn decode_identity(full: &GrayImage, working: Option<&GrayImage>) -> Option<IdentityPayload> {
    let mut attempts: Vec<(&str, &GrayImage, bool)> = vec![("full", full, false)];
    if let Some(working) = working {
        attempts.push(("working", working, false));
        attempts.push(("working-otsu", working, true));
    }

    for (name, image, binarize) in attempts {
        match catch_unwind(AssertUnwindSafe(|| decode_once(image, binarize))) {
            Ok(Some(text)) => {
                debug!(strategy = name, "Identity code decoded");
                return Some(IdentityPayload::parse(&text));
            }
            Ok(None) => {}
            Err(_) => warn!(strategy = name, "QR decoder panicked"),
        }
    }
    debug!("No identity code found");
    None
}

fn decode_once(gray: &GrayImage, binarize: bool) -> Option<String> {
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    if w == 0 || h == 0 {
        return None;
    }
    let mut prepared = if binarize {
        let level = otsu_level(gray);
        PreparedImage::prepare_from_bitmap(w, h, |x, y| gray.get_pixel(x as u32, y as u32).0[0] <= level)
    } else {
        PreparedImage::prepare_from_greyscale(w, h, |x, y| gray.get_pixel(x as u32, y as u32).0[0])
    };
    prepared
        .detect_grids()
        .iter()
        .find_map(|grid| grid.decode().ok())
        .map(|(_, content)| content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn blank_page_has_no_identity() {
        let page = GrayImage::from_pixel(200, 300, Luma([240]));
        assert_eq!(decode_identity(&page, Some(&page)), None);
    }

    #[test]
    fn empty_image_is_tolerated() {
        assert_eq!(decode_identity(&GrayImage::new(0, 0), None), None);
    }
}
