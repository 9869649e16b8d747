// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image ingestion: decoding of base64 / data-URL / raw payloads into a raster,
// resizing to working resolution, portrait normalisation, and JPEG output.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, RgbImage};
use marksense_core::error::{OmrError, Result};
use marksense_core::ImageInput;
use tracing::{debug, instrument};

/// Media type used for every data URL the engine produces.
const JPEG_DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// A decoded capture.
///
/// Transformations consume `self` and return a new `Capture`, so stages can
/// be chained and intermediate buffers are dropped as soon as they are
/// superseded.
#[derive(Debug, Clone)]
pub struct Capture {
    image: DynamicImage,
}

impl Capture {
    // -- Construction ---------------------------------------------------------

    /// Decode any supported input payload.
    pub fn decode(input: &ImageInput) -> Result<Self> {
        match input {
            ImageInput::Base64(text) => Self::from_base64(text),
            ImageInput::Bytes(bytes) => Self::from_bytes(bytes),
        }
    }

    /// Decode base64 text. A `data:...;base64,` prefix is stripped first.
    #[instrument(skip(text), fields(text_len = text.len()))]
    pub fn from_base64(text: &str) -> Result<Self> {
        let payload = strip_data_url(text);
        let cleaned: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        if cleaned.is_empty() {
            return Err(OmrError::InvalidImage("payload is empty".into()));
        }
        let bytes = STANDARD
            .decode(cleaned.as_bytes())
            .map_err(|err| OmrError::InvalidImage(format!("invalid base64: {err}")))?;
        Self::from_bytes(&bytes)
    }

    /// Decode raw encoded bytes (JPEG, PNG, ...).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(OmrError::InvalidImage("payload is empty".into()));
        }
        let image = image::load_from_memory(data)
            .map_err(|err| OmrError::InvalidImage(format!("failed to decode image: {err}")))?;
        if image.width() == 0 || image.height() == 0 {
            return Err(OmrError::InvalidImage("image has no pixels".into()));
        }
        debug!(
            width = image.width(),
            height = image.height(),
            "Capture decoded"
        );
        Ok(Self { image })
    }

    /// Wrap an already-decoded image.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    pub fn to_rgb(&self) -> RgbImage {
        self.image.to_rgb8()
    }

    pub fn to_gray(&self) -> GrayImage {
        self.image.to_luma8()
    }

    // -- Transformations ------------------------------------------------------

    /// Resize to exactly `width` x `height` with bilinear filtering.
    pub fn resize_exact(&self, width: u32, height: u32) -> Self {
        Self {
            image: self.image.resize_exact(width, height, FilterType::Triangle),
        }
    }

    /// Rotate a landscape capture 90 degrees clockwise. Returns whether it
    /// rotated.
    pub fn into_portrait(self) -> (Self, bool) {
        if self.image.width() > self.image.height() {
            debug!("Rotating landscape capture to portrait");
            (
                Self {
                    image: self.image.rotate90(),
                },
                true,
            )
        } else {
            (self, false)
        }
    }

    // -- Output ---------------------------------------------------------------

    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>> {
        encode_jpeg(&self.image, quality)
    }

    pub fn to_data_url(&self, quality: u8) -> Result<String> {
        Ok(jpeg_data_url(&self.to_jpeg_bytes(quality)?))
    }
}

/// Everything after the first comma of a data URL, or the input unchanged.
fn strip_data_url(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.starts_with("data:") {
        trimmed.split_once(',').map_or("", |(_, rest)| rest)
    } else {
        trimmed
    }
}

/// Encode any image as JPEG with the given quality (1-100).
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let rgb = image.to_rgb8();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    rgb.write_with_encoder(encoder)
        .map_err(|err| OmrError::ImageEncoding(format!("JPEG encoding failed: {err}")))?;
    Ok(buffer)
}

/// Wrap JPEG bytes in a data URL.
pub fn jpeg_data_url(jpeg: &[u8]) -> String {
    format!("{JPEG_DATA_URL_PREFIX}{}", STANDARD.encode(jpeg))
}
