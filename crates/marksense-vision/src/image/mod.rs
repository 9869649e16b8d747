// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module: payload decoding, working-resolution resize, JPEG output.

pub mod capture;

pub use capture::{Capture, encode_jpeg, jpeg_data_url};
