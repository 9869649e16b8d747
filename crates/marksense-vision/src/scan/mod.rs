// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanning pipeline stages: preprocessing, anchor detection, rectification,
// bubble sampling, classification and the quality gate.

pub mod anchors;
pub mod bubbles;
pub mod classify;
pub mod gate;
pub mod geometry;
pub mod preprocess;
pub mod rectify;

pub use anchors::AnchorDetector;
pub use bubbles::{BubbleReader, cell_rect};
pub use classify::{classify, classify_all};
pub use gate::gate;
pub use preprocess::{Preprocessed, preprocess};
pub use rectify::{Rectified, Rectifier};
