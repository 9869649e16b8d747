// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// marksense-vision: the optical mark recognition pipeline.
//
// Decodes a photographed answer sheet, finds its corner fiducials, warps it
// into the layout's canonical space, samples every bubble, classifies each
// question and grades the scan's trustworthiness. `OmrEngine` is the entry
// point; the stages are public for tools and tests.

pub mod engine;
pub mod identity;
pub mod image;
pub mod registry;
pub mod render;
pub mod scan;

// Re-export the primary types so callers can use `marksense_vision::OmrEngine` etc.
pub use crate::image::Capture;
pub use engine::OmrEngine;
pub use identity::decode_identity;
pub use registry::{DirLayoutSource, LayoutRegistry, LayoutSource, MemoryLayoutSource};
pub use render::{SheetRenderer, render_audit};
