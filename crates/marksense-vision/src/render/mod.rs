// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster output: the audit overlay of a read sheet and the answer-sheet
// template renderer.

pub mod audit;
pub mod sheet;

pub use audit::render_audit;
pub use sheet::SheetRenderer;
