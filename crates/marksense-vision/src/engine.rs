// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OmrEngine: the public facade running the full scan and the alignment
// preview.
//
// A scan never returns an error. Malformed input, geometric rejections and
// internal failures all come back as a `ScanResult` with `success = false`;
// rejections and internal failures additionally offer the capture to the
// diagnostic sink on a background thread.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use image::DynamicImage;
use marksense_core::config::ClassifierPolicy;
use marksense_core::human_errors::{Severity, humanize_error, humanize_reject};
use marksense_core::{
    DiagnosticEvent, DiagnosticSink, EngineConfig, ImageInput, LayoutSpec, OmrError, PreviewResult,
    RejectReason, Result, ScanRequest, ScanResult,
};
use serde_json::{Map, Value, json};
use tracing::{debug, error, info, instrument, warn};

use crate::identity::decode_identity;
use crate::image::{Capture, encode_jpeg, jpeg_data_url};
use crate::registry::{DirLayoutSource, LayoutRegistry, LayoutSource};
use crate::scan::preprocess::{blur, preprocess};
use crate::scan::rectify::order_corners;
use crate::scan::{AnchorDetector, BubbleReader, Rectifier, classify_all, gate};

/// Blur applied to the preview working image.
const PREVIEW_BLUR_SIGMA: f32 = 1.0;

/// How a pipeline run that did not fail ended.
enum Verdict {
    Read(ScanResult),
    Rejected {
        result: ScanResult,
        foreground_ratio: f32,
    },
}

/// Optical mark recognition engine. Cheap to share across threads; the
/// layout cache is the only mutable state.
pub struct OmrEngine {
    config: EngineConfig,
    layouts: LayoutRegistry,
    sink: Option<Arc<dyn DiagnosticSink>>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl OmrEngine {
    // -- Construction ---------------------------------------------------------

    /// Engine reading layouts from `config.layout_dir`, or only the built-in
    /// baseline when none is configured.
    pub fn new(config: EngineConfig) -> Self {
        let layouts = match &config.layout_dir {
            Some(dir) => LayoutRegistry::new(DirLayoutSource::new(dir), config.default_layout_version.clone()),
            None => LayoutRegistry::baseline_only(config.default_layout_version.clone()),
        };
        Self {
            config,
            layouts,
            sink: None,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Replace the layout source.
    pub fn with_layout_source(mut self, source: impl LayoutSource + 'static) -> Self {
        self.layouts = LayoutRegistry::new(source, self.config.default_layout_version.clone());
        self
    }

    /// Offer failing captures to `sink`.
    pub fn with_diagnostic_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn layouts(&self) -> &LayoutRegistry {
        &self.layouts
    }

    // -- Scan -----------------------------------------------------------------

    /// Run the full pipeline on one capture.
    #[instrument(skip_all, fields(layout = ?request.layout_version, questions = ?request.question_count))]
    pub fn scan(&self, request: &ScanRequest) -> ScanResult {
        let started = Instant::now();
        let layout = self.layouts.get(request.layout_version.as_deref());

        let capture = match Capture::decode(&request.image) {
            Ok(capture) => capture,
            Err(e) => {
                warn!(error = %e, "Capture could not be decoded");
                let result = ScanResult::failure(layout.version.clone(), failure_message(&e));
                return self.finish(result, started);
            }
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| self.run(&capture, request, &layout)));
        let result = match outcome {
            Ok(Ok(Verdict::Read(result))) => result,
            Ok(Ok(Verdict::Rejected {
                result,
                foreground_ratio,
            })) => {
                let mut context = Map::new();
                context.insert("anchors_found".into(), json!(result.anchors_found));
                context.insert("foreground_ratio".into(), json!(foreground_ratio));
                context.insert("layout_version".into(), json!(layout.version));
                if let Some(reason) = &result.reject_reason {
                    context.insert("reject_reason".into(), json!(reason.as_str()));
                }
                let message = result.error.clone().unwrap_or_default();
                self.offer_diagnostic(&capture, message, context);
                result
            }
            Ok(Err(e)) => {
                error!(error = %e, "Scan failed");
                let message = failure_message(&e);
                self.offer_diagnostic(&capture, message.clone(), error_context(&layout, &e.to_string()));
                ScanResult::failure(layout.version.clone(), message)
            }
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                error!(detail, "Scan pipeline panicked");
                let message = format!("Something went wrong while reading the sheet. ({detail})");
                self.offer_diagnostic(&capture, message.clone(), error_context(&layout, &detail));
                ScanResult::failure(layout.version.clone(), message)
            }
        };
        self.finish(result, started)
    }

    /// Stamp the duration and emit the per-scan telemetry event.
    fn finish(&self, mut result: ScanResult, started: Instant) -> ScanResult {
        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            event = "omr_processed",
            success = result.success,
            anchors = result.anchors_found,
            quality = ?result.quality,
            duration_ms = result.duration_ms,
        );
        result
    }

    fn run(&self, capture: &Capture, request: &ScanRequest, layout: &LayoutSpec) -> Result<Verdict> {
        let question_count = self.question_count(request, layout)?;
        let (w, h) = (layout.warped_width, layout.warped_height);

        // Anchors are searched at canonical resolution and scaled back.
        let working_gray = capture.resize_exact(w, h).to_gray();
        let identity = if self.config.decode_identity {
            decode_identity(&capture.to_gray(), Some(&working_gray))
        } else {
            None
        };
        let original_image = if request.include_original {
            Some(capture.to_data_url(self.config.original_jpeg_quality)?)
        } else {
            None
        };

        let pre = preprocess(working_gray, &self.config.preprocess);
        let foreground_ratio = pre.foreground_ratio();
        let sx = capture.width() as f32 / w as f32;
        let sy = capture.height() as f32 / h as f32;
        let anchors: Vec<_> = AnchorDetector::new(&self.config.anchors)
            .find_anchors(&pre.gray, &pre.enhanced)
            .into_iter()
            .map(|a| a.scaled(sx, sy))
            .collect();
        drop(pre);
        debug!(anchors = anchors.len(), foreground_ratio, "Anchor detection complete");

        let reject = |reason: RejectReason, anchors: Vec<_>| {
            let message = humanize_reject(&reason).to_line();
            let mut result = ScanResult::rejected(layout.version.clone(), reason, anchors, message);
            result.identity = identity.clone();
            result.original_image = original_image.clone();
            Verdict::Rejected {
                result,
                foreground_ratio,
            }
        };

        if anchors.len() != 4 {
            let found = anchors.len();
            return Ok(reject(RejectReason::AnchorsNotFound { found }, anchors));
        }

        let rectified = match Rectifier::new(&self.config.rectify).rectify(&capture.to_rgb(), &anchors, layout) {
            Ok(rectified) => rectified,
            Err(reason) => {
                debug!(reason = reason.as_str(), "Rectification rejected");
                return Ok(reject(reason, anchors));
            }
        };

        let samples = BubbleReader::new(&self.config.bubbles, &self.config.preprocess).read(
            &rectified.image,
            layout,
            question_count,
        );
        let policy = ClassifierPolicy::from_layout(layout);
        let questions = classify_all(samples, &policy);
        let (quality, reasons) = gate(&questions, &self.config.gate);

        let audit = request
            .include_audit
            .then(|| crate::render::render_audit(&rectified.image, &questions, &policy));

        let mut result = ScanResult::read(layout.version.clone(), questions, quality, reasons, anchors);
        result.identity = identity;
        result.original_image = original_image;
        if request.include_rectified {
            result.processed_image = Some(self.render_jpeg(DynamicImage::ImageRgb8(rectified.image))?);
        }
        if let Some(audit) = audit {
            result.audit_map = Some(self.render_jpeg(DynamicImage::ImageRgb8(audit))?);
        }
        result.grade = request.answer_key.as_ref().map(|key| key.compare(&result));
        Ok(Verdict::Read(result))
    }

    /// Question count: the request's, else the answer key length, else the
    /// layout's printed count.
    fn question_count(&self, request: &ScanRequest, layout: &LayoutSpec) -> Result<usize> {
        let count = match request.question_count {
            Some(count) => count as usize,
            None => match &request.answer_key {
                Some(key) if !key.is_empty() => key.len(),
                _ => layout.question_count as usize,
            },
        };
        if count == 0 {
            return Err(OmrError::InvalidRequest("question count must be at least 1".into()));
        }
        let capacity = layout.max_questions();
        if count > capacity {
            return Err(OmrError::InvalidRequest(format!(
                "{count} questions do not fit layout {} (at most {capacity})",
                layout.version
            )));
        }
        Ok(count)
    }

    fn render_jpeg(&self, image: DynamicImage) -> Result<String> {
        Ok(jpeg_data_url(&encode_jpeg(&image, self.config.render_jpeg_quality)?))
    }

    // -- Diagnostics ----------------------------------------------------------

    /// Hand the capture to the diagnostic sink without blocking the caller.
    /// Encoding and recording failures are logged and otherwise ignored.
    fn offer_diagnostic(&self, capture: &Capture, message: String, context: Map<String, Value>) {
        let Some(sink) = &self.sink else {
            return;
        };
        let sink = Arc::clone(sink);
        let image = capture.as_dynamic().clone();
        let quality = self.config.original_jpeg_quality;
        let spawned = std::thread::Builder::new()
            .name("marksense-diagnostic".into())
            .spawn(move || {
                let jpeg = match encode_jpeg(&image, quality) {
                    Ok(jpeg) => jpeg,
                    Err(e) => {
                        warn!(error = %e, "Diagnostic snapshot could not be encoded");
                        return;
                    }
                };
                drop(image);
                let event = DiagnosticEvent::new(message, context, jpeg);
                match sink.record(&event) {
                    Ok(()) => debug!(event_id = %event.event_id, "Diagnostic recorded"),
                    Err(e) => warn!(event_id = %event.event_id, error = %e, "Diagnostic could not be recorded"),
                }
            });
        match spawned {
            Ok(handle) => {
                let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
                pending.retain(|h| !h.is_finished());
                pending.push(handle);
            }
            Err(e) => warn!(error = %e, "Diagnostic thread could not be started"),
        }
    }

    /// Block until every diagnostic offered so far has been recorded. Short
    /// lived callers use this before exiting.
    pub fn flush_diagnostics(&self) {
        let handles = std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner));
        for handle in handles {
            if handle.join().is_err() {
                warn!("Diagnostic thread panicked");
            }
        }
    }

    // -- Preview --------------------------------------------------------------

    /// Fast alignment feedback: anchors only, on a small blurred copy.
    #[instrument(skip_all)]
    pub fn preview(&self, input: &ImageInput) -> PreviewResult {
        let capture = match Capture::decode(input) {
            Ok(capture) => capture,
            Err(e) => return PreviewResult::failure(failure_message(&e)),
        };
        let (capture, rotated) = capture.into_portrait();
        let (pw, ph) = (self.config.preview_width, self.config.preview_height);
        let gray = blur(&capture.resize_exact(pw, ph).to_gray(), PREVIEW_BLUR_SIGMA);
        drop(capture);

        let anchors = AnchorDetector::new(&self.config.anchors).find_anchors(&gray, &gray);
        let confidence = match anchors.as_slice() {
            [a, b, c, d] => {
                let mean_score = (a.score + b.score + c.score + d.score) / 4.0;
                let quad = order_corners([(a.x, a.y), (b.x, b.y), (c.x, c.y), (d.x, d.y)]);
                let plausible = Rectifier::new(&self.config.rectify).check_quad(&quad).is_ok();
                mean_score.clamp(0.0, 1.0) * if plausible { 1.0 } else { 0.5 }
            }
            _ => 0.0,
        };
        debug!(anchors = anchors.len(), confidence, rotated, "Preview complete");

        PreviewResult {
            success: anchors.len() == 4,
            anchors_found: anchors.len(),
            anchors: anchors
                .iter()
                .map(|a| [a.x / pw as f32, a.y / ph as f32])
                .collect(),
            confidence,
            rotated,
            error: None,
        }
    }
}

impl std::fmt::Debug for OmrEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OmrEngine")
            .field("config", &self.config)
            .field("layouts", &self.layouts)
            .field("diagnostics", &self.sink.is_some())
            .finish()
    }
}

/// The user-facing line for an error; internal errors keep the raw detail.
fn failure_message(err: &OmrError) -> String {
    let human = humanize_error(err);
    match human.severity {
        Severity::Internal => format!("{} ({err})", human.to_line()),
        _ => human.to_line(),
    }
}

fn error_context(layout: &LayoutSpec, detail: &str) -> Map<String, Value> {
    let mut context = Map::new();
    context.insert("error".into(), json!(detail));
    context.insert("layout_version".into(), json!(layout.version));
    context
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
