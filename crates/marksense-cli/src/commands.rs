// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Subcommand implementations.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::Args;
use marksense_core::layout::LayoutFile;
use marksense_core::{AnswerKey, EngineConfig, ImageInput, ScanRequest};
use marksense_diagnostics::DirectorySink;
use marksense_vision::{OmrEngine, SheetRenderer};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Captured image (JPEG, PNG, ...).
    image: PathBuf,

    /// Layout version printed on the sheet.
    #[arg(long)]
    layout: Option<String>,

    /// Number of questions to read.
    #[arg(long)]
    questions: Option<u32>,

    /// Expected answers: a JSON array, `A,B,,D`, or a single option.
    #[arg(long)]
    answer_key: Option<String>,

    /// Write the rectified sheet here (JPEG).
    #[arg(long)]
    rectified: Option<PathBuf>,

    /// Write the audit overlay here (JPEG).
    #[arg(long)]
    audit: Option<PathBuf>,

    /// Echo the capture as a data URL in the result.
    #[arg(long)]
    original: bool,

    /// Store snapshots of failed scans in this directory.
    #[arg(long)]
    diagnostics_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct TemplateArgs {
    /// Output image; the format follows the extension.
    #[arg(long)]
    out: PathBuf,

    /// Layout version to render.
    #[arg(long)]
    layout: Option<String>,

    /// Number of questions; the layout's count when omitted.
    #[arg(long)]
    questions: Option<usize>,

    /// Draw an outline around every bubble.
    #[arg(long)]
    outlines: bool,

    /// Pre-fill answers, in answer key syntax.
    #[arg(long)]
    fill: Option<String>,
}

#[derive(Debug, Args)]
pub struct DiagnosticsArgs {
    /// Snapshot directory written by `scan --diagnostics-dir`.
    dir: PathBuf,

    /// Number of events to list.
    #[arg(long, default_value_t = 20)]
    limit: u32,

    /// Check one snapshot against its journaled fingerprint.
    #[arg(long)]
    verify: Option<String>,
}

// -- Shared ---------------------------------------------------------------------

/// Load the engine configuration, letting `--layout-dir` override the file.
pub fn load_config(path: Option<&Path>, layout_dir: Option<PathBuf>) -> anyhow::Result<EngineConfig> {
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };
    if layout_dir.is_some() {
        config.layout_dir = layout_dir;
    }
    Ok(config)
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_image(path: &Path) -> anyhow::Result<ImageInput> {
    let bytes = fs::read(path).with_context(|| format!("reading image {}", path.display()))?;
    Ok(ImageInput::Bytes(bytes))
}

/// Decode a `data:image/...;base64,` URL and write its payload to `path`.
fn write_data_url(url: &str, path: &Path) -> anyhow::Result<()> {
    let payload = url
        .split_once(',')
        .map(|(_, payload)| payload)
        .context("image is not a data URL")?;
    let bytes = STANDARD.decode(payload).context("decoding image payload")?;
    fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "Image written");
    Ok(())
}

// -- Scan -----------------------------------------------------------------------

pub fn scan(config: EngineConfig, args: ScanArgs) -> anyhow::Result<()> {
    let mut engine = OmrEngine::new(config);
    if let Some(dir) = &args.diagnostics_dir {
        let sink = DirectorySink::open(dir).with_context(|| format!("opening diagnostics dir {}", dir.display()))?;
        engine = engine.with_diagnostic_sink(Arc::new(sink));
    }

    let mut request = ScanRequest::new(read_image(&args.image)?)
        .with_images(args.rectified.is_some(), args.audit.is_some())
        .with_original(args.original);
    if let Some(version) = args.layout {
        request = request.with_layout_version(version);
    }
    if let Some(count) = args.questions {
        request = request.with_question_count(count);
    }
    if let Some(raw) = &args.answer_key {
        request = request.with_answer_key(AnswerKey::parse(raw).context("parsing answer key")?);
    }

    let mut result = engine.scan(&request);
    engine.flush_diagnostics();

    // Images went to files; keep the printed result readable.
    if let (Some(url), Some(path)) = (result.processed_image.take(), &args.rectified) {
        write_data_url(&url, path)?;
    }
    if let (Some(url), Some(path)) = (result.audit_map.take(), &args.audit) {
        write_data_url(&url, path)?;
    }
    if !result.success {
        warn!(error = ?result.error, "Scan did not succeed");
    }
    print_json(&result)
}

// -- Preview --------------------------------------------------------------------

pub fn preview(config: EngineConfig, image: &Path) -> anyhow::Result<()> {
    let engine = OmrEngine::new(config);
    print_json(&engine.preview(&read_image(image)?))
}

// -- Layouts and templates ------------------------------------------------------

pub fn layout(config: EngineConfig, version: Option<&str>) -> anyhow::Result<()> {
    let engine = OmrEngine::new(config);
    let spec = engine.layouts().get(version);
    print_json(&LayoutFile::from((*spec).clone()))
}

pub fn template(config: EngineConfig, args: TemplateArgs) -> anyhow::Result<()> {
    let engine = OmrEngine::new(config);
    let spec = engine.layouts().get(args.layout.as_deref());
    let options = spec.options.clone();

    let mut renderer = SheetRenderer::new((*spec).clone()).with_outlines(args.outlines);
    if let Some(count) = args.questions {
        renderer = renderer.with_question_count(count);
    }
    if let Some(raw) = &args.fill {
        let key = AnswerKey::parse(raw).context("parsing --fill")?;
        for (question, answer) in key.0.iter().enumerate() {
            let Some(answer) = answer else { continue };
            let Some(option) = options.iter().position(|o| o.eq_ignore_ascii_case(answer)) else {
                bail!("question {}: {answer:?} is not one of {options:?}", question + 1);
            };
            renderer = renderer.mark(question, option);
        }
    }

    let sheet = renderer.render();
    sheet
        .save(&args.out)
        .with_context(|| format!("writing template {}", args.out.display()))?;
    print_json(&json!({
        "path": args.out,
        "layout_version": spec.version,
        "width": sheet.width(),
        "height": sheet.height(),
        "anchor_centers": renderer.anchor_centers(),
    }))
}

// -- Diagnostics ----------------------------------------------------------------

pub fn diagnostics(args: DiagnosticsArgs) -> anyhow::Result<()> {
    let store = DirectorySink::open(&args.dir)?;
    if let Some(event_id) = &args.verify {
        store.verify(event_id)?;
        return print_json(&json!({ "event_id": event_id, "verified": true }));
    }
    print_json(&store.recent(args.limit)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_dir_flag_overrides_config_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("engine.json");
        fs::write(&path, r#"{"default_layout_version": "v2", "layout_dir": "/srv/layouts"}"#).expect("write config");

        let config = load_config(Some(&path), None).expect("load");
        assert_eq!(config.default_layout_version, "v2");
        assert_eq!(config.layout_dir, Some(PathBuf::from("/srv/layouts")));

        let config = load_config(Some(&path), Some(tmp.path().to_path_buf())).expect("load");
        assert_eq!(config.layout_dir.as_deref(), Some(tmp.path()));
        assert!(load_config(Some(&tmp.path().join("missing.json")), None).is_err());
    }

    #[test]
    fn data_urls_are_written_as_raw_bytes() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let out = tmp.path().join("audit.jpg");
        write_data_url(&format!("data:image/jpeg;base64,{}", STANDARD.encode(b"jpeg")), &out).expect("write");
        assert_eq!(fs::read(&out).expect("read"), b"jpeg");
        assert!(write_data_url("no comma here", &out).is_err());
    }
}
