// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Marksense: optical mark recognition for photographed answer sheets.
//
// Entry point. Initialises logging, parses the command line and dispatches to
// the subcommands in `commands`. Every subcommand prints JSON on stdout.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Read photographed multiple-choice answer sheets.
#[derive(Debug, Parser)]
#[command(name = "marksense", version, about)]
struct Cli {
    /// Engine configuration (JSON). Missing keys keep their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding `layout_<version>.json` files.
    #[arg(long, global = true)]
    layout_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan one captured sheet and print the result.
    Scan(commands::ScanArgs),
    /// Quick alignment check: locate the corner markers only.
    Preview {
        /// Captured image (JPEG, PNG, ...).
        image: PathBuf,
    },
    /// Print a resolved layout, with missing keys filled from the baseline.
    Layout {
        /// Layout version; the configured default when omitted.
        version: Option<String>,
    },
    /// Render a printable answer sheet template.
    Template(commands::TemplateArgs),
    /// Inspect a diagnostic snapshot directory.
    Diagnostics(commands::DiagnosticsArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref(), cli.layout_dir)?;

    match cli.command {
        Command::Scan(args) => commands::scan(config, args),
        Command::Preview { image } => commands::preview(config, &image),
        Command::Layout { version } => commands::layout(config, version.as_deref()),
        Command::Template(args) => commands::template(config, args),
        Command::Diagnostics(args) => commands::diagnostics(args),
    }
}
