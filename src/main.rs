use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spectral_color_rs::logger;
use spectral_color_rs::session::SessionConfig;

use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "spectral_color_rs", about = "Multispectral capture to color rendering")]
struct Cli {
    /// Log at debug level regardless of RUST_LOG
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process a capture session described by a JSON file
    Run {
        #[arg(short, long)]
        session: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.verbose {
        logger::init_with_level("debug");
    } else {
        logger::init();
    }

    match cli.command {
        Command::Run { session } => run(&session),
    }
}

fn run(path: &Path) -> Result<()> {
    info!("Starting spectral_color_rs...");

    let session = SessionConfig::from_file(path)
        .with_context(|| format!("failed to load session {}", path.display()))?;
    info!(
        lights = session.lights,
        frames = session.frames.len(),
        "Session loaded"
    );

    let outcome = session
        .run()
        .with_context(|| format!("session {} failed", path.display()))?;

    let report = &outcome.report;
    info!(
        processed = report.frames_processed,
        elapsed = ?report.timings.total_duration(),
        "Capture processed"
    );
    if report.guard.total() > 0 {
        warn!(guarded = report.guard.total(), "Divisions by zero were guarded");
    }
    info!("Display image: {}", outcome.rgb_path.display());
    if let Some(lab) = &outcome.lab_path {
        info!("Lab planes: {}", lab.display());
    }
    if let Some(archive) = &outcome.archive_path {
        info!("Archive: {}", archive.display());
    }
    Ok(())
}
