//! bookscan CLI
//!
//! Converts a directory of scanned book pages (`page_NNNN.png`) into a
//! single Markdown document with per-page OCR and layout artifacts.
//!
//! # Usage
//!
//! ```bash
//! bookscan --input ./scans
//! bookscan --input ./scans --engine klocr --pages 1-50 --resume
//! bookscan --input ./scans --quality-check-only
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use bookscan::core::config::parse_page_range;
use bookscan::core::{EngineKind, PipelineConfig};
use bookscan::pipeline::Pipeline;
use bookscan::utils::init_tracing;

#[derive(Parser)]
#[command(name = "bookscan")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Scanned book to Markdown OCR pipeline", long_about = None)]
struct Cli {
    /// Directory containing page_NNNN.png captures
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// Recognition engine to request
    #[arg(long, value_enum, default_value = "paddle")]
    engine: EngineKind,

    /// Disable GPU-backed engines
    #[arg(long)]
    no_gpu: bool,

    /// Disable layout analysis (whole-page recognition)
    #[arg(long)]
    no_layout: bool,

    /// Resume from the last checkpoint
    #[arg(long)]
    resume: bool,

    /// Page range to process, e.g. "1-50" or "12"
    #[arg(long)]
    pages: Option<String>,

    /// Confidence threshold for review flagging
    #[arg(long, default_value_t = 0.7)]
    confidence: f32,

    /// Recognition batch size hint
    #[arg(long, default_value_t = 4)]
    batch_size: usize,

    /// Save the checkpoint every N pages
    #[arg(long, default_value_t = 10)]
    checkpoint_interval: usize,

    /// Assess page quality and exit without recognizing
    #[arg(long)]
    quality_check_only: bool,

    /// Directory holding the generic backend's .rten models
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "run failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), bookscan::core::OcrError> {
    let (page_start, page_end) = match &cli.pages {
        Some(spec) => parse_page_range(spec)?,
        None => (1, 0),
    };

    let config = PipelineConfig {
        input_dir: cli.input,
        engine: cli.engine,
        use_gpu: !cli.no_gpu,
        use_layout: !cli.no_layout,
        page_start,
        page_end,
        batch_size: cli.batch_size,
        confidence_threshold: cli.confidence,
        resume: cli.resume,
        checkpoint_interval: cli.checkpoint_interval.max(1),
        quality_check_only: cli.quality_check_only,
        ocr_model_dir: cli.model_dir,
        verbose: cli.verbose,
        ..Default::default()
    };

    let summary = Pipeline::from_config(config)?.run()?;

    println!("completed pages: {}", summary.completed.len());
    if !summary.failed.is_empty() {
        println!("failed pages: {:?}", summary.failed);
    }
    if let Some(book) = &summary.book_path {
        println!("book: {}", book.display());
    }
    println!("elapsed: {:.1}s", summary.elapsed_secs);
    Ok(())
}
