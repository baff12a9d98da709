//! bookscan: a checkpointed OCR pipeline that turns a directory of scanned
//! Korean book pages into a single Markdown document.
//!
//! Pages flow through a fixed set of stages: a quality gate, preprocessing
//! (deskew, contrast normalization, denoise), layout analysis, pluggable text
//! recognition with engine fallback, Korean-aware postprocessing, and final
//! document assembly. Every stage persists its artifacts immediately, and a
//! checkpoint written at page boundaries makes interrupted runs resumable.
//!
//! # Example
//!
//! ```no_run
//! use bookscan::core::PipelineConfig;
//! use bookscan::pipeline::Pipeline;
//!
//! # fn main() -> Result<(), bookscan::core::OcrError> {
//! let config = PipelineConfig {
//!     input_dir: "./scans".into(),
//!     ..Default::default()
//! };
//! let summary = Pipeline::from_config(config)?.run()?;
//! println!("completed {} pages", summary.completed.len());
//! # Ok(())
//! # }
//! ```

pub mod assemble;
pub mod checkpoint;
pub mod core;
pub mod engine;
pub mod layout;
pub mod pipeline;
pub mod postprocess;
pub mod preprocess;
pub mod quality;
pub mod utils;

pub use crate::core::{Bbox, EngineKind, OcrError, PipelineConfig, RegionType};
pub use pipeline::{Pipeline, RunSummary};
