//! Core module for the book OCR pipeline.
//!
//! Contains the configuration, error, and shared geometry types used by every
//! pipeline stage.

pub mod config;
pub mod errors;
pub mod types;

pub use config::{EngineKind, PipelineConfig};
pub use errors::OcrError;
pub use types::{Bbox, RegionType};
