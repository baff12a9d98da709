//! Run configuration for the book OCR pipeline.

use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::OcrError;

/// Requested recognition engine.
///
/// Each engine resolves to a fixed fallback chain of backends; see
/// [`crate::engine::fallback_chain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Korean-specialized backend; requires GPU and a wired model handle.
    Klocr,
    /// Paddle-style backend; requires a wired model handle.
    Paddle,
    /// General-purpose backend; requires a wired model handle.
    Easyocr,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Klocr => "klocr",
            Self::Paddle => "paddle",
            Self::Easyocr => "easyocr",
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full pipeline configuration.
///
/// Defaults mirror the CLI defaults; the CLI populates an instance of this
/// struct and hands it to [`crate::pipeline::Pipeline`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory containing `page_NNNN.png` captures.
    pub input_dir: PathBuf,
    /// Output subdirectory, created under `input_dir`.
    pub output_subdir: String,

    /// Requested recognition engine.
    pub engine: EngineKind,
    /// Whether GPU-backed engines may be used.
    pub use_gpu: bool,

    /// Whether to run the external layout model (fallback: one full-page
    /// text region).
    pub use_layout: bool,

    /// First page to process (inclusive).
    pub page_start: u32,
    /// Last page to process (inclusive); 0 means no upper bound.
    pub page_end: u32,

    /// Recognition batch size hint forwarded to backends.
    pub batch_size: usize,

    /// Minimum confidence below which a region is flagged for review at the
    /// recognition stage.
    pub confidence_threshold: f32,

    /// Resume from a previous checkpoint instead of starting cold.
    pub resume: bool,
    /// Save the checkpoint after every N completed pages.
    pub checkpoint_interval: usize,

    /// Assess quality for every page and exit without recognizing.
    pub quality_check_only: bool,

    /// Blur warning threshold (variance of the Laplacian response). Hard
    /// rejection fires below half of this value.
    pub blur_threshold: f64,
    /// Acceptable mean-brightness band, inclusive.
    pub brightness_min: f64,
    pub brightness_max: f64,
    /// Whether deskew runs before contrast normalization.
    pub deskew_enabled: bool,
    /// Clip limit for tiled histogram equalization.
    pub clahe_clip_limit: f32,
    /// Tile grid size (NxN) for tiled histogram equalization.
    pub clahe_grid_size: u32,

    /// Directory holding the generic backend's `.rten` model files; `None`
    /// uses the ocrs cache directory.
    pub ocr_model_dir: Option<PathBuf>,

    /// Enable debug-level logging.
    pub verbose: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            output_subdir: "ocr_output".to_string(),
            engine: EngineKind::Paddle,
            use_gpu: true,
            use_layout: true,
            page_start: 1,
            page_end: 0,
            batch_size: 4,
            confidence_threshold: 0.7,
            resume: false,
            checkpoint_interval: 10,
            quality_check_only: false,
            blur_threshold: 100.0,
            brightness_min: 50.0,
            brightness_max: 230.0,
            deskew_enabled: true,
            clahe_clip_limit: 2.0,
            clahe_grid_size: 8,
            ocr_model_dir: None,
            verbose: false,
        }
    }
}

impl PipelineConfig {
    /// Directory receiving all per-page artifacts and the final document.
    pub fn output_dir(&self) -> PathBuf {
        self.input_dir.join(&self.output_subdir)
    }

    /// Directory receiving extracted figure/table crops.
    pub fn images_dir(&self) -> PathBuf {
        self.output_dir().join("images")
    }

    /// Primary checkpoint file path. The backup sits next to it with an
    /// additional `.bak` extension.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.input_dir.join(".ocr_checkpoint.json")
    }

    /// Creates the output directories.
    pub fn ensure_dirs(&self) -> Result<(), OcrError> {
        std::fs::create_dir_all(self.output_dir())?;
        std::fs::create_dir_all(self.images_dir())?;
        Ok(())
    }

    /// Hash of the recognition-relevant configuration, recorded in the
    /// checkpoint so a resumed run can detect config drift. `DefaultHasher`
    /// is not guaranteed stable across Rust releases; the drift check only
    /// warns, so a spurious mismatch after a toolchain upgrade is harmless.
    pub fn config_hash(&self) -> String {
        let mut hasher = std::hash::DefaultHasher::new();
        self.engine.hash(&mut hasher);
        self.use_layout.hash(&mut hasher);
        self.confidence_threshold.to_bits().hash(&mut hasher);
        self.blur_threshold.to_bits().hash(&mut hasher);
        self.deskew_enabled.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

/// Parses a `--pages` range such as `"1-50"` or `"12"` into
/// `(page_start, page_end)`, where `page_end == 0` means unbounded.
pub fn parse_page_range(spec: &str) -> Result<(u32, u32), OcrError> {
    let mut parts = spec.splitn(2, '-');
    let start = parts
        .next()
        .unwrap_or("")
        .trim()
        .parse::<u32>()
        .map_err(|_| OcrError::invalid_input(format!("invalid page range '{spec}' (e.g. '1-50')")))?;
    let end = match parts.next() {
        Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
            OcrError::invalid_input(format!("invalid page range '{spec}' (e.g. '1-50')"))
        })?,
        None => 0,
    };
    Ok((start, end))
}

/// Returns the default model directory for the generic backend, honoring the
/// XDG cache layout used by the ocrs tooling.
pub fn default_model_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg).join("ocrs")
    } else if let Ok(home) = std::env::var("HOME") {
        Path::new(&home).join(".cache").join("ocrs")
    } else {
        PathBuf::from("ocrs-models")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_paths_derive_from_input_dir() {
        let config = PipelineConfig {
            input_dir: PathBuf::from("/books/alpha"),
            ..Default::default()
        };
        assert_eq!(config.output_dir(), PathBuf::from("/books/alpha/ocr_output"));
        assert_eq!(
            config.images_dir(),
            PathBuf::from("/books/alpha/ocr_output/images")
        );
        assert_eq!(
            config.checkpoint_path(),
            PathBuf::from("/books/alpha/.ocr_checkpoint.json")
        );
    }

    #[test]
    fn config_hash_tracks_recognition_settings() {
        let a = PipelineConfig::default();
        let mut b = PipelineConfig::default();
        assert_eq!(a.config_hash(), b.config_hash());

        b.confidence_threshold = 0.9;
        assert_ne!(a.config_hash(), b.config_hash());

        // Unrelated settings do not affect the hash.
        let mut c = PipelineConfig::default();
        c.verbose = true;
        c.checkpoint_interval = 50;
        assert_eq!(a.config_hash(), c.config_hash());
    }

    #[test]
    fn page_range_parsing() {
        assert_eq!(parse_page_range("1-50").unwrap(), (1, 50));
        assert_eq!(parse_page_range("12").unwrap(), (12, 0));
        assert!(parse_page_range("abc").is_err());
        assert!(parse_page_range("3-x").is_err());
    }
}
