//! Utility functions for the book OCR pipeline.
//!
//! Covers tracing setup, page-file discovery, image loading, and the JSON
//! artifact helpers shared by every stage that persists per-page state.

use std::path::{Path, PathBuf};

use image::RgbImage;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::core::OcrError;

/// Capture files are named `page_NNNN.png` by the capture tool.
static PAGE_FILE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^page_(\d+)\.png$").unwrap());

/// A discovered page capture: path plus the page number parsed from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFile {
    pub path: PathBuf,
    pub number: u32,
}

/// Initializes the tracing subscriber for the process.
///
/// Honors `RUST_LOG` when set; otherwise logs at `debug` level when `verbose`
/// and `info` otherwise. Safe to call once per process.
pub fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("bookscan={default_level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Lists page captures in `input_dir`, sorted ascending by page number and
/// filtered to the inclusive `[page_start, page_end]` range (`page_end == 0`
/// means unbounded).
///
/// Files that merely resemble captures but fail the naming convention are
/// skipped silently, as are non-file directory entries.
pub fn page_files(
    input_dir: &Path,
    page_start: u32,
    page_end: u32,
) -> Result<Vec<PageFile>, OcrError> {
    let mut pages = Vec::new();

    for entry in std::fs::read_dir(input_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(caps) = PAGE_FILE_RE.captures(name) else {
            continue;
        };
        let Ok(number) = caps[1].parse::<u32>() else {
            continue;
        };
        if number < page_start {
            continue;
        }
        if page_end > 0 && number > page_end {
            continue;
        }
        pages.push(PageFile {
            path: entry.path(),
            number,
        });
    }

    pages.sort_by_key(|p| p.number);
    Ok(pages)
}

/// Loads a page capture as an RGB raster.
pub fn load_image(path: &Path) -> Result<RgbImage, OcrError> {
    Ok(image::open(path)?.to_rgb8())
}

/// Writes `value` to `path` as pretty-printed JSON, creating parent
/// directories as needed.
pub fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<(), OcrError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Reads a JSON artifact from `path`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, OcrError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_files_are_sorted_and_range_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for n in [3u32, 1, 10, 2] {
            std::fs::write(dir.path().join(format!("page_{n:04}.png")), b"x").unwrap();
        }
        // Distractors that must be ignored.
        std::fs::write(dir.path().join("page_abc.png"), b"x").unwrap();
        std::fs::write(dir.path().join("cover.png"), b"x").unwrap();

        let all = page_files(dir.path(), 1, 0).unwrap();
        let numbers: Vec<u32> = all.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 10]);

        let ranged = page_files(dir.path(), 2, 3).unwrap();
        let numbers: Vec<u32> = ranged.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![2, 3]);
    }

    #[test]
    fn json_round_trip_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.json");
        save_json(&vec![1, 2, 3], &path).unwrap();
        let back: Vec<i32> = load_json(&path).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }
}
