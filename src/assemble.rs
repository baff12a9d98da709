//! Final document assembly.
//!
//! Collects the per-page layout and OCR artifacts, renders each page to
//! Markdown in reading order, merges paragraphs broken across page
//! boundaries, and writes `book.md` plus `book_metadata.json`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::{OcrError, PipelineConfig, RegionType};
use crate::engine::{OcrRecord, PageOcr};
use crate::layout::PageLayout;
use crate::postprocess::{ConfidenceStats, aggregate_confidence};
use crate::utils;

static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?。…]\s*$").unwrap());

static LAYOUT_FILE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^page_(\d+)_layout\.json$").unwrap());
static OCR_FILE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^page_(\d+)_ocr\.json$").unwrap());

/// Book-level metadata written next to `book.md`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookMetadata {
    pub source_dir: String,
    pub page_count: usize,
    pub engine: String,
    pub mean_confidence: f32,
    pub pages_needing_review: Vec<u32>,
    pub created_at: String,
    pub pipeline_version: String,
}

/// Renders one page's layout and OCR records to Markdown.
///
/// Regions are walked in reading order. Figures and tables become image
/// references (numbered per page), footers become `<sub>` lines, uncertain
/// text becomes an HTML comment, headers get a `##` prefix, and everything
/// else is a plain paragraph. The page ends with a `<!-- page N -->` marker.
pub fn build_page_markdown(page_num: u32, layout: &PageLayout, records: &[OcrRecord]) -> String {
    let mut regions: Vec<_> = layout.regions.iter().collect();
    regions.sort_by_key(|r| r.reading_order);

    // Records whose id matches no layout region are consumed positionally,
    // covering whole-page recognition against a single-region layout.
    let matched = |record: &OcrRecord| layout.regions.iter().any(|r| r.id == record.region_id);
    let by_region: BTreeMap<u32, &OcrRecord> = records
        .iter()
        .filter(|r| matched(r))
        .map(|r| (r.region_id, r))
        .collect();
    let mut unmatched = records.iter().filter(|r| !matched(r));

    let mut lines: Vec<String> = Vec::new();
    let mut figure_counter = 0u32;
    let mut table_counter = 0u32;

    for region in regions {
        let record = by_region
            .get(&region.id)
            .copied()
            .or_else(|| unmatched.next());
        let text = record.map(|r| r.text.trim()).unwrap_or("");

        match region.region_type {
            RegionType::Figure | RegionType::Table => {
                let (counter, label) = if region.region_type == RegionType::Figure {
                    figure_counter += 1;
                    (figure_counter, "그림")
                } else {
                    table_counter += 1;
                    (table_counter, "표")
                };
                if let Some(path) = &region.extracted_image {
                    lines.push(format!("![{label} {counter}]({path})"));
                } else if !text.is_empty() {
                    lines.push(format!("![{label} {counter}]"));
                }
                lines.push(String::new());
            }
            RegionType::Footer => {
                if !text.is_empty() {
                    lines.push(format!("<sub>{text}</sub>"));
                    lines.push(String::new());
                }
            }
            RegionType::Text | RegionType::Header => {
                if text.is_empty() {
                    continue;
                }
                let Some(record) = record else { continue };

                if record.confidence_level.is_uncertain() {
                    lines.push(format!("<!-- 불확실: {text} -->"));
                    lines.push(String::new());
                    continue;
                }

                if region.region_type == RegionType::Header {
                    lines.push(format!("## {text}"));
                } else {
                    lines.push(text.to_string());
                }
                lines.push(String::new());
            }
        }
    }

    lines.push(format!("<!-- page {page_num} -->"));
    lines.push(String::new());
    lines.join("\n")
}

/// Merges paragraphs broken across page boundaries.
///
/// Two consecutive pages merge when the previous page's last text line does
/// not end a sentence and the next page opens with a continuation: a line
/// that is not a header, image, or comment and starts with a Hangul syllable
/// or a lowercase letter.
pub fn merge_cross_page_paragraphs(pages_md: &[String]) -> String {
    let Some(first) = pages_md.first() else {
        return String::new();
    };
    let mut parts: Vec<String> = vec![first.clone()];

    for curr in &pages_md[1..] {
        let prev = match parts.last() {
            Some(prev) => prev,
            None => continue,
        };

        let last_text_line = prev
            .trim_end()
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty() && !l.starts_with("<!--"))
            .unwrap_or("");
        let first_text_line = curr
            .trim_start()
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty() && !l.starts_with("<!--"))
            .unwrap_or("");

        let should_merge = !last_text_line.is_empty()
            && !first_text_line.is_empty()
            && !SENTENCE_END.is_match(last_text_line)
            && !first_text_line.starts_with('#')
            && !first_text_line.starts_with("![")
            && starts_with_continuation(first_text_line);

        if should_merge {
            let merged = format!("{} {}", prev.trim_end(), curr.trim_start());
            if let Some(last) = parts.last_mut() {
                *last = merged;
            }
        } else {
            parts.push(curr.clone());
        }
    }

    parts.join("\n")
}

fn starts_with_continuation(line: &str) -> bool {
    let Some(first) = line.chars().next() else {
        return false;
    };
    let cp = first as u32;
    (0xAC00..=0xD7A3).contains(&cp) || first.is_lowercase()
}

/// Builds the metadata record for a finished book.
pub fn build_metadata(
    input_dir: &Path,
    page_count: usize,
    engine: &str,
    stats: &ConfidenceStats,
    pages_needing_review: Vec<u32>,
) -> BookMetadata {
    BookMetadata {
        source_dir: input_dir.display().to_string(),
        page_count,
        engine: engine.to_string(),
        mean_confidence: stats.mean_confidence,
        pages_needing_review,
        created_at: Local::now().to_rfc3339(),
        pipeline_version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

fn collect_artifacts(
    output_dir: &Path,
) -> Result<(BTreeMap<u32, PageLayout>, BTreeMap<u32, PageOcr>), OcrError> {
    let mut layouts = BTreeMap::new();
    let mut ocrs = BTreeMap::new();

    for entry in std::fs::read_dir(output_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if LAYOUT_FILE_RE.is_match(name) {
            let layout: PageLayout = utils::load_json(&entry.path())?;
            layouts.insert(layout.page_num, layout);
        } else if OCR_FILE_RE.is_match(name) {
            let ocr: PageOcr = utils::load_json(&entry.path())?;
            ocrs.insert(ocr.page_num, ocr);
        }
    }
    Ok((layouts, ocrs))
}

/// Assembles `book.md` and `book_metadata.json` from all per-page artifacts
/// in the output directory. Returns the path of the written book.
pub fn build_book(config: &PipelineConfig) -> Result<PathBuf, OcrError> {
    let output_dir = config.output_dir();
    let (layouts, ocrs) = collect_artifacts(&output_dir)?;

    let mut all_pages: Vec<u32> = layouts.keys().chain(ocrs.keys()).copied().collect();
    all_pages.sort_unstable();
    all_pages.dedup();
    if all_pages.is_empty() {
        return Err(OcrError::invalid_input(format!(
            "no page artifacts found in {}",
            output_dir.display()
        )));
    }

    let mut pages_md = Vec::with_capacity(all_pages.len());
    let mut all_records: Vec<OcrRecord> = Vec::new();
    let mut pages_needing_review: Vec<u32> = Vec::new();
    let mut engine = String::new();

    for &page_num in &all_pages {
        let fallback;
        let layout = match layouts.get(&page_num) {
            Some(layout) => layout,
            None => {
                fallback = PageLayout::whole_page(page_num, 0, 0);
                &fallback
            }
        };
        let records: &[OcrRecord] = ocrs.get(&page_num).map(|o| o.results.as_slice()).unwrap_or(&[]);
        if let Some(ocr) = ocrs.get(&page_num) {
            if engine.is_empty() {
                engine = ocr.engine.clone();
            }
        }

        pages_md.push(build_page_markdown(page_num, layout, records));
        if records.iter().any(|r| r.needs_review) {
            pages_needing_review.push(page_num);
        }
        all_records.extend_from_slice(records);
    }

    let body = merge_cross_page_paragraphs(&pages_md);

    let book_name = config
        .input_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "book".to_string());
    if engine.is_empty() {
        engine = config.engine.as_str().to_string();
    }
    let front_matter = format!(
        "# {book_name}\n\n- 페이지 수: {}\n- OCR 엔진: {engine}\n- 생성일: {}\n\n---\n\n",
        all_pages.len(),
        Local::now().format("%Y-%m-%d %H:%M"),
    );

    let book_path = output_dir.join("book.md");
    std::fs::write(&book_path, front_matter + &body)?;
    info!(path = %book_path.display(), pages = all_pages.len(), "book assembled");

    let stats = aggregate_confidence(&all_records);
    let metadata = build_metadata(
        &config.input_dir,
        all_pages.len(),
        &engine,
        &stats,
        pages_needing_review,
    );
    utils::save_json(&metadata, &output_dir.join("book_metadata.json"))?;

    Ok(book_path)
}
