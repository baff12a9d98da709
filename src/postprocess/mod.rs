//! Recognition postprocessing: jamo repair, line merging, confidence
//! bucketing, and per-page confidence statistics.

pub mod jamo;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::PipelineConfig;
use crate::engine::OcrRecord;

pub use jamo::fix_jamo_errors;

/// Placeholder substituted for text too unreliable to keep.
pub const UNCLEAR_PLACEHOLDER: &str = "[이미지: 텍스트 불명확]";

static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?。…]\s*$").unwrap());
static BULLET_START: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\s]*[-•▪▸►●○◆◇※☞·\d]+[.)]\s").unwrap());

/// Confidence bucket for a recognized region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
    VeryLow,
}

impl ConfidenceLevel {
    /// Buckets whose text is wrapped in an uncertainty marker when rendered.
    pub fn is_uncertain(&self) -> bool {
        matches!(self, Self::Low | Self::VeryLow)
    }
}

/// Buckets a confidence score. The high and low cut points are fixed; only
/// the high/medium boundary follows the configured threshold.
pub fn classify_confidence(confidence: f32, threshold: f32) -> ConfidenceLevel {
    if confidence >= 0.85 {
        ConfidenceLevel::High
    } else if confidence >= threshold {
        ConfidenceLevel::Medium
    } else if confidence >= 0.5 {
        ConfidenceLevel::Low
    } else {
        ConfidenceLevel::VeryLow
    }
}

/// Merges lines broken mid-sentence within each paragraph.
///
/// Paragraphs are blank-line separated. A line joins its predecessor when
/// the predecessor does not end a sentence, the line is not a bullet item,
/// and the line does not begin with an ASCII uppercase letter.
pub fn merge_lines(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let merged_paragraphs: Vec<String> = text
        .split("\n\n")
        .map(|para| {
            let mut lines = para.split('\n');
            let Some(first) = lines.next() else {
                return String::new();
            };

            let mut merged: Vec<String> = Vec::new();
            let mut current = first.to_string();
            for line in lines {
                let stripped = line.trim();
                if stripped.is_empty() {
                    continue;
                }

                let starts_upper = stripped
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_uppercase());
                if !SENTENCE_END.is_match(&current) && !BULLET_START.is_match(line) && !starts_upper
                {
                    current = format!("{} {}", current.trim_end(), stripped);
                } else {
                    merged.push(std::mem::replace(&mut current, line.to_string()));
                }
            }
            merged.push(current);
            merged.join("\n")
        })
        .collect();

    merged_paragraphs.join("\n\n")
}

/// Applies text repair and review flagging to a page's OCR records, in
/// place.
///
/// Very-low-confidence text is replaced by [`UNCLEAR_PLACEHOLDER`]; all
/// other text gets jamo repair and line merging. A record needs review
/// whenever its bucket is below high.
pub fn postprocess_page(records: &mut [OcrRecord], config: &PipelineConfig) {
    for record in records.iter_mut() {
        let level = classify_confidence(record.confidence, config.confidence_threshold);
        record.confidence_level = level;

        if level == ConfidenceLevel::VeryLow {
            record.text = UNCLEAR_PLACEHOLDER.to_string();
            record.needs_review = true;
        } else {
            let repaired = fix_jamo_errors(&record.text);
            record.text = merge_lines(&repaired);
            record.needs_review = level != ConfidenceLevel::High;
        }
    }
}

/// Confidence statistics for one page's records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfidenceStats {
    pub mean_confidence: f32,
    pub min_confidence: f32,
    pub high_count: usize,
    pub medium_count: usize,
    pub low_count: usize,
    pub very_low_count: usize,
    pub needs_review: bool,
}

/// Aggregates per-record confidence into page-level statistics.
pub fn aggregate_confidence(records: &[OcrRecord]) -> ConfidenceStats {
    if records.is_empty() {
        return ConfidenceStats::default();
    }

    let mut stats = ConfidenceStats {
        min_confidence: f32::INFINITY,
        ..Default::default()
    };
    let mut sum = 0.0f32;
    for record in records {
        sum += record.confidence;
        stats.min_confidence = stats.min_confidence.min(record.confidence);
        match record.confidence_level {
            ConfidenceLevel::High => stats.high_count += 1,
            ConfidenceLevel::Medium => stats.medium_count += 1,
            ConfidenceLevel::Low => stats.low_count += 1,
            ConfidenceLevel::VeryLow => stats.very_low_count += 1,
        }
        stats.needs_review |= record.needs_review;
    }
    stats.mean_confidence = sum / records.len() as f32;
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(text: &str, confidence: f32) -> OcrRecord {
        OcrRecord {
            region_id: 0,
            text: text.to_string(),
            confidence,
            reading_order: 0,
            needs_review: false,
            confidence_level: ConfidenceLevel::High,
        }
    }

    #[test]
    fn classification_boundaries() {
        assert_eq!(classify_confidence(0.9, 0.7), ConfidenceLevel::High);
        assert_eq!(classify_confidence(0.85, 0.7), ConfidenceLevel::High);
        assert_eq!(classify_confidence(0.7, 0.7), ConfidenceLevel::Medium);
        assert_eq!(classify_confidence(0.6, 0.7), ConfidenceLevel::Low);
        assert_eq!(classify_confidence(0.5, 0.7), ConfidenceLevel::Low);
        assert_eq!(classify_confidence(0.49, 0.7), ConfidenceLevel::VeryLow);
    }

    #[test]
    fn level_serializes_snake_case() {
        let json = serde_json::to_string(&ConfidenceLevel::VeryLow).unwrap();
        assert_eq!(json, "\"very_low\"");
    }

    #[test]
    fn broken_sentence_lines_merge() {
        let input = "이 문장은 중간에서\n잘렸습니다.";
        assert_eq!(merge_lines(input), "이 문장은 중간에서 잘렸습니다.");
    }

    #[test]
    fn sentence_end_blocks_merging() {
        let input = "첫 문장입니다.\n둘째 문장";
        assert_eq!(merge_lines(input), input);
    }

    #[test]
    fn bullets_and_uppercase_start_new_lines() {
        // A bullet needs `.` or `)` right after the marker to count.
        let numbered = "항목 목록\n1. 첫째 항목\n2) 둘째 항목";
        assert_eq!(merge_lines(numbered), numbered);

        // A bare dash is not a bullet and merges like any broken line.
        assert_eq!(merge_lines("항목 목록\n- 항목"), "항목 목록 - 항목");

        let english = "continued text\nNew sentence here";
        assert_eq!(merge_lines(english), english);
    }

    #[test]
    fn paragraph_breaks_are_preserved() {
        let input = "첫 단락 잘린\n부분입니다.\n\n둘째 단락";
        assert_eq!(merge_lines(input), "첫 단락 잘린 부분입니다.\n\n둘째 단락");
    }

    #[test]
    fn very_low_confidence_gets_placeholder() {
        let config = PipelineConfig::default();
        let mut records = vec![record("noise", 0.3)];
        postprocess_page(&mut records, &config);
        assert_eq!(records[0].text, UNCLEAR_PLACEHOLDER);
        assert!(records[0].needs_review);
        assert_eq!(records[0].confidence_level, ConfidenceLevel::VeryLow);
    }

    #[test]
    fn high_confidence_text_is_repaired_not_flagged() {
        let config = PipelineConfig::default();
        let mut records = vec![record("ㅎㅏㄴㄱㅡㄹ 텍스트", 0.95)];
        postprocess_page(&mut records, &config);
        assert_eq!(records[0].text, "한글 텍스트");
        assert!(!records[0].needs_review);
    }

    #[test]
    fn medium_confidence_is_flagged_for_review() {
        let config = PipelineConfig::default();
        let mut records = vec![record("보통 신뢰도", 0.75)];
        postprocess_page(&mut records, &config);
        assert!(records[0].needs_review);
        assert_eq!(records[0].confidence_level, ConfidenceLevel::Medium);
    }

    #[test]
    fn stats_aggregate_buckets_and_review_flag() {
        let config = PipelineConfig::default();
        let mut records = vec![record("하나", 0.9), record("둘", 0.75), record("셋", 0.55)];
        postprocess_page(&mut records, &config);
        let stats = aggregate_confidence(&records);
        assert_eq!(stats.high_count, 1);
        assert_eq!(stats.medium_count, 1);
        assert_eq!(stats.low_count, 1);
        assert!(stats.needs_review);
        assert!((stats.min_confidence - 0.55).abs() < 1e-6);

        let empty = aggregate_confidence(&[]);
        assert_eq!(empty.mean_confidence, 0.0);
        assert!(!empty.needs_review);
    }
}
