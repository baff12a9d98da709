//! Generic pure-Rust recognition backend built on ocrs.
//!
//! This backend terminates every fallback chain: it needs no GPU and no
//! external service, only the two `.rten` model files in the model
//! directory. ocrs reports no per-line confidence, so lines carry a fixed
//! nominal score.

use std::path::PathBuf;

use image::RgbImage;
use ocrs::{ImageSource, OcrEngine, OcrEngineParams, TextItem};
use once_cell::sync::OnceCell;
use rten::Model;
use tracing::debug;

use crate::core::config::default_model_dir;
use crate::core::{Bbox, OcrError};
use crate::engine::{RawLine, RecognitionBackend};

const DETECTION_MODEL: &str = "text-detection.rten";
const RECOGNITION_MODEL: &str = "text-recognition.rten";

/// Nominal confidence for ocrs output, which exposes none of its own.
const NOMINAL_CONFIDENCE: f32 = 0.9;

pub struct GenericBackend {
    model_dir: PathBuf,
    engine: OnceCell<OcrEngine>,
}

impl GenericBackend {
    /// Creates the backend; `model_dir` of `None` uses the ocrs cache
    /// directory.
    pub fn new(model_dir: Option<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.unwrap_or_else(default_model_dir),
            engine: OnceCell::new(),
        }
    }

    fn engine(&self) -> Result<&OcrEngine, OcrError> {
        self.engine.get_or_try_init(|| {
            debug!(dir = %self.model_dir.display(), "loading ocrs models");
            let detection = Model::load_file(self.model_dir.join(DETECTION_MODEL))
                .map_err(|e| OcrError::recognition("generic", format!("loading detection model: {e}")))?;
            let recognition = Model::load_file(self.model_dir.join(RECOGNITION_MODEL))
                .map_err(|e| {
                    OcrError::recognition("generic", format!("loading recognition model: {e}"))
                })?;
            OcrEngine::new(OcrEngineParams {
                detection_model: Some(detection),
                recognition_model: Some(recognition),
                ..Default::default()
            })
            .map_err(|e| OcrError::recognition("generic", format!("engine init: {e}")))
        })
    }
}

/// Axis-aligned bounds of a set of corner points.
fn corners_bbox(corners: impl Iterator<Item = (i32, i32)>) -> Bbox {
    let mut bbox = Bbox::new(i32::MAX, i32::MAX, i32::MIN, i32::MIN);
    for (x, y) in corners {
        bbox.x1 = bbox.x1.min(x);
        bbox.y1 = bbox.y1.min(y);
        bbox.x2 = bbox.x2.max(x);
        bbox.y2 = bbox.y2.max(y);
    }
    bbox
}

impl RecognitionBackend for GenericBackend {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn is_available(&self) -> bool {
        self.model_dir.join(DETECTION_MODEL).is_file()
            && self.model_dir.join(RECOGNITION_MODEL).is_file()
    }

    fn recognize_lines(&self, image: &RgbImage) -> Result<Vec<RawLine>, OcrError> {
        let engine = self.engine()?;

        let source = ImageSource::from_bytes(image.as_raw(), image.dimensions())
            .map_err(|e| OcrError::recognition("generic", format!("preparing input: {e}")))?;
        let input = engine
            .prepare_input(source)
            .map_err(|e| OcrError::recognition("generic", format!("preparing input: {e}")))?;

        let words = engine
            .detect_words(&input)
            .map_err(|e| OcrError::recognition("generic", format!("detecting words: {e}")))?;
        let line_rects = engine.find_text_lines(&input, &words);
        let lines = engine
            .recognize_text(&input, &line_rects)
            .map_err(|e| OcrError::recognition("generic", format!("recognizing text: {e}")))?;

        let mut out = Vec::new();
        for line in lines.into_iter().flatten() {
            let text = line.to_string();
            if text.trim().is_empty() {
                continue;
            }

            let corners = line.bounding_rect().corners();
            let bbox = corners_bbox(corners.iter().map(|p| (p.x, p.y)));

            out.push(RawLine {
                text,
                confidence: NOMINAL_CONFIDENCE,
                bbox,
            });
        }
        Ok(out)
    }
}
