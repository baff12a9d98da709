//! Text recognition backends.
//!
//! Recognition is pluggable behind [`RecognitionBackend`]. The requested
//! engine resolves to a fixed fallback chain; the first available backend in
//! the chain wins. Backends return raw lines in image-local coordinates; the
//! shared [`RecognitionBackend::recognize`] default handles per-region
//! cropping and the translation back into page coordinates.

pub mod generic;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::{Bbox, EngineKind, OcrError, PipelineConfig};
use crate::layout::LayoutRegion;
use crate::postprocess::ConfidenceLevel;
use crate::utils;

/// One recognized text line in the coordinate space of the submitted image.
#[derive(Debug, Clone)]
pub struct RawLine {
    pub text: String,
    pub confidence: f32,
    pub bbox: Bbox,
}

/// A recognized region in page coordinates.
#[derive(Debug, Clone)]
pub struct RecognizedRegion {
    /// Id of the originating layout region, or a 1-based sequence number in
    /// whole-page mode.
    pub region_id: u32,
    pub text: String,
    pub confidence: f32,
    pub bbox: Bbox,
}

/// Line-level recognizer handle for externally wired models.
///
/// Exists so GPU-backed engines can be injected without this crate linking
/// their runtimes.
pub trait LineRecognizer: Send + Sync {
    fn recognize(&self, image: &RgbImage) -> Result<Vec<RawLine>, OcrError>;
}

/// A recognition backend: availability probing plus line recognition.
pub trait RecognitionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this backend can run right now (models present, required
    /// hardware available).
    fn is_available(&self) -> bool;

    /// Recognizes all text lines in `image`, in image-local coordinates.
    fn recognize_lines(&self, image: &RgbImage) -> Result<Vec<RawLine>, OcrError>;

    /// Recognizes a page, honoring layout regions when provided.
    ///
    /// With regions, each region is cropped, recognized, and translated back
    /// into page coordinates; region lines are joined in line order and carry
    /// the layout region's id. Without regions (or with an empty list) the
    /// whole page is recognized and regions are numbered from 1 in line
    /// order.
    fn recognize(
        &self,
        image: &RgbImage,
        regions: Option<&[LayoutRegion]>,
    ) -> Result<Vec<RecognizedRegion>, OcrError> {
        match regions {
            Some(regions) if !regions.is_empty() => {
                let mut out = Vec::with_capacity(regions.len());
                for region in regions {
                    let bbox = region.bbox.clamp_to(image.width(), image.height());
                    if bbox.is_empty() {
                        continue;
                    }
                    let crop = image::imageops::crop_imm(
                        image,
                        bbox.x1 as u32,
                        bbox.y1 as u32,
                        bbox.width() as u32,
                        bbox.height() as u32,
                    )
                    .to_image();

                    let lines = self.recognize_lines(&crop)?;
                    if lines.is_empty() {
                        continue;
                    }

                    let text = lines
                        .iter()
                        .map(|l| l.text.as_str())
                        .collect::<Vec<_>>()
                        .join("\n");
                    let confidence =
                        lines.iter().map(|l| l.confidence).sum::<f32>() / lines.len() as f32;
                    // Line bboxes are crop-local; translate into page
                    // coordinates and take their union as the region extent.
                    let bbox = lines
                        .iter()
                        .map(|l| l.bbox.offset_by(&region.bbox))
                        .reduce(|a, b| a.union(&b))
                        .unwrap_or(region.bbox);
                    out.push(RecognizedRegion {
                        region_id: region.id,
                        text,
                        confidence,
                        bbox,
                    });
                }
                Ok(out)
            }
            _ => {
                let lines = self.recognize_lines(image)?;
                Ok(lines
                    .into_iter()
                    .enumerate()
                    .map(|(index, line)| RecognizedRegion {
                        region_id: index as u32 + 1,
                        text: line.text,
                        confidence: line.confidence,
                        bbox: line.bbox,
                    })
                    .collect())
            }
        }
    }
}

/// Fallback chain for each requested engine. The generic backend terminates
/// every chain.
pub fn fallback_chain(engine: EngineKind) -> &'static [&'static str] {
    match engine {
        EngineKind::Klocr => &["klocr", "paddle", "generic"],
        EngineKind::Paddle => &["paddle", "generic"],
        EngineKind::Easyocr => &["easyocr", "generic"],
    }
}

/// Externally wired model handles. All optional; the generic backend needs
/// none of them.
#[derive(Default)]
pub struct BackendHandles {
    pub klocr: Option<Arc<dyn LineRecognizer>>,
    pub paddle: Option<Arc<dyn LineRecognizer>>,
    pub easyocr: Option<Arc<dyn LineRecognizer>>,
}

/// Backend over an injected line-recognizer handle.
struct WiredBackend {
    name: &'static str,
    handle: Option<Arc<dyn LineRecognizer>>,
    /// When true the backend additionally requires GPU use to be enabled.
    needs_gpu: bool,
    gpu_enabled: bool,
}

impl RecognitionBackend for WiredBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn is_available(&self) -> bool {
        self.handle.is_some() && (!self.needs_gpu || self.gpu_enabled)
    }

    fn recognize_lines(&self, image: &RgbImage) -> Result<Vec<RawLine>, OcrError> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| OcrError::recognition(self.name, "backend not wired"))?;
        handle.recognize(image)
    }
}

/// Resolves the configured engine to the first available backend in its
/// fallback chain.
pub fn select_backend(
    config: &PipelineConfig,
    handles: BackendHandles,
) -> Result<Arc<dyn RecognitionBackend>, OcrError> {
    let candidates: Vec<Arc<dyn RecognitionBackend>> = vec![
        Arc::new(WiredBackend {
            name: "klocr",
            handle: handles.klocr,
            needs_gpu: true,
            gpu_enabled: config.use_gpu,
        }),
        Arc::new(WiredBackend {
            name: "paddle",
            handle: handles.paddle,
            needs_gpu: false,
            gpu_enabled: config.use_gpu,
        }),
        Arc::new(WiredBackend {
            name: "easyocr",
            handle: handles.easyocr,
            needs_gpu: false,
            gpu_enabled: config.use_gpu,
        }),
        Arc::new(generic::GenericBackend::new(config.ocr_model_dir.clone())),
    ];

    let chain = fallback_chain(config.engine);
    for name in chain {
        let Some(backend) = candidates.iter().find(|b| b.name() == *name) else {
            continue;
        };
        if backend.is_available() {
            if *name != chain[0] {
                warn!(
                    requested = chain[0],
                    selected = name,
                    "requested engine unavailable, falling back"
                );
            } else {
                info!(engine = name, "recognition backend selected");
            }
            return Ok(Arc::clone(backend));
        }
        debug!(backend = name, "backend unavailable, trying next in chain");
    }

    Err(OcrError::config_error_detailed(
        "engine selection",
        format!("no backend in chain {chain:?} is available"),
    ))
}

/// One recognized region as persisted in the page OCR artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrRecord {
    pub region_id: u32,
    pub text: String,
    pub confidence: f32,
    pub reading_order: u32,
    pub needs_review: bool,
    pub confidence_level: ConfidenceLevel,
}

/// OCR artifact for one page, persisted as `page_NNNN_ocr.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageOcr {
    pub page_num: u32,
    pub engine: String,
    /// Seconds spent in recognition for this page.
    pub processing_time: f64,
    pub results: Vec<OcrRecord>,
}

impl PageOcr {
    /// Artifact path for this page under `output_dir`.
    pub fn artifact_path(output_dir: &Path, page_num: u32) -> std::path::PathBuf {
        output_dir.join(format!("page_{page_num:04}_ocr.json"))
    }
}

/// Runs recognition for one page and assembles the OCR artifact.
///
/// Resource exhaustion from the backend is downgraded to an empty successful
/// result so one oversized page cannot fail the run; every other backend
/// error propagates and fails the page.
pub fn run_ocr(
    backend: &dyn RecognitionBackend,
    image: &RgbImage,
    page_num: u32,
    regions: Option<&[LayoutRegion]>,
    config: &PipelineConfig,
) -> Result<PageOcr, OcrError> {
    let started = Instant::now();

    let recognized = match backend.recognize(image, regions) {
        Ok(recognized) => recognized,
        Err(err) if err.is_resource_exhaustion() => {
            warn!(page = page_num, error = %err, "recognizer exhausted resources, emitting empty page");
            Vec::new()
        }
        Err(err) => return Err(err),
    };

    let order_of = |region_id: u32| -> u32 {
        regions
            .and_then(|regions| regions.iter().find(|r| r.id == region_id))
            .map(|r| r.reading_order)
            .unwrap_or(region_id)
    };

    let mut results: Vec<OcrRecord> = recognized
        .into_iter()
        .map(|region| {
            let level =
                crate::postprocess::classify_confidence(region.confidence, config.confidence_threshold);
            OcrRecord {
                region_id: region.region_id,
                text: region.text,
                confidence: region.confidence,
                reading_order: order_of(region.region_id),
                needs_review: region.confidence < config.confidence_threshold,
                confidence_level: level,
            }
        })
        .collect();
    results.sort_by_key(|r| r.reading_order);

    Ok(PageOcr {
        page_num,
        engine: backend.name().to_string(),
        processing_time: started.elapsed().as_secs_f64(),
        results,
    })
}

/// Persists the OCR artifact for a page.
pub fn save_ocr(ocr: &PageOcr, output_dir: &Path) -> Result<(), OcrError> {
    utils::save_json(ocr, &PageOcr::artifact_path(output_dir, ocr.page_num))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RegionType;
    use image::Rgb;

    struct ScriptedBackend {
        lines: Vec<RawLine>,
        fail_with: Option<fn() -> OcrError>,
    }

    impl RecognitionBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn recognize_lines(&self, _image: &RgbImage) -> Result<Vec<RawLine>, OcrError> {
            if let Some(make) = self.fail_with {
                return Err(make());
            }
            Ok(self.lines.clone())
        }
    }

    fn region(id: u32, order: u32, bbox: Bbox) -> LayoutRegion {
        LayoutRegion {
            id,
            bbox,
            region_type: RegionType::Text,
            reading_order: order,
            confidence: 0.9,
            extracted_image: None,
        }
    }

    fn page() -> RgbImage {
        RgbImage::from_pixel(400, 600, Rgb([255, 255, 255]))
    }

    #[test]
    fn chains_terminate_in_generic() {
        assert_eq!(fallback_chain(EngineKind::Klocr), ["klocr", "paddle", "generic"]);
        assert_eq!(fallback_chain(EngineKind::Paddle), ["paddle", "generic"]);
        assert_eq!(fallback_chain(EngineKind::Easyocr), ["easyocr", "generic"]);
    }

    #[test]
    fn region_mode_translates_coordinates_and_keeps_ids() {
        let backend = ScriptedBackend {
            lines: vec![
                RawLine {
                    text: "hello".to_string(),
                    confidence: 0.8,
                    bbox: Bbox::new(5, 10, 60, 30),
                },
                RawLine {
                    text: "world".to_string(),
                    confidence: 0.8,
                    bbox: Bbox::new(8, 40, 70, 60),
                },
            ],
            fail_with: None,
        };
        let regions = vec![region(4, 0, Bbox::new(100, 200, 300, 400))];
        let out = backend.recognize(&page(), Some(&regions)).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].region_id, 4);
        // Union of the crop-local line boxes shifted by the region origin.
        assert_eq!(out[0].bbox, Bbox::new(105, 210, 170, 260));
        assert_eq!(out[0].text, "hello\nworld");
    }

    #[test]
    fn whole_page_mode_numbers_regions_from_one() {
        let backend = ScriptedBackend {
            lines: vec![
                RawLine {
                    text: "first".to_string(),
                    confidence: 0.9,
                    bbox: Bbox::new(0, 0, 100, 20),
                },
                RawLine {
                    text: "second".to_string(),
                    confidence: 0.7,
                    bbox: Bbox::new(0, 30, 100, 50),
                },
            ],
            fail_with: None,
        };
        let out = backend.recognize(&page(), None).unwrap();
        let ids: Vec<u32> = out.iter().map(|r| r.region_id).collect();
        assert_eq!(ids, vec![1, 2]);

        // An empty region list behaves like whole-page mode.
        let out = backend.recognize(&page(), Some(&[])).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn resource_exhaustion_yields_empty_success() {
        let backend = ScriptedBackend {
            lines: Vec::new(),
            fail_with: Some(|| OcrError::resource_exhausted("scripted", "out of memory")),
        };
        let config = PipelineConfig::default();
        let ocr = run_ocr(&backend, &page(), 9, None, &config).unwrap();
        assert!(ocr.results.is_empty());
        assert_eq!(ocr.page_num, 9);
    }

    #[test]
    fn other_backend_errors_propagate() {
        let backend = ScriptedBackend {
            lines: Vec::new(),
            fail_with: Some(|| OcrError::recognition("scripted", "bad tensor")),
        };
        let config = PipelineConfig::default();
        assert!(run_ocr(&backend, &page(), 9, None, &config).is_err());
    }

    #[test]
    fn records_sort_by_reading_order_and_flag_low_confidence() {
        let backend = ScriptedBackend {
            lines: vec![RawLine {
                text: "text".to_string(),
                confidence: 0.6,
                bbox: Bbox::new(0, 0, 50, 20),
            }],
            fail_with: None,
        };
        let regions = vec![
            region(0, 1, Bbox::new(0, 300, 400, 600)),
            region(1, 0, Bbox::new(0, 0, 400, 280)),
        ];
        let config = PipelineConfig::default();
        let ocr = run_ocr(&backend, &page(), 1, Some(&regions), &config).unwrap();
        let orders: Vec<u32> = ocr.results.iter().map(|r| r.reading_order).collect();
        assert_eq!(orders, vec![0, 1]);
        assert!(ocr.results.iter().all(|r| r.needs_review));
    }

    #[test]
    fn selection_falls_back_to_generic_or_errors() {
        // No handles wired and no model files on disk: selection must either
        // pick the generic backend or report a config error, never panic.
        let config = PipelineConfig {
            ocr_model_dir: Some(std::path::PathBuf::from("/nonexistent/models")),
            ..Default::default()
        };
        let result = select_backend(&config, BackendHandles::default());
        assert!(matches!(result, Err(OcrError::Config { .. })));
    }
}
