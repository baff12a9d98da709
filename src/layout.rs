//! Layout analysis.
//!
//! A page is segmented into typed regions (text, header, footer, figure,
//! table) by an injected [`LayoutModel`]. When no model is wired or analysis
//! is disabled, the page degrades to a single full-page text region so that
//! recognition always has something to work on. Figure and table regions are
//! cropped to PNG files and referenced from the layout artifact.

use std::path::Path;
use std::sync::Arc;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::{Bbox, OcrError, PipelineConfig, RegionType};
use crate::utils;

/// A raw detection reported by a layout model, before type mapping.
#[derive(Debug, Clone)]
pub struct DetectedRegion {
    pub bbox: Bbox,
    /// Model-specific label, e.g. `"SectionHeader"` or `"Picture"`.
    pub label: String,
    pub confidence: f32,
    /// Reading position predicted by the model; ties broken by detection
    /// order.
    pub position: u32,
}

/// Segmentation model behind layout analysis.
///
/// Implementations wrap an external detector; the analyzer owns label
/// mapping, ordering, and the degraded-mode fallback.
pub trait LayoutModel: Send + Sync {
    fn name(&self) -> &str;
    fn detect_regions(&self, image: &RgbImage) -> Result<Vec<DetectedRegion>, OcrError>;
}

/// A typed, ordered region of a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutRegion {
    pub id: u32,
    pub bbox: Bbox,
    #[serde(rename = "type")]
    pub region_type: RegionType,
    /// Dense rank within the page, `0..regions.len()`.
    pub reading_order: u32,
    pub confidence: f32,
    /// Relative path of the extracted crop, for graphic regions only.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub extracted_image: Option<String>,
}

/// Layout artifact for one page, persisted as `page_NNNN_layout.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLayout {
    pub page_num: u32,
    pub width: u32,
    pub height: u32,
    pub regions: Vec<LayoutRegion>,
}

impl PageLayout {
    /// Degraded-mode layout: one full-page text region.
    pub fn whole_page(page_num: u32, width: u32, height: u32) -> Self {
        Self {
            page_num,
            width,
            height,
            regions: vec![LayoutRegion {
                id: 0,
                bbox: Bbox::full(width, height),
                region_type: RegionType::Text,
                reading_order: 0,
                confidence: 1.0,
                extracted_image: None,
            }],
        }
    }

    /// Artifact path for this page under `output_dir`.
    pub fn artifact_path(output_dir: &Path, page_num: u32) -> std::path::PathBuf {
        output_dir.join(format!("page_{page_num:04}_layout.json"))
    }
}

/// Maps a model label onto a region type. Unknown labels are treated as
/// body text so nothing the model found is dropped.
pub fn map_label(label: &str) -> RegionType {
    match label {
        "Title" | "SectionHeader" | "Section-header" | "PageHeader" | "Page-header" => {
            RegionType::Header
        }
        "Footnote" | "PageFooter" | "Page-footer" => RegionType::Footer,
        "Picture" | "Figure" => RegionType::Figure,
        "Table" => RegionType::Table,
        _ => RegionType::Text,
    }
}

/// Runs layout analysis with fallback to a single whole-page region.
pub struct LayoutAnalyzer {
    model: Option<Arc<dyn LayoutModel>>,
    enabled: bool,
}

impl LayoutAnalyzer {
    pub fn new(model: Option<Arc<dyn LayoutModel>>, enabled: bool) -> Self {
        Self { model, enabled }
    }

    /// Segments `image` into ordered, typed regions.
    ///
    /// Model failures are downgraded to the whole-page fallback so a flaky
    /// detector never fails a page.
    pub fn analyze(&self, image: &RgbImage, page_num: u32) -> PageLayout {
        let (width, height) = image.dimensions();

        let model = match (&self.model, self.enabled) {
            (Some(model), true) => model,
            _ => return PageLayout::whole_page(page_num, width, height),
        };

        let detections = match model.detect_regions(image) {
            Ok(detections) => detections,
            Err(err) => {
                warn!(page = page_num, error = %err, "layout model failed, using whole-page region");
                return PageLayout::whole_page(page_num, width, height);
            }
        };
        if detections.is_empty() {
            debug!(page = page_num, "layout model found no regions, using whole-page region");
            return PageLayout::whole_page(page_num, width, height);
        }

        let mut indexed: Vec<(usize, DetectedRegion)> = detections.into_iter().enumerate().collect();
        indexed.sort_by_key(|(_, d)| d.position);

        let regions = indexed
            .into_iter()
            .enumerate()
            .map(|(order, (index, detected))| LayoutRegion {
                id: index as u32,
                bbox: detected.bbox.clamp_to(width, height),
                region_type: map_label(&detected.label),
                reading_order: order as u32,
                confidence: detected.confidence,
                extracted_image: None,
            })
            .collect();

        PageLayout {
            page_num,
            width,
            height,
            regions,
        }
    }
}

/// Crops figure and table regions to PNG files under the images directory
/// and records the relative path on each region.
pub fn extract_figures(
    image: &RgbImage,
    layout: &mut PageLayout,
    config: &PipelineConfig,
) -> Result<(), OcrError> {
    let images_dir = config.images_dir();

    for region in &mut layout.regions {
        if !region.region_type.is_graphic() {
            continue;
        }
        let bbox = region.bbox.clamp_to(image.width(), image.height());
        if bbox.is_empty() {
            continue;
        }

        let file_name = format!(
            "{}_{:04}_{:03}.png",
            region.region_type.as_str(),
            layout.page_num,
            region.id
        );
        let crop = image::imageops::crop_imm(
            image,
            bbox.x1 as u32,
            bbox.y1 as u32,
            bbox.width() as u32,
            bbox.height() as u32,
        )
        .to_image();
        crop.save(images_dir.join(&file_name))?;
        region.extracted_image = Some(format!("images/{file_name}"));
    }
    Ok(())
}

/// Persists the layout artifact for a page.
pub fn save_layout(layout: &PageLayout, output_dir: &Path) -> Result<(), OcrError> {
    utils::save_json(layout, &PageLayout::artifact_path(output_dir, layout.page_num))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    struct FixedModel {
        detections: Vec<DetectedRegion>,
    }

    impl LayoutModel for FixedModel {
        fn name(&self) -> &str {
            "fixed"
        }

        fn detect_regions(&self, _image: &RgbImage) -> Result<Vec<DetectedRegion>, OcrError> {
            Ok(self.detections.clone())
        }
    }

    struct FailingModel;

    impl LayoutModel for FailingModel {
        fn name(&self) -> &str {
            "failing"
        }

        fn detect_regions(&self, _image: &RgbImage) -> Result<Vec<DetectedRegion>, OcrError> {
            Err(OcrError::Layout {
                context: "model crashed".to_string(),
                source: Box::new(std::io::Error::other("boom")),
            })
        }
    }

    fn page() -> RgbImage {
        RgbImage::from_pixel(800, 1200, Rgb([255, 255, 255]))
    }

    #[test]
    fn disabled_layout_yields_whole_page_region() {
        let analyzer = LayoutAnalyzer::new(None, false);
        let layout = analyzer.analyze(&page(), 7);
        assert_eq!(layout.regions.len(), 1);
        let region = &layout.regions[0];
        assert_eq!(region.id, 0);
        assert_eq!(region.reading_order, 0);
        assert_eq!(region.region_type, RegionType::Text);
        assert_eq!(region.confidence, 1.0);
        assert_eq!(region.bbox, Bbox::full(800, 1200));
    }

    #[test]
    fn model_failure_falls_back_to_whole_page() {
        let analyzer = LayoutAnalyzer::new(Some(Arc::new(FailingModel)), true);
        let layout = analyzer.analyze(&page(), 3);
        assert_eq!(layout.regions.len(), 1);
        assert_eq!(layout.regions[0].bbox, Bbox::full(800, 1200));
    }

    #[test]
    fn regions_are_sorted_and_reading_order_reassigned() {
        let model = FixedModel {
            detections: vec![
                DetectedRegion {
                    bbox: Bbox::new(0, 600, 800, 1100),
                    label: "Text".to_string(),
                    confidence: 0.8,
                    position: 5,
                },
                DetectedRegion {
                    bbox: Bbox::new(0, 0, 800, 100),
                    label: "SectionHeader".to_string(),
                    confidence: 0.9,
                    position: 1,
                },
                DetectedRegion {
                    bbox: Bbox::new(0, 150, 800, 550),
                    label: "Picture".to_string(),
                    confidence: 0.7,
                    position: 2,
                },
            ],
        };
        let analyzer = LayoutAnalyzer::new(Some(Arc::new(model)), true);
        let layout = analyzer.analyze(&page(), 1);

        let orders: Vec<u32> = layout.regions.iter().map(|r| r.reading_order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert_eq!(layout.regions[0].region_type, RegionType::Header);
        assert_eq!(layout.regions[1].region_type, RegionType::Figure);
        assert_eq!(layout.regions[2].region_type, RegionType::Text);
        // Ids keep the detection index.
        assert_eq!(layout.regions[0].id, 1);
        assert_eq!(layout.regions[1].id, 2);
        assert_eq!(layout.regions[2].id, 0);
    }

    #[test]
    fn unknown_labels_map_to_text() {
        assert_eq!(map_label("ListItem"), RegionType::Text);
        assert_eq!(map_label("Table"), RegionType::Table);
        assert_eq!(map_label("Footnote"), RegionType::Footer);
    }

    #[test]
    fn extract_figures_crops_and_records_paths() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            input_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        config.ensure_dirs().unwrap();

        let mut layout = PageLayout {
            page_num: 12,
            width: 800,
            height: 1200,
            regions: vec![
                LayoutRegion {
                    id: 0,
                    bbox: Bbox::new(100, 100, 300, 400),
                    region_type: RegionType::Figure,
                    reading_order: 0,
                    confidence: 0.9,
                    extracted_image: None,
                },
                LayoutRegion {
                    id: 1,
                    bbox: Bbox::new(0, 500, 800, 1100),
                    region_type: RegionType::Text,
                    reading_order: 1,
                    confidence: 0.9,
                    extracted_image: None,
                },
            ],
        };

        extract_figures(&page(), &mut layout, &config).unwrap();
        assert_eq!(
            layout.regions[0].extracted_image.as_deref(),
            Some("images/figure_0012_000.png")
        );
        assert!(config.images_dir().join("figure_0012_000.png").exists());
        assert!(layout.regions[1].extracted_image.is_none());
    }
}
