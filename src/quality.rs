//! Page quality gate.
//!
//! Every page is scored before any expensive work happens: blur (variance of
//! the Laplacian response), mean brightness, and contrast (grayscale standard
//! deviation). Soft failures only produce warnings; a page is hard-rejected
//! only when the blur score falls below half of the configured threshold.

use image::RgbImage;
use image::buffer::ConvertBuffer;
use imageproc::filter::laplacian_filter;
use tracing::{info, warn};

use serde::{Deserialize, Serialize};

use crate::core::PipelineConfig;

/// Contrast below this standard deviation is flagged regardless of config.
const CONTRAST_FLOOR: f64 = 20.0;

/// Quality assessment for a single page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub page_num: u32,
    /// False only when the page should be skipped entirely.
    pub acceptable: bool,
    /// Variance of the Laplacian response over the grayscale page.
    pub blur_score: f64,
    /// Mean grayscale intensity.
    pub brightness: f64,
    /// Grayscale standard deviation.
    pub contrast: f64,
    /// Human-readable soft warnings.
    pub warnings: Vec<String>,
}

/// Scores a page against the configured quality thresholds.
pub fn assess_quality(image: &RgbImage, page_num: u32, config: &PipelineConfig) -> QualityReport {
    let gray: image::GrayImage = image.convert();

    let blur_score = laplacian_variance(&gray);
    let (brightness, contrast) = mean_and_std(&gray);

    let mut warnings = Vec::new();
    if blur_score < config.blur_threshold {
        warnings.push(format!(
            "blurry image (score {blur_score:.1} < {:.1})",
            config.blur_threshold
        ));
    }
    if brightness < config.brightness_min {
        warnings.push(format!("too dark (brightness {brightness:.1})"));
    } else if brightness > config.brightness_max {
        warnings.push(format!("too bright (brightness {brightness:.1})"));
    }
    if contrast < CONTRAST_FLOOR {
        warnings.push(format!("low contrast ({contrast:.1})"));
    }

    // Only severe blur rejects outright; everything else is advisory.
    let acceptable = blur_score >= config.blur_threshold * 0.5;

    QualityReport {
        page_num,
        acceptable,
        blur_score,
        brightness,
        contrast,
        warnings,
    }
}

/// Runs quality assessment over a set of already-loaded reports and logs a
/// per-page line plus a summary. Used by the quality-check-only mode.
pub fn report_quality_summary(reports: &[QualityReport]) {
    let mut rejected = 0usize;
    let mut warned = 0usize;
    for report in reports {
        if !report.acceptable {
            rejected += 1;
            warn!(
                page = report.page_num,
                blur = format_args!("{:.1}", report.blur_score),
                "page rejected by quality gate"
            );
        } else if !report.warnings.is_empty() {
            warned += 1;
            warn!(
                page = report.page_num,
                warnings = report.warnings.join("; "),
                "page has quality warnings"
            );
        }
    }
    info!(
        total = reports.len(),
        rejected, warned, "quality check complete"
    );
}

fn laplacian_variance(gray: &image::GrayImage) -> f64 {
    let response = laplacian_filter(gray);
    let n = response.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mean: f64 = response.iter().map(|&v| v as f64).sum::<f64>() / n;
    response
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n
}

fn mean_and_std(gray: &image::GrayImage) -> (f64, f64) {
    let n = gray.len() as f64;
    if n == 0.0 {
        return (0.0, 0.0);
    }
    let mean: f64 = gray.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var: f64 = gray
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn flat_page(value: u8) -> RgbImage {
        RgbImage::from_pixel(64, 64, Rgb([value, value, value]))
    }

    fn checkerboard() -> RgbImage {
        RgbImage::from_fn(64, 64, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    #[test]
    fn flat_page_is_rejected_as_blurry() {
        let config = PipelineConfig::default();
        let report = assess_quality(&flat_page(127), 1, &config);
        assert!(!report.acceptable);
        assert_eq!(report.blur_score, 0.0);
        assert!(report.warnings.iter().any(|w| w.contains("blurry")));
        assert!(report.warnings.iter().any(|w| w.contains("low contrast")));
    }

    #[test]
    fn checkerboard_passes_the_gate() {
        let config = PipelineConfig::default();
        let report = assess_quality(&checkerboard(), 1, &config);
        assert!(report.acceptable);
        assert!(report.blur_score > config.blur_threshold);
        assert!((report.brightness - 127.5).abs() < 2.0);
        assert!(report.contrast > CONTRAST_FLOOR);
    }

    #[test]
    fn dark_page_warns_but_is_not_rejected_on_brightness_alone() {
        let config = PipelineConfig::default();
        // Dark checkerboard variant: sharp but dim.
        let image = RgbImage::from_fn(64, 64, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([40, 40, 40])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let report = assess_quality(&image, 1, &config);
        assert!(report.warnings.iter().any(|w| w.contains("too dark")));
        // Rejection only tracks blur, so this stays acceptable if sharp enough.
        assert_eq!(report.acceptable, report.blur_score >= config.blur_threshold * 0.5);
    }
}
