//! Page preprocessing: deskew, contrast normalization, denoise.
//!
//! The stages run in a fixed order. Deskew estimates the dominant text angle
//! from the minimum-area rectangle around dark pixels and rotates only when
//! the angle is meaningful. Contrast normalization is a tiled, clip-limited
//! histogram equalization. Denoise is a small median filter.

use image::buffer::ConvertBuffer;
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::contrast::otsu_level;
use imageproc::filter::median_filter;
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use imageproc::geometry::min_area_rect;
use imageproc::point::Point;
use tracing::debug;

use crate::core::PipelineConfig;

/// Angles below this magnitude are noise; the page is left unrotated.
const DESKEW_MIN_ANGLE: f64 = 0.5;

/// Fewer dark pixels than this means the page is effectively blank and the
/// angle estimate would be meaningless.
const DESKEW_MIN_POINTS: usize = 100;

/// Runs the full preprocessing chain and returns an RGB page ready for layout
/// analysis and recognition.
pub fn preprocess(image: &RgbImage, config: &PipelineConfig) -> RgbImage {
    let mut gray: GrayImage = image.convert();

    if config.deskew_enabled {
        let angle = detect_skew_angle(&gray);
        if angle.abs() > DESKEW_MIN_ANGLE {
            debug!(angle = format_args!("{angle:.2}"), "deskewing page");
            gray = rotate_about_center(
                &gray,
                (-angle).to_radians() as f32,
                Interpolation::Bicubic,
                Luma([255u8]),
            );
        }
    }

    let equalized = clahe(&gray, config.clahe_clip_limit, config.clahe_grid_size);
    let denoised = median_filter(&equalized, 1, 1);

    // Downstream stages want an RGB raster.
    RgbImage::from_fn(denoised.width(), denoised.height(), |x, y| {
        let v = denoised.get_pixel(x, y)[0];
        Rgb([v, v, v])
    })
}

/// Estimates the page skew angle in degrees.
///
/// Binarizes with Otsu (text pixels dark), collects dark-pixel coordinates,
/// fits a minimum-area rectangle around them, and derives the rectangle's
/// orientation from its longest edge, normalized into `(-45, 45]`.
pub fn detect_skew_angle(gray: &GrayImage) -> f64 {
    let threshold = otsu_level(gray);

    let mut points = Vec::new();
    for (x, y, pixel) in gray.enumerate_pixels() {
        if pixel[0] < threshold {
            points.push(Point::new(x as i32, y as i32));
        }
    }
    if points.len() < DESKEW_MIN_POINTS {
        return 0.0;
    }

    let rect = min_area_rect(&points);
    normalize_angle(rect_angle(&rect))
}

/// Orientation of the rectangle's longest edge, in degrees.
fn rect_angle(rect: &[Point<i32>; 4]) -> f64 {
    let edge = |a: Point<i32>, b: Point<i32>| {
        let dx = (b.x - a.x) as f64;
        let dy = (b.y - a.y) as f64;
        (dx * dx + dy * dy, dy.atan2(dx).to_degrees())
    };
    let (len_a, angle_a) = edge(rect[0], rect[1]);
    let (len_b, angle_b) = edge(rect[1], rect[2]);
    if len_a >= len_b { angle_a } else { angle_b }
}

/// Folds an arbitrary angle into `(-45, 45]`, the smallest rotation that
/// aligns text lines horizontally.
pub fn normalize_angle(mut angle: f64) -> f64 {
    while angle > 45.0 {
        angle -= 90.0;
    }
    while angle <= -45.0 {
        angle += 90.0;
    }
    angle
}

/// Clip-limited adaptive histogram equalization over a `grid x grid` tiling.
///
/// Each tile gets a clipped-histogram equalization lookup table; per-pixel
/// output bilinearly interpolates between the four surrounding tile tables to
/// avoid visible tile seams.
pub fn clahe(gray: &GrayImage, clip_limit: f32, grid: u32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let grid = grid.max(1);
    if width < grid || height < grid {
        return gray.clone();
    }

    let tile_w = width.div_ceil(grid);
    let tile_h = height.div_ceil(grid);

    // Per-tile lookup tables.
    let mut luts = vec![[0u8; 256]; (grid * grid) as usize];
    for ty in 0..grid {
        for tx in 0..grid {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);

            let mut hist = [0u32; 256];
            let mut count = 0u32;
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[gray.get_pixel(x, y)[0] as usize] += 1;
                    count += 1;
                }
            }
            if count == 0 {
                continue;
            }

            // Clip and redistribute the excess uniformly.
            let clip = ((clip_limit * count as f32) / 256.0).max(1.0) as u32;
            let mut excess = 0u32;
            for bin in hist.iter_mut() {
                if *bin > clip {
                    excess += *bin - clip;
                    *bin = clip;
                }
            }
            let bump = excess / 256;
            for bin in hist.iter_mut() {
                *bin += bump;
            }

            let lut = &mut luts[(ty * grid + tx) as usize];
            let mut cdf = 0u32;
            let scale = 255.0 / count as f32;
            for (value, bin) in hist.iter().enumerate() {
                cdf += *bin;
                lut[value] = (cdf as f32 * scale).round().min(255.0) as u8;
            }
        }
    }

    // Bilinear interpolation between the tile tables.
    let lut_at = |tx: i64, ty: i64, value: u8| -> f32 {
        let tx = tx.clamp(0, grid as i64 - 1) as u32;
        let ty = ty.clamp(0, grid as i64 - 1) as u32;
        luts[(ty * grid + tx) as usize][value as usize] as f32
    };

    GrayImage::from_fn(width, height, |x, y| {
        let value = gray.get_pixel(x, y)[0];

        // Position relative to tile centers.
        let fx = (x as f32 - tile_w as f32 / 2.0) / tile_w as f32;
        let fy = (y as f32 - tile_h as f32 / 2.0) / tile_h as f32;
        let tx = fx.floor() as i64;
        let ty = fy.floor() as i64;
        let wx = fx - tx as f32;
        let wy = fy - ty as f32;

        let top = lut_at(tx, ty, value) * (1.0 - wx) + lut_at(tx + 1, ty, value) * wx;
        let bottom = lut_at(tx, ty + 1, value) * (1.0 - wx) + lut_at(tx + 1, ty + 1, value) * wx;
        let out = top * (1.0 - wy) + bottom * wy;
        Luma([out.round().clamp(0.0, 255.0) as u8])
    })
}
