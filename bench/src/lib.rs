//! Synthetic inputs shared by the pipeline benchmarks.

use image::{Rgb, RgbImage};

use vehiscan_core::RawDetection;

/// Deterministic image with enough gradient structure to keep the
/// resampler honest.
pub fn synthetic_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

/// Scripted engine rows spread evenly across a batch. Every row stays
/// inside the canvas and above the default threshold.
pub fn synthetic_rows(batch: usize, per_image: usize) -> Vec<RawDetection> {
    let mut rows = Vec::with_capacity(batch * per_image);
    for image_index in 0..batch {
        for i in 0..per_image {
            let offset = (i * 7 % 300) as f32;
            rows.push(RawDetection {
                image_index,
                class_id: (i % 6) as i64,
                confidence: 0.3 + (i % 7) as f32 * 0.1,
                x1: offset,
                y1: offset,
                x2: offset + 120.0,
                y2: offset + 90.0,
            });
        }
    }
    rows
}
