use ndarray::ArrayView2;

use vehiscan_core::{DetectError, Detection, LabelMap, RawDetection, Result};

use crate::feed::scaled_extent;

/// Converts raw engine rows into per-image detection lists.
///
/// Steps, in order: group rows by batch-local image index, drop rows
/// under the confidence threshold, resolve class ids against the label
/// table, then map canvas coordinates back to the original image and
/// clip to its bounds. A dropped row's class id is never validated.
pub struct DetectionPostprocessor {
    score_thresh: f32,
    input_size: u32,
}

impl DetectionPostprocessor {
    pub fn new(input_size: u32) -> Self {
        Self {
            score_thresh: 0.2,
            input_size,
        }
    }

    pub fn with_threshold(mut self, score_thresh: f32) -> Self {
        self.score_thresh = score_thresh;
        self
    }

    /// Decode one batch of rows into one detection list per image.
    ///
    /// `sizes` is the feed's [batch, 2] original (height, width) tensor.
    /// The returned vec holds exactly one entry per batch image, in batch
    /// order, empty where nothing survived.
    pub fn process_batch(
        &self,
        rows: &[RawDetection],
        sizes: ArrayView2<'_, i32>,
        labels: &LabelMap,
    ) -> Result<Vec<Vec<Detection>>> {
        let batch = sizes.shape()[0];

        let mut grouped: Vec<Vec<&RawDetection>> = vec![Vec::new(); batch];
        for row in rows {
            let bucket = grouped.get_mut(row.image_index).ok_or_else(|| {
                DetectError::Consistency(format!(
                    "row references image {} in a batch of {batch}",
                    row.image_index
                ))
            })?;
            bucket.push(row);
        }

        let mut results = Vec::with_capacity(batch);
        for (index, bucket) in grouped.into_iter().enumerate() {
            let height = sizes[[index, 0]];
            let width = sizes[[index, 1]];
            if width <= 0 || height <= 0 {
                return Err(DetectError::Consistency(format!(
                    "image {index} has non-positive size {width}x{height}"
                )));
            }

            let mut detections = Vec::new();
            for row in bucket {
                if row.confidence < self.score_thresh {
                    continue;
                }
                let label = labels.get(row.class_id)?.to_owned();
                let (left, top, right, bottom) =
                    self.to_original(row, width as u32, height as u32);
                detections.push(Detection {
                    label,
                    confidence: row.confidence,
                    left,
                    top,
                    right,
                    bottom,
                });
            }
            results.push(detections);
        }

        Ok(results)
    }

    /// Map a canvas-space box back to original pixels and clip.
    fn to_original(&self, row: &RawDetection, width: u32, height: u32) -> (f32, f32, f32, f32) {
        let (scaled_w, scaled_h) = scaled_extent(width, height, self.input_size);
        let fx = width as f32 / scaled_w as f32;
        let fy = height as f32 / scaled_h as f32;
        let clip_x = |v: f32| (v * fx).clamp(0.0, width as f32);
        let clip_y = |v: f32| (v * fy).clamp(0.0, height as f32);
        (
            clip_x(row.x1),
            clip_y(row.y1),
            clip_x(row.x2),
            clip_y(row.y2),
        )
    }
}
