use ndarray::{ArrayView2, ArrayView4};

use crate::error::Result;
use crate::types::RawDetection;

/// The black-box inference seam.
///
/// Implementations execute the exported detection graph (or a stand-in)
/// on a preprocessed batch and hand back raw rows. The graph already ran
/// NMS and score decoding, and the rows are in canvas coordinates;
/// nothing behind this trait rescales to the original image.
pub trait InferenceEngine: Send + Sync {
    /// Human-readable name for tracing/metrics.
    fn name(&self) -> &str;

    /// Run the network on one batch.
    ///
    /// `images` is [batch, 3, S, S] normalized CHW pixels; `sizes` is
    /// [batch, 2] holding each image's original (height, width). Returned
    /// rows reference images by batch-local index.
    fn run(
        &self,
        images: ArrayView4<'_, f32>,
        sizes: ArrayView2<'_, i32>,
    ) -> Result<Vec<RawDetection>>;
}
