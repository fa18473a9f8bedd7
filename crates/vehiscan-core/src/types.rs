use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A single detected vehicle, in original-image pixel coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

/// Detection results for a single input image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResult {
    /// Where the annotated copy was written, when visualization ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
    /// Surviving detections, in the engine's output order.
    pub data: Vec<Detection>,
}

/// One raw output row from the inference engine.
///
/// Coordinates are canvas-space corners; mapping back to the original
/// image is the postprocessor's job.
#[derive(Debug, Clone, Copy)]
pub struct RawDetection {
    /// Batch-local index of the image this row belongs to.
    pub image_index: usize,
    pub class_id: i64,
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// Per-call options, mirrored by the CLI flags and the HTTP request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectOptions {
    /// Images per inference batch.
    pub batch_size: usize,
    /// Run on the GPU engine; requires CUDA_VISIBLE_DEVICES.
    pub use_gpu: bool,
    /// Directory annotated images are written to.
    pub output_dir: PathBuf,
    /// Minimum confidence for a detection to be kept.
    pub score_thresh: f32,
    /// Write an annotated copy of each input to output_dir.
    pub visualization: bool,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            batch_size: 1,
            use_gpu: false,
            output_dir: PathBuf::from("yolov3_vehicles_detect_output"),
            score_thresh: 0.2,
            visualization: true,
        }
    }
}
