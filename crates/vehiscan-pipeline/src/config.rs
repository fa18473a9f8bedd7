use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use vehiscan_detect::FeedConfig;

/// Static pipeline configuration, loadable from a JSON file. Every
/// field has a default, so a partial file only overrides what it names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Exported detection graph.
    pub model_path: PathBuf,
    /// Newline-separated label table matching the graph's class ids.
    pub label_path: PathBuf,
    /// Square canvas edge the graph was exported with.
    pub input_size: u32,
    /// Per-channel normalization mean.
    pub mean: [f32; 3],
    /// Per-channel normalization standard deviation.
    pub std: [f32; 3],
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/yolov3_darknet53_vehicles.onnx"),
            label_path: PathBuf::from("assets/labels/vehicle_labels.txt"),
            input_size: 608,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }
}

impl PipelineConfig {
    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            input_size: self.input_size,
            mean: self.mean,
            std: self.std,
        }
    }
}
