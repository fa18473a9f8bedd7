//! Vehicle detection stages: image feed, ONNX Runtime engine,
//! postprocessing and visualization.

pub mod engine;
pub mod feed;
pub mod postprocess;
pub mod visualize;

pub use engine::{cuda_device_from_env, Device, OrtEngine};
pub use feed::{Batch, DetectInput, FeedConfig, ImageFeed};
pub use postprocess::DetectionPostprocessor;
