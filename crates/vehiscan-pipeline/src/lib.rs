//! Facade over the detection stages: configuration, engine selection
//! and the end-to-end `DetectPipeline`.

pub mod config;
pub mod pipeline;

pub use config::PipelineConfig;
pub use pipeline::DetectPipeline;
