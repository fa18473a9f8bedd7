use thiserror::Error;

/// Top-level error type for the vehiscan pipeline.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("GPU configuration error: {0}")]
    GpuConfig(String),

    #[error("Image decode error: {0}")]
    ImageDecode(String),

    #[error("Model loading error: {0}")]
    ModelLoad(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Visualization error: {0}")]
    Visualization(String),

    #[error("class id {class_id} out of range for label file with {num_labels} entries")]
    LabelMismatch { class_id: i64, num_labels: usize },

    #[error("Inconsistent engine output: {0}")]
    Consistency(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DetectError>;
