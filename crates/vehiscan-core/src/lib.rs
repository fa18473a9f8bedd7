pub mod error;
pub mod labels;
pub mod traits;
pub mod types;

pub use error::{DetectError, Result};
pub use labels::LabelMap;
pub use traits::InferenceEngine;
pub use types::*;
