use std::path::Path;

use crate::error::{DetectError, Result};

/// Ordered class-label table for the detection head.
///
/// The label file is newline-delimited, one label per line; the line
/// index is the class id the engine emits. Lines are trimmed but never
/// dropped, so ids stay aligned with the file.
#[derive(Debug, Clone)]
pub struct LabelMap {
    labels: Vec<String>,
}

impl LabelMap {
    /// Load labels from a text file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_text(&text))
    }

    /// Parse labels from newline-delimited text.
    pub fn from_text(text: &str) -> Self {
        let labels = text.lines().map(|line| line.trim().to_owned()).collect();
        Self { labels }
    }

    /// Resolve a class id to its label.
    ///
    /// An out-of-range id means the model and the label file do not
    /// belong together, which the caller must treat as fatal.
    pub fn get(&self, class_id: i64) -> Result<&str> {
        usize::try_from(class_id)
            .ok()
            .and_then(|index| self.labels.get(index))
            .map(String::as_str)
            .ok_or(DetectError::LabelMismatch {
                class_id,
                num_labels: self.labels.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
