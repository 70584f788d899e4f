//! Class label list

use crate::error::VisionError;
use std::fs;
use std::path::Path;

/// Ordered class labels; line `i` of the source file names class index `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelList {
    labels: Vec<String>,
}

impl LabelList {
    /// Load one label per line from a UTF-8 text file.
    pub fn load(path: &Path) -> Result<Self, VisionError> {
        let content = fs::read_to_string(path)
            .map_err(|e| VisionError::LabelLoad(format!("Failed to read labels {:?}: {}", path, e)))?;
        let labels = Self::from_lines(content.trim_start_matches('\u{feff}').lines())
            .map_err(|e| match e {
                VisionError::LabelLoad(msg) => VisionError::LabelLoad(format!("{:?}: {}", path, msg)),
                other => other,
            })?;
        Ok(labels)
    }

    /// Build from in-memory lines. Surrounding whitespace is trimmed. Blank
    /// lines stay as empty labels so later lines keep their class index.
    pub fn from_lines<I, S>(lines: I) -> Result<Self, VisionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let labels: Vec<String> = lines
            .into_iter()
            .map(|line| line.as_ref().trim().to_string())
            .collect();

        if labels.iter().all(|label| label.is_empty()) {
            return Err(VisionError::LabelLoad("Label list is empty".to_string()));
        }

        Ok(Self { labels })
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}
