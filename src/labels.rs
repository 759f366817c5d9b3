//! Class label set
//!
//! The ordered list of disease names, index-aligned with the classifier head.
//! A `LabelSet` is immutable once built; it is normally read from the model
//! manifest that ships next to the weights.

use serde::{Deserialize, Serialize};

use crate::utils::error::{ClassifierError, Result};

/// Alphabetical training order of the reference 7-class model
pub const DEFAULT_LABELS: [&str; crate::NUM_CLASSES] = [
    "anthracnose",
    "healthy",
    "powdery",
    "rust",
    "sooty_mold",
    "spot",
    "yellow",
];

/// Ordered, non-empty, duplicate-free class names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    /// Build a label set, rejecting empty, blank or duplicated names
    pub fn new(labels: Vec<String>) -> Result<Self> {
        if labels.is_empty() {
            return Err(ClassifierError::Config("label set is empty".to_string()));
        }

        for (i, label) in labels.iter().enumerate() {
            if label.trim().is_empty() {
                return Err(ClassifierError::Config(format!("label {} is blank", i)));
            }
            if labels[..i].contains(label) {
                return Err(ClassifierError::Config(format!(
                    "label '{}' appears more than once",
                    label
                )));
            }
        }

        Ok(Self { labels })
    }

    /// Parse a comma-separated list, e.g. from the command line
    pub fn parse_list(list: &str) -> Result<Self> {
        Self::new(
            list.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label at a class index
    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// Class index of a label
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        Self {
            labels: DEFAULT_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl TryFrom<Vec<String>> for LabelSet {
    type Error = ClassifierError;

    fn try_from(labels: Vec<String>) -> Result<Self> {
        Self::new(labels)
    }
}

impl From<LabelSet> for Vec<String> {
    fn from(set: LabelSet) -> Self {
        set.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_set_matches_model_head() {
        let config = crate::model::SupConMobileNetConfig::new();
        assert_eq!(LabelSet::default().len(), crate::NUM_CLASSES);
        assert_eq!(config.num_classes, crate::NUM_CLASSES);
    }

    #[test]
    fn test_default_order() {
        let labels = LabelSet::default();
        assert_eq!(labels.len(), 7);
        assert_eq!(labels.get(0), Some("anthracnose"));
        assert_eq!(labels.get(3), Some("rust"));
        assert_eq!(labels.get(7), None);
        assert_eq!(labels.index_of("yellow"), Some(6));
    }

    #[test]
    fn test_rejects_invalid_sets() {
        assert!(LabelSet::new(vec![]).is_err());
        assert!(LabelSet::new(vec!["a".into(), " ".into()]).is_err());
        assert!(LabelSet::new(vec!["a".into(), "b".into(), "a".into()]).is_err());
    }

    #[test]
    fn test_parse_list() {
        let labels = LabelSet::parse_list("blight, healthy ,scab").unwrap();
        assert_eq!(labels.as_slice(), &["blight", "healthy", "scab"]);
        assert!(LabelSet::parse_list(" , ").is_err());
    }

    #[test]
    fn test_serde_validates() {
        let json = serde_json::to_string(&LabelSet::default()).unwrap();
        assert!(json.starts_with("[\"anthracnose\""));
        let back: LabelSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, LabelSet::default());

        let dup: std::result::Result<LabelSet, _> = serde_json::from_str("[\"a\",\"a\"]");
        assert!(dup.is_err());
    }
}
