//! # Leaf Classifier
//!
//! Single-image plant leaf disease classification with the Burn framework.
//!
//! An uploaded photo is decoded, resized to 256x256, scaled to [0, 1] and run
//! through a MobileNetV2 feature extractor with a linear classification head.
//! The result is the predicted disease label plus the probability of every
//! class.
//!
//! ## Modules
//!
//! - `backend`: compute backends and the startup device decision
//! - `model`: MobileNetV2 backbone, classification/projection heads, weight bundles
//! - `inference`: preprocessing and the `Classifier` service
//! - `labels`: the ordered class label set
//! - `utils`: logging and error types
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use leaf_classifier::backend::{negotiate, DevicePreference};
//! use leaf_classifier::inference::load_classifier;
//!
//! let target = negotiate(DevicePreference::Auto);
//! let classifier = load_classifier("models/leaf.mpk".as_ref(), target)?;
//! let result = classifier.classify(&std::fs::read("leaf.jpg")?)?;
//! println!("{} ({:.2}%)", result.label, result.confidence * 100.0);
//! ```

pub mod backend;
pub mod inference;
pub mod labels;
pub mod model;
pub mod utils;

// Re-export commonly used items for convenience
pub use backend::{negotiate, ComputeTarget, DevicePreference};
pub use inference::{load_classifier, Classification, Classifier, ImageClassifier};
pub use labels::{LabelSet, DEFAULT_LABELS};
pub use model::{ModelManifest, SupConMobileNet, SupConMobileNetConfig};
pub use utils::error::{ClassifierError, Result};

/// Number of classes in the reference model
pub const NUM_CLASSES: usize = 7;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
