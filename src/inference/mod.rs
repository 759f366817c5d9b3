//! Inference module: preprocessing and the classifier service
//!
//! This module provides:
//! - Decoding, resizing and tensor layout of uploaded images
//! - The `Classifier` service object and its backend-erased `ImageClassifier` view
//! - Post-processing of logits into a label and a full probability table

pub mod classifier;
pub mod preprocess;

// Re-export main types for convenience
pub use classifier::{
    argmax_first, load_classifier, ClassProbability, Classification, Classifier, ImageClassifier,
};
pub use preprocess::{decode_image, preprocess, preprocess_bytes, PreprocessedImage, IMAGE_SIZE};

/// Below this confidence a prediction is flagged as uncertain to API clients
pub const DEFAULT_LOW_CONFIDENCE_THRESHOLD: f32 = 0.8;
