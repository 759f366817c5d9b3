//! Model module for the leaf disease network using the Burn framework
//!
//! This module provides:
//! - MobileNetV2 feature extractor
//! - Classification and projection heads on top of pooled features
//! - Model configuration
//! - Weight bundle (record + manifest) loading and saving

pub mod bundle;
pub mod config;
pub mod mobilenet;
pub mod supcon;

// Re-export main types for convenience
pub use bundle::{load_bundle, save_bundle, ModelManifest, WeightRecorder};
pub use config::SupConMobileNetConfig;
pub use mobilenet::MobileNetV2;
pub use supcon::{ModelOutput, SupConMobileNet};
