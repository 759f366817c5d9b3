//! Application state for the classifier server
//!
//! Holds the validated configuration and the classifier loaded at startup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use leaf_classifier::backend::DevicePreference;
use leaf_classifier::inference::DEFAULT_LOW_CONFIDENCE_THRESHOLD;
use leaf_classifier::ImageClassifier;

/// Port the web app has always listened on
pub const DEFAULT_PORT: u16 = 2003;

/// Server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Weight bundle (manifest is looked up next to it)
    pub weights: PathBuf,
    /// Where uploaded images are kept for the preview
    pub upload_dir: PathBuf,
    /// Static assets (logo etc.)
    pub static_dir: PathBuf,
    /// Requested compute device
    pub device: DevicePreference,
    /// Request body limit in MiB
    pub max_upload_mb: usize,
    /// Predictions below this confidence are flagged as uncertain
    pub low_confidence_threshold: f32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            weights: PathBuf::from("models/leaf_classifier.mpk"),
            upload_dir: PathBuf::from("uploads"),
            static_dir: PathBuf::from("static"),
            device: DevicePreference::Auto,
            max_upload_mb: 16,
            low_confidence_threshold: DEFAULT_LOW_CONFIDENCE_THRESHOLD,
        }
    }
}

impl ServerConfig {
    /// Reject settings the server cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.low_confidence_threshold) {
            anyhow::bail!(
                "low confidence threshold must be within [0, 1], got {}",
                self.low_confidence_threshold
            );
        }
        if self.max_upload_mb == 0 {
            anyhow::bail!("max upload size must be at least 1 MiB");
        }
        Ok(())
    }

    /// Body limit in bytes
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }
}

/// Shared application state
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Classifier loaded once at startup
    pub classifier: Arc<dyn ImageClassifier>,
    /// Server start time
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig, classifier: Arc<dyn ImageClassifier>) -> Self {
        Self {
            config,
            classifier,
            started_at: Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;
