//! Weight bundle: parameter record + JSON manifest
//!
//! A bundle is two files sharing a stem:
//! - `<stem>.mpk`  Burn MessagePack record, full precision
//! - `<stem>.json` [`ModelManifest`] with the head sizes and the label order
//!
//! Loading only happens at startup. Every failure here is fatal for the
//! process; nothing is retried.

use std::fs;
use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::backend::Backend,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::config::SupConMobileNetConfig;
use super::mobilenet::{LAST_CHANNEL, STEM_CHANNELS};
use super::supcon::{SupConMobileNet, SupConMobileNetRecord};
use crate::inference::IMAGE_SIZE;
use crate::labels::LabelSet;
use crate::utils::error::{ClassifierError, Result};

/// Manifest schema version understood by this build
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// Architecture tag written into manifests
pub const ARCHITECTURE: &str = "supcon-mobilenet-v2";

/// Recorder for weight bundles. Full precision so logits match the
/// exporting side exactly.
pub type WeightRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Extension the recorder writes
pub const WEIGHTS_EXTENSION: &str = "mpk";

/// Canonical record path for a user-supplied weights path
pub fn weights_path(path: &Path) -> PathBuf {
    path.with_extension(WEIGHTS_EXTENSION)
}

/// Manifest path that accompanies a weights path
pub fn manifest_path(path: &Path) -> PathBuf {
    path.with_extension("json")
}

/// Describes a weight bundle: head sizes, input size and class order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub format_version: u32,
    pub architecture: String,
    pub num_classes: usize,
    pub projection_dim: usize,
    pub image_size: usize,
    pub labels: LabelSet,
}

impl ModelManifest {
    /// Manifest for a model built from `config` with the given label order
    pub fn new(config: &SupConMobileNetConfig, labels: LabelSet) -> Self {
        Self {
            format_version: MANIFEST_FORMAT_VERSION,
            architecture: ARCHITECTURE.to_string(),
            num_classes: config.num_classes,
            projection_dim: config.projection_dim,
            image_size: config.image_size,
            labels,
        }
    }

    /// Model configuration described by this manifest
    pub fn config(&self) -> SupConMobileNetConfig {
        SupConMobileNetConfig::new()
            .with_num_classes(self.num_classes)
            .with_projection_dim(self.projection_dim)
            .with_image_size(self.image_size)
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.format_version != MANIFEST_FORMAT_VERSION {
            return Err(ClassifierError::Config(format!(
                "unsupported manifest format_version {} (expected {})",
                self.format_version, MANIFEST_FORMAT_VERSION
            )));
        }

        if self.architecture != ARCHITECTURE {
            return Err(ClassifierError::Config(format!(
                "unknown architecture '{}' (expected '{}')",
                self.architecture, ARCHITECTURE
            )));
        }

        if self.image_size != IMAGE_SIZE {
            return Err(ClassifierError::Config(format!(
                "manifest image_size {} is not supported (inputs are always {}x{})",
                self.image_size, IMAGE_SIZE, IMAGE_SIZE
            )));
        }

        if self.labels.len() != self.num_classes {
            return Err(ClassifierError::Config(format!(
                "manifest lists {} labels but num_classes is {}",
                self.labels.len(),
                self.num_classes
            )));
        }

        self.config().validate().map_err(ClassifierError::Config)
    }

    /// Read and validate a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let manifest: Self = serde_json::from_str(&text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Write the manifest as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

impl Default for ModelManifest {
    fn default() -> Self {
        Self::new(&SupConMobileNetConfig::new(), LabelSet::default())
    }
}

fn expect_dims<const D: usize>(name: &str, actual: [usize; D], expected: [usize; D]) -> Result<()> {
    if actual != expected {
        return Err(ClassifierError::Model(format!(
            "parameter '{}' has shape {:?}, expected {:?}",
            name, actual, expected
        )));
    }
    Ok(())
}

/// Compare the shapes in a loaded record with what `config` declares
pub fn check_record_shapes<B: Backend>(
    record: &SupConMobileNetRecord<B>,
    config: &SupConMobileNetConfig,
) -> Result<()> {
    let feature_dim = config.feature_dim();

    expect_dims(
        "feature_extractor.stem.conv.weight",
        record.feature_extractor.stem.conv.weight.val().dims(),
        [STEM_CHANNELS, 3, 3, 3],
    )?;
    expect_dims(
        "feature_extractor.head.conv.weight",
        record.feature_extractor.head.conv.weight.val().dims(),
        [LAST_CHANNEL, 320, 1, 1],
    )?;
    expect_dims(
        "classifier.weight",
        record.classifier.weight.val().dims(),
        [feature_dim, config.num_classes],
    )?;
    if let Some(bias) = &record.classifier.bias {
        expect_dims("classifier.bias", bias.val().dims(), [config.num_classes])?;
    }
    expect_dims(
        "projection_head.fc1.weight",
        record.projection_head.fc1.weight.val().dims(),
        [feature_dim, feature_dim],
    )?;
    expect_dims(
        "projection_head.fc2.weight",
        record.projection_head.fc2.weight.val().dims(),
        [feature_dim, config.projection_dim],
    )?;

    Ok(())
}

/// Write weights and manifest for `model`
pub fn save_bundle<B: Backend>(
    model: &SupConMobileNet<B>,
    manifest: &ModelManifest,
    path: &Path,
) -> Result<()> {
    manifest.validate()?;
    if model.num_classes() != manifest.num_classes {
        return Err(ClassifierError::Config(format!(
            "model has {} classes but manifest declares {}",
            model.num_classes(),
            manifest.num_classes
        )));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    model
        .clone()
        .save_file(weights_path(path), &WeightRecorder::new())?;
    manifest.save(&manifest_path(path))?;

    info!(
        "Saved weight bundle to {:?} ({} classes)",
        weights_path(path),
        manifest.num_classes
    );
    Ok(())
}

/// Load a bundle: manifest (or the built-in default), then the weights.
///
/// Missing weights, unreadable records and shape mismatches are all
/// `ClassifierError::Model`.
pub fn load_bundle<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<(SupConMobileNet<B>, ModelManifest)> {
    let weights = weights_path(path);
    if !weights.exists() {
        return Err(ClassifierError::Model(format!(
            "weight file not found: {:?}",
            weights
        )));
    }

    let manifest_file = manifest_path(path);
    let manifest = if manifest_file.exists() {
        ModelManifest::load(&manifest_file)?
    } else {
        warn!(
            "No manifest at {:?}; assuming the default {}-class label order",
            manifest_file,
            LabelSet::default().len()
        );
        ModelManifest::default()
    };

    let config = manifest.config();
    let record: SupConMobileNetRecord<B> = WeightRecorder::new().load(weights.clone(), device)?;
    check_record_shapes(&record, &config)?;

    let model = SupConMobileNet::new(&config, device).load_record(record);

    info!(
        "Loaded {} weights from {:?} ({} classes, input {}x{})",
        manifest.architecture, weights, manifest.num_classes, manifest.image_size, manifest.image_size
    );

    Ok((model, manifest))
}
