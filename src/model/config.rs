//! Model Configuration Module
//!
//! Hyperparameters of the served network. The backbone width is fixed by the
//! MobileNetV2 layer plan; only the heads and the input size are configurable.

use burn::config::Config;

use super::mobilenet::LAST_CHANNEL;

/// Configuration for [`super::SupConMobileNet`]
#[derive(Config, Debug)]
pub struct SupConMobileNetConfig {
    /// Number of disease classes produced by the classifier head
    #[config(default = "7")]
    pub num_classes: usize,

    /// Width of the L2-normalised contrastive embedding
    #[config(default = "128")]
    pub projection_dim: usize,

    /// Square input size the preprocessing resizes to
    #[config(default = "256")]
    pub image_size: usize,
}

impl SupConMobileNetConfig {
    /// Width of the pooled backbone feature vector
    pub fn feature_dim(&self) -> usize {
        LAST_CHANNEL
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.num_classes == 0 {
            return Err("num_classes must be greater than 0".to_string());
        }

        if self.projection_dim == 0 {
            return Err("projection_dim must be greater than 0".to_string());
        }

        // Five stride-2 stages; anything smaller collapses before pooling.
        if self.image_size < 32 {
            return Err("image_size must be at least 32".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SupConMobileNetConfig::new();
        assert_eq!(config.num_classes, 7);
        assert_eq!(config.projection_dim, 128);
        assert_eq!(config.image_size, 256);
        assert_eq!(config.feature_dim(), 1280);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_configs() {
        assert!(SupConMobileNetConfig::new()
            .with_num_classes(0)
            .validate()
            .is_err());
        assert!(SupConMobileNetConfig::new()
            .with_projection_dim(0)
            .validate()
            .is_err());
        assert!(SupConMobileNetConfig::new()
            .with_image_size(16)
            .validate()
            .is_err());
    }
}
