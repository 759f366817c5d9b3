//! Supervised-contrastive MobileNet classifier
//!
//! Backbone + global average pooling feeding two heads:
//! - `classifier`: Linear(1280 -> C) producing the logits used for serving
//! - `projection_head`: Linear -> ReLU -> Linear -> L2 norm, a training-time
//!   head kept so the weight bundle loads, only evaluated on request

use burn::{
    module::Module,
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Linear, LinearConfig, Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::config::SupConMobileNetConfig;
use super::mobilenet::MobileNetV2;

/// Smallest denominator used by [`l2_normalize`]
pub const NORMALIZE_EPS: f32 = 1e-12;

/// Scale each row to unit L2 norm
pub fn l2_normalize<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 2> {
    let norm = (x.clone() * x.clone())
        .sum_dim(1)
        .sqrt()
        .clamp_min(NORMALIZE_EPS);
    x / norm
}

/// Two-layer MLP projecting pooled features into the contrastive space
#[derive(Module, Debug)]
pub struct ProjectionHead<B: Backend> {
    pub fc1: Linear<B>,
    pub relu: Relu,
    pub fc2: Linear<B>,
}

impl<B: Backend> ProjectionHead<B> {
    pub fn new(feature_dim: usize, projection_dim: usize, device: &B::Device) -> Self {
        Self {
            fc1: LinearConfig::new(feature_dim, feature_dim).init(device),
            relu: Relu::new(),
            fc2: LinearConfig::new(feature_dim, projection_dim).init(device),
        }
    }

    /// `[B, F]` -> unit-norm `[B, P]`
    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.fc1.forward(features);
        let x = self.relu.forward(x);
        l2_normalize(self.fc2.forward(x))
    }
}

/// Output of [`SupConMobileNet::forward`]
#[derive(Debug, Clone)]
pub struct ModelOutput<B: Backend> {
    /// `[B, num_classes]` unnormalised scores
    pub logits: Tensor<B, 2>,
    /// `[B, projection_dim]`, present only when requested
    pub embedding: Option<Tensor<B, 2>>,
}

/// Plant disease classifier with a frozen MobileNetV2 backbone
#[derive(Module, Debug)]
pub struct SupConMobileNet<B: Backend> {
    pub feature_extractor: MobileNetV2<B>,
    pub pool: AdaptiveAvgPool2d,
    pub projection_head: ProjectionHead<B>,
    pub classifier: Linear<B>,

    num_classes: usize,
    projection_dim: usize,
}

impl<B: Backend> SupConMobileNet<B> {
    /// Create a freshly initialised model from configuration
    pub fn new(config: &SupConMobileNetConfig, device: &B::Device) -> Self {
        let feature_dim = config.feature_dim();

        Self {
            feature_extractor: MobileNetV2::new(device),
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            projection_head: ProjectionHead::new(feature_dim, config.projection_dim, device),
            classifier: LinearConfig::new(feature_dim, config.num_classes).init(device),
            num_classes: config.num_classes,
            projection_dim: config.projection_dim,
        }
    }

    /// Pooled backbone features: `[B, 3, H, W]` -> `[B, 1280]`
    pub fn features(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.feature_extractor.forward(x);
        let x = self.pool.forward(x);

        let [batch_size, channels, _, _] = x.dims();
        x.reshape([batch_size, channels])
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width]
    /// * `want_embedding` - also evaluate the projection head
    pub fn forward(&self, x: Tensor<B, 4>, want_embedding: bool) -> ModelOutput<B> {
        let features = self.features(x);

        let embedding = if want_embedding {
            Some(self.projection_head.forward(features.clone()))
        } else {
            None
        };

        ModelOutput {
            logits: self.classifier.forward(features),
            embedding,
        }
    }

    /// Logits only; the serving path
    pub fn logits(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward(x, false).logits
    }

    /// Softmax over the class dimension
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        burn::tensor::activation::softmax(self.logits(x), 1)
    }

    /// Get the number of output classes
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Get the embedding width
    pub fn projection_dim(&self) -> usize {
        self.projection_dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::module::Param;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_l2_normalize_unit_rows() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![3.0f32, 4.0, 0.0, 0.0], [2, 2]),
            &device,
        );
        let values: Vec<f32> = l2_normalize(x).into_data().to_vec().unwrap();
        assert!((values[0] - 0.6).abs() < 1e-6);
        assert!((values[1] - 0.8).abs() < 1e-6);
        // Zero rows stay zero instead of producing NaN.
        assert_eq!(values[2], 0.0);
        assert_eq!(values[3], 0.0);
    }

    #[test]
    fn test_forward_shapes_with_and_without_embedding() {
        let device = Default::default();
        let config = SupConMobileNetConfig::new();
        let model = SupConMobileNet::<TestBackend>::new(&config, &device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 64, 64], &device);

        let output = model.forward(input.clone(), false);
        assert_eq!(output.logits.dims(), [2, 7]);
        assert!(output.embedding.is_none());

        let output = model.forward(input, true);
        let embedding = output.embedding.expect("embedding requested");
        assert_eq!(embedding.dims(), [2, 128]);

        let norms: Vec<f32> = (embedding.clone() * embedding)
            .sum_dim(1)
            .into_data()
            .to_vec()
            .unwrap();
        for n in norms {
            assert!((n - 1.0).abs() < 1e-4 || n == 0.0);
        }
    }

    #[test]
    fn test_forward_is_deterministic() {
        let device = Default::default();
        let config = SupConMobileNetConfig::new();
        let model = SupConMobileNet::<TestBackend>::new(&config, &device);

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 64, 64], &device) * 0.5;
        let a: Vec<f32> = model.logits(input.clone()).into_data().to_vec().unwrap();
        let b: Vec<f32> = model.logits(input).into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_biased_classifier_dominates() {
        let device = Default::default();
        let config = SupConMobileNetConfig::new();
        let mut model = SupConMobileNet::<TestBackend>::new(&config, &device);

        let mut bias = vec![0.0f32; 7];
        bias[3] = 50.0;
        model.classifier.weight = Param::from_tensor(Tensor::zeros([1280, 7], &device));
        model.classifier.bias = Some(Param::from_tensor(Tensor::from_data(
            TensorData::new(bias, [7]),
            &device,
        )));

        let input = Tensor::<TestBackend, 4>::random(
            [1, 3, 64, 64],
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let probs: Vec<f32> = model.forward_softmax(input).into_data().to_vec().unwrap();
        assert!(probs[3] > 0.99);
    }
}
