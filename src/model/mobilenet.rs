//! MobileNetV2 feature extractor
//!
//! Width multiplier 1.0, same layer plan as torchvision, with
//! its classification layer removed. Output is the final 1280-channel
//! feature map; pooling is the caller's job.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d,
    },
    tensor::{backend::Backend, Tensor},
};

/// Channels produced by the stem convolution
pub const STEM_CHANNELS: usize = 32;

/// Channels produced by the final 1x1 convolution
pub const LAST_CHANNEL: usize = 1280;

/// Inverted residual plan: (expansion t, output channels c, repeats n, first stride s)
pub const INVERTED_RESIDUAL_SETTINGS: [(usize, usize, usize, usize); 7] = [
    (1, 16, 1, 1),
    (6, 24, 2, 2),
    (6, 32, 3, 2),
    (6, 64, 4, 2),
    (6, 96, 3, 1),
    (6, 160, 3, 2),
    (6, 320, 1, 1),
];

fn relu6<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.clamp(0.0, 6.0)
}

fn conv(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    groups: usize,
) -> Conv2dConfig {
    let padding = (kernel_size - 1) / 2;
    Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_groups(groups)
        .with_bias(false)
}

/// Conv2d -> BatchNorm -> ReLU6
#[derive(Module, Debug)]
pub struct ConvBnRelu6<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
}

impl<B: Backend> ConvBnRelu6<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        groups: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            conv: conv(in_channels, out_channels, kernel_size, stride, groups).init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        relu6(self.bn.forward(self.conv.forward(x)))
    }
}

/// Expand (1x1) -> depthwise (3x3) -> linear project (1x1), with an identity
/// shortcut when shape is preserved
#[derive(Module, Debug)]
pub struct InvertedResidual<B: Backend> {
    pub expand: Option<ConvBnRelu6<B>>,
    pub depthwise: ConvBnRelu6<B>,
    pub project: Conv2d<B>,
    pub project_bn: BatchNorm<B, 2>,
    use_residual: bool,
}

impl<B: Backend> InvertedResidual<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        expand_ratio: usize,
        device: &B::Device,
    ) -> Self {
        let hidden = in_channels * expand_ratio;

        let expand = if expand_ratio != 1 {
            Some(ConvBnRelu6::new(in_channels, hidden, 1, 1, 1, device))
        } else {
            None
        };

        Self {
            expand,
            depthwise: ConvBnRelu6::new(hidden, hidden, 3, stride, hidden, device),
            project: conv(hidden, out_channels, 1, 1, 1).init(device),
            project_bn: BatchNormConfig::new(out_channels).init(device),
            use_residual: stride == 1 && in_channels == out_channels,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = match &self.expand {
            Some(expand) => expand.forward(x.clone()),
            None => x.clone(),
        };
        let out = self.depthwise.forward(out);
        let out = self.project_bn.forward(self.project.forward(out));

        if self.use_residual {
            x + out
        } else {
            out
        }
    }

    pub fn has_residual(&self) -> bool {
        self.use_residual
    }
}

/// MobileNetV2 backbone up to (and including) the 1280-channel head conv
#[derive(Module, Debug)]
pub struct MobileNetV2<B: Backend> {
    pub stem: ConvBnRelu6<B>,
    pub blocks: Vec<InvertedResidual<B>>,
    pub head: ConvBnRelu6<B>,
}

impl<B: Backend> MobileNetV2<B> {
    pub fn new(device: &B::Device) -> Self {
        let stem = ConvBnRelu6::new(3, STEM_CHANNELS, 3, 2, 1, device);

        let mut blocks = Vec::new();
        let mut in_channels = STEM_CHANNELS;
        for (t, c, n, s) in INVERTED_RESIDUAL_SETTINGS {
            for i in 0..n {
                let stride = if i == 0 { s } else { 1 };
                blocks.push(InvertedResidual::new(in_channels, c, stride, t, device));
                in_channels = c;
            }
        }

        let head = ConvBnRelu6::new(in_channels, LAST_CHANNEL, 1, 1, 1, device);

        Self { stem, blocks, head }
    }

    /// `[B, 3, H, W]` -> `[B, 1280, H/32, W/32]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = self.stem.forward(x);
        for block in &self.blocks {
            x = block.forward(x);
        }
        self.head.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_block_count_matches_layer_plan() {
        let device = Default::default();
        let backbone = MobileNetV2::<TestBackend>::new(&device);
        let expected: usize = INVERTED_RESIDUAL_SETTINGS.iter().map(|s| s.2).sum();
        assert_eq!(backbone.blocks.len(), expected);
        assert_eq!(backbone.blocks.len(), 17);
    }

    #[test]
    fn test_residual_only_when_shape_preserved() {
        let device = Default::default();
        let backbone = MobileNetV2::<TestBackend>::new(&device);
        // First block of every stage changes width or stride.
        assert!(!backbone.blocks[0].has_residual());
        assert!(!backbone.blocks[1].has_residual());
        assert!(backbone.blocks[2].has_residual());
        assert!(backbone.blocks[0].expand.is_none());
        assert!(backbone.blocks[1].expand.is_some());
    }

    #[test]
    fn test_inverted_residual_preserves_shape() {
        let device = Default::default();
        let block = InvertedResidual::<TestBackend>::new(16, 16, 1, 6, &device);
        let input = Tensor::<TestBackend, 4>::ones([1, 16, 8, 8], &device);
        assert_eq!(block.forward(input).dims(), [1, 16, 8, 8]);
    }

    #[test]
    fn test_backbone_output_shape() {
        let device = Default::default();
        let backbone = MobileNetV2::<TestBackend>::new(&device);
        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 64, 64], &device);
        assert_eq!(backbone.forward(input).dims(), [1, LAST_CHANNEL, 2, 2]);
    }
}
