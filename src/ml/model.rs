use anyhow::{ensure, Result};
use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig,
        PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

/// Any Burn module that maps an image batch to class logits.
///
/// The trainer and evaluator are generic over this trait, so any
/// pre-built network can be trained as long as it implements it.
pub trait ImageClassifier<B: Backend> {
    /// images: [batch, channels, height, width] → logits: [batch, num_classes]
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    fn num_classes(&self) -> usize;
}

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct ResNetConfig {
    pub num_classes: usize,
    #[config(default = 3)]
    pub in_channels: usize,
    /// Total weighted layers; must be 6n + 2
    #[config(default = 20)]
    pub depth: usize,
    /// Filters in the first stage; doubled at each following stage
    #[config(default = 16)]
    pub base_filters: usize,
    #[config(default = 0.0)]
    pub dropout: f64,
}

impl ResNetConfig {
    /// Residual blocks in each of the three stages.
    pub fn blocks_per_stage(&self) -> Result<usize> {
        ensure!(
            self.depth >= 8 && (self.depth - 2) % 6 == 0,
            "ResNet depth must be 6n + 2 (e.g. 20, 32, 44, 56), got {}",
            self.depth
        );
        Ok((self.depth - 2) / 6)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<ResNet<B>> {
        ensure!(self.num_classes > 0, "a classifier needs at least one class");
        let n = self.blocks_per_stage()?;

        let stem = ConvBn::new(device, self.in_channels, self.base_filters, 3, 1);

        let mut blocks  = Vec::with_capacity(3 * n);
        let mut in_ch   = self.base_filters;
        for stage in 0..3 {
            let filters = self.base_filters << stage;
            for block in 0..n {
                // Stages 2 and 3 halve the resolution in their first block
                let stride = if stage > 0 && block == 0 { 2 } else { 1 };
                blocks.push(ResidualBlock::new(device, in_ch, filters, stride));
                in_ch = filters;
            }
        }

        Ok(ResNet {
            stem,
            blocks,
            pool:        AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout:     DropoutConfig::new(self.dropout).init(),
            head:        LinearConfig::new(in_ch, self.num_classes).init(device),
            num_classes: self.num_classes,
        })
    }
}

/// 3x3 (or 1x1) convolution followed by batch normalisation.
#[derive(Module, Debug)]
pub struct ConvBn<B: Backend> {
    conv: Conv2d<B>,
    bn:   BatchNorm<B, 2>,
}

impl<B: Backend> ConvBn<B> {
    pub fn new(
        device:       &B::Device,
        in_channels:  usize,
        out_channels: usize,
        kernel_size:  usize,
        stride:       usize,
    ) -> Self {
        let padding = kernel_size / 2;
        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(padding, padding))
                .init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// Two stacked ConvBn layers with an identity (or 1x1 projection) shortcut.
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    conv1:    ConvBn<B>,
    conv2:    ConvBn<B>,
    shortcut: Option<Conv2d<B>>,
}

impl<B: Backend> ResidualBlock<B> {
    pub fn new(device: &B::Device, in_channels: usize, out_channels: usize, stride: usize) -> Self {
        let shortcut = (stride != 1 || in_channels != out_channels).then(|| {
            Conv2dConfig::new([in_channels, out_channels], [1, 1])
                .with_stride([stride, stride])
                .init(device)
        });
        Self {
            conv1: ConvBn::new(device, in_channels, out_channels, 3, stride),
            conv2: ConvBn::new(device, out_channels, out_channels, 3, 1),
            shortcut,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let y = relu(self.conv1.forward(x.clone()));
        let y = self.conv2.forward(y);
        let x = match &self.shortcut {
            Some(proj) => proj.forward(x),
            None => x,
        };
        relu(x + y)
    }
}

/// ResNet v1 for small images: stem, three residual stages, global
/// average pooling, linear head. Outputs raw logits.
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    stem:        ConvBn<B>,
    blocks:      Vec<ResidualBlock<B>>,
    pool:        AdaptiveAvgPool2d,
    dropout:     Dropout,
    head:        Linear<B>,
    num_classes: usize,
}

impl<B: Backend> ImageClassifier<B> for ResNet<B> {
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = relu(self.stem.forward(images));
        for block in &self.blocks {
            x = block.forward(x);
        }
        let [batch, channels, _, _] = x.dims();
        let x = self.pool.forward(x).reshape([batch, channels]);
        self.head.forward(self.dropout.forward(x))
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_logit_shape() {
        let device = Default::default();
        let model: ResNet<TestBackend> = ResNetConfig::new(5)
            .with_depth(8)
            .with_base_filters(4)
            .init(&device)
            .unwrap();
        let images = Tensor::<TestBackend, 4>::zeros([2, 3, 8, 8], &device);
        assert_eq!(model.forward(images).dims(), [2, 5]);
        assert_eq!(model.num_classes(), 5);
    }

    #[test]
    fn test_depth_must_be_6n_plus_2() {
        assert_eq!(ResNetConfig::new(10).blocks_per_stage().unwrap(), 3);
        assert_eq!(ResNetConfig::new(10).with_depth(56).blocks_per_stage().unwrap(), 9);
        assert!(ResNetConfig::new(10).with_depth(21).blocks_per_stage().is_err());
        assert!(ResNetConfig::new(10).with_depth(2).blocks_per_stage().is_err());
    }

    #[test]
    fn test_zero_classes_rejected() {
        let device = Default::default();
        assert!(ResNetConfig::new(0).init::<TestBackend>(&device).is_err());
    }
}
