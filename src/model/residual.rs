use super::{Comparator, IMAGE_SIZE, ModelOutput};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AvgPool2d, AvgPool2dConfig};
use burn::nn::{
    BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
};
use burn::prelude::*;
use burn::tensor::activation::relu;

/// Output channels of a bottleneck block, relative to its inner width.
const EXPANSION: usize = 4;

#[derive(Config, Debug)]
pub struct ResidualBlockConfig {
    /// Inner (bottleneck) width. The block outputs `4 * filters` channels.
    pub filters: usize,
    pub input_channels: usize,
    /// Project the shortcut with a 1x1 convolution, needed whenever
    /// `input_channels != 4 * filters`.
    #[config(default = false)]
    pub conv_shortcut: bool,
    #[config(default = 3)]
    pub kernel_size: usize,
    #[config(default = 1)]
    pub stride: usize,
    #[config(default = 14)]
    pub input_size: usize,
}

impl ResidualBlockConfig {
    /// Zero-padding of the spatial convolution, chosen so that a stride of 1 keeps the size.
    ///
    /// A zero stride is treated like a unit one instead of underflowing.
    pub fn padding(&self) -> usize {
        let stride = self.stride.max(1);
        (self.input_size * (stride - 1) + self.kernel_size).saturating_sub(stride).div_ceil(2)
    }

    /// Returns the initialized block.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResidualBlock<B> {
        let out_channels = EXPANSION * self.filters;
        let (conv_sc, norm_sc) = if self.conv_shortcut {
            let conv = Conv2dConfig::new([self.input_channels, out_channels], [1, 1])
                .with_stride([self.stride, self.stride])
                .init(device);
            let norm = BatchNormConfig::new(out_channels).init(device);
            (Some(conv), Some(norm))
        } else {
            (None, None)
        };

        let padding = self.padding();
        ResidualBlock {
            conv_sc,
            norm_sc,
            conv1: Conv2dConfig::new([self.input_channels, self.filters], [1, 1])
                .with_stride([self.stride, self.stride])
                .init(device),
            norm1: BatchNormConfig::new(self.filters).init(device),
            conv2: Conv2dConfig::new(
                [self.filters, self.filters],
                [self.kernel_size, self.kernel_size],
            )
            .with_stride([self.stride, self.stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .init(device),
            norm2: BatchNormConfig::new(self.filters).init(device),
            conv3: Conv2dConfig::new([self.filters, out_channels], [1, 1]).init(device),
            norm3: BatchNormConfig::new(out_channels).init(device),
        }
    }
}

/// Bottleneck residual block: 1x1 reduce, kxk spatial conv, 1x1 expand, plus a shortcut added
/// before the last activation.
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    pub conv_sc: Option<Conv2d<B>>,
    pub norm_sc: Option<BatchNorm<B, 2>>,
    pub conv1: Conv2d<B>,
    pub norm1: BatchNorm<B, 2>,
    pub conv2: Conv2d<B>,
    pub norm2: BatchNorm<B, 2>,
    pub conv3: Conv2d<B>,
    pub norm3: BatchNorm<B, 2>,
}

impl<B: Backend> ResidualBlock<B> {
    /// # Shapes
    ///   - Input [batch, input_channels, height, width]
    ///   - Output [batch, 4 * filters, height, width] (for a stride of 1)
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let shortcut = match (&self.conv_sc, &self.norm_sc) {
            (Some(conv), Some(norm)) => norm.forward(conv.forward(x.clone())),
            _ => x.clone(),
        };

        let x = relu(self.norm1.forward(self.conv1.forward(x)));
        let x = relu(self.norm2.forward(self.conv2.forward(x)));
        let x = self.norm3.forward(self.conv3.forward(x));
        relu(x + shortcut)
    }
}

#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// Number of residual blocks.
    pub depth: usize,
    pub n_classes: usize,
    #[config(default = 2)]
    pub input_channels: usize,
    #[config(default = 32)]
    pub filters: usize,
    #[config(default = 14)]
    pub input_size: usize,
    #[config(default = 0.5)]
    pub dropout: f64,
}

impl ResNetConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNet<B> {
        let out_channels = EXPANSION * self.filters;
        let mut blocks = Vec::with_capacity(self.depth);
        // the first block projects the input pair to the residual width
        blocks.push(
            ResidualBlockConfig::new(self.filters, self.input_channels)
                .with_conv_shortcut(true)
                .with_input_size(self.input_size)
                .init(device),
        );
        for _ in 1..self.depth {
            blocks.push(
                ResidualBlockConfig::new(self.filters, out_channels)
                    .with_input_size(self.input_size)
                    .init(device),
            );
        }

        ResNet {
            blocks,
            avg_pool: AvgPool2dConfig::new([self.input_size, self.input_size])
                .with_strides([self.input_size, self.input_size])
                .init(),
            dropout: DropoutConfig::new(self.dropout).init(),
            dense: LinearConfig::new(out_channels, self.n_classes).init(device),
        }
    }
}

impl Default for ResNetConfig {
    fn default() -> Self {
        Self::new(10, 2).with_input_size(IMAGE_SIZE)
    }
}

#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    pub blocks: Vec<ResidualBlock<B>>,
    pub avg_pool: AvgPool2d,
    pub dropout: Dropout,
    pub dense: Linear<B>,
}

impl<B: Backend> Comparator<B> for ResNet<B> {
    fn forward(&self, mut x: Tensor<B, 4>) -> ModelOutput<B> {
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = self.avg_pool.forward(x).flatten::<2>(1, 3);
        let x = self.dropout.forward(x);
        ModelOutput::Logits(self.dense.forward(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestBackend;
    use burn::tensor::Distribution;

    #[test]
    fn unit_stride_padding_preserves_size() {
        assert_eq!(1, ResidualBlockConfig::new(4, 4).padding());
        assert_eq!(
            2,
            ResidualBlockConfig::new(4, 4).with_kernel_size(5).padding()
        );
    }

    #[test]
    fn padding_handles_degenerate_strides() {
        let unit = ResidualBlockConfig::new(4, 4).padding();
        assert_eq!(unit, ResidualBlockConfig::new(4, 4).with_stride(0).padding());
        // (14 * 1 + 3 - 2) / 2, rounded up
        assert_eq!(8, ResidualBlockConfig::new(4, 4).with_stride(2).padding());
        assert_eq!(
            0,
            ResidualBlockConfig::new(4, 4)
                .with_kernel_size(1)
                .with_input_size(0)
                .with_stride(3)
                .padding()
        );
    }

    #[test]
    fn projected_block_widens_channels() {
        let device = Default::default();
        let block = ResidualBlockConfig::new(4, 2)
            .with_conv_shortcut(true)
            .init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 4>::random([2, 2, 14, 14], Distribution::Default, &device);
        assert_eq!([2, 16, 14, 14], block.forward(x).dims());
    }

    #[test]
    fn identity_block_keeps_shape() {
        let device = Default::default();
        let block = ResidualBlockConfig::new(4, 16).init::<TestBackend>(&device);
        assert!(block.conv_sc.is_none());
        let x = Tensor::<TestBackend, 4>::random([2, 16, 14, 14], Distribution::Default, &device);
        assert_eq!([2, 16, 14, 14], block.forward(x).dims());
    }

    #[test]
    fn resnet_outputs_class_logits() {
        let device = Default::default();
        let model = ResNetConfig::new(3, 2)
            .with_filters(4)
            .init::<TestBackend>(&device);
        assert_eq!(3, model.blocks.len());
        let x = Tensor::<TestBackend, 4>::random([5, 2, 14, 14], Distribution::Default, &device);
        let logits = model.forward(x).logits();
        assert_eq!([5, 2], logits.dims());
    }
}
