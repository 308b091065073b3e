use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AvgPool2d, AvgPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation::relu;

/// Configuration to create a [ConvBlock] using the [init function](ConvBlockConfig::init).
#[derive(Config, Debug)]
pub struct ConvBlockConfig {
    pub in_channels: usize,
    #[config(default = 4)]
    pub filters: usize,
    #[config(default = 3)]
    pub kernel_size: usize,
}

impl ConvBlockConfig {
    /// Zero-padding applied on each side, `ceil((kernel_size - 1) / 2)`.
    pub fn padding(&self) -> usize {
        self.kernel_size.saturating_sub(1).div_ceil(2)
    }

    /// Returns the initialized block.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvBlock<B> {
        let padding = self.padding();
        let conv = Conv2dConfig::new(
            [self.in_channels, self.filters],
            [self.kernel_size, self.kernel_size],
        )
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .init(device);
        let norm = BatchNormConfig::new(self.filters).init(device);
        ConvBlock { conv, norm }
    }
}

/// Size-preserving convolution followed by batch-norm and relu.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub norm: BatchNorm<B, 2>,
}

impl<B: Backend> ConvBlock<B> {
    /// # Shapes
    ///   - Input [batch, in_channels, height, width]
    ///   - Output [batch, filters, height, width]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.norm.forward(x);
        relu(x)
    }
}

/// Configuration to create an [AuxConvBlock] using the [init function](AuxConvBlockConfig::init).
#[derive(Config, Debug)]
pub struct AuxConvBlockConfig {
    /// Width of the auxiliary prediction.
    pub n_classes: usize,
    pub in_channels: usize,
    #[config(default = 16)]
    pub filters: usize,
    #[config(default = 3)]
    pub kernel_size: usize,
    /// Side length of the feature map entering the block.
    #[config(default = 14)]
    pub input_size: usize,
}

impl AuxConvBlockConfig {
    /// Returns the initialized block.
    pub fn init<B: Backend>(&self, device: &B::Device) -> AuxConvBlock<B> {
        let conv_block = ConvBlockConfig::new(self.in_channels)
            .with_filters(self.filters)
            .with_kernel_size(self.kernel_size)
            .init(device);
        // halves each side of the feature map
        let avg_pool = AvgPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        let pooled = self.input_size / 2;
        let dense = LinearConfig::new(self.filters * pooled * pooled, self.n_classes).init(device);
        AuxConvBlock {
            conv_block,
            avg_pool,
            dense,
        }
    }
}

/// A [ConvBlock] with a classification head attached to its output.
#[derive(Module, Debug)]
pub struct AuxConvBlock<B: Backend> {
    pub conv_block: ConvBlock<B>,
    pub avg_pool: AvgPool2d,
    pub dense: Linear<B>,
}

impl<B: Backend> AuxConvBlock<B> {
    /// Returns the feature map, to continue the backbone, and the auxiliary prediction.
    ///
    /// # Shapes
    ///   - Input [batch, in_channels, height, width]
    ///   - Output features [batch, filters, height, width]
    ///   - Output prediction [batch, n_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 2>) {
        let x = self.conv_block.forward(x);
        let preds = self.avg_pool.forward(x.clone());
        let preds = preds.flatten::<2>(1, 3);
        let preds = self.dense.forward(preds);
        (x, preds)
    }
}

/// One element of a convolutional stack, tagged at construction time.
#[derive(Module, Debug)]
pub enum ConvStage<B: Backend> {
    Plain(ConvBlock<B>),
    Auxiliary(AuxConvBlock<B>),
}

impl<B: Backend> ConvStage<B> {
    /// Runs the stage, pushing the auxiliary prediction (if any) into `aux_preds`.
    pub fn forward(&self, x: Tensor<B, 4>, aux_preds: &mut Vec<Tensor<B, 2>>) -> Tensor<B, 4> {
        match self {
            ConvStage::Plain(block) => block.forward(x),
            ConvStage::Auxiliary(block) => {
                let (x, pred) = block.forward(x);
                aux_preds.push(pred);
                x
            }
        }
    }

    pub fn is_auxiliary(&self) -> bool {
        matches!(self, ConvStage::Auxiliary(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestBackend;
    use burn::tensor::Distribution;

    #[test]
    fn conv_block_preserves_spatial_size() {
        let device = Default::default();
        let block = ConvBlockConfig::new(2)
            .with_filters(8)
            .init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 4>::random([3, 2, 14, 14], Distribution::Default, &device);

        let y = block.forward(x);
        assert_eq!([3, 8, 14, 14], y.dims());
    }

    #[test]
    fn padding_rounds_up() {
        assert_eq!(1, ConvBlockConfig::new(1).with_kernel_size(3).padding());
        assert_eq!(2, ConvBlockConfig::new(1).with_kernel_size(4).padding());
        assert_eq!(2, ConvBlockConfig::new(1).with_kernel_size(5).padding());
        assert_eq!(0, ConvBlockConfig::new(1).with_kernel_size(1).padding());
    }

    #[test]
    fn aux_block_returns_features_and_prediction() {
        let device = Default::default();
        let block = AuxConvBlockConfig::new(20, 4)
            .with_filters(4)
            .init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 4>::random([2, 4, 14, 14], Distribution::Default, &device);

        let (features, pred) = block.forward(x);
        assert_eq!([2, 4, 14, 14], features.dims());
        assert_eq!([2, 20], pred.dims());
    }

    #[test]
    fn stage_collects_only_auxiliary_predictions() {
        let device = Default::default();
        let stages = vec![
            ConvStage::Plain(ConvBlockConfig::new(2).init::<TestBackend>(&device)),
            ConvStage::Auxiliary(
                AuxConvBlockConfig::new(10, 4)
                    .with_filters(4)
                    .init::<TestBackend>(&device),
            ),
            ConvStage::Plain(ConvBlockConfig::new(4).init::<TestBackend>(&device)),
        ];
        let mut x = Tensor::<TestBackend, 4>::zeros([1, 2, 14, 14], &device);
        let mut aux_preds = Vec::new();
        for stage in &stages {
            x = stage.forward(x, &mut aux_preds);
        }
        assert_eq!(1, aux_preds.len());
        assert_eq!([1, 10], aux_preds[0].dims());
        assert_eq!([1, 4, 14, 14], x.dims());
    }
}
