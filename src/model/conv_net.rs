use super::{Comparator, ModelOutput};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{
    BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
};
use burn::prelude::*;
use burn::tensor::activation::relu;

/// Flattened features after the two conv stages on a 14x14 pair: 20 channels of 6x6.
const FLAT_FEATURES: usize = 20 * 6 * 6;

#[derive(Config, Debug)]
pub struct ConvNetConfig {
    #[config(default = 2)]
    pub n_classes: usize,
    #[config(default = 0.5)]
    pub dropout: f64,
}

impl ConvNetConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvNet<B> {
        ConvNet {
            // 14x14 -> 16x16 -> pool 8x8
            conv1: Conv2dConfig::new([2, 16], [5, 5])
                .with_padding(PaddingConfig2d::Explicit(3, 3))
                .init(device),
            // 8x8 -> 12x12 -> pool 6x6
            conv2: Conv2dConfig::new([16, 20], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(3, 3))
                .init(device),
            norm1: BatchNormConfig::new(16).init(device),
            norm2: BatchNormConfig::new(20).init(device),
            norm3: BatchNormConfig::new(FLAT_FEATURES).init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            fc1: LinearConfig::new(FLAT_FEATURES, 100).init(device),
            fc2: LinearConfig::new(100, self.n_classes).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

/// Shallow baseline: two conv/batch-norm/relu/max-pool stages and two linear layers.
#[derive(Module, Debug)]
pub struct ConvNet<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
    pub norm1: BatchNorm<B, 2>,
    pub norm2: BatchNorm<B, 2>,
    /// Normalizes the flat features, seen as `[batch, FLAT_FEATURES, 1]`.
    pub norm3: BatchNorm<B, 1>,
    pub pool: MaxPool2d,
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
    pub dropout: Dropout,
}

impl<B: Backend> Comparator<B> for ConvNet<B> {
    fn forward(&self, x: Tensor<B, 4>) -> ModelOutput<B> {
        let [batch, _, _, _] = x.dims();

        let x = self.pool.forward(relu(self.norm1.forward(self.conv1.forward(x))));
        let x = self.pool.forward(relu(self.norm2.forward(self.conv2.forward(x))));
        debug_assert_eq!([batch, 20, 6, 6], x.dims());

        let x = x.reshape([batch, FLAT_FEATURES, 1]);
        let x = self.norm3.forward(x).reshape([batch, FLAT_FEATURES]);
        let x = relu(self.fc1.forward(x));
        let x = self.fc2.forward(self.dropout.forward(x));
        ModelOutput::Logits(x)
    }
}
