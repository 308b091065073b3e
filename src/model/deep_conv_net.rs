use super::conv_block::{AuxConvBlockConfig, ConvBlockConfig, ConvStage};
use super::{Comparator, IMAGE_SIZE, ModelOutput, N_DIGITS};
use crate::error::Error;
use burn::nn::pool::{AvgPool2d, AvgPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;

/// Smallest depth for which auxiliary supervision is allowed.
pub const MIN_AUXILIARY_DEPTH: usize = 30;

/// Every `AUXILIARY_PERIOD`-th iteration of the stack inserts an auxiliary head.
const AUXILIARY_PERIOD: usize = 5;

/// Channels of the last block, right before global pooling.
const HEAD_CHANNELS: usize = 32;

#[derive(Config, Debug)]
pub struct DeepConvNetConfig {
    pub use_auxiliary_loss: bool,
    #[config(default = 30)]
    pub depth: usize,
    #[config(default = 2)]
    pub n_classes: usize,
    #[config(default = 16)]
    pub filters: usize,
    #[config(default = 2)]
    pub in_channels: usize,
    #[config(default = 0.5)]
    pub dropout: f64,
}

impl DeepConvNetConfig {
    /// Number of auxiliary predictions the network emits, `floor((depth - 1) / 5)` when auxiliary
    /// supervision is on.
    pub fn n_auxiliary(&self) -> usize {
        if self.use_auxiliary_loss {
            self.depth.saturating_sub(1) / AUXILIARY_PERIOD
        } else {
            0
        }
    }

    /// Returns the initialized model.
    ///
    /// Fails if auxiliary supervision is requested with a depth below [`MIN_AUXILIARY_DEPTH`].
    pub fn init<B: Backend>(&self, device: &B::Device) -> crate::Result<DeepConvNet<B>> {
        if self.use_auxiliary_loss && self.depth < MIN_AUXILIARY_DEPTH {
            return Err(Error::Config(format!(
                "auxiliary loss needs at least {MIN_AUXILIARY_DEPTH} conv blocks, got depth {}",
                self.depth
            )));
        }

        tracing::debug!(
            "deep conv net: depth {}, {} auxiliary head(s)",
            self.depth,
            self.n_auxiliary()
        );

        let plain = |in_channels: usize, filters: usize| {
            ConvStage::Plain(
                ConvBlockConfig::new(in_channels)
                    .with_filters(filters)
                    .with_kernel_size(3)
                    .init::<B>(device),
            )
        };

        let mut stages = Vec::with_capacity(2 * self.depth + 1);
        stages.push(plain(self.in_channels, self.filters));
        for i in 1..self.depth {
            if self.use_auxiliary_loss && i % AUXILIARY_PERIOD == 0 {
                // one digit space per input channel
                let aux = AuxConvBlockConfig::new(self.in_channels * N_DIGITS, self.filters)
                    .with_filters(self.filters)
                    .with_kernel_size(3)
                    .with_input_size(IMAGE_SIZE)
                    .init::<B>(device);
                stages.push(ConvStage::Auxiliary(aux));
            } else {
                stages.push(plain(self.filters, self.filters));
            }
            stages.push(plain(self.filters, self.filters));
        }
        stages.push(plain(self.filters, HEAD_CHANNELS));

        Ok(DeepConvNet {
            stages,
            avg_pool: AvgPool2dConfig::new([IMAGE_SIZE, IMAGE_SIZE])
                .with_strides([IMAGE_SIZE, IMAGE_SIZE])
                .init(),
            dropout: DropoutConfig::new(self.dropout).init(),
            dense: LinearConfig::new(HEAD_CHANNELS, self.n_classes).init(device),
            use_auxiliary_loss: self.use_auxiliary_loss,
        })
    }
}

/// A deep stack of [conv blocks](super::ConvBlock) with optional auxiliary heads every five
/// iterations, followed by global average pooling and a linear classifier.
#[derive(Module, Debug)]
pub struct DeepConvNet<B: Backend> {
    pub stages: Vec<ConvStage<B>>,
    pub avg_pool: AvgPool2d,
    pub dropout: Dropout,
    pub dense: Linear<B>,
    pub use_auxiliary_loss: bool,
}

impl<B: Backend> DeepConvNet<B> {
    /// Runs the whole stack, returning the logits and every auxiliary prediction in depth order.
    ///
    /// # Shapes
    ///   - Input [batch, in_channels, IMAGE_SIZE, IMAGE_SIZE]
    ///   - Output logits [batch, n_classes]
    ///   - Output auxiliary predictions [batch, in_channels * N_DIGITS]
    pub fn forward_features(&self, mut x: Tensor<B, 4>) -> (Tensor<B, 2>, Vec<Tensor<B, 2>>) {
        let mut aux_preds = Vec::new();
        for stage in &self.stages {
            x = stage.forward(x, &mut aux_preds);
        }
        let [batch, channels, _, _] = x.dims();

        let x = self.avg_pool.forward(x);
        debug_assert_eq!([batch, channels, 1, 1], x.dims());
        let x = x.flatten::<2>(1, 3);
        let x = self.dropout.forward(x);
        (self.dense.forward(x), aux_preds)
    }
}

impl<B: Backend> Comparator<B> for DeepConvNet<B> {
    fn forward(&self, input: Tensor<B, 4>) -> ModelOutput<B> {
        let (logits, auxiliary) = self.forward_features(input);
        if self.use_auxiliary_loss {
            ModelOutput::WithAuxiliary { logits, auxiliary }
        } else {
            ModelOutput::Logits(logits)
        }
    }

    fn emits_auxiliary(&self) -> bool {
        self.use_auxiliary_loss
    }
}
