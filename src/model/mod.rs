//! Architectures for the digit-pair comparison task.
//!
//! Every model consumes a batch of stacked image pairs `[batch, 2, 14, 14]` and produces comparison
//! logits `[batch, 2]`, optionally together with auxiliary digit predictions.

mod conv_block;
mod conv_net;
mod deep_conv_net;
mod mlp;
mod residual;
mod siamese;

pub use conv_block::{AuxConvBlock, AuxConvBlockConfig, ConvBlock, ConvBlockConfig, ConvStage};
pub use conv_net::{ConvNet, ConvNetConfig};
pub use deep_conv_net::{DeepConvNet, DeepConvNetConfig, MIN_AUXILIARY_DEPTH};
pub use mlp::{Mlp, MlpConfig};
pub use residual::{ResNet, ResNetConfig, ResidualBlock, ResidualBlockConfig};
pub use siamese::{Siamese, SiameseConfig};

use burn::prelude::*;

/// Side length of the (square) input images.
pub const IMAGE_SIZE: usize = 14;

/// Number of digit classes.
pub const N_DIGITS: usize = 10;

/// Result of a forward pass.
#[derive(Debug, Clone)]
pub enum ModelOutput<B: Backend> {
    /// Comparison logits only.
    ///
    /// # Shape
    /// [batch, n_classes]
    Logits(Tensor<B, 2>),
    /// Comparison logits plus the predictions collected at intermediate depths.
    ///
    /// Each auxiliary term has shape [batch, 2 * N_DIGITS]: the first half classifies the first
    /// digit, the second half the second digit.
    WithAuxiliary {
        logits: Tensor<B, 2>,
        auxiliary: Vec<Tensor<B, 2>>,
    },
}

impl<B: Backend> ModelOutput<B> {
    /// The comparison logits, discarding any auxiliary term.
    pub fn logits(self) -> Tensor<B, 2> {
        match self {
            ModelOutput::Logits(logits) => logits,
            ModelOutput::WithAuxiliary { logits, .. } => logits,
        }
    }

    /// Number of auxiliary terms, zero for plain logits.
    pub fn auxiliary_len(&self) -> usize {
        match self {
            ModelOutput::Logits(_) => 0,
            ModelOutput::WithAuxiliary { auxiliary, .. } => auxiliary.len(),
        }
    }
}

/// A model that compares the two digits of an image pair.
///
/// The execution mode is given by the backend: on an autodiff backend batch-norm and dropout run
/// in training mode, and on the inner backend (see [`burn::module::AutodiffModule::valid`]) they
/// run in inference mode.
pub trait Comparator<B: Backend>: Module<B> {
    /// # Shapes
    ///   - Input [batch, 2, IMAGE_SIZE, IMAGE_SIZE]
    ///   - Output logits [batch, n_classes]
    fn forward(&self, input: Tensor<B, 4>) -> ModelOutput<B>;

    /// Whether [`Self::forward`] returns [`ModelOutput::WithAuxiliary`].
    fn emits_auxiliary(&self) -> bool {
        false
    }
}

/// Number of trainable parameters of the model.
pub fn count_parameters<B: Backend, M: Module<B>>(model: &M) -> usize {
    model.num_params()
}

