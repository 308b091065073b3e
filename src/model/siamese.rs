use super::deep_conv_net::{DeepConvNet, DeepConvNetConfig};
use super::{Comparator, ModelOutput, N_DIGITS};
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;

#[derive(Config, Debug)]
pub struct SiameseConfig {
    pub use_auxiliary_loss: bool,
    #[config(default = 16)]
    pub filters: usize,
    #[config(default = 30)]
    pub depth: usize,
}

impl SiameseConfig {
    /// Configuration of the shared backbone: one image in, one digit-class embedding out.
    pub fn backbone(&self) -> DeepConvNetConfig {
        DeepConvNetConfig::new(self.use_auxiliary_loss)
            .with_depth(self.depth)
            .with_n_classes(N_DIGITS)
            .with_filters(self.filters)
            .with_in_channels(1)
    }

    /// Returns the initialized model.
    ///
    /// Fails under the same conditions as [`DeepConvNetConfig::init`].
    pub fn init<B: Backend>(&self, device: &B::Device) -> crate::Result<Siamese<B>> {
        Ok(Siamese {
            backbone: self.backbone().init(device)?,
            dense: LinearConfig::new(N_DIGITS, 2).init(device),
            use_auxiliary_loss: self.use_auxiliary_loss,
        })
    }
}

/// Compares two digits by running each image through one shared [DeepConvNet] and classifying
/// the difference of the two embeddings.
#[derive(Module, Debug)]
pub struct Siamese<B: Backend> {
    /// Applied to both images; there is a single set of backbone parameters.
    pub backbone: DeepConvNet<B>,
    pub dense: Linear<B>,
    pub use_auxiliary_loss: bool,
}

impl<B: Backend> Comparator<B> for Siamese<B> {
    /// # Shapes
    ///   - Input [batch, 2, IMAGE_SIZE, IMAGE_SIZE]
    ///   - Output logits [batch, 2]
    ///   - Output auxiliary terms [batch, 2 * N_DIGITS]
    fn forward(&self, x: Tensor<B, 4>) -> ModelOutput<B> {
        let x1 = x.clone().narrow(1, 0, 1);
        let x2 = x.narrow(1, 1, 1);

        let (x1, aux_preds1) = self.backbone.forward_features(x1);
        let (x2, aux_preds2) = self.backbone.forward_features(x2);
        let logits = self.dense.forward(x1.clone() - x2.clone());

        if !self.use_auxiliary_loss {
            return ModelOutput::Logits(logits);
        }

        let mut auxiliary: Vec<Tensor<B, 2>> = aux_preds1
            .into_iter()
            .zip(aux_preds2)
            .map(|(pred1, pred2)| Tensor::cat(vec![pred1, pred2], 1))
            .collect();
        // the final embeddings are digit predictions as well
        auxiliary.push(Tensor::cat(vec![x1, x2], 1));
        ModelOutput::WithAuxiliary { logits, auxiliary }
    }

    fn emits_auxiliary(&self) -> bool {
        self.use_auxiliary_loss
    }
}
