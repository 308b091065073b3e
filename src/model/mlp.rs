use super::{Comparator, IMAGE_SIZE, ModelOutput};
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;

/// Widths of the hidden layers.
const HIDDEN: [usize; 4] = [350, 250, 200, 20];

#[derive(Config, Debug)]
pub struct MlpConfig {
    #[config(default = 2)]
    pub n_classes: usize,
}

impl MlpConfig {
    /// Flattened size of an image pair.
    pub const INPUT_SIZE: usize = 2 * IMAGE_SIZE * IMAGE_SIZE;

    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Mlp<B> {
        let mut layers = Vec::with_capacity(HIDDEN.len() + 1);
        let mut d_input = Self::INPUT_SIZE;
        for d_output in HIDDEN.into_iter().chain([self.n_classes]) {
            layers.push(LinearConfig::new(d_input, d_output).init(device));
            d_input = d_output;
        }
        Mlp { layers }
    }
}

/// Fully connected baseline over the flattened image pair.
#[derive(Module, Debug)]
pub struct Mlp<B: Backend> {
    /// Relu is applied between consecutive layers.
    pub layers: Vec<Linear<B>>,
}

impl<B: Backend> Comparator<B> for Mlp<B> {
    fn forward(&self, x: Tensor<B, 4>) -> ModelOutput<B> {
        let mut x = x.flatten::<2>(1, 3);
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(x);
            if i != last {
                x = relu(x);
            }
        }
        ModelOutput::Logits(x)
    }
}
