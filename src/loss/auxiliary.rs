use crate::error::Error;
use crate::model::N_DIGITS;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::prelude::*;

/// Width of a packed prediction: comparison logits, then each digit's class logits.
pub const PACKED_PREDICTION_WIDTH: usize = 2 + 2 * N_DIGITS;

/// Width of a packed target: comparison label, then each digit's class.
pub const PACKED_TARGET_WIDTH: usize = 3;

/// Configuration to create an [Auxiliary loss](AuxiliaryLoss) using the
/// [init function](AuxiliaryLossConfig::init).
#[derive(Config, Debug)]
pub struct AuxiliaryLossConfig {
    /// Weight of each of the two digit-classification terms.
    #[config(default = 0.2)]
    pub weight_classification: f64,
    /// Weight of the comparison term.
    #[config(default = 0.6)]
    pub weight_inequality: f64,
}

impl AuxiliaryLossConfig {
    /// Initialize the [Auxiliary loss](AuxiliaryLoss).
    ///
    /// Fails unless `2 * weight_classification + weight_inequality` is exactly 1, which keeps the
    /// combined loss on the scale of a single cross-entropy.
    pub fn init(&self) -> crate::Result<AuxiliaryLoss> {
        let total = 2.0 * self.weight_classification + self.weight_inequality;
        if total != 1.0 {
            return Err(Error::Config(format!(
                "2 * weight_classification + weight_inequality must be 1, got {total}"
            )));
        }
        Ok(AuxiliaryLoss {
            weight_classification: self.weight_classification,
            weight_inequality: self.weight_inequality,
        })
    }
}

/// Weighted sum of the comparison loss and the two digit-classification losses.
///
/// Should be created using [AuxiliaryLossConfig].
#[derive(Clone, Debug)]
pub struct AuxiliaryLoss {
    pub weight_classification: f64,
    pub weight_inequality: f64,
}

impl AuxiliaryLoss {
    /// Compute the criterion on the packed predictions.
    ///
    /// # Shapes
    ///
    /// - preds: `[batch_size, PACKED_PREDICTION_WIDTH]`
    /// - targets: `[batch_size, PACKED_TARGET_WIDTH]`
    /// - output: `[1]`
    pub fn forward<B: Backend>(&self, preds: Tensor<B, 2>, targets: Tensor<B, 2, Int>) -> Tensor<B, 1> {
        let [batch, width] = preds.dims();
        debug_assert_eq!(PACKED_PREDICTION_WIDTH, width);
        debug_assert_eq!([batch, PACKED_TARGET_WIDTH], targets.dims());

        let cross_entropy = CrossEntropyLossConfig::new().init(&preds.device());
        let column = |i: usize| targets.clone().narrow(1, i, 1).squeeze::<1>(1);

        let loss_ineq = cross_entropy.forward(preds.clone().narrow(1, 0, 2), column(0));
        let loss_class1 = cross_entropy.forward(preds.clone().narrow(1, 2, N_DIGITS), column(1));
        let loss_class2 = cross_entropy.forward(preds.narrow(1, 2 + N_DIGITS, N_DIGITS), column(2));

        (loss_class1 + loss_class2).mul_scalar(self.weight_classification)
            + loss_ineq.mul_scalar(self.weight_inequality)
    }
}
