//! Losses used to train the comparison models.

mod auxiliary;

pub use auxiliary::{
    AuxiliaryLoss, AuxiliaryLossConfig, PACKED_PREDICTION_WIDTH, PACKED_TARGET_WIDTH,
};

use crate::data::Targets;
use crate::error::Result;
use crate::model::ModelOutput;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::prelude::*;

/// The training criterion of a run.
#[derive(Clone, Debug)]
pub enum Criterion {
    /// Cross-entropy on the comparison logits.
    CrossEntropy,
    /// Weighted comparison and digit-classification losses on packed predictions.
    Auxiliary(AuxiliaryLoss),
}

/// Selects the criterion matching the auxiliary-supervision mode.
///
/// Fails if the auxiliary weights do not satisfy [`AuxiliaryLossConfig::init`].
pub fn get_criterion(use_auxiliary_loss: bool, weights: &AuxiliaryLossConfig) -> Result<Criterion> {
    if use_auxiliary_loss {
        Ok(Criterion::Auxiliary(weights.init()?))
    } else {
        Ok(Criterion::CrossEntropy)
    }
}

impl Criterion {
    /// Scalar loss of a forward output against its targets.
    ///
    /// With auxiliary supervision, every auxiliary term is concatenated after the comparison
    /// logits and scored with the [`AuxiliaryLoss`]; the result is the mean over terms. Any other
    /// combination of output and targets is scored with cross-entropy on the comparison logits.
    pub fn forward<B: Backend>(&self, output: ModelOutput<B>, targets: &Targets<B>) -> Tensor<B, 1> {
        let n_terms = output.auxiliary_len();
        if let (
            Criterion::Auxiliary(loss),
            ModelOutput::WithAuxiliary { logits, auxiliary },
            Targets::Packed(packed),
        ) = (self, &output, targets)
        {
            if n_terms > 0 {
                let total = auxiliary
                    .iter()
                    .map(|term| {
                        let preds = Tensor::cat(vec![logits.clone(), term.clone()], 1);
                        loss.forward(preds, packed.clone())
                    })
                    .reduce(|acc, term| acc + term);
                if let Some(total) = total {
                    return total.div_scalar(n_terms as f64);
                }
            }
        }

        let logits = output.logits();
        let cross_entropy = CrossEntropyLossConfig::new().init(&logits.device());
        cross_entropy.forward(logits, targets.comparison())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestBackend;

    fn packed(device: &<TestBackend as Backend>::Device) -> Targets<TestBackend> {
        Targets::Packed(Tensor::from_data(
            TensorData::new(vec![1i64, 2, 7, 0, 9, 1], [2, 3]),
            device,
        ))
    }

    #[test]
    fn criterion_follows_the_auxiliary_mode() {
        let weights = AuxiliaryLossConfig::new();
        assert!(matches!(
            get_criterion(false, &weights).unwrap(),
            Criterion::CrossEntropy
        ));
        assert!(matches!(
            get_criterion(true, &weights).unwrap(),
            Criterion::Auxiliary(_)
        ));

        let invalid = AuxiliaryLossConfig::new().with_weight_inequality(0.5);
        assert!(get_criterion(true, &invalid).is_err());
        // weights are irrelevant without auxiliary supervision
        assert!(get_criterion(false, &invalid).is_ok());
    }

    #[test]
    fn auxiliary_loss_is_averaged_over_terms() {
        let device = Default::default();
        let criterion = get_criterion(true, &AuxiliaryLossConfig::new()).unwrap();
        let logits = Tensor::<TestBackend, 2>::zeros([2, 2], &device);
        // identical terms: the mean equals the loss of a single term
        let term = Tensor::<TestBackend, 2>::zeros([2, 20], &device);

        let single = criterion
            .forward(
                ModelOutput::WithAuxiliary {
                    logits: logits.clone(),
                    auxiliary: vec![term.clone()],
                },
                &packed(&device),
            )
            .into_scalar();
        let averaged = criterion
            .forward(
                ModelOutput::WithAuxiliary {
                    logits,
                    auxiliary: vec![term.clone(), term.clone(), term],
                },
                &packed(&device),
            )
            .into_scalar();

        let expected = 0.4 * 10f32.ln() + 0.6 * 2f32.ln();
        assert!((single - expected).abs() < 1e-5);
        assert!((averaged - expected).abs() < 1e-5);
    }

    #[test]
    fn plain_logits_use_the_comparison_column() {
        let device = Default::default();
        let criterion = get_criterion(true, &AuxiliaryLossConfig::new()).unwrap();
        let logits = Tensor::<TestBackend, 2>::zeros([2, 2], &device);

        let value = criterion
            .forward(ModelOutput::Logits(logits), &packed(&device))
            .into_scalar();
        assert!((value - 2f32.ln()).abs() < 1e-5);
    }
}
