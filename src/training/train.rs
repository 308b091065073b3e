use super::{CheckpointTracker, ExperimentConfig};
use crate::data::Batch;
use crate::error::{Error, Result};
use crate::loss::Criterion;
use crate::model::Comparator;
use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::ElementConversion;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

/// Number of samples per forward pass when measuring the error rate.
pub const TEST_BATCH_SIZE: usize = 20;

/// Per-epoch losses of a training run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LossHistory {
    /// Mean of the mini-batch losses of each epoch.
    pub train_losses: Vec<f64>,
    /// Loss over the whole validation set after each epoch.
    pub val_losses: Vec<f64>,
}

/// Trains `model` for `config.nb_epochs` epochs.
///
/// Each epoch runs one optimizer step per mini-batch of `config.mini_batch_size` samples (the
/// last one may be shorter), then computes the validation loss in a single inference-mode pass
/// and hands it to `tracker`. The returned model is the one of the last epoch; use
/// [`CheckpointTracker::restore`] to recover the best one.
///
/// Fails on a zero mini-batch size or an empty training or validation set.
pub fn train<B, M, O>(
    mut model: M,
    optim: &mut O,
    criterion: &Criterion,
    train_set: &Batch<B>,
    val_set: &Batch<B>,
    config: &ExperimentConfig,
    tracker: &mut CheckpointTracker,
) -> Result<(M, LossHistory)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + Comparator<B>,
    M::InnerModule: Comparator<B::InnerBackend>,
    O: Optimizer<M, B>,
{
    let batch_size = config.mini_batch_size;
    if batch_size == 0 {
        return Err(Error::Config("the mini-batch size must be positive".into()));
    }
    if train_set.is_empty() || val_set.is_empty() {
        return Err(Error::Config(format!(
            "training needs samples, got {} training and {} validation pairs",
            train_set.len(),
            val_set.len()
        )));
    }
    let n = train_set.len();
    let val_inner = val_set.clone().inner();

    let mut history = LossHistory::default();
    for epoch in 0..config.nb_epochs {
        let mut loss_sum = 0.0;
        let mut n_batches = 0usize;
        for start in (0..n).step_by(batch_size) {
            let batch = train_set.narrow(start, batch_size.min(n - start));

            let loss = criterion.forward(model.forward(batch.input), &batch.targets);
            loss_sum += loss.clone().into_scalar().elem::<f64>();
            n_batches += 1;

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(config.lr, model, grads);
        }
        let train_loss = loss_sum / n_batches.max(1) as f64;

        let valid_model = model.valid();
        let val_loss = criterion
            .forward(valid_model.forward(val_inner.input.clone()), &val_inner.targets)
            .into_scalar()
            .elem::<f64>();

        history.train_losses.push(train_loss);
        history.val_losses.push(val_loss);
        let saved = tracker.observe(epoch, val_loss, &model)?;

        if config.verbose >= 2 {
            tracing::info!(
                "Epoch {}/{}, Train Loss {train_loss:.4}, Val Loss {val_loss:.4}{}",
                epoch + 1,
                config.nb_epochs,
                if saved { " (saved)" } else { "" },
            );
        }
    }

    Ok((model, history))
}

/// Fraction of misclassified comparisons, measured in sub-batches of [`TEST_BATCH_SIZE`].
///
/// `model` is expected on an inference backend. Only the first two logit columns are read, and
/// the error is the mean absolute difference between the arg-max and the label, which is a
/// misclassification rate because labels are binary. An empty input has no error.
pub fn test_error<B: Backend, M: Comparator<B>>(
    model: &M,
    input: Tensor<B, 4>,
    target: Tensor<B, 1, Int>,
) -> f64 {
    let [n, ..] = input.dims();
    if n == 0 {
        return 0.0;
    }
    let logits: Vec<Tensor<B, 2>> = (0..n)
        .step_by(TEST_BATCH_SIZE)
        .map(|start| {
            let len = TEST_BATCH_SIZE.min(n - start);
            model.forward(input.clone().narrow(0, start, len)).logits()
        })
        .collect();
    classification_error(Tensor::cat(logits, 0), target)
}

/// Mean absolute difference between the arg-max of the first two columns of `logits` and
/// `target`.
///
/// # Shapes
///   - logits [n, n_classes >= 2]
///   - target [n]
pub fn classification_error<B: Backend>(logits: Tensor<B, 2>, target: Tensor<B, 1, Int>) -> f64 {
    let predicted = logits.narrow(1, 0, 2).argmax(1).squeeze::<1>(1);
    (predicted - target)
        .abs()
        .float()
        .mean()
        .into_scalar()
        .elem::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{PairProvider, SyntheticPairs, Targets};
    use crate::model::{Mlp, MlpConfig};
    use crate::test_utils::{TestAutodiffBackend, TestBackend};
    use burn::optim::AdamConfig;

    fn labels(values: &[i64]) -> Tensor<TestBackend, 1, Int> {
        Tensor::from_data(TensorData::new(values.to_vec(), [values.len()]), &Default::default())
    }

    fn logits(rows: &[[f32; 2]]) -> Tensor<TestBackend, 2> {
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        Tensor::from_data(TensorData::new(flat, [rows.len(), 2]), &Default::default())
    }

    #[test]
    fn error_is_zero_for_exact_predictions() {
        let logits = logits(&[[2.0, -1.0], [0.0, 3.0], [-4.0, 1.0]]);
        assert_eq!(0.0, classification_error(logits, labels(&[0, 1, 1])));
    }

    #[test]
    fn error_is_one_when_every_prediction_is_wrong() {
        let logits = logits(&[[2.0, -1.0], [0.0, 3.0], [-4.0, 1.0]]);
        assert_eq!(1.0, classification_error(logits, labels(&[1, 0, 0])));
    }

    #[test]
    fn error_ignores_auxiliary_columns() {
        let device = Default::default();
        let wide = Tensor::cat(
            vec![
                logits(&[[1.0, 0.0], [0.0, 1.0]]),
                Tensor::<TestBackend, 2>::ones([2, 20], &device).mul_scalar(10.0),
            ],
            1,
        );
        assert_eq!(0.5, classification_error(wide, labels(&[0, 0])));
    }

    #[test]
    fn test_error_covers_a_short_final_batch() {
        let device = Default::default();
        // 45 samples: two full sub-batches and a short one
        let (set, _) = SyntheticPairs::default().generate_pair_sets::<TestBackend>(45, 2, &device);
        let model = MlpConfig::new().init::<TestBackend>(&device);

        let whole = classification_error(
            model.forward(set.input.clone()).logits(),
            set.target.clone(),
        );
        let batched = test_error(&model, set.input.clone(), set.target.clone());
        assert!((whole - batched).abs() < 1e-6, "{whole} != {batched}");

        // flipping every label turns each hit into a miss
        let flipped = set.target.clone().neg().add_scalar(1);
        let flipped = test_error(&model, set.input, flipped);
        assert!((1.0 - batched - flipped).abs() < 1e-6);
    }

    #[test]
    fn records_one_loss_pair_per_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let (pool, _) =
            SyntheticPairs::default().generate_pair_sets::<TestAutodiffBackend>(23, 0, &device);
        let train_set = Batch::new(pool.narrow(0, 18), false);
        let val_set = Batch::new(pool.narrow(18, 5), false);

        let config = ExperimentConfig::new()
            .with_nb_epochs(3)
            .with_mini_batch_size(5)
            .with_verbose(0);
        let model = MlpConfig::new().init::<TestAutodiffBackend>(&device);
        let mut optim = AdamConfig::new().init::<TestAutodiffBackend, Mlp<TestAutodiffBackend>>();
        let mut tracker = CheckpointTracker::new(dir.path().join("mlp.pth"));

        let (_model, history) = train(
            model,
            &mut optim,
            &Criterion::CrossEntropy,
            &train_set,
            &val_set,
            &config,
            &mut tracker,
        )
        .unwrap();

        assert_eq!(3, history.train_losses.len());
        assert_eq!(3, history.val_losses.len());
        assert!(history.train_losses.iter().all(|loss| loss.is_finite()));
        let best = history
            .val_losses
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
        assert_eq!(Some(best), tracker.best_loss());
        assert!(tracker.path().exists());
    }

    #[test]
    fn rejects_empty_sets() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let (pool, _) =
            SyntheticPairs::default().generate_pair_sets::<TestAutodiffBackend>(10, 0, &device);
        let filled = Batch::new(pool, false);
        let empty = Batch {
            input: Tensor::from_data(TensorData::new(Vec::<f32>::new(), [0, 2, 14, 14]), &device),
            targets: Targets::Labels(Tensor::from_data(
                TensorData::new(Vec::<i64>::new(), [0]),
                &device,
            )),
        };
        assert!(empty.is_empty());

        let config = ExperimentConfig::new().with_nb_epochs(1).with_verbose(0);
        for (train_set, val_set) in [(&empty, &filled), (&filled, &empty)] {
            let model = MlpConfig::new().init::<TestAutodiffBackend>(&device);
            let mut optim =
                AdamConfig::new().init::<TestAutodiffBackend, Mlp<TestAutodiffBackend>>();
            let mut tracker = CheckpointTracker::new(dir.path().join("mlp.pth"));
            let result = train(
                model,
                &mut optim,
                &Criterion::CrossEntropy,
                train_set,
                val_set,
                &config,
                &mut tracker,
            );
            assert!(matches!(result, Err(Error::Config(_))));
            assert!(!tracker.path().exists());
        }
    }
}
