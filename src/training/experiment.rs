use super::{CheckpointTracker, ExperimentConfig, LossHistory, test_error, train};
use crate::data::{Batch, PairProvider, augment, random_split};
use crate::error::{Error, Result};
use crate::loss::get_criterion;
use crate::model::{Comparator, count_parameters};
use burn::module::AutodiffModule;
use burn::optim::AdamConfig;
use burn::optim::decay::WeightDecayConfig;
use burn::tensor::backend::AutodiffBackend;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Outcome of a single training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub history: LossHistory,
    /// Epoch (0-based) whose parameters were restored.
    pub best_epoch: Option<usize>,
    pub num_params: usize,
    /// Training pairs after augmentation.
    pub n_train: usize,
    pub n_val: usize,
    pub checkpoint: PathBuf,
    pub train_error: f64,
    pub val_error: f64,
    pub test_error: f64,
}

/// Trains `model` on pairs drawn from `provider` and measures its error rates.
///
/// The run generates `config.n_pairs` training and test pairs, carves a validation set out of
/// the training pool, optionally augments the remaining training pairs, trains with Adam, then
/// restores the parameters of the epoch with the lowest validation loss before measuring the
/// errors on the three sets.
pub fn run_experiment<B, M, P>(
    model: M,
    provider: &P,
    config: &ExperimentConfig,
    device: &B::Device,
) -> Result<(M, ExperimentReport)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + Comparator<B>,
    M::InnerModule: Comparator<B::InnerBackend>,
    P: PairProvider,
{
    if config.use_auxiliary_loss != model.emits_auxiliary() {
        return Err(Error::Config(format!(
            "use_auxiliary_loss is {} but the model {} auxiliary predictions",
            config.use_auxiliary_loss,
            if model.emits_auxiliary() { "emits" } else { "does not emit" },
        )));
    }
    let criterion = get_criterion(config.use_auxiliary_loss, &config.aux_loss_weight)?;

    let (pool, test_set) = provider.generate_pair_sets::<B>(config.n_pairs, config.seed, device);
    let mut rng = StdRng::seed_from_u64(config.seed);
    let (train_set, val_set) = random_split(pool, config.percentage_val, &mut rng)?;
    let train_set = if config.augment {
        augment(train_set)
    } else {
        train_set
    };

    let train_batch = Batch::new(train_set, config.use_auxiliary_loss).to_device(device);
    let val_batch = Batch::new(val_set, config.use_auxiliary_loss).to_device(device);
    let (n_train, n_val) = (train_batch.len(), val_batch.len());
    let test_set = test_set.to_device(device);

    let num_params = count_parameters(&model);
    if config.verbose >= 1 {
        tracing::info!("Device: {device:?}");
        tracing::info!(
            "Train: {} pairs, Validation: {} pairs, Test: {} pairs",
            n_train,
            n_val,
            test_set.len(),
        );
        tracing::info!("Model parameters: {num_params}");
    }

    let mut optim = AdamConfig::new()
        .with_weight_decay(Some(WeightDecayConfig::new(config.weight_decay as f32)))
        .init::<B, M>();
    let mut tracker = CheckpointTracker::new(config.checkpoint_path());
    let (model, history) = train(
        model,
        &mut optim,
        &criterion,
        &train_batch,
        &val_batch,
        config,
        &mut tracker,
    )?;
    let model = tracker.restore(model, device)?;

    let valid_model = model.valid();
    let train_batch = train_batch.inner();
    let val_batch = val_batch.inner();
    let test_set = test_set.inner();
    let train_error = test_error(&valid_model, train_batch.input, train_batch.targets.comparison());
    let val_error = test_error(&valid_model, val_batch.input, val_batch.targets.comparison());
    let test_error = test_error(&valid_model, test_set.input, test_set.target);

    if config.verbose >= 1 {
        tracing::info!(
            "Best epoch: {:?}, Train Error {:.2}%, Validation Error {:.2}%, Test Error {:.2}%",
            tracker.best_epoch().map(|epoch| epoch + 1),
            train_error * 100.0,
            val_error * 100.0,
            test_error * 100.0,
        );
    }

    if config.plot {
        let path = config.loss_history_path();
        let json = serde_json::to_string_pretty(&history)?;
        fs::write(&path, json).map_err(|err| Error::io(&path, err))?;
        if config.verbose >= 1 {
            tracing::info!("Loss history written to {path:?}");
        }
    }

    let report = ExperimentReport {
        history,
        best_epoch: tracker.best_epoch(),
        num_params,
        n_train,
        n_val,
        checkpoint: tracker.path().to_path_buf(),
        train_error,
        val_error,
        test_error,
    };
    Ok((model, report))
}

/// Mean and sample standard deviation of an error rate over repeated runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorStats {
    pub mean: f64,
    /// Zero when fewer than two runs were made.
    pub std: f64,
}

impl ErrorStats {
    pub fn from_samples(samples: &[f64]) -> Self {
        let n = samples.len();
        if n == 0 {
            return Self { mean: 0.0, std: 0.0 };
        }
        let mean = samples.iter().sum::<f64>() / n as f64;
        let std = if n < 2 {
            0.0
        } else {
            let sum_sq: f64 = samples.iter().map(|x| (x - mean).powi(2)).sum();
            (sum_sq / (n - 1) as f64).sqrt()
        };
        Self { mean, std }
    }
}

/// Aggregated error rates of [`evaluate_model`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub train: ErrorStats,
    pub val: ErrorStats,
    pub test: ErrorStats,
    pub runs: Vec<ExperimentReport>,
}

/// Repeats [`run_experiment`] `n` times, each with a freshly constructed model.
///
/// Run `i` seeds the backend and the data with `config.seed + i`.
pub fn evaluate_model<B, M, P, F>(
    mut constructor: F,
    n: usize,
    provider: &P,
    config: &ExperimentConfig,
    device: &B::Device,
) -> Result<Evaluation>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + Comparator<B>,
    M::InnerModule: Comparator<B::InnerBackend>,
    P: PairProvider,
    F: FnMut(&B::Device) -> Result<M>,
{
    if n == 0 {
        return Err(Error::Config("at least one run is required".into()));
    }

    let mut runs = Vec::with_capacity(n);
    for i in 0..n {
        let seed = config.seed + i as u64;
        B::seed(seed);
        let run_config = config.clone().with_seed(seed);
        if config.verbose >= 1 {
            tracing::info!("Run {}/{n}", i + 1);
        }
        let model = constructor(device)?;
        let (_model, report) = run_experiment(model, provider, &run_config, device)?;
        runs.push(report);
    }

    let stats = |error: fn(&ExperimentReport) -> f64| {
        ErrorStats::from_samples(&runs.iter().map(error).collect::<Vec<_>>())
    };
    let (train, val, test) = (
        stats(|run| run.train_error),
        stats(|run| run.val_error),
        stats(|run| run.test_error),
    );
    Ok(Evaluation {
        train,
        val,
        test,
        runs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_standard_deviation() {
        let stats = ErrorStats::from_samples(&[0.1, 0.2, 0.3, 0.4]);
        assert!((stats.mean - 0.25).abs() < 1e-12);
        // sqrt(0.05 / 3)
        assert!((stats.std - 0.129_099_444_873_580_57).abs() < 1e-12);
    }

    #[test]
    fn single_run_has_no_spread() {
        let stats = ErrorStats::from_samples(&[0.3]);
        assert_eq!(0.3, stats.mean);
        assert_eq!(0.0, stats.std);
    }
}
