use crate::loss::AuxiliaryLossConfig;
use burn::prelude::*;
use std::path::PathBuf;

/// Settings of a single training run.
///
/// Saved and loaded as JSON through [`Config::save`] and [`Config::load`].
#[derive(Config, Debug)]
pub struct ExperimentConfig {
    #[config(default = 25)]
    pub nb_epochs: usize,
    /// L2 penalty applied by the optimizer.
    #[config(default = 0.1)]
    pub weight_decay: f64,
    #[config(default = 50)]
    pub mini_batch_size: usize,
    #[config(default = 5e-4)]
    pub lr: f64,
    /// Fraction of the training pool held out for validation.
    #[config(default = 0.1)]
    pub percentage_val: f64,
    #[config(default = false)]
    pub use_auxiliary_loss: bool,
    #[config(default = "AuxiliaryLossConfig::new()")]
    pub aux_loss_weight: AuxiliaryLossConfig,
    /// Stem of the checkpoint file name.
    #[config(default = "String::from(\"model\")")]
    pub model_name: String,
    #[config(default = "String::from(\"./model_weights\")")]
    pub weights_dir: String,
    /// Number of generated pairs, for both the training pool and the test set.
    #[config(default = 1000)]
    pub n_pairs: usize,
    /// Whether the training set is extended with channel-swapped copies.
    #[config(default = true)]
    pub augment: bool,
    /// 0 = silent, 1 = summary lines, 2 = also per-epoch lines.
    #[config(default = 1)]
    pub verbose: u8,
    /// Whether the loss history is exported for plotting.
    #[config(default = false)]
    pub plot: bool,
    #[config(default = 0)]
    pub seed: u64,
}

impl ExperimentConfig {
    /// `<weights_dir>/<model_name>.pth`
    pub fn checkpoint_path(&self) -> PathBuf {
        PathBuf::from(&self.weights_dir).join(format!("{}.pth", self.model_name))
    }

    /// `<weights_dir>/<model_name>_losses.json`
    pub fn loss_history_path(&self) -> PathBuf {
        PathBuf::from(&self.weights_dir).join(format!("{}_losses.json", self.model_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ExperimentConfig::new();
        assert_eq!(25, config.nb_epochs);
        assert_eq!(50, config.mini_batch_size);
        assert_eq!(0.2, config.aux_loss_weight.weight_classification);
        assert_eq!(0.6, config.aux_loss_weight.weight_inequality);
        assert!(config.augment);
        assert_eq!(
            PathBuf::from("./model_weights").join("model.pth"),
            config.checkpoint_path()
        );
    }

    #[test]
    fn json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment.json");
        let config = ExperimentConfig::new()
            .with_nb_epochs(3)
            .with_use_auxiliary_loss(true)
            .with_model_name("siamese".into());
        config.save(&path).unwrap();

        let loaded = ExperimentConfig::load(&path).unwrap();
        assert_eq!(3, loaded.nb_epochs);
        assert!(loaded.use_auxiliary_loss);
        assert_eq!("siamese", loaded.model_name);
    }
}
