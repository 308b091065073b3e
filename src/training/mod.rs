//! Training and evaluation engine.

mod checkpoint;
mod config;
mod experiment;
mod train;

pub use checkpoint::CheckpointTracker;
pub use config::ExperimentConfig;
pub use experiment::{ErrorStats, Evaluation, ExperimentReport, evaluate_model, run_experiment};
pub use train::{LossHistory, TEST_BATCH_SIZE, classification_error, test_error, train};
