//! Neural-network comparators for pairs of digit images.
//!
//! Given two stacked 14x14 digit images, every model predicts whether the first digit is less
//! than or equal to the second one. The deep convolutional models can additionally supervise
//! intermediate layers with per-digit classification heads.

#[cfg(any(feature = "ndarray", feature = "wgpu", feature = "tch-gpu"))]
pub mod backend;
pub mod data;
pub mod error;
pub mod loss;
pub mod model;
pub mod training;

pub use error::{Error, Result};

pub mod prelude {
    pub use crate::data::{Batch, PairProvider, PairSet, SyntheticPairs, Targets};
    pub use crate::error::{Error, Result};
    pub use crate::loss::{AuxiliaryLoss, AuxiliaryLossConfig, Criterion, get_criterion};
    pub use crate::model::*;
    pub use crate::training::*;
}

#[cfg(test)]
pub(crate) mod test_utils {
    pub type TestBackend = burn::backend::NdArray<f32>;
    pub type TestAutodiffBackend = burn::backend::Autodiff<TestBackend>;
}
