//! Digit-pair datasets and the preprocessing applied before training.

mod synthetic;

pub use synthetic::SyntheticPairs;

use crate::error::{Error, Result};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use num_traits::AsPrimitive;
use rand::Rng;
use rand::seq::SliceRandom;

/// A set of image pairs with their labels.
#[derive(Clone, Debug)]
pub struct PairSet<B: Backend> {
    /// Two stacked single-channel digit images per sample.
    ///
    /// # Shape
    /// [n, 2, IMAGE_SIZE, IMAGE_SIZE]
    pub input: Tensor<B, 4>,
    /// 1 if the first digit is less or equal to the second one, 0 otherwise.
    ///
    /// # Shape
    /// [n]
    pub target: Tensor<B, 1, Int>,
    /// Digit class (0..=9) of each image.
    ///
    /// # Shape
    /// [n, 2]
    pub classes: Tensor<B, 2, Int>,
}

impl<B: Backend> PairSet<B> {
    pub fn len(&self) -> usize {
        let [n, _, _, _] = self.input.dims();
        n
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples at `indices`, in that order.
    pub fn select(&self, indices: Tensor<B, 1, Int>) -> Self {
        PairSet {
            input: self.input.clone().select(0, indices.clone()),
            target: self.target.clone().select(0, indices.clone()),
            classes: self.classes.clone().select(0, indices),
        }
    }

    /// Samples `start..start + len`.
    pub fn narrow(&self, start: usize, len: usize) -> Self {
        PairSet {
            input: self.input.clone().narrow(0, start, len),
            target: self.target.clone().narrow(0, start, len),
            classes: self.classes.clone().narrow(0, start, len),
        }
    }

    pub fn to_device(self, device: &B::Device) -> Self {
        PairSet {
            input: self.input.to_device(device),
            target: self.target.to_device(device),
            classes: self.classes.to_device(device),
        }
    }
}

impl<B: AutodiffBackend> PairSet<B> {
    /// The same samples on the inner backend, used for inference.
    pub fn inner(self) -> PairSet<B::InnerBackend> {
        PairSet {
            input: self.input.inner(),
            target: self.target.inner(),
            classes: self.classes.inner(),
        }
    }
}

/// Source of train and test pair sets.
pub trait PairProvider {
    /// Generates `n` training pairs and `n` test pairs.
    fn generate_pair_sets<B: Backend>(
        &self,
        n: usize,
        seed: u64,
        device: &B::Device,
    ) -> (PairSet<B>, PairSet<B>);
}

/// Shuffles `set` and splits it into a training part and a validation part holding
/// `percentage_val` of the samples.
///
/// The training part gets `floor(n * (1 - percentage_val))` samples, the validation part the
/// remainder. Both parts must be non-empty.
pub fn random_split<B: Backend, R: Rng>(
    set: PairSet<B>,
    percentage_val: f64,
    rng: &mut R,
) -> Result<(PairSet<B>, PairSet<B>)> {
    if !(percentage_val > 0.0 && percentage_val < 1.0) {
        return Err(Error::Config(format!(
            "the validation fraction must be in (0, 1), got {percentage_val}"
        )));
    }
    let n = set.len();
    let train_size = (n as f64 * (1.0 - percentage_val)).floor() as usize;
    let val_size = n - train_size;
    if train_size == 0 || val_size == 0 {
        return Err(Error::Config(format!(
            "cannot split {n} samples into train and validation with fraction {percentage_val}"
        )));
    }

    let mut permutation: Vec<i64> = (0..n).map(|i| i.as_()).collect();
    permutation.shuffle(rng);
    let indices = Tensor::<B, 1, Int>::from_data(
        TensorData::new(permutation, [n]).convert::<B::IntElem>(),
        &set.input.device(),
    );
    let shuffled = set.select(indices);

    Ok((
        shuffled.narrow(0, train_size),
        shuffled.narrow(train_size, val_size),
    ))
}

/// Appends a channel-swapped copy of every sample, doubling the set.
///
/// Swapping the images also swaps their digit classes, and the comparison label of the copy is
/// recomputed from the swapped classes.
pub fn augment<B: Backend>(set: PairSet<B>) -> PairSet<B> {
    let swap = |x: Tensor<B, 4>| Tensor::cat(vec![x.clone().narrow(1, 1, 1), x.narrow(1, 0, 1)], 1);
    let flipped_input = swap(set.input.clone());

    let first = set.classes.clone().narrow(1, 0, 1);
    let second = set.classes.clone().narrow(1, 1, 1);
    let flipped_classes = Tensor::cat(vec![second.clone(), first.clone()], 1);
    let flipped_target = (second - first)
        .lower_equal_elem(0)
        .int()
        .squeeze::<1>(1);

    PairSet {
        input: Tensor::cat(vec![set.input, flipped_input], 0),
        target: Tensor::cat(vec![set.target, flipped_target], 0),
        classes: Tensor::cat(vec![set.classes, flipped_classes], 0),
    }
}

/// Training targets, shaped after the loss they feed.
#[derive(Clone, Debug)]
pub enum Targets<B: Backend> {
    /// Comparison label only.
    ///
    /// # Shape
    /// [n]
    Labels(Tensor<B, 1, Int>),
    /// Comparison label, first digit class, second digit class.
    ///
    /// # Shape
    /// [n, 3]
    Packed(Tensor<B, 2, Int>),
}

impl<B: Backend> Targets<B> {
    pub fn len(&self) -> usize {
        match self {
            Targets::Labels(t) => t.dims()[0],
            Targets::Packed(t) => t.dims()[0],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn narrow(&self, start: usize, len: usize) -> Self {
        match self {
            Targets::Labels(t) => Targets::Labels(t.clone().narrow(0, start, len)),
            Targets::Packed(t) => Targets::Packed(t.clone().narrow(0, start, len)),
        }
    }

    /// The comparison label of every sample.
    ///
    /// # Shape
    /// [n]
    pub fn comparison(&self) -> Tensor<B, 1, Int> {
        match self {
            Targets::Labels(t) => t.clone(),
            Targets::Packed(t) => t.clone().narrow(1, 0, 1).squeeze::<1>(1),
        }
    }

    pub fn to_device(self, device: &B::Device) -> Self {
        match self {
            Targets::Labels(t) => Targets::Labels(t.to_device(device)),
            Targets::Packed(t) => Targets::Packed(t.to_device(device)),
        }
    }
}

impl<B: AutodiffBackend> Targets<B> {
    pub fn inner(self) -> Targets<B::InnerBackend> {
        match self {
            Targets::Labels(t) => Targets::Labels(t.inner()),
            Targets::Packed(t) => Targets::Packed(t.inner()),
        }
    }
}

/// Packs the comparison label with both digit classes when auxiliary supervision is used, or
/// keeps the comparison label alone otherwise.
pub fn build_target<B: Backend>(
    target: Tensor<B, 1, Int>,
    classes: Tensor<B, 2, Int>,
    use_auxiliary_loss: bool,
) -> Targets<B> {
    if use_auxiliary_loss {
        Targets::Packed(Tensor::cat(vec![target.unsqueeze_dim(1), classes], 1))
    } else {
        Targets::Labels(target)
    }
}

/// Model inputs paired with the targets of the active criterion.
#[derive(Clone, Debug)]
pub struct Batch<B: Backend> {
    /// # Shape
    /// [n, 2, IMAGE_SIZE, IMAGE_SIZE]
    pub input: Tensor<B, 4>,
    pub targets: Targets<B>,
}

impl<B: Backend> Batch<B> {
    pub fn new(set: PairSet<B>, use_auxiliary_loss: bool) -> Self {
        Batch {
            input: set.input,
            targets: build_target(set.target, set.classes, use_auxiliary_loss),
        }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn narrow(&self, start: usize, len: usize) -> Self {
        Batch {
            input: self.input.clone().narrow(0, start, len),
            targets: self.targets.narrow(start, len),
        }
    }

    pub fn to_device(self, device: &B::Device) -> Self {
        Batch {
            input: self.input.to_device(device),
            targets: self.targets.to_device(device),
        }
    }
}

impl<B: AutodiffBackend> Batch<B> {
    pub fn inner(self) -> Batch<B::InnerBackend> {
        Batch {
            input: self.input.inner(),
            targets: self.targets.inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestBackend;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn pairs(n: usize) -> PairSet<TestBackend> {
        let (train, _test) = SyntheticPairs::default().generate_pair_sets(n, 7, &Default::default());
        train
    }

    fn ints<const D: usize>(t: Tensor<TestBackend, D, Int>) -> Vec<i64> {
        t.into_data().iter::<i64>().collect()
    }

    #[test]
    fn split_keeps_every_sample() {
        let mut rng = StdRng::seed_from_u64(0);
        for (n, percentage_val) in [(20, 0.1), (1000, 0.1), (37, 0.25), (10, 0.5)] {
            let (train, val) = random_split(pairs(n), percentage_val, &mut rng).unwrap();
            let expected_train = (n as f64 * (1.0 - percentage_val)).floor() as usize;
            assert_eq!(expected_train, train.len());
            assert_eq!(n - expected_train, val.len());
            assert_eq!(n, train.len() + val.len());
        }
    }

    #[test]
    fn split_is_a_permutation() {
        let set = pairs(30);
        let mut before = ints(set.classes.clone().narrow(1, 0, 1).squeeze::<1>(1));
        let (train, val) = random_split(set, 0.2, &mut StdRng::seed_from_u64(3)).unwrap();
        let mut after = ints(train.classes.narrow(1, 0, 1).squeeze::<1>(1));
        after.extend(ints(val.classes.narrow(1, 0, 1).squeeze::<1>(1)));
        before.sort();
        after.sort();
        assert_eq!(before, after);
    }

    #[test]
    fn split_rejects_degenerate_fractions() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(random_split(pairs(10), 0.0, &mut rng).is_err());
        assert!(random_split(pairs(10), 1.0, &mut rng).is_err());
        // 1 - 1e-17 rounds to 1, leaving nothing for validation
        assert!(random_split(pairs(10), 1e-17, &mut rng).is_err());
        // floor(0.5) leaves nothing for training
        assert!(random_split(pairs(1), 0.5, &mut rng).is_err());
    }

    #[test]
    fn augmentation_doubles_and_swaps_consistently() {
        let set = pairs(25);
        let n = set.len();
        let augmented = augment(set.clone());
        assert_eq!(2 * n, augmented.len());

        let classes = ints(augmented.classes.clone());
        let targets = ints(augmented.target.clone());
        for i in 0..n {
            let (a, b) = (classes[2 * i], classes[2 * i + 1]);
            let j = n + i;
            let (a_swapped, b_swapped) = (classes[2 * j], classes[2 * j + 1]);
            assert_eq!((b, a), (a_swapped, b_swapped));
            assert_eq!(i64::from(b - a <= 0), targets[j]);
            // the comparison rule still holds on the swapped copy
            assert_eq!(i64::from(a_swapped <= b_swapped), targets[j]);
        }

        let first: Vec<f32> = augmented
            .input
            .clone()
            .narrow(0, n, n)
            .narrow(1, 0, 1)
            .into_data()
            .to_vec()
            .unwrap();
        let second: Vec<f32> = set.input.narrow(1, 1, 1).into_data().to_vec().unwrap();
        assert_eq!(second, first);
    }

    #[test]
    fn targets_are_packed_only_for_auxiliary_loss() {
        let set = pairs(6);
        let labels = build_target(set.target.clone(), set.classes.clone(), false);
        assert!(matches!(labels, Targets::Labels(_)));
        assert_eq!(6, labels.len());

        let packed = build_target(set.target.clone(), set.classes.clone(), true);
        let Targets::Packed(tensor) = &packed else {
            panic!("expected packed targets");
        };
        assert_eq!([6, 3], tensor.dims());
        assert_eq!(ints(set.target), ints(packed.comparison()));
        assert_eq!(ints(set.classes), ints(tensor.clone().narrow(1, 1, 2)));
    }
}
