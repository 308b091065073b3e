use super::{PairProvider, PairSet};
use crate::model::{IMAGE_SIZE, N_DIGITS};
use burn::prelude::*;
use num_traits::AsPrimitive;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// Renders digit pairs as noisy class-dependent patterns.
///
/// Digit `d` is drawn as a vertical bar `d + 1` columns wide next to a horizontal bar `d + 1`
/// rows tall, with additive gaussian noise. This keeps the comparison task learnable without any
/// external image source.
#[derive(Debug, Clone)]
pub struct SyntheticPairs {
    /// Standard deviation of the pixel noise.
    pub noise: f32,
}

impl Default for SyntheticPairs {
    fn default() -> Self {
        Self { noise: 0.3 }
    }
}

impl SyntheticPairs {
    fn render(
        &self,
        digit: usize,
        normal: Option<&Normal<f32>>,
        rng: &mut StdRng,
        image: &mut Vec<f32>,
    ) {
        let width = digit + 1;
        for row in 0..IMAGE_SIZE {
            for col in 0..IMAGE_SIZE {
                let vertical = (2..2 + width).contains(&col) && row >= 2;
                let horizontal = (IMAGE_SIZE - 1 - width..IMAGE_SIZE - 1).contains(&row) && col >= 2;
                let ink = if vertical || horizontal { 1.0 } else { 0.0 };
                let noise = normal.map_or(0.0, |normal| normal.sample(rng));
                image.push(ink + noise);
            }
        }
    }

    fn generate<B: Backend>(&self, n: usize, rng: &mut StdRng, device: &B::Device) -> PairSet<B> {
        let normal = Normal::new(0.0, self.noise.max(0.0)).ok();

        let mut images = Vec::with_capacity(n * 2 * IMAGE_SIZE * IMAGE_SIZE);
        let mut classes: Vec<i64> = Vec::with_capacity(2 * n);
        let mut targets: Vec<i64> = Vec::with_capacity(n);
        for _ in 0..n {
            let first = rng.gen_range(0..N_DIGITS);
            let second = rng.gen_range(0..N_DIGITS);
            self.render(first, normal.as_ref(), rng, &mut images);
            self.render(second, normal.as_ref(), rng, &mut images);
            classes.push(first.as_());
            classes.push(second.as_());
            targets.push(i64::from(first <= second));
        }

        PairSet {
            input: Tensor::from_data(
                TensorData::new(images, [n, 2, IMAGE_SIZE, IMAGE_SIZE]).convert::<B::FloatElem>(),
                device,
            ),
            target: Tensor::from_data(
                TensorData::new(targets, [n]).convert::<B::IntElem>(),
                device,
            ),
            classes: Tensor::from_data(
                TensorData::new(classes, [n, 2]).convert::<B::IntElem>(),
                device,
            ),
        }
    }
}

impl PairProvider for SyntheticPairs {
    fn generate_pair_sets<B: Backend>(
        &self,
        n: usize,
        seed: u64,
        device: &B::Device,
    ) -> (PairSet<B>, PairSet<B>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let train = self.generate(n, &mut rng, device);
        let test = self.generate(n, &mut rng, device);
        (train, test)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestBackend;

    #[test]
    fn labels_follow_the_classes() {
        let (train, test) =
            SyntheticPairs::default().generate_pair_sets::<TestBackend>(40, 1, &Default::default());
        assert_eq!(40, train.len());
        assert_eq!(40, test.len());
        assert_eq!([40, 2, IMAGE_SIZE, IMAGE_SIZE], train.input.dims());

        let classes: Vec<i64> = train.classes.into_data().iter::<i64>().collect();
        let targets: Vec<i64> = train.target.into_data().iter::<i64>().collect();
        for (pair, target) in classes.chunks(2).zip(targets) {
            assert!(pair.iter().all(|c| (0..10).contains(c)));
            assert_eq!(i64::from(pair[0] <= pair[1]), target);
        }
    }

    #[test]
    fn same_seed_same_pairs() {
        let provider = SyntheticPairs::default();
        let device = Default::default();
        let (a, _) = provider.generate_pair_sets::<TestBackend>(5, 9, &device);
        let (b, _) = provider.generate_pair_sets::<TestBackend>(5, 9, &device);
        let a: Vec<f32> = a.input.into_data().to_vec().unwrap();
        let b: Vec<f32> = b.input.into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }
}
