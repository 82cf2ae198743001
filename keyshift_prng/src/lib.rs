// Deterministic, portable pseudo-random number generator for chart transforms.
//
// Implements xoshiro256++ (Blackman & Vigna, 2019) with SplitMix64 seeding,
// plus the handful of sampling helpers the engine needs on top of it:
// Fisher-Yates shuffling, roulette-wheel selection, and stream forking for
// row-parallel work.
//
// Every transform in `keyshift_engine` takes a `&mut ChartRng` parameter.
// There is no global or thread-local generator anywhere in the workspace; a
// transform's output is a pure function of its input events, its options,
// and the seed the caller built the generator from.
//
// **Critical constraint: determinism.** The core generator must produce
// identical output given the same prior state, regardless of platform,
// compiler version, or optimization level. No floating-point arithmetic in
// `next_u64`, no stdlib hashing, no OS entropy.

use serde::{Deserialize, Serialize};

/// Xoshiro256++ PRNG: the engine's sole source of randomness.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRng {
    s: [u64; 4],
}

impl ChartRng {
    /// Create a new PRNG seeded from a `u64`.
    ///
    /// Uses SplitMix64 to expand the seed into the 256-bit internal state.
    /// Two `ChartRng` instances created with the same seed will produce
    /// identical output sequences.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    /// Derive an independent generator for sub-stream `stream` without
    /// advancing `self`.
    ///
    /// Row-parallel passes fork one generator per row index so the result
    /// does not depend on how rayon schedules the rows.
    pub fn fork(&self, stream: u64) -> Self {
        let mut sm = self.s[0] ^ self.s[2].rotate_left(17);
        let base = splitmix64(&mut sm);
        Self::new(base ^ stream.wrapping_mul(0x9e37_79b9_7f4a_7c15))
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }

    /// Generate a uniform `f64` in [0, 1) from the upper 53 bits.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Generate a uniform random integer in `[low, high)`.
    ///
    /// Uses rejection sampling to avoid modulo bias.
    /// Panics if `low >= high`.
    pub fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(low < high, "range_u64: low must be less than high");
        let range = high - low;
        if range.is_power_of_two() {
            return low + (self.next_u64() & (range - 1));
        }
        let threshold = range.wrapping_neg() % range;
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return low + (r % range);
            }
        }
    }

    /// Generate a uniform random `usize` in `[low, high)`.
    ///
    /// Panics if `low >= high`.
    pub fn range_usize(&mut self, low: usize, high: usize) -> usize {
        self.range_u64(low as u64, high as u64) as usize
    }

    /// Generate a uniform random `usize` in `[low, high]`.
    ///
    /// Panics if `low > high`.
    pub fn range_usize_inclusive(&mut self, low: usize, high: usize) -> usize {
        assert!(low <= high, "range_usize_inclusive: low must be <= high");
        self.range_u64(low as u64, high as u64 + 1) as usize
    }

    /// Return `true` with probability `p`. `p <= 0.0` is always false,
    /// `p >= 1.0` always true.
    pub fn random_bool(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Shuffle a slice in place (Fisher-Yates, back to front).
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.range_usize_inclusive(0, i);
            items.swap(i, j);
        }
    }

    /// Roulette-wheel selection: pick index `i` with probability
    /// `weights[i] / sum(weights)`.
    ///
    /// Non-positive and non-finite weights never win. Returns `None` when no
    /// weight is positive.
    pub fn choose_weighted(&mut self, weights: &[f64]) -> Option<usize> {
        let usable = |w: f64| w.is_finite() && w > 0.0;
        let total: f64 = weights.iter().copied().filter(|&w| usable(w)).sum();
        if total <= 0.0 {
            return None;
        }
        let mut target = self.next_f64() * total;
        let mut last = None;
        for (i, &w) in weights.iter().enumerate() {
            if !usable(w) {
                continue;
            }
            if target < w {
                return Some(i);
            }
            target -= w;
            last = Some(i);
        }
        // Rounding can leave `target` a hair above zero after the last slot.
        last
    }
}

/// SplitMix64, used only for seeding xoshiro256++ from a single `u64`.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn determinism_same_seed_same_output() {
        let mut a = ChartRng::new(42);
        let mut b = ChartRng::new(42);
        for _ in 0..1000 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn different_seeds_different_output() {
        let mut a = ChartRng::new(42);
        let mut b = ChartRng::new(43);
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn f64_in_unit_range() {
        let mut rng = ChartRng::new(12345);
        for _ in 0..10_000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v), "f64 out of range: {v}");
        }
    }

    #[test]
    fn range_usize_inclusive_reaches_both_ends() {
        let mut rng = ChartRng::new(666);
        let mut seen = [false; 6];
        for _ in 0..10_000 {
            let v = rng.range_usize_inclusive(5, 10);
            assert!((5..=10).contains(&v), "out of range: {v}");
            seen[v - 5] = true;
        }
        assert!(seen.iter().all(|&s| s), "every value should appear: {seen:?}");
    }

    #[test]
    fn random_bool_extremes() {
        let mut rng = ChartRng::new(42);
        for _ in 0..100 {
            assert!(!rng.random_bool(0.0));
            assert!(rng.random_bool(1.0));
        }
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let mut rng = ChartRng::new(7);
        let mut items: Vec<u32> = (0..50).collect();
        rng.shuffle(&mut items);
        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
        assert_ne!(items, sorted, "50 elements should not shuffle to identity");
    }

    #[test]
    fn shuffle_handles_tiny_slices() {
        let mut rng = ChartRng::new(7);
        let mut empty: [u8; 0] = [];
        rng.shuffle(&mut empty);
        let mut one = [9];
        rng.shuffle(&mut one);
        assert_eq!(one, [9]);
    }

    #[test]
    fn choose_weighted_skips_zero_weights() {
        let mut rng = ChartRng::new(3);
        for _ in 0..1000 {
            let i = rng.choose_weighted(&[0.0, 1.0, 0.0, 2.0]).unwrap();
            assert!(i == 1 || i == 3, "picked zero-weight slot {i}");
        }
        assert_eq!(rng.choose_weighted(&[0.0, 0.0]), None);
        assert_eq!(rng.choose_weighted(&[]), None);
    }

    #[test]
    fn choose_weighted_follows_proportions() {
        let mut rng = ChartRng::new(99);
        let mut counts = [0u32; 2];
        for _ in 0..20_000 {
            counts[rng.choose_weighted(&[1.0, 3.0]).unwrap()] += 1;
        }
        let share = counts[1] as f64 / 20_000.0;
        assert!((0.72..0.78).contains(&share), "heavy slot share {share}");
    }

    #[test]
    fn fork_is_stable_and_does_not_advance_parent() {
        let parent = ChartRng::new(5);
        let mut a = parent.fork(3);
        let mut b = parent.fork(3);
        let mut c = parent.fork(4);
        let (x, y, z) = (a.next_u64(), b.next_u64(), c.next_u64());
        assert_eq!(x, y);
        assert_ne!(x, z);
        assert_eq!(parent, ChartRng::new(5));
    }

    #[test]
    fn serialization_roundtrip() {
        let mut rng = ChartRng::new(42);
        for _ in 0..100 {
            rng.next_u64();
        }
        let json = serde_json::to_string(&rng).unwrap();
        let mut restored: ChartRng = serde_json::from_str(&json).unwrap();
        for _ in 0..100 {
            assert_eq!(rng.next_u64(), restored.next_u64());
        }
    }
}
