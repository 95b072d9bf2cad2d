//! Replayable streams of random choices.
//!
//! Every nondeterministic decision the engine makes is drawn from a
//! [`ChoiceStream`]. Streams record what they hand out, so running the same
//! stream again from the start reproduces the same decisions, and they can
//! be copied or mutated to steer the next run.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Mean number of mutation bursts for schedule streams.
pub const SCHEDULE_MEAN_MUTATION_COUNT: f64 = 5.0;
/// Mean burst length for schedule streams.
pub const SCHEDULE_MEAN_MUTATION_SIZE: f64 = 5.0;
/// Mean number of mutation bursts for input streams.
pub const INPUT_MEAN_MUTATION_COUNT: f64 = 32.0;
/// Mean burst length for input streams.
pub const INPUT_MEAN_MUTATION_SIZE: f64 = 128.0;

/// Sample a geometric number of trials (at least 1) with success
/// probability `p`, from a uniform `u` in `[0, 1)`.
///
/// Returns `usize::MAX` when `p <= 0` (success never happens).
pub fn sample_geometric(p: f64, u: f64) -> usize {
    if p >= 1.0 {
        return 1;
    }
    if p <= 0.0 {
        return usize::MAX;
    }
    let trials = ((1.0 - u).ln() / (1.0 - p).ln()).ceil();
    if trials.is_finite() && trials >= 1.0 {
        trials as usize
    } else {
        1
    }
}

/// Geometric sample parameterized by its mean: `ceil(ln(1-u) / ln(1-1/mean))`.
pub fn sample_geometric_mean(mean: f64, u: f64) -> usize {
    if mean <= 1.0 {
        return 1;
    }
    sample_geometric(1.0 / mean, u)
}

/// Recorded choices plus a live random source for when they run out.
#[derive(Debug, Clone)]
pub struct ChoiceStream {
    values: Vec<u64>,
    cursor: usize,
    rng: ChaCha8Rng,
}

impl ChoiceStream {
    pub fn new(seed: u64) -> Self {
        Self::from_values(Vec::new(), seed)
    }

    /// A stream that replays `values` first.
    pub fn from_values(values: Vec<u64>, seed: u64) -> Self {
        Self {
            values,
            cursor: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// An empty stream whose entropy is derived from `rng`.
    pub fn from_rng(rng: &mut ChaCha8Rng) -> Self {
        Self::new(rng.gen())
    }

    fn next_raw(&mut self) -> u64 {
        let value = match self.values.get(self.cursor) {
            Some(&recorded) => recorded,
            None => {
                let fresh = self.rng.gen();
                self.values.push(fresh);
                fresh
            }
        };
        self.cursor += 1;
        value
    }

    pub fn next_u64(&mut self) -> u64 {
        self.next_raw()
    }

    /// A value in `0..bound`; a zero bound yields 0.
    pub fn next_int(&mut self, bound: u64) -> u64 {
        let raw = self.next_raw();
        if bound == 0 {
            0
        } else {
            raw % bound
        }
    }

    /// An index in `0..len`.
    pub fn next_index(&mut self, len: usize) -> usize {
        self.next_int(len as u64) as usize
    }

    /// A double in `[0, 1)`.
    pub fn next_double(&mut self) -> f64 {
        (self.next_raw() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// `n` bytes, eight per recorded choice.
    pub fn next_bytes(&mut self, n: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            let word = self.next_raw().to_le_bytes();
            let take = (n - out.len()).min(word.len());
            out.extend_from_slice(&word[..take]);
        }
        out
    }

    /// Start replaying from the first recorded value.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    pub fn values(&self) -> &[u64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Same recorded values, rewound, with an independent random source.
    pub fn copy(&self, rng: &mut ChaCha8Rng) -> Self {
        Self::from_values(self.values.clone(), rng.gen())
    }

    /// A copy with a geometric number of bursts overwritten by fresh values.
    ///
    /// Each burst has a geometric length and starts at a uniform offset. Bursts
    /// are clipped at the end of the stream; the length never changes.
    pub fn mutate(&self, mean_count: f64, mean_size: f64, rng: &mut ChaCha8Rng) -> Self {
        let mut mutated = self.copy(rng);
        let len = mutated.values.len();
        if len == 0 {
            return mutated;
        }
        let bursts = sample_geometric_mean(mean_count, rng.gen());
        for _ in 0..bursts {
            let size = sample_geometric_mean(mean_size, rng.gen());
            let offset = rng.gen_range(0..len);
            let end = offset.saturating_add(size).min(len);
            for slot in &mut mutated.values[offset..end] {
                *slot = rng.gen();
            }
        }
        mutated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_exhaustion_appends() {
        let mut stream = ChoiceStream::new(7);
        assert!(stream.is_empty());
        let a = stream.next_int(10);
        let b = stream.next_int(10);
        assert!(a < 10 && b < 10);
        assert_eq!(stream.len(), 2);
        assert_eq!(stream.position(), 2);
    }

    #[test]
    fn test_rewind_replays() {
        let mut stream = ChoiceStream::new(1);
        let first: Vec<u64> = (0..20).map(|_| stream.next_int(1000)).collect();
        stream.rewind();
        let second: Vec<u64> = (0..20).map(|_| stream.next_int(1000)).collect();
        assert_eq!(first, second);
        assert_eq!(stream.len(), 20);
    }

    #[test]
    fn test_copy_is_independent() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut original = ChoiceStream::new(9);
        let _ = original.next_bytes(5);
        let mut copy = original.copy(&mut rng);
        let _ = copy.next_u64();
        let _ = copy.next_u64();
        assert_eq!(original.len(), 1);
        assert_eq!(copy.len(), 2);
        assert_eq!(copy.values()[0], original.values()[0]);
    }

    #[test]
    fn test_double_range() {
        let mut stream = ChoiceStream::new(11);
        for _ in 0..1000 {
            let d = stream.next_double();
            assert!((0.0..1.0).contains(&d));
        }
    }

    #[test]
    fn test_bytes_consume_words() {
        let mut stream = ChoiceStream::new(5);
        assert_eq!(stream.next_bytes(12).len(), 12);
        assert_eq!(stream.len(), 2);
    }

    #[test]
    fn test_mutate_empty_stream() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mutated = ChoiceStream::new(1).mutate(5.0, 5.0, &mut rng);
        assert!(mutated.is_empty());
    }

    #[test]
    fn test_geometric_sampling() {
        assert_eq!(sample_geometric(1.0, 0.5), 1);
        assert_eq!(sample_geometric(0.0, 0.5), usize::MAX);
        assert_eq!(sample_geometric(0.5, 0.0), 1);
        assert_eq!(sample_geometric_mean(1.0, 0.9), 1);
        // ln(0.5)/ln(0.5) = 1 at u = 0.5, mean 2.
        assert_eq!(sample_geometric_mean(2.0, 0.5), 1);
        assert!(sample_geometric_mean(10.0, 0.99) > 10);
    }

    proptest! {
        #[test]
        fn copy_replays_recorded_values(seed in any::<u64>(), n in 0usize..64, copy_seed in any::<u64>()) {
            let mut original = ChoiceStream::new(seed);
            let drawn: Vec<u64> = (0..n).map(|_| original.next_u64()).collect();
            let mut rng = ChaCha8Rng::seed_from_u64(copy_seed);
            let mut copy = original.copy(&mut rng);
            let replayed: Vec<u64> = (0..n).map(|_| copy.next_u64()).collect();
            prop_assert_eq!(drawn, replayed);
        }

        #[test]
        fn mutation_is_local_and_keeps_length(seed in any::<u64>(), len in 1usize..200, rng_seed in any::<u64>()) {
            let mut stream = ChoiceStream::new(seed);
            for _ in 0..len {
                stream.next_u64();
            }
            let mut rng = ChaCha8Rng::seed_from_u64(rng_seed);
            let mutated = stream.mutate(SCHEDULE_MEAN_MUTATION_COUNT, SCHEDULE_MEAN_MUTATION_SIZE, &mut rng);
            prop_assert_eq!(mutated.len(), len);

            // Replay the sampling to recover the burst counts drawn in that call.
            let mut replay = ChaCha8Rng::seed_from_u64(rng_seed);
            let _: u64 = replay.gen();
            let bursts = sample_geometric_mean(SCHEDULE_MEAN_MUTATION_COUNT, replay.gen());
            let mut max_size = 0;
            for _ in 0..bursts {
                let size = sample_geometric_mean(SCHEDULE_MEAN_MUTATION_SIZE, replay.gen());
                let offset = replay.gen_range(0..len);
                max_size = max_size.max(size);
                for _ in offset..offset.saturating_add(size).min(len) {
                    let _: u64 = replay.gen();
                }
            }
            let changed = stream
                .values()
                .iter()
                .zip(mutated.values())
                .filter(|(a, b)| a != b)
                .count();
            prop_assert!(changed <= bursts.saturating_mul(max_size));
        }
    }
}
