use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::trace;

use crate::shared_list::SharedList;

/// Default seed used when none is configured.
pub const DEFAULT_SEED: u64 = 0;

/// The single seeded random stream behind every probabilistic decision.
///
/// Two sources built from the same seed produce identical decision streams.
/// The stream is owned and threaded explicitly through the components that
/// need it; there is no global instance.
pub struct RandomSource {
    rng: ChaCha8Rng,
    seed: u64,
    /// Number of values drawn since the last reset.
    calls: u64,
    /// Log every decision at trace level. Never changes the stream.
    verbose: bool,
}

impl Default for RandomSource {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl RandomSource {
    pub fn new(seed: u64) -> Self {
        RandomSource {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
            calls: 0,
            verbose: false,
        }
    }

    /// Reinitialize the stream deterministically.
    pub fn reset(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        self.seed = seed;
        self.calls = 0;
        if self.verbose {
            trace!(seed, "random source reset");
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Uniform value in `[0, n)`. `n` must be positive.
    pub fn next_int(&mut self, n: usize) -> usize {
        assert!(n > 0, "next_int bound must be positive");
        self.calls += 1;
        let value = self.rng.random_range(0..n);
        if self.verbose {
            trace!(bound = n, value, calls = self.calls, "next_int");
        }
        value
    }

    /// Uniform value in `[0, 1)`.
    pub fn next_double(&mut self) -> f64 {
        self.calls += 1;
        let value: f64 = self.rng.random();
        if self.verbose {
            trace!(value, calls = self.calls, "next_double");
        }
        value
    }

    /// True with probability `p`. Always draws, so the stream advances the
    /// same way whatever `p` is.
    pub fn weighted_coin_flip(&mut self, p: f64) -> bool {
        self.next_double() < p
    }

    /// Uniformly chosen element of a slice.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let idx = self.next_int(items.len());
        items.get(idx)
    }

    /// Uniformly chosen element of a shared list, returned with its index.
    pub fn choose_shared<'a, T>(&mut self, items: &'a SharedList<T>) -> Option<(usize, &'a T)> {
        if items.is_empty() {
            return None;
        }
        let idx = self.next_int(items.len());
        items.get(idx).map(|item| (idx, item))
    }
}

impl std::fmt::Debug for RandomSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomSource")
            .field("seed", &self.seed)
            .field("calls", &self.calls)
            .finish()
    }
}
