//! Concurrent Bloom filter over SURT keys

use crate::dedup::UriFilter;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use xxhash_rust::xxh3::xxh3_64_with_seed;

const STRIPES: usize = 64;

/// Bloom filter with an atomic bit array
///
/// Membership tests are lock-free. Inserts take one of a fixed set of stripe
/// locks chosen by key, so two inserts of the same key are serialized and
/// exactly one of them reports the key as new.
///
/// Removal is not supported: [`UriFilter::remove`] is a no-op, which can only
/// turn a later lookup into a false positive.
pub struct BloomFilter {
    words: Vec<AtomicU64>,
    num_bits: usize,
    num_hashes: usize,
    stripes: Vec<Mutex<()>>,
}

impl BloomFilter {
    /// Create a new bloom filter
    ///
    /// # Arguments
    /// * `num_items` - Expected number of items
    /// * `false_positive_rate` - Desired false positive rate (e.g., 0.001 for 0.1%)
    pub fn new(num_items: usize, false_positive_rate: f64) -> Self {
        let num_items = num_items.max(1);
        // m = -n * ln(p) / (ln(2)^2)
        let m = (-(num_items as f64) * false_positive_rate.ln() / (2.0_f64.ln().powi(2))).ceil()
            as usize;
        let num_bits = m.max(64);

        // k = m/n * ln(2)
        let k = ((num_bits as f64 / num_items as f64) * 2.0_f64.ln()).round() as usize;
        let num_hashes = k.clamp(1, 16);

        Self::with_params(num_bits, num_hashes)
    }

    /// Create a bloom filter with specific parameters
    pub fn with_params(num_bits: usize, num_hashes: usize) -> Self {
        let num_words = num_bits.div_ceil(64).max(1);
        Self {
            words: (0..num_words).map(|_| AtomicU64::new(0)).collect(),
            num_bits: num_words * 64,
            num_hashes: num_hashes.max(1),
            stripes: (0..STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    pub fn num_hashes(&self) -> usize {
        self.num_hashes
    }

    fn bit_positions<'a>(&'a self, item: &'a [u8]) -> impl Iterator<Item = (usize, u64)> + 'a {
        (0..self.num_hashes).map(move |i| {
            let bit_idx = xxh3_64_with_seed(item, i as u64) as usize % self.num_bits;
            (bit_idx / 64, 1u64 << (bit_idx % 64))
        })
    }

    fn contains_bytes(&self, item: &[u8]) -> bool {
        self.bit_positions(item)
            .all(|(word, mask)| self.words[word].load(Ordering::Acquire) & mask != 0)
    }

    /// Approximate number of distinct items inserted
    pub fn estimate_count(&self) -> usize {
        let set_bits: usize = self
            .words
            .iter()
            .map(|w| w.load(Ordering::Relaxed).count_ones() as usize)
            .sum();
        let m = self.num_bits as f64;
        let k = self.num_hashes as f64;
        let x = set_bits as f64;

        if x >= m {
            return set_bits;
        }

        // n ≈ -m/k * ln(1 - x/m)
        let estimate = (-m / k) * (1.0 - x / m).ln();
        if estimate.is_nan() || estimate.is_infinite() || estimate < 0.0 {
            return 0;
        }
        estimate.round() as usize
    }
}

impl UriFilter for BloomFilter {
    fn might_contain(&self, surt: &str) -> bool {
        self.contains_bytes(surt.as_bytes())
    }

    fn add(&self, surt: &str) -> bool {
        let item = surt.as_bytes();
        let stripe = xxh3_64_with_seed(item, u64::MAX) as usize % STRIPES;
        // A poisoned stripe only guards the bit updates below, which are atomic
        let _guard = match self.stripes[stripe].lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut was_new = false;
        for (word, mask) in self.bit_positions(item) {
            let previous = self.words[word].fetch_or(mask, Ordering::AcqRel);
            if previous & mask == 0 {
                was_new = true;
            }
        }
        was_new
    }

    fn remove(&self, _surt: &str) {}
}
