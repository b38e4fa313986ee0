//! # Datagen — key/value generators for loading and benchmarking
//!
//! Produces `(key, value)` string pairs of an exact combined byte size. Keys
//! are decimal-rendered numbers drawn from one of two distributions; values
//! are `'a'` padding up to the requested size. Both halves can carry a
//! caller-supplied ASCII prefix, which the bulk loader uses to stamp each
//! pair with its destination level.
//!
//! ## Distributions
//!
//! - [`UniformGenerator`] — keys uniform over `[0, 10^9)`.
//! - [`BimodalGapGenerator`] — keys uniform over
//!   `[0, 4.6e6) ∪ [5.6e6, 10^7]`. The hole in the middle gives tests a
//!   supply of keys that are guaranteed absent while still inside the
//!   domain's decimal width.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Key domain for the uniform distribution.
pub const KEY_DOMAIN: u64 = 1_000_000_000;

/// Key domain for the bimodal-gap distribution.
pub const GAP_KEY_DOMAIN: u64 = 10_000_000;
/// Exclusive upper edge of the lower mode.
pub const GAP_KEY_MIDDLE_LEFT: u64 = 4_600_000;
/// Inclusive lower edge of the upper mode.
pub const GAP_KEY_MIDDLE_RIGHT: u64 = 5_600_000;

/// A source of key/value pairs for loading and benchmarking.
pub trait DataGenerator: Send {
    /// Draws the next key number from the distribution.
    fn next_key_number(&mut self) -> u64;

    /// Upper bound (exclusive or inclusive per distribution) of the key
    /// domain. Keys offset past this are guaranteed absent, which is how
    /// empty-read phases build their probes.
    fn key_domain(&self) -> u64;

    /// Renders a key: `key_prefix` followed by the decimal key number.
    fn generate_key(&mut self, key_prefix: &str) -> String {
        format!("{}{}", key_prefix, self.next_key_number())
    }

    /// Produces a `(key, value)` pair whose combined length is exactly
    /// `kv_size` bytes. The value is `value_prefix` plus `'a'` padding.
    ///
    /// # Panics
    ///
    /// Panics if the rendered key (or the value prefix) does not leave room
    /// inside `kv_size`.
    fn generate_kv_pair(
        &mut self,
        kv_size: usize,
        key_prefix: &str,
        value_prefix: &str,
    ) -> (String, String) {
        let key = self.generate_key(key_prefix);
        assert!(
            key.len() < kv_size,
            "key {:?} does not fit in a {} byte entry",
            key,
            kv_size
        );
        let value_size = kv_size - key.len();
        assert!(
            value_prefix.len() <= value_size,
            "value prefix {:?} does not fit in {} value bytes",
            value_prefix,
            value_size
        );
        let mut value = String::with_capacity(value_size);
        value.push_str(value_prefix);
        value.extend(std::iter::repeat('a').take(value_size - value_prefix.len()));
        (key, value)
    }
}

/// Keys uniform over `[0, KEY_DOMAIN)`.
pub struct UniformGenerator {
    rng: StdRng,
}

impl UniformGenerator {
    /// Creates a generator with the given RNG seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl DataGenerator for UniformGenerator {
    fn next_key_number(&mut self) -> u64 {
        self.rng.random_range(0..KEY_DOMAIN)
    }

    fn key_domain(&self) -> u64 {
        KEY_DOMAIN
    }
}

/// Keys uniform over the two modes flanking the gap
/// `[GAP_KEY_MIDDLE_LEFT, GAP_KEY_MIDDLE_RIGHT)`.
pub struct BimodalGapGenerator {
    rng: StdRng,
}

impl BimodalGapGenerator {
    /// Creates a generator with the given RNG seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl DataGenerator for BimodalGapGenerator {
    fn next_key_number(&mut self) -> u64 {
        if self.rng.random_bool(0.5) {
            self.rng.random_range(0..GAP_KEY_MIDDLE_LEFT)
        } else {
            self.rng.random_range(GAP_KEY_MIDDLE_RIGHT..=GAP_KEY_DOMAIN)
        }
    }

    fn key_domain(&self) -> u64 {
        GAP_KEY_DOMAIN
    }
}
