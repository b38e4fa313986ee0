//! # Bloom Filter
//!
//! A probabilistic set-membership structure used to skip run files during
//! point lookups. A filter answers "definitely not present" with certainty
//! and "maybe present" with a tunable false-positive rate.
//!
//! Filters can be sized two ways:
//!
//! - [`BloomFilter::new`] — from an expected item count and a target
//!   false-positive rate (the classic `m = -n ln p / (ln 2)^2` sizing).
//! - [`BloomFilter::with_bits_per_key`] — from an explicit bits-per-key
//!   budget, the knob a leveled filter policy allocates per level.
//!
//! Hashing is FNV-1a double hashing: two independent 64-bit hashes `h1`,
//! `h2` are combined as `h(i) = h1 + i * h2` to derive the probe positions.
//!
//! ## Example
//!
//! ```rust
//! use bloom::BloomFilter;
//!
//! let mut filter = BloomFilter::with_bits_per_key(1000, 10.0);
//! filter.add(b"raven");
//! assert!(filter.contains(b"raven"));
//! ```

use std::io::{self, Read, Write};

/// Guard against pathological serialized filters (128 MiB of bits).
const MAX_FILTER_BYTES: usize = 128 * 1024 * 1024;

/// A Bloom filter over a flat bit vector with `k` derived hash probes.
pub struct BloomFilter {
    bits: Vec<u8>,
    num_bits: u64,
    num_probes: u32,
}

impl BloomFilter {
    /// Creates a filter sized for `expected_items` at the target
    /// `false_positive_rate`.
    ///
    /// # Panics
    ///
    /// Panics if `expected_items == 0` or the rate is outside `(0, 1)`.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        assert!(expected_items > 0, "expected_items must be > 0");
        assert!(
            false_positive_rate > 0.0 && false_positive_rate < 1.0,
            "false_positive_rate must be in (0, 1)"
        );

        // m = -n ln(p) / (ln 2)^2, then the per-key budget follows.
        let n = expected_items as f64;
        let m = (-n * false_positive_rate.ln() / LN2_SQUARED).ceil();
        let bits_per_key = m / n;
        Self::with_bits_per_key(expected_items, bits_per_key)
    }

    /// Creates a filter with an explicit bits-per-key budget.
    ///
    /// This is the constructor leveled policies use: the policy computes the
    /// per-level budget and hands it down unchanged. The probe count is the
    /// optimum `k = bits_per_key * ln 2`, at least one.
    ///
    /// # Panics
    ///
    /// Panics if `expected_items == 0` or `bits_per_key <= 0`.
    pub fn with_bits_per_key(expected_items: usize, bits_per_key: f64) -> Self {
        assert!(expected_items > 0, "expected_items must be > 0");
        assert!(bits_per_key > 0.0, "bits_per_key must be > 0");

        let num_bits = ((expected_items as f64 * bits_per_key).ceil() as u64).max(64);
        let num_probes = ((bits_per_key * std::f64::consts::LN_2).round() as u32).clamp(1, 30);
        let byte_len = num_bits.div_ceil(8) as usize;

        Self {
            bits: vec![0u8; byte_len],
            num_bits,
            num_probes,
        }
    }

    /// Adds a key to the filter.
    pub fn add(&mut self, key: &[u8]) {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.num_probes {
            let idx = probe_index(h1, h2, i, self.num_bits);
            self.bits[(idx / 8) as usize] |= 1 << (idx % 8);
        }
    }

    /// Returns `false` if the key is definitely absent, `true` if it may be
    /// present.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.num_probes {
            let idx = probe_index(h1, h2, i, self.num_bits);
            if self.bits[(idx / 8) as usize] >> (idx % 8) & 1 == 0 {
                return false;
            }
        }
        true
    }

    /// Number of bits backing the filter.
    #[must_use]
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    /// Number of hash probes per key.
    #[must_use]
    pub fn num_probes(&self) -> u32 {
        self.num_probes
    }

    /// Serialized size in bytes: `num_bits(u64) + num_probes(u32) +
    /// bits_len(u32) + bits`.
    #[must_use]
    pub fn serialized_size(&self) -> usize {
        8 + 4 + 4 + self.bits.len()
    }

    /// Writes the filter to `w` in the documented little-endian layout.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.num_bits.to_le_bytes())?;
        w.write_all(&self.num_probes.to_le_bytes())?;
        w.write_all(&(self.bits.len() as u32).to_le_bytes())?;
        w.write_all(&self.bits)?;
        Ok(())
    }

    /// Reads a filter previously written by [`write_to`](Self::write_to).
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf8 = [0u8; 8];
        let mut buf4 = [0u8; 4];

        r.read_exact(&mut buf8)?;
        let num_bits = u64::from_le_bytes(buf8);

        r.read_exact(&mut buf4)?;
        let num_probes = u32::from_le_bytes(buf4);

        r.read_exact(&mut buf4)?;
        let bits_len = u32::from_le_bytes(buf4) as usize;
        if bits_len > MAX_FILTER_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bloom filter too large: {} bytes", bits_len),
            ));
        }

        let mut bits = vec![0u8; bits_len];
        r.read_exact(&mut bits)?;

        Ok(Self {
            bits,
            num_bits,
            num_probes,
        })
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_probes", &self.num_probes)
            .field("bytes", &self.bits.len())
            .finish()
    }
}

/// `(ln 2)^2`, the constant relating bits-per-key to false-positive rate.
pub const LN2_SQUARED: f64 = std::f64::consts::LN_2 * std::f64::consts::LN_2;

/// Two independent FNV-1a hashes from different bases.
fn hash_pair(key: &[u8]) -> (u64, u64) {
    (
        fnv1a_64(key, 0xcbf2_9ce4_8422_2325),
        fnv1a_64(key, 0x517c_c1b7_2722_0a95),
    )
}

/// Double hashing: `h(i) = (h1 + i * h2) mod num_bits`.
fn probe_index(h1: u64, h2: u64, i: u32, num_bits: u64) -> u64 {
    h1.wrapping_add((i as u64).wrapping_mul(h2)) % num_bits
}

fn fnv1a_64(data: &[u8], basis: u64) -> u64 {
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = basis;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests;
