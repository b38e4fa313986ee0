//! # Monkey — level-aware Bloom filter allocation
//!
//! A [`FilterPolicy`] that spends a fixed memory budget unevenly across
//! levels. Deeper levels hold exponentially more entries, so a uniform
//! bits-per-key split wastes memory where it matters least; Monkey instead
//! assigns each level an optimal false-positive rate
//!
//! ```text
//! fpr_opt(l) = T^(T/(T-1)) / T^(L+1-l) * e^(-h * (ln 2)^2)
//! ```
//!
//! for level `l` in `1..=L` (level 1 shallowest), which places tighter
//! filters — more bits per key — on shallow levels while keeping the
//! aggregate false-positive rate of a point lookup near the minimum the
//! budget allows. The per-key budget follows as
//! `bpe(l) = -ln(fpr_opt(l)) / (ln 2)^2`.
//!
//! Construction is delegated: each level gets its own standard
//! [`BloomFilterPolicy`] seeded with that level's budget, and files created
//! without a usable level hint fall back to a default policy at the base
//! budget `h`.

use engine::{BloomFilterPolicy, FilterBitsBuilder, FilterContext, FilterPolicy};
use tracing::warn;

/// `(ln 2)^2`.
const LN2_SQUARED: f64 = std::f64::consts::LN_2 * std::f64::consts::LN_2;

/// Clamp ceiling for a computed rate that the formula pushed to or past 1.
/// Small `T`/`L` combinations can do this; the caller should lower `h` or
/// `L` when the warning fires.
const MAX_FPR: f64 = 0.999;

/// Clamp floor, keeping `bpe` finite for extreme budgets.
const MIN_FPR: f64 = 1e-12;

/// Level-aware Bloom filter policy.
pub struct MonkeyFilterPolicy {
    size_ratio: f64,
    levels: usize,
    lower_level_run_max: usize,
    level_fpr: Vec<f64>,
    level_bpe: Vec<f64>,
    default_policy: BloomFilterPolicy,
    level_policies: Vec<BloomFilterPolicy>,
}

impl MonkeyFilterPolicy {
    /// Creates a policy for a tree of `levels` fluid levels with size ratio
    /// `size_ratio`, base budget `bits_per_element`, and run width
    /// `lower_level_run_max` (needed to map physical levels back to fluid
    /// levels).
    ///
    /// # Panics
    ///
    /// Panics if `levels == 0`, `size_ratio <= 1`, or the budget is not
    /// positive.
    pub fn new(
        bits_per_element: f64,
        size_ratio: f64,
        levels: usize,
        lower_level_run_max: usize,
    ) -> Self {
        assert!(levels > 0, "levels must be > 0");
        assert!(size_ratio > 1.0, "size_ratio must be > 1");
        assert!(bits_per_element > 0.0, "bits_per_element must be > 0");

        let mut level_fpr = Vec::with_capacity(levels);
        let mut level_bpe = Vec::with_capacity(levels);
        let mut level_policies = Vec::with_capacity(levels);

        for level in 1..=levels {
            let raw = optimal_false_positive_rate(bits_per_element, size_ratio, levels, level);
            let fpr = raw.clamp(MIN_FPR, MAX_FPR);
            if raw >= 1.0 {
                warn!(
                    level,
                    raw_fpr = raw,
                    "monkey fpr exceeds 1, clamping; reduce bits_per_element or levels"
                );
            }
            let bpe = -fpr.ln() / LN2_SQUARED;
            level_policies.push(BloomFilterPolicy::new(bpe));
            level_fpr.push(fpr);
            level_bpe.push(bpe);
        }

        Self {
            size_ratio,
            levels,
            lower_level_run_max,
            level_fpr,
            level_bpe,
            default_policy: BloomFilterPolicy::new(bits_per_element),
            level_policies,
        }
    }

    /// The clamped optimal false-positive rate for fluid `level`
    /// (1-indexed).
    ///
    /// # Panics
    ///
    /// Panics if `level` is outside `1..=levels`.
    #[must_use]
    pub fn optimal_false_positive_rate(&self, level: usize) -> f64 {
        self.level_fpr[level - 1]
    }

    /// The bits-per-element budget for fluid `level` (1-indexed).
    #[must_use]
    pub fn bits_per_element(&self, level: usize) -> f64 {
        self.level_bpe[level - 1]
    }

    /// Number of fluid levels this policy allocates for.
    #[must_use]
    pub fn levels(&self) -> usize {
        self.levels
    }

    /// The configured size ratio.
    #[must_use]
    pub fn size_ratio(&self) -> f64 {
        self.size_ratio
    }

    /// Maps an engine (physical) level to a 1-indexed fluid level.
    ///
    /// Physical levels 0 and 1 belong to fluid level 1; past that, each
    /// fluid level owns `K + 1` physical slots:
    /// `fluid = ceil((p - 1) / (K + 1))`.
    fn fluid_level_of(&self, physical: usize) -> usize {
        if physical <= 1 {
            return 1;
        }
        (physical - 1).div_ceil(self.lower_level_run_max + 1)
    }
}

impl FilterPolicy for MonkeyFilterPolicy {
    fn name(&self) -> &'static str {
        "Monkey"
    }

    fn create_filter(&self, keys: &[&[u8]]) -> Vec<u8> {
        // No level hint available through this entry point; keep the
        // default budget for compatibility.
        self.default_policy.create_filter(keys)
    }

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool {
        self.default_policy.key_may_match(key, filter)
    }

    fn builder_for_context(&self, ctx: &FilterContext) -> Box<dyn FilterBitsBuilder> {
        match ctx.level_at_creation {
            Some(physical) => {
                let fluid = self.fluid_level_of(physical);
                if (1..=self.levels).contains(&fluid) {
                    self.level_policies[fluid - 1].builder_for_context(ctx)
                } else {
                    self.default_policy.builder_for_context(ctx)
                }
            }
            None => self.default_policy.builder_for_context(ctx),
        }
    }
}

/// The raw (unclamped) Monkey rate for `level` in `1..=levels`.
fn optimal_false_positive_rate(h: f64, t: f64, levels: usize, level: usize) -> f64 {
    let numerator = t.powf(t / (t - 1.0));
    let depth_discount = t.powf((levels + 1 - level) as f64);
    numerator / depth_discount * (-h * LN2_SQUARED).exp()
}

#[cfg(test)]
mod tests;
