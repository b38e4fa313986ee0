/// Pluggable filter policy.
///
/// Every run file may embed an opaque filter block; point lookups consult it
/// before touching the data section. The policy is split in two layers the
/// way leveled allocators need it: the [`FilterPolicy`] selects a
/// [`FilterBitsBuilder`] per file (with the destination level as a hint),
/// and the builder produces the bytes. Reading back goes through the policy
/// so the block stays opaque to the engine.
use bloom::BloomFilter;

/// Context handed to the policy when a run file is created.
#[derive(Debug, Clone, Default)]
pub struct FilterContext {
    /// Physical level the file is being written to, when known.
    pub level_at_creation: Option<usize>,
}

/// Accumulates the keys of one run file and renders the filter block.
pub trait FilterBitsBuilder: Send {
    /// Registers a key that will live in the file.
    fn add_key(&mut self, key: &[u8]);

    /// Consumes the accumulated keys and returns the filter block.
    fn finish(&mut self) -> Vec<u8>;
}

/// A filter construction and probing strategy.
pub trait FilterPolicy: Send + Sync {
    /// Policy name, recorded for diagnostics.
    fn name(&self) -> &'static str;

    /// Builds a filter block for `keys` with no level hint.
    fn create_filter(&self, keys: &[&[u8]]) -> Vec<u8> {
        let mut builder = self.builder_for_context(&FilterContext::default());
        for key in keys {
            builder.add_key(key);
        }
        builder.finish()
    }

    /// Probes a filter block previously produced by this policy. Must never
    /// return `false` for a key that was added (no false negatives).
    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool;

    /// Picks a builder for a new run file. Implementations may specialize on
    /// `ctx.level_at_creation`.
    fn builder_for_context(&self, ctx: &FilterContext) -> Box<dyn FilterBitsBuilder>;
}

/// The standard level-oblivious Bloom policy: one bits-per-key budget for
/// every file.
pub struct BloomFilterPolicy {
    bits_per_key: f64,
}

impl BloomFilterPolicy {
    /// Creates a policy spending `bits_per_key` bits on every key.
    pub fn new(bits_per_key: f64) -> Self {
        assert!(bits_per_key > 0.0, "bits_per_key must be > 0");
        Self { bits_per_key }
    }

    /// The configured per-key budget.
    #[must_use]
    pub fn bits_per_key(&self) -> f64 {
        self.bits_per_key
    }
}

impl FilterPolicy for BloomFilterPolicy {
    fn name(&self) -> &'static str {
        "BloomFilterPolicy"
    }

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool {
        match BloomFilter::read_from(&mut &filter[..]) {
            Ok(parsed) => parsed.contains(key),
            // An unparseable block cannot rule anything out.
            Err(_) => true,
        }
    }

    fn builder_for_context(&self, _ctx: &FilterContext) -> Box<dyn FilterBitsBuilder> {
        Box::new(BloomBitsBuilder {
            bits_per_key: self.bits_per_key,
            keys: Vec::new(),
        })
    }
}

/// Builder backing [`BloomFilterPolicy`]; buffers keys and sizes the filter
/// from the final count.
pub struct BloomBitsBuilder {
    bits_per_key: f64,
    keys: Vec<Vec<u8>>,
}

impl FilterBitsBuilder for BloomBitsBuilder {
    fn add_key(&mut self, key: &[u8]) {
        self.keys.push(key.to_vec());
    }

    fn finish(&mut self) -> Vec<u8> {
        let mut filter = BloomFilter::with_bits_per_key(self.keys.len().max(1), self.bits_per_key);
        for key in self.keys.drain(..) {
            filter.add(&key);
        }
        let mut out = Vec::with_capacity(filter.serialized_size());
        // Writing to a Vec cannot fail.
        filter
            .write_to(&mut out)
            .unwrap_or_else(|_| unreachable!("vec write"));
        out
    }
}
