/// Read-only snapshot of the on-disk layout.
///
/// The metadata query is the contract a compaction scheduler plans
/// against: an ordered sequence of physical levels, each holding file
/// descriptors with sizes, key ranges, and the `being_compacted` flag that
/// prevents a file from being picked into two merges at once. The snapshot
/// is consistent at the moment of the call and goes stale as soon as a
/// flush or compaction lands.

/// Descriptor of one run file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFileMetaData {
    /// File name relative to the DB directory.
    pub name: String,
    /// Size of the file in bytes.
    pub size_bytes: u64,
    /// Number of entries stored.
    pub num_entries: u64,
    /// Smallest key in the file.
    pub smallest_key: Vec<u8>,
    /// Largest key in the file.
    pub largest_key: Vec<u8>,
    /// True while the file is an input of an in-flight compaction.
    pub being_compacted: bool,
}

/// One physical level and its files. Level 0 files are ordered
/// newest-first; deeper levels are ordered by placement.
#[derive(Debug, Clone, Default)]
pub struct LevelMetaData {
    /// Physical level index.
    pub level: usize,
    /// Files currently at this level.
    pub files: Vec<RunFileMetaData>,
}

/// Per-column-family layout snapshot.
#[derive(Debug, Clone)]
pub struct ColumnFamilyMetaData {
    /// Column family name.
    pub name: String,
    /// All physical levels, index 0 first, length `DbOptions::num_levels`.
    pub levels: Vec<LevelMetaData>,
}

impl ColumnFamilyMetaData {
    /// Total bytes across all levels.
    #[must_use]
    pub fn total_size_bytes(&self) -> u64 {
        self.levels
            .iter()
            .flat_map(|l| l.files.iter())
            .map(|f| f.size_bytes)
            .sum()
    }

    /// Total entries across all levels.
    #[must_use]
    pub fn total_entries(&self) -> u64 {
        self.levels
            .iter()
            .flat_map(|l| l.files.iter())
            .map(|f| f.num_entries)
            .sum()
    }
}
