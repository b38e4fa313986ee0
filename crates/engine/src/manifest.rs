/// # Manifest — run-file level assignments
///
/// Tracks which run file lives at which physical level so the layout
/// survives a restart. One entry per line:
///
/// ```text
/// L0:000007.run
/// L0:000005.run
/// L4:000006.run
/// ```
///
/// Lines starting with `#` are comments, empty lines are ignored. The file
/// is rewritten atomically (tmp + fsync + rename, with a direct-overwrite
/// fallback for filesystems where rename-over-existing fails).
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::error::EngineError;

/// Name of the manifest file within the DB directory.
pub(crate) const MANIFEST_FILENAME: &str = "LEVELS";

const MANIFEST_TMP_FILENAME: &str = "LEVELS.tmp";

/// Level assignment for a single run file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RunEntry {
    pub(crate) filename: String,
    pub(crate) level: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct Manifest {
    path: PathBuf,
    pub(crate) entries: Vec<RunEntry>,
}

impl Manifest {
    /// Loads `dir/LEVELS`, or starts empty if it does not exist.
    pub(crate) fn load_or_create(dir: &Path) -> Result<Self, EngineError> {
        let path = dir.join(MANIFEST_FILENAME);
        if !path.exists() {
            return Ok(Self {
                path,
                entries: Vec::new(),
            });
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut entries = Vec::new();
        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            // Expected format: "L<n>:<filename>"
            let parsed = trimmed
                .strip_prefix('L')
                .and_then(|rest| rest.split_once(':'))
                .and_then(|(level, name)| {
                    level
                        .parse::<usize>()
                        .ok()
                        .map(|l| (l, name.to_string()))
                });
            let (level, filename) = parsed.ok_or_else(|| {
                EngineError::Corrupt(format!(
                    "manifest line {}: expected 'L<n>:<filename>', got {:?}",
                    line_num + 1,
                    trimmed
                ))
            })?;
            entries.push(RunEntry { filename, level });
        }

        Ok(Self { path, entries })
    }

    /// Persists the current state atomically.
    pub(crate) fn save(&self) -> Result<(), EngineError> {
        let tmp_path = self.path.with_file_name(MANIFEST_TMP_FILENAME);

        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            Self::write_contents(&mut f, &self.entries)?;
            f.flush()?;
            f.sync_all()?;
        }

        if fs::rename(&tmp_path, &self.path).is_err() {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)?;
            Self::write_contents(&mut f, &self.entries)?;
            f.flush()?;
            f.sync_all()?;
            let _ = fs::remove_file(&tmp_path);
        }

        Ok(())
    }

    fn write_contents(f: &mut File, entries: &[RunEntry]) -> Result<(), EngineError> {
        writeln!(f, "# run-file level assignments")?;
        writeln!(f, "# format: L<level>:<filename>")?;
        for entry in entries {
            writeln!(f, "L{}:{}", entry.level, entry.filename)?;
        }
        Ok(())
    }

    /// Filenames at `level`, in manifest order.
    pub(crate) fn filenames_at(&self, level: usize) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.level == level)
            .map(|e| e.filename.as_str())
            .collect()
    }

    /// Highest level that has an entry, if any.
    pub(crate) fn max_level(&self) -> Option<usize> {
        self.entries.iter().map(|e| e.level).max()
    }

    /// Records a file at `level` (in memory only; call `save` to persist).
    /// Entries for a level keep newest-first order.
    pub(crate) fn add(&mut self, filename: String, level: usize) {
        let insert_pos = self
            .entries
            .iter()
            .position(|e| e.level == level)
            .unwrap_or(self.entries.len());
        self.entries.insert(insert_pos, RunEntry { filename, level });
    }

    /// Drops all entries matching the given filenames.
    pub(crate) fn remove_files(&mut self, filenames: &[String]) {
        self.entries
            .retain(|e| !filenames.iter().any(|f| f == &e.filename));
    }
}
