/// # Run file format
///
/// Immutable sorted-run files, the unit the compaction scheduler moves
/// between levels.
///
/// ```text
/// ┌────────────────────────────────────────────────────────────┐
/// │ DATA    repeated: crc32(u32) | key_len(u32) | key          │
/// │                   | val_len(u32) | val                     │
/// ├────────────────────────────────────────────────────────────┤
/// │ META    num_entries(u64) | smallest_len(u32) | smallest    │
/// │         | largest_len(u32) | largest                       │
/// ├────────────────────────────────────────────────────────────┤
/// │ FILTER  present(u8) | [filter_len(u32) | filter bytes]     │
/// ├────────────────────────────────────────────────────────────┤
/// │ INDEX   repeated: key_len(u32) | key | data_offset(u64)    │
/// ├────────────────────────────────────────────────────────────┤
/// │ FOOTER  meta_offset(u64) | filter_offset(u64)              │
/// │         | index_offset(u64) | magic(u32 = "RUN1")          │
/// └────────────────────────────────────────────────────────────┘
/// ```
///
/// All integers are little-endian. The per-record CRC32 covers key_len
/// through the end of the value. Files are written to a `.tmp` sibling and
/// renamed into place, so a partially written file is never visible under
/// its final name.
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use parking_lot::Mutex;
use std::fs::{rename, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::EngineError;
use crate::filter::{FilterBitsBuilder, FilterPolicy};
use crate::{MAX_KEY_SIZE, MAX_VALUE_SIZE};

/// Magic value identifying the run-file format ("RUN1").
pub(crate) const RUN_MAGIC: u32 = 0x3152_554E;

/// Footer size: three u64 offsets plus the magic.
const FOOTER_BYTES: u64 = 28;

/// On-disk cost of one record: crc + two length prefixes + payload.
pub(crate) fn record_size(key: &[u8], value: &[u8]) -> u64 {
    12 + key.len() as u64 + value.len() as u64
}

// ---------------------------------------------------------------- writer

/// Incremental run-file writer. Keys must be added in ascending order;
/// [`finish`](TableWriter::finish) seals the file and renames it into
/// place.
pub(crate) struct TableWriter {
    file: BufWriter<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    index: Vec<(Vec<u8>, u64)>,
    filter_builder: Option<Box<dyn FilterBitsBuilder>>,
    smallest: Option<Vec<u8>>,
    largest: Option<Vec<u8>>,
    data_bytes: u64,
    record_buf: Vec<u8>,
}

impl TableWriter {
    /// Opens a writer targeting `path`. Data accumulates in `path` + `.tmp`
    /// until `finish`.
    pub(crate) fn create(
        path: &Path,
        filter_builder: Option<Box<dyn FilterBitsBuilder>>,
    ) -> Result<Self, EngineError> {
        let tmp_path = tmp_sibling(path);
        let raw = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        Ok(Self {
            file: BufWriter::new(raw),
            tmp_path,
            final_path: path.to_path_buf(),
            index: Vec::new(),
            filter_builder,
            smallest: None,
            largest: None,
            data_bytes: 0,
            record_buf: Vec::with_capacity(256),
        })
    }

    /// Appends one record. Keys must arrive in strictly ascending order.
    pub(crate) fn add(&mut self, key: &[u8], value: &[u8]) -> Result<(), EngineError> {
        debug_assert!(
            self.largest.as_deref().map_or(true, |l| l < key),
            "keys must be added in ascending order"
        );

        self.record_buf.clear();
        self.record_buf
            .write_u32::<LittleEndian>(key.len() as u32)?;
        self.record_buf.extend_from_slice(key);
        self.record_buf
            .write_u32::<LittleEndian>(value.len() as u32)?;
        self.record_buf.extend_from_slice(value);

        let mut hasher = Crc32::new();
        hasher.update(&self.record_buf);
        let crc = hasher.finalize();

        let offset = self.data_bytes;
        self.file.write_u32::<LittleEndian>(crc)?;
        self.file.write_all(&self.record_buf)?;
        self.data_bytes += 4 + self.record_buf.len() as u64;

        if let Some(builder) = self.filter_builder.as_mut() {
            builder.add_key(key);
        }
        if self.smallest.is_none() {
            self.smallest = Some(key.to_vec());
        }
        self.largest = Some(key.to_vec());
        self.index.push((key.to_vec(), offset));
        Ok(())
    }

    /// Bytes written to the data section so far. Used by compaction to
    /// decide when to roll to a new output file.
    pub(crate) fn data_size(&self) -> u64 {
        self.data_bytes
    }

    /// Records added so far.
    pub(crate) fn entry_count(&self) -> u64 {
        self.index.len() as u64
    }

    /// Writes the meta/filter/index/footer sections, fsyncs, and renames
    /// the file into place.
    ///
    /// # Errors
    ///
    /// Refuses to seal an empty file; returns any I/O failure.
    pub(crate) fn finish(mut self) -> Result<(), EngineError> {
        if self.index.is_empty() {
            let _ = std::fs::remove_file(&self.tmp_path);
            return Err(EngineError::InvalidArgument(
                "refusing to write an empty run file".into(),
            ));
        }

        let smallest = self.smallest.take().unwrap_or_default();
        let largest = self.largest.take().unwrap_or_default();

        // META
        let meta_offset = self.data_bytes;
        self.file
            .write_u64::<LittleEndian>(self.index.len() as u64)?;
        self.file
            .write_u32::<LittleEndian>(smallest.len() as u32)?;
        self.file.write_all(&smallest)?;
        self.file
            .write_u32::<LittleEndian>(largest.len() as u32)?;
        self.file.write_all(&largest)?;

        // FILTER
        let filter_offset = self.file.stream_position()?;
        match self.filter_builder.as_mut() {
            Some(builder) => {
                let bits = builder.finish();
                self.file.write_u8(1)?;
                self.file.write_u32::<LittleEndian>(bits.len() as u32)?;
                self.file.write_all(&bits)?;
            }
            None => self.file.write_u8(0)?,
        }

        // INDEX
        let index_offset = self.file.stream_position()?;
        for (key, data_offset) in &self.index {
            self.file.write_u32::<LittleEndian>(key.len() as u32)?;
            self.file.write_all(key)?;
            self.file.write_u64::<LittleEndian>(*data_offset)?;
        }

        // FOOTER
        self.file.write_u64::<LittleEndian>(meta_offset)?;
        self.file.write_u64::<LittleEndian>(filter_offset)?;
        self.file.write_u64::<LittleEndian>(index_offset)?;
        self.file.write_u32::<LittleEndian>(RUN_MAGIC)?;

        self.file.flush()?;
        self.file.get_ref().sync_all()?;

        rename(&self.tmp_path, &self.final_path)?;

        // Make the rename durable on filesystems that need the directory
        // entry synced.
        if let Some(parent) = self.final_path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }
        Ok(())
    }

    /// Drops the writer and its temp file.
    pub(crate) fn abandon(self) {
        let _ = std::fs::remove_file(&self.tmp_path);
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

// ---------------------------------------------------------------- reader

/// Open run file: footer, meta, filter block, and index are resident; data
/// records are read on demand through a shared seekable handle.
pub(crate) struct TableReader {
    path: PathBuf,
    name: String,
    file_number: u64,
    file: Mutex<File>,
    size_bytes: u64,
    num_entries: u64,
    smallest: Vec<u8>,
    largest: Vec<u8>,
    filter: Option<Vec<u8>>,
    index: Vec<(Vec<u8>, u64)>,
    data_end: u64,
}

impl TableReader {
    pub(crate) fn open(path: &Path) -> Result<Self, EngineError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let file_number = parse_file_number(&name).ok_or_else(|| {
            EngineError::Corrupt(format!("run file name {:?} has no file number", name))
        })?;

        let mut file = File::open(path)?;
        let size_bytes = file.metadata()?.len();
        if size_bytes < FOOTER_BYTES {
            return Err(EngineError::Corrupt(format!(
                "{}: too small for a footer ({} bytes)",
                name, size_bytes
            )));
        }

        // FOOTER
        file.seek(SeekFrom::End(-(FOOTER_BYTES as i64)))?;
        let meta_offset = file.read_u64::<LittleEndian>()?;
        let filter_offset = file.read_u64::<LittleEndian>()?;
        let index_offset = file.read_u64::<LittleEndian>()?;
        let magic = file.read_u32::<LittleEndian>()?;
        if magic != RUN_MAGIC {
            return Err(EngineError::Corrupt(format!(
                "{}: bad magic {:#010x}",
                name, magic
            )));
        }
        if meta_offset > filter_offset || filter_offset > index_offset || index_offset > size_bytes
        {
            return Err(EngineError::Corrupt(format!(
                "{}: inconsistent section offsets",
                name
            )));
        }

        // META
        file.seek(SeekFrom::Start(meta_offset))?;
        let num_entries = file.read_u64::<LittleEndian>()?;
        let smallest = read_len_prefixed(&mut file, MAX_KEY_SIZE, &name)?;
        let largest = read_len_prefixed(&mut file, MAX_KEY_SIZE, &name)?;

        // FILTER
        file.seek(SeekFrom::Start(filter_offset))?;
        let filter = match file.read_u8()? {
            0 => None,
            _ => {
                let len = file.read_u32::<LittleEndian>()? as usize;
                let mut bits = vec![0u8; len];
                file.read_exact(&mut bits)?;
                Some(bits)
            }
        };

        // INDEX
        file.seek(SeekFrom::Start(index_offset))?;
        let mut index = Vec::with_capacity(num_entries as usize);
        for _ in 0..num_entries {
            let key = read_len_prefixed(&mut file, MAX_KEY_SIZE, &name)?;
            let offset = file.read_u64::<LittleEndian>()?;
            index.push((key, offset));
        }

        Ok(Self {
            path: path.to_path_buf(),
            name,
            file_number,
            file: Mutex::new(file),
            size_bytes,
            num_entries,
            smallest,
            largest,
            filter,
            index,
            data_end: meta_offset,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Monotonic number from the file name; higher means written later.
    pub(crate) fn file_number(&self) -> u64 {
        self.file_number
    }

    pub(crate) fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub(crate) fn num_entries(&self) -> u64 {
        self.num_entries
    }

    pub(crate) fn smallest_key(&self) -> &[u8] {
        &self.smallest
    }

    pub(crate) fn largest_key(&self) -> &[u8] {
        &self.largest
    }

    /// True if `key` falls inside this file's key range.
    pub(crate) fn covers(&self, key: &[u8]) -> bool {
        self.smallest.as_slice() <= key && key <= self.largest.as_slice()
    }

    /// Point lookup. Consults the filter block (through `policy`) before
    /// the index; a filter miss costs no I/O.
    pub(crate) fn get(
        &self,
        key: &[u8],
        policy: Option<&dyn FilterPolicy>,
    ) -> Result<Option<Vec<u8>>, EngineError> {
        if let (Some(policy), Some(filter)) = (policy, self.filter.as_deref()) {
            if !policy.key_may_match(key, filter) {
                return Ok(None);
            }
        }

        let slot = match self.index.binary_search_by(|(k, _)| k.as_slice().cmp(key)) {
            Ok(i) => i,
            Err(_) => return Ok(None),
        };
        let offset = self.index[slot].1;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let (stored_key, value) = read_record(&mut *file, &self.name)?;
        if stored_key != key {
            return Err(EngineError::Corrupt(format!(
                "{}: index points at the wrong record",
                self.name
            )));
        }
        Ok(Some(value))
    }

    /// Sequential scan over the data section with a dedicated file handle.
    pub(crate) fn iter(&self) -> Result<TableIter, EngineError> {
        let file = File::open(&self.path)?;
        Ok(TableIter {
            reader: BufReader::new(file),
            name: self.name.clone(),
            remaining: self.num_entries,
            position: 0,
            data_end: self.data_end,
        })
    }
}

impl std::fmt::Debug for TableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableReader")
            .field("name", &self.name)
            .field("num_entries", &self.num_entries)
            .field("size_bytes", &self.size_bytes)
            .finish()
    }
}

/// Streaming cursor over one run file's records in key order.
pub(crate) struct TableIter {
    reader: BufReader<File>,
    name: String,
    remaining: u64,
    position: u64,
    data_end: u64,
}

impl Iterator for TableIter {
    type Item = Result<(Vec<u8>, Vec<u8>), EngineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.position >= self.data_end {
            return None;
        }
        match read_record(&mut self.reader, &self.name) {
            Ok((key, value)) => {
                self.remaining -= 1;
                self.position += record_size(&key, &value);
                Some(Ok((key, value)))
            }
            Err(e) => {
                self.remaining = 0;
                Some(Err(e))
            }
        }
    }
}

// ---------------------------------------------------------------- helpers

/// Extracts the numeric component of a `<number>.run` file name.
pub(crate) fn parse_file_number(name: &str) -> Option<u64> {
    name.strip_suffix(".run")?.parse().ok()
}

fn read_len_prefixed(r: &mut impl Read, cap: usize, name: &str) -> Result<Vec<u8>, EngineError> {
    let len = r.read_u32::<LittleEndian>()? as usize;
    if len > cap {
        return Err(EngineError::Corrupt(format!(
            "{}: length prefix {} exceeds cap {}",
            name, len, cap
        )));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Reads and CRC-verifies one data record.
fn read_record(r: &mut impl Read, name: &str) -> Result<(Vec<u8>, Vec<u8>), EngineError> {
    let stored_crc = r.read_u32::<LittleEndian>()?;

    let mut hasher = Crc32::new();

    let mut len4 = [0u8; 4];
    r.read_exact(&mut len4)?;
    hasher.update(&len4);
    let key_len = u32::from_le_bytes(len4) as usize;
    if key_len > MAX_KEY_SIZE {
        return Err(EngineError::Corrupt(format!(
            "{}: key length {} exceeds cap",
            name, key_len
        )));
    }
    let mut key = vec![0u8; key_len];
    r.read_exact(&mut key)?;
    hasher.update(&key);

    r.read_exact(&mut len4)?;
    hasher.update(&len4);
    let val_len = u32::from_le_bytes(len4) as usize;
    if val_len > MAX_VALUE_SIZE {
        return Err(EngineError::Corrupt(format!(
            "{}: value length {} exceeds cap",
            name, val_len
        )));
    }
    let mut value = vec![0u8; val_len];
    r.read_exact(&mut value)?;
    hasher.update(&value);

    if hasher.finalize() != stored_crc {
        return Err(EngineError::Corrupt(format!(
            "{}: record checksum mismatch",
            name
        )));
    }
    Ok((key, value))
}
