//! Sorted key tables
//!
//! Exact-match `string -> ordinals` tables backing the name and structure
//! indices. Construction is spill-and-merge: keys buffered during one batch are
//! sorted and spilled as a run file on `spill`, and `finish` k-way merges the
//! runs into the final table. Build memory is bounded by the batch plus a fixed
//! merge fan-in, never by the total number of keys.
//!
//! # Table layout
//!
//! ```text
//! Offset   Size    Type        Description
//! ─────────────────────────────────────────────────
//! 0x00     8       [u8; 8]     Magic: "MVKEYS01"
//! 0x08     4       u32 LE      Version (1)
//! 0x0C     4       u32 LE      Flags (bit 0 = multi-valued)
//! 0x10     8       u64 LE      Rows covered (ordinals are < this)
//! 0x18     8       u64 LE      K: key count
//! 0x20     8       u64 LE      P: postings count
//! 0x28     8       u64 LE      Entries section offset (64)
//! 0x30     8       u64 LE      Postings section offset
//! 0x38     8       u64 LE      Key pool offset
//! ─────────────────────────────────────────────────
//! entries:  K x [key_offset u64][key_len u32][postings_len u32][postings_start u64]
//! postings: P x u64 ordinal
//! pool:     packed UTF-8 keys
//! ```
//!
//! Entries are sorted by key bytes, so lookups are a binary search over the
//! mmap. Postings of one key are stored in ordinal order.
//!
//! # Run layout
//!
//! ```text
//! [key_len u32][key bytes][ordinal u64] ...   sorted by (key, ordinal)
//! ```

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use thiserror::Error;

pub const TABLE_MAGIC: [u8; 8] = *b"MVKEYS01";
pub const TABLE_VERSION: u32 = 1;
pub const TABLE_HEADER_SIZE: usize = 64;
const ENTRY_SIZE: usize = 24;
const POSTING_SIZE: usize = 8;

/// Maximum number of runs merged at once; more runs go through intermediate passes
pub const MERGE_FAN_IN: usize = 64;

pub mod flags {
    /// A key may map to more than one ordinal
    pub const MULTI_VALUED: u32 = 1 << 0;
}

#[derive(Error, Debug)]
pub enum TableError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid magic bytes: expected MVKEYS01")]
    InvalidMagic,

    #[error("Unsupported table version: {0}")]
    UnsupportedVersion(u32),

    #[error("Table kind mismatch: expected {expected:?}")]
    KindMismatch { expected: TableKind },

    #[error("Corrupt table: {0}")]
    Corrupt(String),
}

/// How repeated keys are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// One ordinal per key; the first occurrence wins
    Unique,
    /// Every occurrence is kept, in ordinal order
    Multi,
}

impl TableKind {
    fn flags(self) -> u32 {
        match self {
            TableKind::Unique => 0,
            TableKind::Multi => flags::MULTI_VALUED,
        }
    }
}

/// A key seen again in a `Unique` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Duplicate {
    pub key: String,
    pub kept: u64,
    pub dropped: u64,
}

/// Counts reported by `TableBuilder::finish`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableSummary {
    pub keys: u64,
    pub postings: u64,
    pub duplicates: u64,
    pub runs: usize,
}

#[derive(Debug, Clone, Copy)]
struct TableHeader {
    flags: u32,
    rows: u64,
    keys: u64,
    postings: u64,
    entries_offset: u64,
    postings_offset: u64,
    pool_offset: u64,
}

impl TableHeader {
    fn to_bytes(self) -> [u8; TABLE_HEADER_SIZE] {
        let mut buf = [0u8; TABLE_HEADER_SIZE];
        buf[0..8].copy_from_slice(&TABLE_MAGIC);
        buf[8..12].copy_from_slice(&TABLE_VERSION.to_le_bytes());
        buf[12..16].copy_from_slice(&self.flags.to_le_bytes());
        buf[16..24].copy_from_slice(&self.rows.to_le_bytes());
        buf[24..32].copy_from_slice(&self.keys.to_le_bytes());
        buf[32..40].copy_from_slice(&self.postings.to_le_bytes());
        buf[40..48].copy_from_slice(&self.entries_offset.to_le_bytes());
        buf[48..56].copy_from_slice(&self.postings_offset.to_le_bytes());
        buf[56..64].copy_from_slice(&self.pool_offset.to_le_bytes());
        buf
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, TableError> {
        if bytes.len() < TABLE_HEADER_SIZE {
            return Err(TableError::Corrupt(format!(
                "file too small for header: {} < {}",
                bytes.len(),
                TABLE_HEADER_SIZE
            )));
        }
        if bytes[0..8] != TABLE_MAGIC {
            return Err(TableError::InvalidMagic);
        }
        let version = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        if version != TABLE_VERSION {
            return Err(TableError::UnsupportedVersion(version));
        }
        let u64_at = |at: usize| u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap());
        Ok(Self {
            flags: u32::from_le_bytes(bytes[12..16].try_into().unwrap()),
            rows: u64_at(16),
            keys: u64_at(24),
            postings: u64_at(32),
            entries_offset: u64_at(40),
            postings_offset: u64_at(48),
            pool_offset: u64_at(56),
        })
    }
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

fn write_run(path: &Path, records: &[(String, u64)]) -> Result<(), TableError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for (key, ordinal) in records {
        write_record(&mut writer, key, *ordinal)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_record<W: Write>(writer: &mut W, key: &str, ordinal: u64) -> io::Result<()> {
    writer.write_all(&(key.len() as u32).to_le_bytes())?;
    writer.write_all(key.as_bytes())?;
    writer.write_all(&ordinal.to_le_bytes())
}

struct RunReader {
    reader: BufReader<File>,
}

impl RunReader {
    fn open(path: &Path) -> Result<Self, TableError> {
        Ok(Self {
            reader: BufReader::new(File::open(path)?),
        })
    }

    fn next_record(&mut self) -> Result<Option<(String, u64)>, TableError> {
        let mut len = [0u8; 4];
        match self.reader.read_exact(&mut len) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let mut key = vec![0u8; u32::from_le_bytes(len) as usize];
        self.reader.read_exact(&mut key)?;
        let mut ordinal = [0u8; 8];
        self.reader.read_exact(&mut ordinal)?;

        let key = String::from_utf8(key)
            .map_err(|e| TableError::Corrupt(format!("invalid UTF-8 key in run: {}", e)))?;
        Ok(Some((key, u64::from_le_bytes(ordinal))))
    }
}

/// K-way merge of sorted runs, feeding `(key, ordinal)` to `sink` in global order
fn merge_runs<F>(runs: &[PathBuf], mut sink: F) -> Result<(), TableError>
where
    F: FnMut(String, u64) -> Result<(), TableError>,
{
    let mut readers = runs
        .iter()
        .map(|p| RunReader::open(p))
        .collect::<Result<Vec<_>, _>>()?;

    let mut heap = BinaryHeap::with_capacity(readers.len());
    for (i, reader) in readers.iter_mut().enumerate() {
        if let Some((key, ordinal)) = reader.next_record()? {
            heap.push(Reverse((key, ordinal, i)));
        }
    }

    while let Some(Reverse((key, ordinal, i))) = heap.pop() {
        if let Some((next_key, next_ordinal)) = readers[i].next_record()? {
            heap.push(Reverse((next_key, next_ordinal, i)));
        }
        sink(key, ordinal)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Spill-and-merge builder for a key table
pub struct TableBuilder {
    kind: TableKind,
    spill_dir: PathBuf,
    pending: Vec<(String, u64)>,
    runs: Vec<PathBuf>,
    next_run: usize,
}

impl TableBuilder {
    /// `spill_dir` holds the temporary runs and is created if missing
    pub fn new<P: Into<PathBuf>>(kind: TableKind, spill_dir: P) -> Result<Self, TableError> {
        let spill_dir = spill_dir.into();
        std::fs::create_dir_all(&spill_dir)?;
        Ok(Self {
            kind,
            spill_dir,
            pending: Vec::new(),
            runs: Vec::new(),
            next_run: 0,
        })
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    /// Buffer one key for the current batch
    pub fn put(&mut self, key: impl Into<String>, ordinal: u64) {
        self.pending.push((key.into(), ordinal));
    }

    /// Number of keys buffered since the last spill
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn next_run_path(&mut self) -> PathBuf {
        let path = self.spill_dir.join(format!("run-{:08}.tmp", self.next_run));
        self.next_run += 1;
        path
    }

    /// Sort the buffered keys and write them out as one run
    pub fn spill(&mut self) -> Result<(), TableError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.pending
            .sort_unstable_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        let path = self.next_run_path();
        write_run(&path, &self.pending)?;
        self.pending.clear();
        self.runs.push(path);
        Ok(())
    }

    /// Merge groups of runs until at most `MERGE_FAN_IN` remain
    fn reduce_runs(&mut self) -> Result<(), TableError> {
        while self.runs.len() > MERGE_FAN_IN {
            let inputs = std::mem::take(&mut self.runs);
            let mut merged = Vec::with_capacity(inputs.len() / MERGE_FAN_IN + 1);
            for group in inputs.chunks(MERGE_FAN_IN) {
                let path = self.next_run_path();
                let mut writer = BufWriter::new(File::create(&path)?);
                merge_runs(group, |key, ordinal| {
                    write_record(&mut writer, &key, ordinal).map_err(TableError::from)
                })?;
                writer.flush()?;
                for run in group {
                    std::fs::remove_file(run)?;
                }
                merged.push(path);
            }
            tracing::debug!(
                "table_intermediate_merge runs_in={} runs_out={}",
                inputs.len(),
                merged.len()
            );
            self.runs = merged;
        }
        Ok(())
    }

    /// Merge every run into the final table at `path`.
    ///
    /// `rows` is the number of row ordinals the table covers. Repeated keys in
    /// a `Unique` table are reported to `on_duplicate` and dropped.
    pub fn finish<P, F>(
        mut self,
        path: P,
        rows: u64,
        mut on_duplicate: F,
    ) -> Result<TableSummary, TableError>
    where
        P: AsRef<Path>,
        F: FnMut(Duplicate),
    {
        self.spill()?;
        let runs = self.runs.len();
        self.reduce_runs()?;

        let mut writer = TableWriter::create(path.as_ref(), self.kind)?;
        let mut duplicates = 0u64;
        merge_runs(&self.runs, |key, ordinal| {
            if let Some(dup) = writer.push(key, ordinal)? {
                duplicates += 1;
                on_duplicate(dup);
            }
            Ok(())
        })?;
        let (keys, postings) = writer.finish(rows)?;

        for run in &self.runs {
            std::fs::remove_file(run)?;
        }
        // Leave the directory behind if something else still lives in it
        let _ = std::fs::remove_dir(&self.spill_dir);

        Ok(TableSummary {
            keys,
            postings,
            duplicates,
            runs,
        })
    }
}

struct OpenEntry {
    key: String,
    key_offset: u64,
    postings_start: u64,
    postings_len: u32,
    first: u64,
}

/// Streams merged records into the final table layout.
///
/// Entries go straight into the table file; postings and keys are staged in
/// two side files and appended in `finish`, so nothing grows with the key count.
struct TableWriter {
    kind: TableKind,
    path: PathBuf,
    entries: BufWriter<File>,
    postings: BufWriter<File>,
    pool: BufWriter<File>,
    postings_path: PathBuf,
    pool_path: PathBuf,
    current: Option<OpenEntry>,
    keys: u64,
    postings_count: u64,
    pool_len: u64,
}

impl TableWriter {
    fn create(path: &Path, kind: TableKind) -> Result<Self, TableError> {
        let postings_path = path.with_extension("postings.tmp");
        let pool_path = path.with_extension("pool.tmp");

        let mut entries = BufWriter::new(File::create(path)?);
        entries.write_all(&[0u8; TABLE_HEADER_SIZE])?;

        Ok(Self {
            kind,
            path: path.to_path_buf(),
            entries,
            postings: BufWriter::new(File::create(&postings_path)?),
            pool: BufWriter::new(File::create(&pool_path)?),
            postings_path,
            pool_path,
            current: None,
            keys: 0,
            postings_count: 0,
            pool_len: 0,
        })
    }

    fn push(&mut self, key: String, ordinal: u64) -> Result<Option<Duplicate>, TableError> {
        if let Some(open) = self.current.as_mut() {
            if open.key == key {
                return match self.kind {
                    TableKind::Unique => Ok(Some(Duplicate {
                        key,
                        kept: open.first,
                        dropped: ordinal,
                    })),
                    TableKind::Multi => {
                        self.postings.write_all(&ordinal.to_le_bytes())?;
                        self.postings_count += 1;
                        open.postings_len += 1;
                        Ok(None)
                    }
                };
            }
        }

        self.close_entry()?;
        self.pool.write_all(key.as_bytes())?;
        self.postings.write_all(&ordinal.to_le_bytes())?;

        let key_len = key.len() as u64;
        self.current = Some(OpenEntry {
            key_offset: self.pool_len,
            postings_start: self.postings_count,
            postings_len: 1,
            first: ordinal,
            key,
        });
        self.pool_len += key_len;
        self.postings_count += 1;
        Ok(None)
    }

    fn close_entry(&mut self) -> Result<(), TableError> {
        if let Some(open) = self.current.take() {
            self.entries.write_all(&open.key_offset.to_le_bytes())?;
            self.entries.write_all(&(open.key.len() as u32).to_le_bytes())?;
            self.entries.write_all(&open.postings_len.to_le_bytes())?;
            self.entries.write_all(&open.postings_start.to_le_bytes())?;
            self.keys += 1;
        }
        Ok(())
    }

    fn finish(mut self, rows: u64) -> Result<(u64, u64), TableError> {
        self.close_entry()?;
        self.postings.flush()?;
        self.pool.flush()?;
        drop(self.postings);
        drop(self.pool);

        io::copy(&mut File::open(&self.postings_path)?, &mut self.entries)?;
        io::copy(&mut File::open(&self.pool_path)?, &mut self.entries)?;
        self.entries.flush()?;

        let entries_offset = TABLE_HEADER_SIZE as u64;
        let postings_offset = entries_offset + self.keys * ENTRY_SIZE as u64;
        let header = TableHeader {
            flags: self.kind.flags(),
            rows,
            keys: self.keys,
            postings: self.postings_count,
            entries_offset,
            postings_offset,
            pool_offset: postings_offset + self.postings_count * POSTING_SIZE as u64,
        };

        let file = self.entries.get_mut();
        file.seek(io::SeekFrom::Start(0))?;
        file.write_all(&header.to_bytes())?;
        file.sync_all()?;

        std::fs::remove_file(&self.postings_path)?;
        std::fs::remove_file(&self.pool_path)?;
        tracing::debug!(
            "table_written path={:?} keys={} postings={} pool_bytes={}",
            self.path,
            self.keys,
            self.postings_count,
            self.pool_len
        );
        Ok((self.keys, self.postings_count))
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Read-only, memory-mapped key table
pub struct KeyTable {
    mmap: Mmap,
    header: TableHeader,
    kind: TableKind,
}

impl KeyTable {
    /// Open a table, checking that it was built as `kind`
    pub fn open<P: AsRef<Path>>(path: P, kind: TableKind) -> Result<Self, TableError> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let header = TableHeader::from_bytes(&mmap)?;

        if header.flags & flags::MULTI_VALUED != kind.flags() {
            return Err(TableError::KindMismatch { expected: kind });
        }

        let overflow = || {
            TableError::Corrupt(format!(
                "section sizes overflow (keys={} postings={})",
                header.keys, header.postings
            ))
        };
        let postings_offset = header
            .keys
            .checked_mul(ENTRY_SIZE as u64)
            .and_then(|bytes| bytes.checked_add(TABLE_HEADER_SIZE as u64))
            .ok_or_else(overflow)?;
        let pool_offset = header
            .postings
            .checked_mul(POSTING_SIZE as u64)
            .and_then(|bytes| bytes.checked_add(postings_offset))
            .ok_or_else(overflow)?;
        if header.entries_offset != TABLE_HEADER_SIZE as u64
            || header.postings_offset != postings_offset
            || header.pool_offset != pool_offset
            || pool_offset > mmap.len() as u64
        {
            return Err(TableError::Corrupt(format!(
                "section offsets disagree with counts (keys={} postings={} len={})",
                header.keys,
                header.postings,
                mmap.len()
            )));
        }

        Ok(Self { mmap, header, kind })
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.header.keys as usize
    }

    pub fn is_empty(&self) -> bool {
        self.header.keys == 0
    }

    /// Number of row ordinals the table was built against
    pub fn rows(&self) -> u64 {
        self.header.rows
    }

    /// Total number of stored ordinals
    pub fn postings(&self) -> u64 {
        self.header.postings
    }

    fn entry(&self, index: usize) -> (u64, u32, u32, u64) {
        let at = self.header.entries_offset as usize + index * ENTRY_SIZE;
        let e = &self.mmap[at..at + ENTRY_SIZE];
        (
            u64::from_le_bytes(e[0..8].try_into().unwrap()),
            u32::from_le_bytes(e[8..12].try_into().unwrap()),
            u32::from_le_bytes(e[12..16].try_into().unwrap()),
            u64::from_le_bytes(e[16..24].try_into().unwrap()),
        )
    }

    fn key_bytes(&self, key_offset: u64, key_len: u32) -> Result<&[u8], TableError> {
        let start = self.header.pool_offset.checked_add(key_offset);
        let end = start.and_then(|s| s.checked_add(key_len as u64));
        match (start, end) {
            (Some(start), Some(end)) if end <= self.mmap.len() as u64 => {
                Ok(&self.mmap[start as usize..end as usize])
            }
            _ => Err(TableError::Corrupt(format!(
                "key at pool offset {} (len {}) outside file of {} bytes",
                key_offset,
                key_len,
                self.mmap.len()
            ))),
        }
    }

    /// Ordinals stored for `key`, in insertion order
    pub fn get(&self, key: &str) -> Result<Option<Vec<u64>>, TableError> {
        let needle = key.as_bytes();
        let (mut lo, mut hi) = (0usize, self.len());

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let (key_offset, key_len, postings_len, postings_start) = self.entry(mid);
            match self.key_bytes(key_offset, key_len)?.cmp(needle) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => {
                    return self.read_postings(postings_start, postings_len).map(Some)
                }
            }
        }
        Ok(None)
    }

    fn read_postings(&self, start: u64, len: u32) -> Result<Vec<u64>, TableError> {
        let end = start.checked_add(len as u64);
        if end.map_or(true, |end| end > self.header.postings) {
            return Err(TableError::Corrupt(format!(
                "postings at {} (len {}) beyond count {}",
                start, len, self.header.postings
            )));
        }
        let begin = self.header.postings_offset as usize + start as usize * POSTING_SIZE;
        let bytes = &self.mmap[begin..begin + len as usize * POSTING_SIZE];
        Ok(bytes
            .chunks_exact(POSTING_SIZE)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
            .collect())
    }

    /// Iterate keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = Result<&str, TableError>> + '_ {
        (0..self.len()).map(move |i| {
            let (key_offset, key_len, _, _) = self.entry(i);
            let bytes = self.key_bytes(key_offset, key_len)?;
            std::str::from_utf8(bytes)
                .map_err(|e| TableError::Corrupt(format!("invalid UTF-8 key: {}", e)))
        })
    }
}
