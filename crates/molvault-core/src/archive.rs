//! Entity archive
//!
//! Append-only storage for variable-length serialized entities, addressed by row
//! ordinal. Payloads are packed back to back in an arena file; a parallel offset
//! table keeps lookups O(1).
//!
//! # Layout
//!
//! ```text
//! entities.bin   [payload 0][payload 1]...[payload N-1]
//!
//! entities.off   Offset  Size  Description
//!                0x00    8     Magic: "MVOFFS01"
//!                0x08    4     u32 LE version (1)
//!                0x0C    4     reserved
//!                0x10    8     u64 LE N: entry count
//!                0x18    8     u64 LE payload length in bytes
//!                0x20    8*(N+1) u64 LE offsets; entry i spans [off[i], off[i+1])
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Seek, Write};
use std::path::Path;

use memmap2::Mmap;
use thiserror::Error;

pub const OFFSETS_MAGIC: [u8; 8] = *b"MVOFFS01";
pub const ARCHIVE_VERSION: u32 = 1;
pub const OFFSETS_HEADER_SIZE: usize = 32;
const OFFSET_SIZE: usize = 8;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid archive: {0}")]
    Invalid(String),

    #[error("Entry out of range: {index} >= {count}")]
    OutOfRange { index: usize, count: usize },
}

#[derive(Debug, Clone, Copy)]
struct OffsetsHeader {
    count: u64,
    payload_len: u64,
}

impl OffsetsHeader {
    fn to_bytes(self) -> [u8; OFFSETS_HEADER_SIZE] {
        let mut buf = [0u8; OFFSETS_HEADER_SIZE];
        buf[0..8].copy_from_slice(&OFFSETS_MAGIC);
        buf[8..12].copy_from_slice(&ARCHIVE_VERSION.to_le_bytes());
        buf[16..24].copy_from_slice(&self.count.to_le_bytes());
        buf[24..32].copy_from_slice(&self.payload_len.to_le_bytes());
        buf
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, ArchiveError> {
        if bytes.len() < OFFSETS_HEADER_SIZE {
            return Err(ArchiveError::Invalid(format!(
                "offset table too short for header: {} < {}",
                bytes.len(),
                OFFSETS_HEADER_SIZE
            )));
        }
        if bytes[0..8] != OFFSETS_MAGIC {
            return Err(ArchiveError::Invalid("bad offset table magic".into()));
        }
        let version = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        if version != ARCHIVE_VERSION {
            return Err(ArchiveError::Invalid(format!(
                "unsupported archive version {}",
                version
            )));
        }
        Ok(Self {
            count: u64::from_le_bytes(bytes[16..24].try_into().unwrap()),
            payload_len: u64::from_le_bytes(bytes[24..32].try_into().unwrap()),
        })
    }
}

/// Writer for the payload arena and its offset table
pub struct ArchiveWriter {
    payload: BufWriter<File>,
    offsets: BufWriter<File>,
    count: u64,
    position: u64,
}

impl ArchiveWriter {
    pub fn create<P: AsRef<Path>, Q: AsRef<Path>>(
        payload_path: P,
        offsets_path: Q,
    ) -> Result<Self, ArchiveError> {
        let payload = BufWriter::new(File::create(payload_path)?);
        let mut offsets = BufWriter::new(File::create(offsets_path)?);

        offsets.write_all(
            &OffsetsHeader {
                count: 0,
                payload_len: 0,
            }
            .to_bytes(),
        )?;
        offsets.write_all(&0u64.to_le_bytes())?;

        Ok(Self {
            payload,
            offsets,
            count: 0,
            position: 0,
        })
    }

    /// Append one entry, returning its ordinal
    pub fn append(&mut self, bytes: &[u8]) -> Result<u64, ArchiveError> {
        self.payload.write_all(bytes)?;
        self.position += bytes.len() as u64;
        self.offsets.write_all(&self.position.to_le_bytes())?;

        let ordinal = self.count;
        self.count += 1;
        Ok(ordinal)
    }

    pub fn flush_batch(&mut self) -> Result<(), ArchiveError> {
        self.payload.flush()?;
        self.offsets.flush()?;
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Finalize both files; the header count is only written here
    pub fn finish(mut self) -> Result<u64, ArchiveError> {
        self.payload.flush()?;
        self.payload.get_mut().sync_all()?;

        self.offsets.flush()?;
        let file = self.offsets.get_mut();
        file.seek(io::SeekFrom::Start(0))?;
        file.write_all(
            &OffsetsHeader {
                count: self.count,
                payload_len: self.position,
            }
            .to_bytes(),
        )?;
        file.sync_all()?;

        Ok(self.count)
    }
}

/// Zero-copy reader over a finished archive
pub struct ArchiveReader {
    payload: Option<Mmap>,
    offsets: Mmap,
    count: usize,
}

impl ArchiveReader {
    /// Open an archive
    ///
    /// Validation is O(1): only the header, the table length and the final
    /// offset are checked here. Individual spans are bounds-checked in `get`.
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(
        payload_path: P,
        offsets_path: Q,
    ) -> Result<Self, ArchiveError> {
        let offsets_file = File::open(offsets_path)?;
        let offsets = unsafe { Mmap::map(&offsets_file)? };
        let header = OffsetsHeader::from_bytes(&offsets)?;

        let expected = header
            .count
            .checked_add(1)
            .and_then(|slots| slots.checked_mul(OFFSET_SIZE as u64))
            .and_then(|bytes| bytes.checked_add(OFFSETS_HEADER_SIZE as u64))
            .ok_or_else(|| {
                ArchiveError::Invalid(format!("entry count {} overflows", header.count))
            })?;
        if offsets.len() as u64 != expected {
            return Err(ArchiveError::Invalid(format!(
                "offset table holds {} bytes, header implies {}",
                offsets.len(),
                expected
            )));
        }

        let payload_file = File::open(payload_path)?;
        let payload_len = payload_file.metadata()?.len();
        if payload_len != header.payload_len {
            return Err(ArchiveError::Invalid(format!(
                "payload holds {} bytes, header implies {}",
                payload_len, header.payload_len
            )));
        }
        // Zero-length files cannot be mapped on every platform
        let payload = if payload_len == 0 {
            None
        } else {
            Some(unsafe { Mmap::map(&payload_file)? })
        };

        let count = header.count as usize;
        let reader = Self {
            payload,
            offsets,
            count,
        };
        if reader.offset(count) != header.payload_len {
            return Err(ArchiveError::Invalid(format!(
                "final offset {} does not match payload length {}",
                reader.offset(count),
                header.payload_len
            )));
        }
        Ok(reader)
    }

    #[inline]
    fn offset(&self, slot: usize) -> u64 {
        let start = OFFSETS_HEADER_SIZE + slot * OFFSET_SIZE;
        u64::from_le_bytes(self.offsets[start..start + OFFSET_SIZE].try_into().unwrap())
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Payload of entry `index`
    pub fn get(&self, index: usize) -> Result<&[u8], ArchiveError> {
        if index >= self.count {
            return Err(ArchiveError::OutOfRange {
                index,
                count: self.count,
            });
        }

        let start = self.offset(index) as usize;
        let end = self.offset(index + 1) as usize;
        let data: &[u8] = self.payload.as_deref().unwrap_or(&[]);
        if start > end || end > data.len() {
            return Err(ArchiveError::Invalid(format!(
                "entry {} spans [{}, {}) outside payload of {} bytes",
                index,
                start,
                end,
                data.len()
            )));
        }
        Ok(&data[start..end])
    }
}
