//! `.col` Binary File Format (descriptor columns)
//!
//! # File Structure
//!
//! ```text
//! Offset   Size    Type        Description
//! ─────────────────────────────────────────────────
//! 0x00     8       [u8; 8]     Magic: "MVCOLS01"
//! 0x08     4       u32 LE      Version (1)
//! 0x0C     4       u32 LE      W: Row width (values per row)
//! 0x10     8       u64 LE      N: Number of rows
//! 0x18     8       u64 LE      Data section offset (64)
//! 0x20     32      [u8; 32]    Reserved / padding
//! ─────────────────────────────────────────────────
//! TOTAL: 64 bytes, followed by N*W*8 bytes of f64 (Little Endian)
//! ```
//!
//! Rows are addressed as `data_offset + ordinal * W * 8`, so random access is O(1).
//! The 64-byte header keeps the data section 8-byte aligned inside a page-aligned
//! mmap, which is what lets the reader cast the bytes to `&[f64]` without copying.
//!
//! # Example
//!
//! ```ignore
//! let mut writer = ColumnWriter::new("descriptors.col", 5)?;
//! writer.write_row(&[78.04695, 0.0, 1.0, 0.0, 1.0])?;
//! writer.finish()?;
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Seek, Write};
use std::path::Path;

use thiserror::Error;

/// Magic bytes identifying a column file: "MVCOLS01"
pub const MAGIC: [u8; 8] = *b"MVCOLS01";

/// Current on-disk version
pub const FORMAT_VERSION: u32 = 1;

/// Header size in bytes (cache-line aligned)
pub const HEADER_SIZE: usize = 64;

/// Size of one stored value
pub const VALUE_SIZE: usize = std::mem::size_of::<f64>();

/// Buffer capacity for the column writer
const WRITE_BUFFER_BYTES: usize = 1 << 20;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Invalid magic bytes: expected MVCOLS01")]
    InvalidMagic,

    #[error("Unsupported column format version: {0}")]
    UnsupportedVersion(u32),

    #[error("Data section misaligned at offset {0} (expected a multiple of 8)")]
    Misaligned(u64),

    #[error("Width mismatch: expected {expected}, got {actual}")]
    WidthMismatch { expected: usize, actual: usize },

    #[error("Header size overflows: {count} rows of width {width}")]
    SizeOverflow { count: u64, width: u32 },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Parsed column file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnHeader {
    pub version: u32,
    pub width: u32,
    pub count: u64,
    pub data_offset: u64,
}

impl ColumnHeader {
    pub fn new(width: usize, count: u64) -> Self {
        Self {
            version: FORMAT_VERSION,
            width: width as u32,
            count,
            data_offset: HEADER_SIZE as u64,
        }
    }

    /// Parse header from raw bytes (first 64 bytes of file)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FormatError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("File too small for header: {} < {}", bytes.len(), HEADER_SIZE),
            )));
        }

        if bytes[0..8] != MAGIC {
            return Err(FormatError::InvalidMagic);
        }

        let version = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion(version));
        }

        let width = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        let count = u64::from_le_bytes(bytes[16..24].try_into().unwrap());
        let data_offset = u64::from_le_bytes(bytes[24..32].try_into().unwrap());

        if data_offset % VALUE_SIZE as u64 != 0 || data_offset < HEADER_SIZE as u64 {
            return Err(FormatError::Misaligned(data_offset));
        }

        Ok(Self {
            version,
            width,
            count,
            data_offset,
        })
    }

    /// Write header to bytes (exactly 64 bytes)
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&MAGIC);
        buf[8..12].copy_from_slice(&self.version.to_le_bytes());
        buf[12..16].copy_from_slice(&self.width.to_le_bytes());
        buf[16..24].copy_from_slice(&self.count.to_le_bytes());
        buf[24..32].copy_from_slice(&self.data_offset.to_le_bytes());
        buf
    }

    /// Bytes occupied by one row
    #[inline]
    pub fn row_bytes(&self) -> usize {
        self.width as usize * VALUE_SIZE
    }

    /// Byte offset of a row by ordinal
    #[inline(always)]
    pub fn row_offset(&self, ordinal: usize) -> usize {
        self.data_offset as usize + ordinal * self.row_bytes()
    }

    /// Total file size implied by the header; a damaged count can overflow
    pub fn file_size(&self) -> Result<usize, FormatError> {
        let overflow = || FormatError::SizeOverflow {
            count: self.count,
            width: self.width,
        };
        let data = self
            .count
            .checked_mul(self.width as u64 * VALUE_SIZE as u64)
            .and_then(|bytes| bytes.checked_add(self.data_offset))
            .ok_or_else(overflow)?;
        usize::try_from(data).map_err(|_| overflow())
    }
}

/// Append-only writer for column files.
///
/// Rows go through a `BufWriter`; `flush_batch` pushes the buffered rows to the
/// file at batch boundaries so peak memory stays bounded by the buffer, not by
/// the number of rows written. The row count in the header is only patched in
/// `finish`, so an unfinished file always reads back as empty.
pub struct ColumnWriter {
    writer: BufWriter<File>,
    width: usize,
    count: u64,
}

impl ColumnWriter {
    /// Create a new column file with a fixed row width
    pub fn new<P: AsRef<Path>>(path: P, width: usize) -> Result<Self, FormatError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_BYTES, file);

        // Placeholder header, rewritten in finish()
        writer.write_all(&ColumnHeader::new(width, 0).to_bytes())?;

        Ok(Self {
            writer,
            width,
            count: 0,
        })
    }

    /// Append one row
    pub fn write_row(&mut self, row: &[f64]) -> Result<(), FormatError> {
        if row.len() != self.width {
            return Err(FormatError::WidthMismatch {
                expected: self.width,
                actual: row.len(),
            });
        }

        for &val in row {
            self.writer.write_all(&val.to_le_bytes())?;
        }
        self.count += 1;
        Ok(())
    }

    /// Append a flat block of rows (`rows.len()` must be a multiple of the width)
    pub fn write_rows(&mut self, rows: &[f64]) -> Result<(), FormatError> {
        if self.width == 0 {
            return Ok(());
        }
        if rows.len() % self.width != 0 {
            return Err(FormatError::WidthMismatch {
                expected: self.width,
                actual: rows.len() % self.width,
            });
        }
        for row in rows.chunks_exact(self.width) {
            self.write_row(row)?;
        }
        Ok(())
    }

    /// Push buffered rows down to the file
    pub fn flush_batch(&mut self) -> Result<(), FormatError> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Finalize the file, updating the header with the actual count
    pub fn finish(mut self) -> Result<u64, FormatError> {
        self.writer.flush()?;

        let file = self.writer.get_mut();
        file.seek(io::SeekFrom::Start(0))?;
        file.write_all(&ColumnHeader::new(self.width, self.count).to_bytes())?;
        file.sync_all()?;

        Ok(self.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_header_roundtrip() {
        let header = ColumnHeader::new(200, 1_000_000);
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), 64);

        let parsed = ColumnHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.data_offset, 64);
    }

    #[test]
    fn test_offset_calculation() {
        let header = ColumnHeader::new(5, 10);
        assert_eq!(header.row_offset(0), 64);
        assert_eq!(header.row_offset(1), 64 + 5 * 8);
        assert_eq!(header.row_offset(9), 64 + 9 * 5 * 8);
        assert_eq!(header.file_size().unwrap(), 64 + 10 * 5 * 8);
    }

    #[test]
    fn test_file_size_overflow() {
        let mut header = ColumnHeader::new(5, 0);
        header.count = u64::MAX;
        assert!(matches!(
            header.file_size(),
            Err(FormatError::SizeOverflow { count: u64::MAX, width: 5 })
        ));

        header.width = 0;
        assert_eq!(header.file_size().unwrap(), 64);
    }

    #[test]
    fn test_rejects_bad_magic_and_version() {
        let mut bytes = ColumnHeader::new(4, 1).to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            ColumnHeader::from_bytes(&bytes),
            Err(FormatError::InvalidMagic)
        ));

        let mut bytes = ColumnHeader::new(4, 1).to_bytes();
        bytes[8..12].copy_from_slice(&7u32.to_le_bytes());
        assert!(matches!(
            ColumnHeader::from_bytes(&bytes),
            Err(FormatError::UnsupportedVersion(7))
        ));

        let mut bytes = ColumnHeader::new(4, 1).to_bytes();
        bytes[24..32].copy_from_slice(&65u64.to_le_bytes());
        assert!(matches!(
            ColumnHeader::from_bytes(&bytes),
            Err(FormatError::Misaligned(65))
        ));
    }

    #[test]
    fn test_writer_basic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.col");

        let mut writer = ColumnWriter::new(&path, 3).unwrap();
        writer.write_row(&[1.0, 2.0, 3.0]).unwrap();
        writer.flush_batch().unwrap();
        writer.write_rows(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0]).unwrap();
        assert_eq!(writer.finish().unwrap(), 3);

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[0..8], b"MVCOLS01");
        let header = ColumnHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.count, 3);
        assert_eq!(header.width, 3);
        assert_eq!(bytes.len(), header.file_size().unwrap());

        let second = f64::from_le_bytes(bytes[64 + 24..64 + 32].try_into().unwrap());
        assert_eq!(second, 4.0);
    }

    #[test]
    fn test_unfinished_writer_reports_zero_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.col");

        let mut writer = ColumnWriter::new(&path, 2).unwrap();
        writer.write_row(&[1.0, 2.0]).unwrap();
        writer.flush_batch().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let header = ColumnHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.count, 0);
        assert!(bytes.len() > header.file_size().unwrap());
    }

    #[test]
    fn test_writer_width_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.col");

        let mut writer = ColumnWriter::new(&path, 4).unwrap();
        let result = writer.write_row(&[1.0, 2.0, 3.0]);
        assert!(matches!(result, Err(FormatError::WidthMismatch { .. })));

        let result = writer.write_rows(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!(matches!(result, Err(FormatError::WidthMismatch { .. })));
    }
}
