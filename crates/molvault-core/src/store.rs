//! Memory-mapped descriptor column storage
//!
//! Provides zero-copy access to rows stored in `.col` files using the OS page cache.
//!
//! # Safety
//!
//! `ColumnStore` uses `bytemuck::try_cast_slice` to convert `&[u8]` to `&[f64]`
//! with an alignment check instead of pointer casts.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use thiserror::Error;

use crate::format::{ColumnHeader, FormatError};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Row out of range: {index} >= {count}")]
    OutOfRange { index: usize, count: usize },

    #[error("File size mismatch: header implies {expected} bytes, file has {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Alignment error: byte slice not aligned to f64 (8 bytes)")]
    AlignmentError,
}

/// Memory-mapped column store providing zero-copy access to `.col` files
pub struct ColumnStore {
    mmap: Mmap,
    header: ColumnHeader,
}

impl ColumnStore {
    /// Open a `.col` file for reading
    ///
    /// # Safety
    ///
    /// Memory mapping is inherently unsafe:
    /// - If the file is truncated while mapped, reads may cause SIGBUS
    /// - The file must not be modified while the store is open
    ///
    /// Finished stores are immutable, which is what makes the mapping sound in practice.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        let header = ColumnHeader::from_bytes(&mmap)?;

        // A crash between flushes leaves trailing rows that the header never
        // counted, so anything other than an exact match is a damaged file.
        let expected = header.file_size()?;
        if mmap.len() != expected {
            return Err(StoreError::SizeMismatch {
                expected,
                actual: mmap.len(),
            });
        }

        Ok(Self { mmap, header })
    }

    /// Number of rows
    #[inline]
    pub fn len(&self) -> usize {
        self.header.count as usize
    }

    pub fn is_empty(&self) -> bool {
        self.header.count == 0
    }

    /// Values per row
    #[inline]
    pub fn width(&self) -> usize {
        self.header.width as usize
    }

    /// Get a row by ordinal with zero-copy access
    pub fn get(&self, index: usize) -> Result<&[f64], StoreError> {
        if index >= self.len() {
            return Err(StoreError::OutOfRange {
                index,
                count: self.len(),
            });
        }

        let start = self.header.row_offset(index);
        let end = start + self.header.row_bytes();
        let bytes = &self.mmap[start..end];

        bytemuck::try_cast_slice(bytes).map_err(|_| StoreError::AlignmentError)
    }

    /// Raw bytes of the data section (all rows, in ordinal order)
    pub fn data_bytes(&self) -> &[u8] {
        &self.mmap[self.header.data_offset as usize..]
    }

    /// Total memory footprint of the mapped file
    pub fn memory_bytes(&self) -> usize {
        self.mmap.len()
    }

    /// Iterator over all rows
    pub fn iter(&self) -> RowIter<'_> {
        RowIter {
            store: self,
            index: 0,
        }
    }
}

/// Iterator over rows in the store
pub struct RowIter<'a> {
    store: &'a ColumnStore,
    index: usize,
}

impl<'a> Iterator for RowIter<'a> {
    type Item = Result<&'a [f64], StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.store.len() {
            return None;
        }
        let row = self.store.get(self.index);
        self.index += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.store.len() - self.index;
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for RowIter<'a> {}
