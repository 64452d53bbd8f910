//! Name index: exact-match `name -> row ordinal`
//!
//! Names are assumed unique but not required to be. The first row carrying a
//! name owns it; later rows with the same name stay in the store, reachable by
//! ordinal only, and are reported through the duplicate callback at `finish`.

use std::path::{Path, PathBuf};

use crate::table::{Duplicate, KeyTable, TableBuilder, TableError, TableKind, TableSummary};

/// Build-side half of the name index
pub struct NameIndexWriter {
    table: TableBuilder,
}

impl NameIndexWriter {
    pub fn new<P: Into<PathBuf>>(spill_dir: P) -> Result<Self, TableError> {
        Ok(Self {
            table: TableBuilder::new(TableKind::Unique, spill_dir)?,
        })
    }

    pub fn put(&mut self, name: impl Into<String>, ordinal: u64) {
        self.table.put(name, ordinal);
    }

    /// Spill the names of the current batch
    pub fn flush_batch(&mut self) -> Result<(), TableError> {
        self.table.spill()
    }

    pub fn finish<P, F>(self, path: P, rows: u64, on_duplicate: F) -> Result<TableSummary, TableError>
    where
        P: AsRef<Path>,
        F: FnMut(Duplicate),
    {
        self.table.finish(path, rows, on_duplicate)
    }
}

/// Read-side name index
pub struct NameIndex {
    table: KeyTable,
}

impl NameIndex {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TableError> {
        Ok(Self {
            table: KeyTable::open(path, TableKind::Unique)?,
        })
    }

    /// Row ordinal owning `name`, if any
    pub fn lookup(&self, name: &str) -> Result<Option<u64>, TableError> {
        match self.table.get(name)? {
            Some(postings) => match postings.as_slice() {
                [ordinal] => Ok(Some(*ordinal)),
                other => Err(TableError::Corrupt(format!(
                    "name {:?} maps to {} ordinals in a unique table",
                    name,
                    other.len()
                ))),
            },
            None => Ok(None),
        }
    }

    /// Number of distinct names
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Row count the index was built against
    pub fn rows(&self) -> u64 {
        self.table.rows()
    }
}
