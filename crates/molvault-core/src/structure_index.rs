//! Structure index: `structural key -> row ordinals`
//!
//! Structurally identical entities collapse to one key, so a key owns an
//! ordered list of rows. Insertion never overwrites; ordinals come back in row
//! order.

use std::path::{Path, PathBuf};

use crate::table::{KeyTable, TableBuilder, TableError, TableKind, TableSummary};

/// Build-side half of the structure index
pub struct StructureIndexWriter {
    table: TableBuilder,
}

impl StructureIndexWriter {
    pub fn new<P: Into<PathBuf>>(spill_dir: P) -> Result<Self, TableError> {
        Ok(Self {
            table: TableBuilder::new(TableKind::Multi, spill_dir)?,
        })
    }

    pub fn put(&mut self, key: impl Into<String>, ordinal: u64) {
        self.table.put(key, ordinal);
    }

    pub fn flush_batch(&mut self) -> Result<(), TableError> {
        self.table.spill()
    }

    pub fn finish<P: AsRef<Path>>(self, path: P, rows: u64) -> Result<TableSummary, TableError> {
        // Multi-valued tables never report duplicates
        self.table.finish(path, rows, |_| {})
    }
}

/// Read-side structure index
pub struct StructureIndex {
    table: KeyTable,
}

impl StructureIndex {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TableError> {
        Ok(Self {
            table: KeyTable::open(path, TableKind::Multi)?,
        })
    }

    /// Rows sharing `key`, in insertion order
    pub fn lookup(&self, key: &str) -> Result<Option<Vec<u64>>, TableError> {
        self.table.get(key)
    }

    /// Number of distinct structural keys
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn rows(&self) -> u64 {
        self.table.rows()
    }

    /// Total ordinals stored; equals `rows()` for a consistent store
    pub fn postings(&self) -> u64 {
        self.table.postings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_shared_structure_keeps_every_row() {
        let dir = tempdir().unwrap();
        let mut writer = StructureIndexWriter::new(dir.path().join("spill")).unwrap();
        writer.put("UHOVQNZJYSORNB-UHFFFAOYSA-N", 0);
        writer.put("YXFVVABEGXRONW-UHFFFAOYSA-N", 1);
        writer.flush_batch().unwrap();
        writer.put("UHOVQNZJYSORNB-UHFFFAOYSA-N", 2);
        let summary = writer.finish(dir.path().join("structures.idx"), 3).unwrap();
        assert_eq!(summary.keys, 2);
        assert_eq!(summary.postings, 3);

        let index = StructureIndex::open(dir.path().join("structures.idx")).unwrap();
        assert_eq!(index.postings(), 3);
        assert_eq!(
            index.lookup("UHOVQNZJYSORNB-UHFFFAOYSA-N").unwrap(),
            Some(vec![0, 2])
        );
        assert_eq!(
            index.lookup("YXFVVABEGXRONW-UHFFFAOYSA-N").unwrap(),
            Some(vec![1])
        );
        assert_eq!(index.lookup("missing").unwrap(), None);
    }
}
