//! Store reader
//!
//! `MolStore` maps every artifact read-only and answers lookups by name,
//! structural key and row ordinal. Nothing is mutated after `open`, so one
//! handle can be shared across threads and any number of handles can be open
//! on the same store.

use std::path::Path;

use molvault_core::{ArchiveReader, ColumnStore, NameIndex, StructureIndex};

use crate::entity::{decode_record, EntityCodec};
use crate::error::{KeyKind, MolvaultError, Result};
use crate::layout::{self, StoreLayout};
use crate::manifest::StoreManifest;
use crate::schema::DescriptorSchema;

pub struct MolStore {
    layout: StoreLayout,
    manifest: StoreManifest,
    columns: ColumnStore,
    archive: ArchiveReader,
    names: NameIndex,
    structures: Option<StructureIndex>,
}

/// Open one artifact, reporting a missing file as store damage
fn open_artifact<T, E>(file: &str, open: impl FnOnce() -> std::result::Result<T, E>) -> Result<T>
where
    E: Into<MolvaultError>,
{
    open().map_err(|e| match e.into() {
        MolvaultError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
            MolvaultError::corrupt(format!("missing artifact {}", file))
        }
        other => other,
    })
}

fn check_rows(file: &str, actual: u64, expected: u64) -> Result<()> {
    if actual != expected {
        return Err(MolvaultError::corrupt(format!(
            "{} holds {} rows, manifest records {}",
            file, actual, expected
        )));
    }
    Ok(())
}

impl MolStore {
    /// Open and cross-check the store at `dir`
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no store at {:?}", dir),
            )
            .into());
        }
        let layout = StoreLayout::new(dir);
        let manifest = StoreManifest::load(&layout)?;
        let rows = manifest.row_count;

        let columns = open_artifact(layout::DESCRIPTORS_FILE, || ColumnStore::open(layout.descriptors()))?;
        if columns.width() != manifest.width {
            return Err(MolvaultError::corrupt(format!(
                "column width {} disagrees with schema width {}",
                columns.width(),
                manifest.width
            )));
        }
        check_rows(layout::DESCRIPTORS_FILE, columns.len() as u64, rows)?;

        let archive = open_artifact(layout::ENTITIES_FILE, || {
            ArchiveReader::open(layout.entities(), layout.offsets())
        })?;
        check_rows(layout::ENTITIES_FILE, archive.len() as u64, rows)?;

        let names = open_artifact(layout::NAMES_FILE, || NameIndex::open(layout.names()))?;
        check_rows(layout::NAMES_FILE, names.rows(), rows)?;

        let structures = if manifest.structure_index {
            let index = open_artifact(layout::STRUCTURES_FILE, || {
                StructureIndex::open(layout.structures())
            })?;
            check_rows(layout::STRUCTURES_FILE, index.rows(), rows)?;
            check_rows(layout::STRUCTURES_FILE, index.postings(), rows)?;
            Some(index)
        } else {
            None
        };

        tracing::debug!(
            "store_opened path={:?} rows={} width={} structure_index={}",
            dir,
            rows,
            manifest.width,
            structures.is_some()
        );

        Ok(Self {
            layout,
            manifest,
            columns,
            archive,
            names,
            structures,
        })
    }

    /// Release every mapping; dropping the handle does the same
    pub fn close(self) {}

    pub fn path(&self) -> &Path {
        self.layout.root()
    }

    pub fn manifest(&self) -> &StoreManifest {
        &self.manifest
    }

    pub fn schema(&self) -> &DescriptorSchema {
        &self.manifest.schema
    }

    pub fn row_count(&self) -> u64 {
        self.manifest.row_count
    }

    pub fn width(&self) -> usize {
        self.manifest.width
    }

    pub fn has_structure_index(&self) -> bool {
        self.structures.is_some()
    }

    /// `Generator.Field` for every column
    pub fn field_names(&self) -> Vec<String> {
        self.manifest.schema.qualified_field_names()
    }

    fn check_ordinal(&self, ordinal: u64) -> Result<usize> {
        if ordinal >= self.row_count() {
            return Err(MolvaultError::OutOfRange {
                ordinal,
                count: self.row_count(),
            });
        }
        Ok(ordinal as usize)
    }

    pub fn lookup_name(&self, name: &str) -> Result<u64> {
        self.names
            .lookup(name)?
            .ok_or_else(|| MolvaultError::NotFound {
                kind: KeyKind::Name,
                key: name.to_string(),
            })
    }

    /// Rows with this structural key, in row order
    pub fn lookup_structural_key(&self, key: &str) -> Result<Vec<u64>> {
        let index = self.structures.as_ref().ok_or(MolvaultError::NotIndexed)?;
        index.lookup(key)?.ok_or_else(|| MolvaultError::NotFound {
            kind: KeyKind::StructuralKey,
            key: key.to_string(),
        })
    }

    pub fn descriptors(&self) -> &ColumnStore {
        &self.columns
    }

    /// Descriptor row at `ordinal`
    pub fn row(&self, ordinal: u64) -> Result<&[f64]> {
        let index = self.check_ordinal(ordinal)?;
        Ok(self.columns.get(index)?)
    }

    pub fn descriptors_for_name(&self, name: &str) -> Result<&[f64]> {
        self.row(self.lookup_name(name)?)
    }

    /// Pair each qualified field name with its value
    pub fn labeled_row(&self, ordinal: u64) -> Result<Vec<(String, f64)>> {
        let row = self.row(ordinal)?;
        Ok(self.field_names().into_iter().zip(row.iter().copied()).collect())
    }

    fn record(&self, ordinal: u64) -> Result<(&str, &[u8])> {
        let index = self.check_ordinal(ordinal)?;
        let record = self.archive.get(index)?;
        decode_record(record)
            .ok_or_else(|| MolvaultError::corrupt(format!("bad archive frame at row {}", ordinal)))
    }

    /// Name recorded for the row at `ordinal`
    pub fn name_at(&self, ordinal: u64) -> Result<&str> {
        Ok(self.record(ordinal)?.0)
    }

    /// Serialized entity at `ordinal`
    pub fn entity_bytes(&self, ordinal: u64) -> Result<&[u8]> {
        Ok(self.record(ordinal)?.1)
    }

    pub fn entity_at<C: EntityCodec>(&self, ordinal: u64, codec: &C) -> Result<C::Entity> {
        let bytes = self.entity_bytes(ordinal)?;
        codec
            .deserialize(bytes)
            .map_err(|e| MolvaultError::corrupt(format!("entity at row {}: {}", ordinal, e)))
    }

    /// Re-hash every artifact and compare against the manifest
    pub fn verify(&self) -> Result<()> {
        for file in self.manifest.expected_files() {
            let expected = self
                .manifest
                .artifact(file)
                .ok_or_else(|| MolvaultError::corrupt(format!("manifest has no entry for {}", file)))?;
            let path = self.layout.root().join(file);
            let size = std::fs::metadata(&path)?.len();
            if size != expected.size_bytes {
                return Err(MolvaultError::corrupt(format!(
                    "{} is {} bytes, manifest records {}",
                    file, size, expected.size_bytes
                )));
            }
            let digest = layout::sha256_file(&path)?;
            if digest != expected.sha256 {
                return Err(MolvaultError::corrupt(format!("{} checksum mismatch", file)));
            }
            tracing::debug!("artifact_verified file={} bytes={}", file, size);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_handle_is_shareable() {
        assert_send_sync::<MolStore>();
    }

    #[test]
    fn test_open_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            MolStore::open(dir.path().join("nope")),
            Err(MolvaultError::Io(_))
        ));
        assert!(matches!(
            MolStore::open(dir.path()),
            Err(MolvaultError::Corrupt(_))
        ));
    }
}
