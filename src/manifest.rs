//! Store manifest
//!
//! `manifest.json` is written last, after every artifact is finished and
//! synced. It records the schema and row count a reader validates against,
//! the options the store was built with, and a sha256 per artifact for
//! `verify`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::BuildOptions;
use crate::error::{MolvaultError, Result};
use crate::layout::{self, StoreLayout};
use crate::schema::DescriptorSchema;

pub const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub file: String,
    pub size_bytes: u64,
    pub sha256: String,
}

impl ArtifactEntry {
    pub fn describe(dir: &Path, file: &str) -> Result<Self> {
        let path = dir.join(file);
        Ok(Self {
            file: file.to_string(),
            size_bytes: std::fs::metadata(&path)?.len(),
            sha256: layout::sha256_file(&path)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreManifest {
    pub format_version: u32,
    pub created_at: i64,
    pub tool_version: String,
    pub schema: DescriptorSchema,
    pub width: usize,
    pub row_count: u64,
    pub structure_index: bool,
    /// Distinct structural keys, when the index is enabled
    #[serde(default)]
    pub distinct_structures: Option<u64>,
    pub distinct_names: u64,
    pub skipped_rows: u64,
    pub duplicate_names: u64,
    pub options: BuildOptions,
    pub artifacts: Vec<ArtifactEntry>,
}

impl StoreManifest {
    /// Read and sanity-check the manifest of the store at `layout`
    pub fn load(layout: &StoreLayout) -> Result<Self> {
        let path = layout.manifest();
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MolvaultError::corrupt(format!(
                    "missing manifest {:?}",
                    path
                )))
            }
            Err(e) => return Err(e.into()),
        };
        let manifest: StoreManifest = serde_json::from_slice(&bytes)
            .map_err(|e| MolvaultError::corrupt(format!("unreadable manifest: {}", e)))?;

        if manifest.format_version != MANIFEST_VERSION {
            return Err(MolvaultError::corrupt(format!(
                "unsupported manifest version {}",
                manifest.format_version
            )));
        }
        if !manifest.schema.is_consistent() || manifest.schema.width() != manifest.width {
            return Err(MolvaultError::corrupt(format!(
                "schema width {} disagrees with recorded width {}",
                manifest.schema.width(),
                manifest.width
            )));
        }
        Ok(manifest)
    }

    pub fn write(&self, layout: &StoreLayout) -> Result<()> {
        let path = layout.manifest();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json.as_bytes())?;
        layout::sync_file(&path)
    }

    pub fn artifact(&self, file: &str) -> Option<&ArtifactEntry> {
        self.artifacts.iter().find(|a| a.file == file)
    }

    /// Artifact files a store with this manifest must contain
    pub fn expected_files(&self) -> Vec<&'static str> {
        let mut files = vec![
            layout::DESCRIPTORS_FILE,
            layout::ENTITIES_FILE,
            layout::OFFSETS_FILE,
            layout::NAMES_FILE,
        ];
        if self.structure_index {
            files.push(layout::STRUCTURES_FILE);
        }
        files
    }
}

pub(crate) fn now_unix_ts() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaEntry;
    use tempfile::tempdir;

    fn sample() -> StoreManifest {
        StoreManifest {
            format_version: MANIFEST_VERSION,
            created_at: now_unix_ts(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            schema: DescriptorSchema {
                entries: vec![SchemaEntry {
                    generator: "Mass".into(),
                    fields: vec!["ExactMolWt".into()],
                    arity: 1,
                }],
            },
            width: 1,
            row_count: 0,
            structure_index: false,
            distinct_structures: None,
            distinct_names: 0,
            skipped_rows: 0,
            duplicate_names: 0,
            options: BuildOptions::default(),
            artifacts: Vec::new(),
        }
    }

    #[test]
    fn test_write_load() {
        let dir = tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        sample().write(&layout).unwrap();
        let loaded = StoreManifest::load(&layout).unwrap();
        assert_eq!(loaded.width, 1);
        assert_eq!(loaded.expected_files().len(), 4);
    }

    #[test]
    fn test_load_rejects_damage() {
        let dir = tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        assert!(matches!(StoreManifest::load(&layout), Err(MolvaultError::Corrupt(_))));

        std::fs::write(layout.manifest(), b"{ not json").unwrap();
        assert!(matches!(StoreManifest::load(&layout), Err(MolvaultError::Corrupt(_))));

        let mut m = sample();
        m.format_version = 99;
        m.write(&layout).unwrap();
        assert!(matches!(StoreManifest::load(&layout), Err(MolvaultError::Corrupt(_))));

        let mut m = sample();
        m.width = 2;
        m.write(&layout).unwrap();
        assert!(matches!(StoreManifest::load(&layout), Err(MolvaultError::Corrupt(_))));
    }
}
