//! Store directory layout, staging and durability helpers
//!
//! A build writes into a hidden staging directory next to the target and
//! renames it into place once every artifact and the manifest are synced. The
//! rename is the commit: the target path either holds a complete store or
//! nothing built by this run.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::error::{MolvaultError, Result};

pub const DESCRIPTORS_FILE: &str = "descriptors.col";
pub const ENTITIES_FILE: &str = "entities.bin";
pub const OFFSETS_FILE: &str = "entities.off";
pub const NAMES_FILE: &str = "names.idx";
pub const STRUCTURES_FILE: &str = "structures.idx";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Paths of every artifact under one store directory
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn descriptors(&self) -> PathBuf {
        self.root.join(DESCRIPTORS_FILE)
    }

    pub fn entities(&self) -> PathBuf {
        self.root.join(ENTITIES_FILE)
    }

    pub fn offsets(&self) -> PathBuf {
        self.root.join(OFFSETS_FILE)
    }

    pub fn names(&self) -> PathBuf {
        self.root.join(NAMES_FILE)
    }

    pub fn structures(&self) -> PathBuf {
        self.root.join(STRUCTURES_FILE)
    }

    pub fn manifest(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// Scratch directory for one index's sorted runs
    pub fn spill_dir(&self, index: &str) -> PathBuf {
        self.root.join(format!(".spill-{}", index))
    }
}

fn unique_suffix() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{}-{:x}", std::process::id(), nanos)
}

/// Hidden sibling of `target` tagged with `tag`
fn sibling(target: &Path, tag: &str) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "store".to_string());
    let parent = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    parent.join(format!(".{}.{}-{}", name, tag, unique_suffix()))
}

/// Build directory that removes itself unless committed
pub struct StagingDir {
    path: PathBuf,
    committed: bool,
}

impl StagingDir {
    pub fn create(target: &Path) -> Result<Self> {
        let path = sibling(target, "building");
        std::fs::create_dir(&path)?;
        tracing::debug!("staging_created path={:?}", path);
        Ok(Self {
            path,
            committed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sync the staged tree and move it to `target`.
    ///
    /// An existing target is only replaced when `overwrite` is set; it is moved
    /// aside first and deleted after the new store is in place.
    pub fn commit(mut self, target: &Path, overwrite: bool) -> Result<()> {
        sync_dir(&self.path)?;

        let displaced = if target.exists() {
            if !overwrite {
                return Err(MolvaultError::config(format!(
                    "store {:?} already exists",
                    target
                )));
            }
            let aside = sibling(target, "replaced");
            std::fs::rename(target, &aside)?;
            Some(aside)
        } else {
            None
        };

        if let Err(e) = std::fs::rename(&self.path, target) {
            if let Some(aside) = &displaced {
                let _ = std::fs::rename(aside, target);
            }
            return Err(e.into());
        }
        self.committed = true;

        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            sync_dir(parent)?;
        }
        if let Some(aside) = displaced {
            std::fs::remove_dir_all(&aside)?;
        }
        Ok(())
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            tracing::warn!("staging_cleanup_failed path={:?} error={}", self.path, e);
        } else {
            tracing::debug!("staging_removed path={:?}", self.path);
        }
    }
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn sync_file(path: &Path) -> Result<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

pub fn sync_dir(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        File::open(path)?.sync_all()?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
