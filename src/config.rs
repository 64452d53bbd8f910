//! Build configuration
//!
//! Options are plain serde structs so the manifest can record exactly what a
//! store was built with.

use serde::{Deserialize, Serialize};

use crate::error::{MolvaultError, Result};

/// Rows buffered before all artifacts flush together
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Environment override for the default batch size
pub const BATCH_SIZE_ENV: &str = "MOLVAULT_BATCH_SIZE";

/// Generator list used when none is given
pub const DEFAULT_DESCRIPTORS: &str = "Basic2D";

/// Default batch size, honoring `MOLVAULT_BATCH_SIZE`
pub fn default_batch_size() -> usize {
    std::env::var(BATCH_SIZE_ENV)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .filter(|&n: &usize| n > 0)
        .unwrap_or(DEFAULT_BATCH_SIZE)
}

/// Split a comma-separated generator list, dropping blanks
pub fn parse_descriptor_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// How input lines are split into fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFormat {
    /// Skip the first non-blank line
    pub has_header: bool,
    /// Field holding the entity text
    pub smiles_column: usize,
    /// Field holding the name; `None` names rows by ordinal
    pub name_column: Option<usize>,
    /// Field separator; `None` splits on runs of whitespace
    pub separator: Option<String>,
}

impl Default for InputFormat {
    fn default() -> Self {
        Self {
            has_header: false,
            smiles_column: 0,
            name_column: Some(1),
            separator: None,
        }
    }
}

impl InputFormat {
    pub fn split<'a>(&self, line: &'a str) -> Vec<&'a str> {
        match self.separator.as_deref() {
            Some(sep) => line.split(sep).collect(),
            None => line.split_whitespace().collect(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name_column == Some(self.smiles_column) {
            return Err(MolvaultError::config(format!(
                "name column and smiles column are both {}",
                self.smiles_column
            )));
        }
        if self.separator.as_deref() == Some("") {
            return Err(MolvaultError::config("separator must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    pub input: InputFormat,
    pub batch_size: usize,
    /// Generator names, concatenated left to right
    pub descriptors: Vec<String>,
    pub index_structures: bool,
    /// Descriptor worker threads; `None` uses the rayon default
    pub threads: Option<usize>,
    /// Replace an existing store at the target path
    #[serde(default)]
    pub overwrite: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            input: InputFormat::default(),
            batch_size: default_batch_size(),
            descriptors: parse_descriptor_list(DEFAULT_DESCRIPTORS),
            index_structures: true,
            threads: None,
            overwrite: false,
        }
    }
}

impl BuildOptions {
    pub fn with_descriptors(mut self, list: &str) -> Self {
        self.descriptors = parse_descriptor_list(list);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_structure_index(mut self, enabled: bool) -> Self {
        self.index_structures = enabled;
        self
    }

    /// Checks that need no registry or filesystem
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(MolvaultError::config("batch size must be at least 1"));
        }
        if self.descriptors.is_empty() {
            return Err(MolvaultError::config("no descriptor generators requested"));
        }
        if self.threads == Some(0) {
            return Err(MolvaultError::config("thread count must be at least 1"));
        }
        self.input.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_list_parsing() {
        assert_eq!(parse_descriptor_list("Basic2D, Mass,,"), vec!["Basic2D", "Mass"]);
        assert!(parse_descriptor_list(" , ").is_empty());
    }

    #[test]
    fn test_split_modes() {
        let ws = InputFormat::default();
        assert_eq!(ws.split("c1ccccc1 \t benzene"), vec!["c1ccccc1", "benzene"]);

        let csv = InputFormat {
            separator: Some(",".into()),
            ..InputFormat::default()
        };
        assert_eq!(csv.split("CCO,,x"), vec!["CCO", "", "x"]);
    }

    #[test]
    fn test_validate_rejects_bad_options() {
        assert!(BuildOptions::default().validate().is_ok());
        assert!(BuildOptions::default().with_batch_size(0).validate().is_err());
        assert!(BuildOptions::default().with_descriptors(",").validate().is_err());

        let mut same_columns = BuildOptions::default();
        same_columns.input.name_column = Some(0);
        assert!(matches!(
            same_columns.validate(),
            Err(MolvaultError::Configuration(_))
        ));
    }

    #[test]
    fn test_options_serde() {
        let opts = BuildOptions::default().with_descriptors("Mass,Rings");
        let json = serde_json::to_string(&opts).unwrap();
        let back: BuildOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, opts);
    }
}
