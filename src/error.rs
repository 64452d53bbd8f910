//! Error types
//!
//! Storage modules have their own error enums; at the store boundary they fold
//! into [`MolvaultError`]. Per-row failures during a build are [`RowError`]s:
//! they are recorded in the build report and never abort the build.

use std::fmt;
use std::io;

use thiserror::Error;

use molvault_core::archive::ArchiveError;
use molvault_core::format::FormatError;
use molvault_core::store::StoreError;
use molvault_core::table::TableError;

/// Which index a failed lookup went to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Name,
    StructuralKey,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Name => f.write_str("name"),
            KeyKind::StructuralKey => f.write_str("structural key"),
        }
    }
}

#[derive(Error, Debug)]
pub enum MolvaultError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Corrupt store: {0}")]
    Corrupt(String),

    #[error("{kind} not found: {key:?}")]
    NotFound { kind: KeyKind, key: String },

    #[error("Row out of range: {ordinal} >= {count}")]
    OutOfRange { ordinal: u64, count: u64 },

    #[error("Store was built without a structure index")]
    NotIndexed,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MolvaultError>;

impl MolvaultError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        MolvaultError::Configuration(msg.into())
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        MolvaultError::Corrupt(msg.into())
    }
}

impl From<FormatError> for MolvaultError {
    fn from(e: FormatError) -> Self {
        match e {
            FormatError::Io(e) => MolvaultError::Io(e),
            other => MolvaultError::Corrupt(format!("descriptor column: {}", other)),
        }
    }
}

impl From<StoreError> for MolvaultError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Io(e) => MolvaultError::Io(e),
            StoreError::Format(e) => e.into(),
            StoreError::OutOfRange { index, count } => MolvaultError::OutOfRange {
                ordinal: index as u64,
                count: count as u64,
            },
            other => MolvaultError::Corrupt(format!("descriptor column: {}", other)),
        }
    }
}

impl From<ArchiveError> for MolvaultError {
    fn from(e: ArchiveError) -> Self {
        match e {
            ArchiveError::Io(e) => MolvaultError::Io(e),
            ArchiveError::OutOfRange { index, count } => MolvaultError::OutOfRange {
                ordinal: index as u64,
                count: count as u64,
            },
            ArchiveError::Invalid(msg) => MolvaultError::Corrupt(format!("entity archive: {}", msg)),
        }
    }
}

impl From<TableError> for MolvaultError {
    fn from(e: TableError) -> Self {
        match e {
            TableError::Io(e) => MolvaultError::Io(e),
            other => MolvaultError::Corrupt(format!("key table: {}", other)),
        }
    }
}

/// Why one input row was left out of the store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowError {
    #[error("line has {found} fields, column {needed} requested")]
    MissingField { needed: usize, found: usize },

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("structural key failed: {0}")]
    StructuralKey(String),

    #[error("generator {generator} failed: {reason}")]
    Generator { generator: String, reason: String },

    #[error("generator {generator} returned {actual} values, expected {expected}")]
    Arity {
        generator: String,
        expected: usize,
        actual: usize,
    },

    #[error("serialization failed: {0}")]
    Serialize(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_fold_into_taxonomy() {
        let e: MolvaultError = StoreError::OutOfRange { index: 3, count: 2 }.into();
        assert!(matches!(e, MolvaultError::OutOfRange { ordinal: 3, count: 2 }));

        let e: MolvaultError = FormatError::InvalidMagic.into();
        assert!(matches!(e, MolvaultError::Corrupt(_)));

        let e: MolvaultError = TableError::Corrupt("bad".into()).into();
        assert!(matches!(e, MolvaultError::Corrupt(_)));

        let e: MolvaultError = ArchiveError::Io(io::Error::new(io::ErrorKind::Other, "x")).into();
        assert!(matches!(e, MolvaultError::Io(_)));
    }

    #[test]
    fn test_not_found_message() {
        let e = MolvaultError::NotFound {
            kind: KeyKind::Name,
            key: "aspirin".into(),
        };
        assert_eq!(e.to_string(), "name not found: \"aspirin\"");
    }
}
