//! molvault-core – Storage engine for descriptor stores
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │        NameIndex (unique)      StructureIndex (multi)       │
//! │            sorted key tables, spill-and-merge built         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ColumnStore (mmap .col, fixed width)  │  ArchiveReader     │
//! │  zero-copy f64 rows                    │  arena + offsets   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every artifact is addressed by the same dense row ordinal.

pub mod archive;
pub mod format;
pub mod name_index;
pub mod store;
pub mod structure_index;
pub mod table;

pub use archive::{ArchiveReader, ArchiveWriter};
pub use format::{ColumnHeader, ColumnWriter};
pub use name_index::{NameIndex, NameIndexWriter};
pub use store::ColumnStore;
pub use structure_index::{StructureIndex, StructureIndexWriter};
pub use table::{Duplicate, TableKind, TableSummary};
