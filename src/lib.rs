//! molvault: a persistent descriptor store for molecules
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 StoreBuilder (one pass, batched)            │
//! │     decode ─▶ structural key ─▶ generators (rayon) ─▶ append│
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  descriptors.col  entities.bin/.off  names.idx  structures  │
//! │                    manifest.json (commit)                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    MolStore (mmap, read-only)               │
//! │        name / structural key / ordinal ─▶ row, entity       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Storage primitives live in `molvault-core`; the molecule model behind the
//! default codec and generators lives in `molvault-chem`.

pub mod builder;
pub mod chem;
pub mod config;
pub mod entity;
pub mod error;
pub mod generators;
pub mod input;
pub mod layout;
pub mod manifest;
pub mod reader;
pub mod schema;

pub use builder::{BuildReport, SkippedRow, StoreBuilder};
pub use chem::{standard_registry, SmilesCodec};
pub use config::{BuildOptions, InputFormat};
pub use entity::EntityCodec;
pub use error::{KeyKind, MolvaultError, Result, RowError};
pub use generators::{CompositeGenerator, DescriptorGenerator, FnGenerator, GeneratorRegistry};
pub use manifest::StoreManifest;
pub use reader::MolStore;
pub use schema::{DescriptorSchema, SchemaEntry};
