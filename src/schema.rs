//! Descriptor schema: the wide-row layout of the column store

use serde::{Deserialize, Serialize};

/// One generator's slice of the row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub generator: String,
    pub fields: Vec<String>,
    pub arity: usize,
}

/// Ordered generator slices; row width is the sum of arities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorSchema {
    pub entries: Vec<SchemaEntry>,
}

impl DescriptorSchema {
    pub fn width(&self) -> usize {
        self.entries.iter().map(|e| e.arity).sum()
    }

    pub fn generator_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.generator.as_str()).collect()
    }

    /// `Generator.Field` for every column, in row order
    pub fn qualified_field_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .flat_map(|e| e.fields.iter().map(move |f| format!("{}.{}", e.generator, f)))
            .collect()
    }

    /// The schema is internally consistent
    pub fn is_consistent(&self) -> bool {
        self.entries.iter().all(|e| e.arity > 0 && e.arity == e.fields.len())
    }
}
