//! Descriptor generators
//!
//! A generator has a name, a fixed list of field names and a `compute` that
//! maps an entity to exactly that many values. Generators are registered by
//! name in a [`GeneratorRegistry`] and resolved once, at build start, into a
//! [`GeneratorSet`] that produces the concatenated wide row.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::error::{MolvaultError, Result, RowError};
use crate::schema::{DescriptorSchema, SchemaEntry};

pub trait DescriptorGenerator<E>: Send + Sync {
    fn name(&self) -> &str;

    fn field_names(&self) -> &[String];

    fn arity(&self) -> usize {
        self.field_names().len()
    }

    /// Exactly `arity()` values for `entity`
    fn compute(&self, entity: &E) -> std::result::Result<Vec<f64>, RowError>;
}

type ComputeFn<E> = dyn Fn(&E) -> std::result::Result<Vec<f64>, String> + Send + Sync;

/// Generator backed by a closure
pub struct FnGenerator<E> {
    name: String,
    fields: Vec<String>,
    compute: Box<ComputeFn<E>>,
}

impl<E> FnGenerator<E> {
    pub fn new<F>(name: &str, fields: &[&str], compute: F) -> Self
    where
        F: Fn(&E) -> std::result::Result<Vec<f64>, String> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            compute: Box::new(compute),
        }
    }
}

impl<E> DescriptorGenerator<E> for FnGenerator<E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn field_names(&self) -> &[String] {
        &self.fields
    }

    fn compute(&self, entity: &E) -> std::result::Result<Vec<f64>, RowError> {
        (self.compute)(entity).map_err(|reason| RowError::Generator {
            generator: self.name.clone(),
            reason,
        })
    }
}

/// Run `generator` and check it produced its declared arity
fn compute_checked<E>(
    generator: &dyn DescriptorGenerator<E>,
    entity: &E,
) -> std::result::Result<Vec<f64>, RowError> {
    let values = generator.compute(entity)?;
    if values.len() != generator.arity() {
        return Err(RowError::Arity {
            generator: generator.name().to_string(),
            expected: generator.arity(),
            actual: values.len(),
        });
    }
    Ok(values)
}

/// A named generator made of others, outputs concatenated in order
pub struct CompositeGenerator<E> {
    name: String,
    parts: Vec<Arc<dyn DescriptorGenerator<E>>>,
    fields: Vec<String>,
}

impl<E> CompositeGenerator<E> {
    pub fn new(name: &str, parts: Vec<Arc<dyn DescriptorGenerator<E>>>) -> Self {
        let fields = parts
            .iter()
            .flat_map(|p| p.field_names().iter().cloned())
            .collect();
        Self {
            name: name.to_string(),
            parts,
            fields,
        }
    }
}

impl<E> DescriptorGenerator<E> for CompositeGenerator<E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn field_names(&self) -> &[String] {
        &self.fields
    }

    fn compute(&self, entity: &E) -> std::result::Result<Vec<f64>, RowError> {
        let mut out = Vec::with_capacity(self.fields.len());
        for part in &self.parts {
            out.extend(compute_checked(part.as_ref(), entity)?);
        }
        Ok(out)
    }
}

/// Name to generator map, populated explicitly
pub struct GeneratorRegistry<E> {
    generators: BTreeMap<String, Arc<dyn DescriptorGenerator<E>>>,
}

impl<E> Default for GeneratorRegistry<E> {
    fn default() -> Self {
        Self {
            generators: BTreeMap::new(),
        }
    }
}

impl<E: 'static> GeneratorRegistry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a generator; names must be unique within a registry
    pub fn register<G>(&mut self, generator: G) -> Result<()>
    where
        G: DescriptorGenerator<E> + 'static,
    {
        self.register_arc(Arc::new(generator))
    }

    pub fn register_arc(&mut self, generator: Arc<dyn DescriptorGenerator<E>>) -> Result<()> {
        let name = generator.name().to_string();
        if self.generators.contains_key(&name) {
            return Err(MolvaultError::config(format!(
                "generator {:?} registered twice",
                name
            )));
        }
        self.generators.insert(name, generator);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn DescriptorGenerator<E>>> {
        self.generators.get(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.generators.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    /// Resolve an ordered generator list into a row producer.
    ///
    /// Unknown names, an empty list, zero-arity generators and generators with
    /// repeated field names are configuration errors. The same generator may
    /// appear more than once; its values are then repeated in the row.
    pub fn resolve(&self, names: &[String]) -> Result<GeneratorSet<E>> {
        if names.is_empty() {
            return Err(MolvaultError::config("no descriptor generators requested"));
        }

        let mut generators = Vec::with_capacity(names.len());
        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            let generator = self.get(name).ok_or_else(|| {
                MolvaultError::config(format!(
                    "unknown descriptor generator {:?} (available: {})",
                    name,
                    self.names().join(", ")
                ))
            })?;

            let fields = generator.field_names();
            if fields.is_empty() {
                return Err(MolvaultError::config(format!(
                    "generator {:?} has no fields",
                    name
                )));
            }
            let mut seen = HashSet::new();
            if let Some(dup) = fields.iter().find(|f| !seen.insert(f.as_str())) {
                return Err(MolvaultError::config(format!(
                    "generator {:?} declares field {:?} twice",
                    name, dup
                )));
            }

            entries.push(SchemaEntry {
                generator: name.clone(),
                fields: fields.to_vec(),
                arity: fields.len(),
            });
            generators.push(Arc::clone(generator));
        }

        Ok(GeneratorSet {
            schema: DescriptorSchema { entries },
            generators,
        })
    }
}

/// Generators resolved for one build, in row order
pub struct GeneratorSet<E> {
    schema: DescriptorSchema,
    generators: Vec<Arc<dyn DescriptorGenerator<E>>>,
}

impl<E> GeneratorSet<E> {
    pub fn schema(&self) -> &DescriptorSchema {
        &self.schema
    }

    pub fn width(&self) -> usize {
        self.schema.width()
    }

    /// The full descriptor row for one entity
    pub fn compute_row(&self, entity: &E) -> std::result::Result<Vec<f64>, RowError> {
        let mut row = Vec::with_capacity(self.width());
        for generator in &self.generators {
            row.extend(compute_checked(generator.as_ref(), entity)?);
        }
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> GeneratorRegistry<i64> {
        let mut reg = GeneratorRegistry::new();
        reg.register(FnGenerator::new("Pair", &["x", "x2"], |v: &i64| {
            Ok(vec![*v as f64, (*v * *v) as f64])
        }))
        .unwrap();
        reg.register(FnGenerator::new("Neg", &["neg"], |v: &i64| {
            if *v < 0 {
                Err("negative".to_string())
            } else {
                Ok(vec![-*v as f64])
            }
        }))
        .unwrap();
        reg.register(FnGenerator::new("Liar", &["a", "b"], |_: &i64| Ok(vec![1.0])))
            .unwrap();
        reg.register(FnGenerator::new("Empty", &[], |_: &i64| Ok(vec![])))
            .unwrap();
        reg.register(FnGenerator::new("Twice", &["a", "a"], |_: &i64| Ok(vec![0.0, 0.0])))
            .unwrap();
        reg
    }

    fn names(list: &str) -> Vec<String> {
        crate::config::parse_descriptor_list(list)
    }

    #[test]
    fn test_resolve_and_concatenate() {
        let set = registry().resolve(&names("Pair,Neg")).unwrap();
        assert_eq!(set.width(), 3);
        assert_eq!(set.compute_row(&3).unwrap(), vec![3.0, 9.0, -3.0]);
        assert_eq!(
            set.schema().qualified_field_names(),
            vec!["Pair.x", "Pair.x2", "Neg.neg"]
        );
    }

    #[test]
    fn test_repeated_generator_doubles_row() {
        let reg = registry();
        let single = reg.resolve(&names("Pair")).unwrap();
        let double = reg.resolve(&names("Pair,Pair")).unwrap();
        assert_eq!(double.width(), 2 * single.width());

        let one = single.compute_row(&5).unwrap();
        let two = double.compute_row(&5).unwrap();
        assert_eq!(two, [one.clone(), one].concat());
    }

    #[test]
    fn test_resolve_errors() {
        let reg = registry();
        for bad in ["Nope", "Empty", "Twice", ""] {
            assert!(
                matches!(reg.resolve(&names(bad)), Err(MolvaultError::Configuration(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_row_failures() {
        let reg = registry();
        let set = reg.resolve(&names("Pair,Neg")).unwrap();
        assert!(matches!(
            set.compute_row(&-1),
            Err(RowError::Generator { .. })
        ));

        let liar = reg.resolve(&names("Liar")).unwrap();
        assert!(matches!(
            liar.compute_row(&1),
            Err(RowError::Arity { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_composite_generator() {
        let reg = registry();
        let composite = CompositeGenerator::new(
            "Both",
            vec![Arc::clone(reg.get("Pair").unwrap()), Arc::clone(reg.get("Neg").unwrap())],
        );
        assert_eq!(composite.arity(), 3);
        assert_eq!(composite.compute(&2).unwrap(), vec![2.0, 4.0, -2.0]);
    }

    #[test]
    fn test_duplicate_registration() {
        let mut reg = registry();
        let again = FnGenerator::new("Pair", &["x"], |_: &i64| Ok(vec![0.0]));
        assert!(reg.register(again).is_err());
    }
}
