//! Molecules as store entities
//!
//! [`SmilesCodec`] decodes SMILES text with `molvault-chem`, archives the
//! parsed graph with bincode and keys it with the structural key. The
//! standard registry exposes the 2D descriptors the CLI knows by name.

use molvault_chem::properties::{self, RingCounts};
use molvault_chem::{smiles, structural_key, Molecule};

use crate::entity::EntityCodec;
use crate::error::RowError;
use crate::generators::{FnGenerator, GeneratorRegistry};

#[derive(Debug, Clone, Copy, Default)]
pub struct SmilesCodec;

impl EntityCodec for SmilesCodec {
    type Entity = Molecule;

    fn decode(&self, text: &str) -> Result<Molecule, RowError> {
        smiles::parse(text).map_err(|e| RowError::Decode(format!("{:?}: {}", text, e)))
    }

    fn serialize(&self, mol: &Molecule) -> Result<Vec<u8>, RowError> {
        bincode::serialize(mol).map_err(|e| RowError::Serialize(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Molecule, RowError> {
        bincode::deserialize(bytes).map_err(|e| RowError::Decode(e.to_string()))
    }

    fn structural_key(&self, mol: &Molecule) -> Result<String, RowError> {
        if mol.is_empty() {
            return Err(RowError::StructuralKey("molecule has no atoms".to_string()));
        }
        Ok(structural_key(mol))
    }
}

/// Whole-molecule 2D descriptor fields known to the standard generators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    ExactMolWt,
    HeavyAtomCount,
    NumHeteroatoms,
    RingCount,
    NumAliphaticRings,
    NumAromaticRings,
    NumAromaticCarbocycles,
    NumAromaticHeterocycles,
}

impl Field {
    fn name(self) -> &'static str {
        match self {
            Field::ExactMolWt => "ExactMolWt",
            Field::HeavyAtomCount => "HeavyAtomCount",
            Field::NumHeteroatoms => "NumHeteroatoms",
            Field::RingCount => "RingCount",
            Field::NumAliphaticRings => "NumAliphaticRings",
            Field::NumAromaticRings => "NumAromaticRings",
            Field::NumAromaticCarbocycles => "NumAromaticCarbocycles",
            Field::NumAromaticHeterocycles => "NumAromaticHeterocycles",
        }
    }

    fn value(self, mol: &Molecule, rings: &RingCounts) -> f64 {
        match self {
            Field::ExactMolWt => properties::exact_mol_wt(mol),
            Field::HeavyAtomCount => properties::heavy_atom_count(mol) as f64,
            Field::NumHeteroatoms => properties::num_heteroatoms(mol) as f64,
            Field::RingCount => rings.rings as f64,
            Field::NumAliphaticRings => rings.aliphatic as f64,
            Field::NumAromaticRings => rings.aromatic as f64,
            Field::NumAromaticCarbocycles => rings.aromatic_carbocycles as f64,
            Field::NumAromaticHeterocycles => rings.aromatic_heterocycles as f64,
        }
    }
}

const BASIC_2D: &[Field] = &[
    Field::ExactMolWt,
    Field::HeavyAtomCount,
    Field::NumHeteroatoms,
    Field::RingCount,
    Field::NumAliphaticRings,
    Field::NumAromaticRings,
    Field::NumAromaticCarbocycles,
    Field::NumAromaticHeterocycles,
];

const BASIC_2D_SUBSET: &[Field] = &[
    Field::ExactMolWt,
    Field::NumAliphaticRings,
    Field::NumAromaticCarbocycles,
    Field::NumAromaticHeterocycles,
    Field::NumAromaticRings,
];

const RINGS: &[Field] = &[
    Field::RingCount,
    Field::NumAliphaticRings,
    Field::NumAromaticRings,
];

fn fields_generator(name: &str, fields: &'static [Field]) -> FnGenerator<Molecule> {
    let names: Vec<&str> = fields.iter().map(|f| f.name()).collect();
    FnGenerator::new(name, &names, move |mol: &Molecule| {
        if mol.is_empty() {
            return Err("molecule has no atoms".to_string());
        }
        let rings = properties::ring_counts(mol);
        Ok(fields.iter().map(|f| f.value(mol, &rings)).collect())
    })
}

/// `Basic2D`, `Basic2DSubset`, `Mass` and `Rings`
pub fn standard_registry() -> crate::error::Result<GeneratorRegistry<Molecule>> {
    let mut registry = GeneratorRegistry::new();
    registry.register(fields_generator("Basic2D", BASIC_2D))?;
    registry.register(fields_generator("Basic2DSubset", BASIC_2D_SUBSET))?;
    registry.register(fields_generator("Mass", &[Field::ExactMolWt]))?;
    registry.register(fields_generator("Rings", RINGS))?;
    Ok(registry)
}
