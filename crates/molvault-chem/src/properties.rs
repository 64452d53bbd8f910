//! Whole-molecule 2D properties

use crate::element::{self, ELECTRON_MASS};
use crate::molecule::Molecule;
use crate::rings::RingInfo;

/// Monoisotopic mass including implicit hydrogens, corrected for net charge
pub fn exact_mol_wt(mol: &Molecule) -> f64 {
    let hydrogen = element::atom_mass(element::HYDROGEN, None);
    let mass: f64 = mol
        .atoms()
        .iter()
        .map(|a| element::atom_mass(a.element, a.isotope) + a.hydrogens as f64 * hydrogen)
        .sum();
    mass - mol.total_charge() as f64 * ELECTRON_MASS
}

pub fn heavy_atom_count(mol: &Molecule) -> usize {
    mol.atoms()
        .iter()
        .filter(|a| a.element != element::HYDROGEN)
        .count()
}

/// Atoms that are neither carbon nor hydrogen
pub fn num_heteroatoms(mol: &Molecule) -> usize {
    mol.atoms()
        .iter()
        .filter(|a| a.element != element::HYDROGEN && a.element != element::CARBON)
        .count()
}

/// Ring counts derived from one SSSR pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingCounts {
    pub rings: usize,
    pub aliphatic: usize,
    pub aromatic: usize,
    pub aromatic_carbocycles: usize,
    pub aromatic_heterocycles: usize,
}

pub fn ring_counts(mol: &Molecule) -> RingCounts {
    let info = RingInfo::perceive(mol);
    let mut counts = RingCounts {
        rings: info.count(),
        ..Default::default()
    };
    for ring in info.rings() {
        if info.is_aromatic(mol, ring) {
            counts.aromatic += 1;
            if info.is_carbocycle(mol, ring) {
                counts.aromatic_carbocycles += 1;
            } else {
                counts.aromatic_heterocycles += 1;
            }
        } else {
            counts.aliphatic += 1;
        }
    }
    counts
}
