//! Structural keys
//!
//! A structural key collapses molecules that are the same graph regardless of
//! how the SMILES was written. Atoms are labelled with their invariants and
//! refined Weisfeiler-Lehman style over their neighbourhoods; the sorted label
//! multiset is digested with SHA-256 and printed in a 27-character
//! `XXXXXXXXXXXXXX-YYYYYYYYYY-Z` shape:
//!
//! - block 1 (14): heavy-atom skeleton (elements and bond orders)
//! - block 2 (10): full labels (hydrogens, charges, isotopes, aromaticity)
//! - block 3 (1):  net charge, `N` for neutral
//!
//! Refinement is not a canonical labelling, so distinct graphs that WL cannot
//! tell apart (some highly regular cages) share a key.

use sha2::{Digest, Sha256};

use crate::molecule::Molecule;

/// Upper bound on refinement rounds
const MAX_ROUNDS: usize = 32;

fn digest64(bytes: &[u8]) -> u64 {
    let hash = Sha256::digest(bytes);
    u64::from_le_bytes(hash[0..8].try_into().unwrap())
}

fn refine(mol: &Molecule, mut labels: Vec<u64>) -> Vec<u64> {
    let adj = mol.adjacency();
    let rounds = mol.atom_count().clamp(1, MAX_ROUNDS);

    let mut buf = Vec::new();
    for _ in 0..rounds {
        let next: Vec<u64> = (0..labels.len())
            .map(|i| {
                let mut around: Vec<(u8, u64)> = adj[i]
                    .iter()
                    .map(|&(n, b)| (mol.bonds()[b].order.code(), labels[n]))
                    .collect();
                around.sort_unstable();

                buf.clear();
                buf.extend_from_slice(&labels[i].to_le_bytes());
                for (order, label) in around {
                    buf.push(order);
                    buf.extend_from_slice(&label.to_le_bytes());
                }
                digest64(&buf)
            })
            .collect();
        labels = next;
    }
    labels
}

fn graph_digest(mol: &Molecule, labels: Vec<u64>) -> [u8; 32] {
    let mut labels = refine(mol, labels);
    labels.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update((mol.atom_count() as u64).to_le_bytes());
    hasher.update((mol.bond_count() as u64).to_le_bytes());
    for label in labels {
        hasher.update(label.to_le_bytes());
    }
    hasher.finalize().into()
}

fn letters(bytes: &[u8], n: usize) -> String {
    bytes
        .iter()
        .take(n)
        .map(|b| (b'A' + b % 26) as char)
        .collect()
}

fn charge_letter(charge: i32) -> char {
    (b'N' as i32 + charge).clamp(b'A' as i32, b'Z' as i32) as u8 as char
}

/// Structural key of a molecule
pub fn structural_key(mol: &Molecule) -> String {
    let skeleton: Vec<u64> = mol
        .atoms()
        .iter()
        .map(|a| digest64(&[a.element]))
        .collect();
    let full: Vec<u64> = mol
        .atoms()
        .iter()
        .map(|a| {
            let isotope = a.isotope.unwrap_or(0).to_le_bytes();
            digest64(&[
                a.element,
                a.aromatic as u8,
                a.hydrogens,
                a.charge as u8,
                isotope[0],
                isotope[1],
            ])
        })
        .collect();

    format!(
        "{}-{}-{}",
        letters(&graph_digest(mol, skeleton), 14),
        letters(&graph_digest(mol, full), 10),
        charge_letter(mol.total_charge())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::parse;

    fn key(smiles: &str) -> String {
        structural_key(&parse(smiles).unwrap())
    }

    #[test]
    fn test_key_shape() {
        let k = key("c1ccccc1");
        assert_eq!(k.len(), 27);
        let blocks: Vec<_> = k.split('-').collect();
        assert_eq!(blocks.iter().map(|b| b.len()).collect::<Vec<_>>(), vec![14, 10, 1]);
        assert!(k.chars().all(|c| c == '-' || c.is_ascii_uppercase()));
        assert!(k.ends_with("-N"));
    }

    #[test]
    fn test_key_ignores_atom_order() {
        assert_eq!(key("CCO"), key("OCC"));
        assert_eq!(key("Cc1ccccc1"), key("c1ccccc1C"));
        assert_eq!(key("c1ccncc1"), key("n1ccccc1"));
        assert_eq!(key("CC(C)O"), key("OC(C)C"));
    }

    #[test]
    fn test_key_separates_structures() {
        let keys: Vec<_> = (0..10)
            .map(|i| key(&format!("{}c1ccccc1", "C".repeat(i))))
            .collect();
        let unique: std::collections::HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), 10);

        assert_ne!(key("CCO"), key("COC"));
        assert_ne!(key("c1ccncc1"), key("c1ccccc1"));
    }

    #[test]
    fn test_key_charge_block() {
        assert!(key("CC(=O)[O-]").ends_with("-M"));
        assert!(key("C[NH3+]").ends_with("-O"));
        // same skeleton, different protonation
        assert_eq!(key("CC(=O)[O-]")[..14], key("CC(=O)O")[..14]);
    }
}
