//! Ring perception
//!
//! Computes a smallest set of smallest rings (SSSR). Candidates are the
//! shortest cycle through every ring bond; they are taken smallest first and
//! kept while they stay linearly independent over GF(2), until the cycle rank
//! `E - V + C` is reached.

use std::collections::{HashSet, VecDeque};

use crate::element;
use crate::molecule::{BondOrder, Molecule};

/// One ring as atom and bond index lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ring {
    pub atoms: Vec<usize>,
    pub bonds: Vec<usize>,
}

impl Ring {
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }
}

/// Ring membership summary for one molecule
#[derive(Debug, Clone, Default)]
pub struct RingInfo {
    rings: Vec<Ring>,
}

impl RingInfo {
    pub fn perceive(mol: &Molecule) -> Self {
        Self {
            rings: sssr(mol),
        }
    }

    pub fn rings(&self) -> &[Ring] {
        &self.rings
    }

    pub fn count(&self) -> usize {
        self.rings.len()
    }

    /// Every bond of the ring is aromatic
    pub fn is_aromatic(&self, mol: &Molecule, ring: &Ring) -> bool {
        ring.bonds
            .iter()
            .all(|&b| mol.bonds()[b].order == BondOrder::Aromatic)
    }

    /// Every atom of the ring is carbon
    pub fn is_carbocycle(&self, mol: &Molecule, ring: &Ring) -> bool {
        ring.atoms
            .iter()
            .all(|&a| mol.atoms()[a].element == element::CARBON)
    }
}

fn cycle_rank(mol: &Molecule) -> usize {
    let components = mol.components().len();
    (mol.bond_count() + components).saturating_sub(mol.atom_count())
}

/// Shortest path from `from` to `to` that does not use bond `skip`,
/// returned as (atoms, bonds)
fn shortest_path(
    adj: &[Vec<(usize, usize)>],
    from: usize,
    to: usize,
    skip: usize,
) -> Option<(Vec<usize>, Vec<usize>)> {
    let mut parent: Vec<Option<(usize, usize)>> = vec![None; adj.len()];
    let mut seen = vec![false; adj.len()];
    let mut queue = VecDeque::new();
    seen[from] = true;
    queue.push_back(from);

    while let Some(a) = queue.pop_front() {
        if a == to {
            break;
        }
        for &(n, b) in &adj[a] {
            if b == skip || seen[n] {
                continue;
            }
            seen[n] = true;
            parent[n] = Some((a, b));
            queue.push_back(n);
        }
    }

    if !seen[to] {
        return None;
    }
    let mut atoms = vec![to];
    let mut bonds = Vec::new();
    let mut cur = to;
    while let Some((p, b)) = parent[cur] {
        atoms.push(p);
        bonds.push(b);
        cur = p;
    }
    Some((atoms, bonds))
}

/// Bond incidence vector over GF(2)
fn bond_bits(bonds: &[usize], n_bonds: usize) -> Vec<u64> {
    let mut bits = vec![0u64; n_bonds.div_ceil(64)];
    for &b in bonds {
        bits[b / 64] ^= 1u64 << (b % 64);
    }
    bits
}

/// Reduce `v` against `basis` (kept in echelon form by leading bit); true if independent
fn insert_independent(basis: &mut Vec<Vec<u64>>, mut v: Vec<u64>) -> bool {
    for row in basis.iter() {
        let lead = leading_bit(row);
        if let Some(bit) = lead {
            if v[bit / 64] & (1u64 << (bit % 64)) != 0 {
                for (x, y) in v.iter_mut().zip(row) {
                    *x ^= y;
                }
            }
        }
    }
    if leading_bit(&v).is_none() {
        return false;
    }
    basis.push(v);
    true
}

fn leading_bit(v: &[u64]) -> Option<usize> {
    v.iter()
        .enumerate()
        .find(|(_, w)| **w != 0)
        .map(|(i, w)| i * 64 + w.trailing_zeros() as usize)
}

fn sssr(mol: &Molecule) -> Vec<Ring> {
    let rank = cycle_rank(mol);
    if rank == 0 {
        return Vec::new();
    }

    let adj = mol.adjacency();
    let mut seen: HashSet<Vec<u64>> = HashSet::new();
    let mut candidates = Vec::new();
    for (b, bond) in mol.bonds().iter().enumerate() {
        if let Some((atoms, mut bonds)) = shortest_path(&adj, bond.end, bond.begin, b) {
            bonds.push(b);
            let bits = bond_bits(&bonds, mol.bond_count());
            if seen.insert(bits.clone()) {
                candidates.push((Ring { atoms, bonds }, bits));
            }
        }
    }
    candidates.sort_by_key(|(ring, _)| ring.len());

    let mut basis = Vec::new();
    let mut rings = Vec::with_capacity(rank);
    for (ring, bits) in candidates {
        if rings.len() == rank {
            break;
        }
        if insert_independent(&mut basis, bits) {
            rings.push(ring);
        }
    }
    rings
}
