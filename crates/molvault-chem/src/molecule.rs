//! In-memory molecule graph

use serde::{Deserialize, Serialize};

use crate::element;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondOrder {
    /// Contribution to an atom's valence (aromatic bonds count as one)
    pub fn valence(self) -> u8 {
        match self {
            BondOrder::Single | BondOrder::Aromatic => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
        }
    }

    pub(crate) fn code(self) -> u8 {
        match self {
            BondOrder::Single => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
            BondOrder::Aromatic => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Atom {
    /// Atomic number
    pub element: u8,
    pub aromatic: bool,
    pub isotope: Option<u16>,
    pub charge: i8,
    /// Attached hydrogens (implicit plus bracket count)
    pub hydrogens: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bond {
    pub begin: usize,
    pub end: usize,
    pub order: BondOrder,
}

impl Bond {
    /// The atom on the other side of `atom`
    pub fn other(&self, atom: usize) -> usize {
        if self.begin == atom {
            self.end
        } else {
            self.begin
        }
    }
}

/// A parsed molecule: atoms plus bonds, hydrogens folded into their heavy atoms
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Molecule {
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
}

impl Molecule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_atom(&mut self, atom: Atom) -> usize {
        self.atoms.push(atom);
        self.atoms.len() - 1
    }

    pub fn add_bond(&mut self, begin: usize, end: usize, order: BondOrder) -> usize {
        self.bonds.push(Bond { begin, end, order });
        self.bonds.len() - 1
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub(crate) fn atoms_mut(&mut self) -> &mut [Atom] {
        &mut self.atoms
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn has_bond(&self, a: usize, b: usize) -> bool {
        self.bonds
            .iter()
            .any(|bond| (bond.begin == a && bond.end == b) || (bond.begin == b && bond.end == a))
    }

    /// Per-atom `(neighbor, bond index)` lists
    pub fn adjacency(&self) -> Vec<Vec<(usize, usize)>> {
        let mut adj = vec![Vec::new(); self.atoms.len()];
        for (i, bond) in self.bonds.iter().enumerate() {
            adj[bond.begin].push((bond.end, i));
            adj[bond.end].push((bond.begin, i));
        }
        adj
    }

    /// Sum of bond valences around `atom`, saturating
    pub fn bond_valence(&self, atom: usize) -> u8 {
        self.bonds
            .iter()
            .filter(|b| b.begin == atom || b.end == atom)
            .fold(0u8, |used, b| used.saturating_add(b.order.valence()))
    }

    /// Connected components (atom index lists)
    pub fn components(&self) -> Vec<Vec<usize>> {
        let adj = self.adjacency();
        let mut seen = vec![false; self.atoms.len()];
        let mut out = Vec::new();
        for start in 0..self.atoms.len() {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            let mut stack = vec![start];
            let mut component = Vec::new();
            while let Some(a) = stack.pop() {
                component.push(a);
                for &(n, _) in &adj[a] {
                    if !seen[n] {
                        seen[n] = true;
                        stack.push(n);
                    }
                }
            }
            component.sort_unstable();
            out.push(component);
        }
        out
    }

    /// Net formal charge
    pub fn total_charge(&self) -> i32 {
        self.atoms.iter().map(|a| a.charge as i32).sum()
    }

    /// Hill-order molecular formula, e.g. `C7H8`
    pub fn formula(&self) -> String {
        let mut counts: std::collections::BTreeMap<&'static str, usize> = Default::default();
        let mut carbon = 0usize;
        let mut hydrogen = 0usize;
        for atom in &self.atoms {
            hydrogen += atom.hydrogens as usize;
            match atom.element {
                element::CARBON => carbon += 1,
                element::HYDROGEN => hydrogen += 1,
                n => {
                    let symbol = element::by_number(n).map(|e| e.symbol).unwrap_or("X");
                    *counts.entry(symbol).or_default() += 1;
                }
            }
        }

        let mut out = String::new();
        let mut push = |symbol: &str, n: usize| {
            if n == 1 {
                out.push_str(symbol);
            } else if n > 1 {
                out.push_str(&format!("{}{}", symbol, n));
            }
        };
        if carbon > 0 {
            push("C", carbon);
            push("H", hydrogen);
            for (symbol, n) in &counts {
                push(symbol, *n);
            }
        } else {
            counts.insert("H", hydrogen);
            for (symbol, n) in &counts {
                push(symbol, *n);
            }
        }
        out
    }
}
