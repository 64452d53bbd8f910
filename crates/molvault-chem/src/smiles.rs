//! SMILES reader
//!
//! Supports the organic subset, bracket atoms (isotope, chirality marks, H
//! count, charge, atom class), branches, ring closures including `%nn`, explicit
//! bond symbols and `.` separated components. Stereo marks are accepted and
//! dropped. No aromaticity perception is done: lowercase atoms are aromatic,
//! everything else is not.

use std::collections::HashMap;

use thiserror::Error;

use crate::element;
use crate::molecule::{Atom, BondOrder, Molecule};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SmilesError {
    #[error("empty SMILES")]
    Empty,

    #[error("unexpected character {ch:?} at position {pos}")]
    Unexpected { ch: char, pos: usize },

    #[error("unknown element {symbol:?} at position {pos}")]
    UnknownElement { symbol: String, pos: usize },

    #[error("unclosed bracket atom starting at position {0}")]
    UnclosedBracket(usize),

    #[error("unbalanced parenthesis at position {0}")]
    UnbalancedBranch(usize),

    #[error("ring closure {0} never closed")]
    UnclosedRing(u32),

    #[error("ring closure {digit} at position {pos} bonds an atom to itself or duplicates a bond")]
    InvalidRingClosure { digit: u32, pos: usize },

    #[error("bond symbol at position {0} is not followed by an atom")]
    DanglingBond(usize),

    #[error("{field} {value} at position {pos} is out of range")]
    OutOfRange {
        field: &'static str,
        value: String,
        pos: usize,
    },
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    mol: Molecule,
    /// Atoms written in brackets keep their explicit hydrogen count
    bracketed: Vec<bool>,
    prev: Option<usize>,
    branches: Vec<Option<usize>>,
    pending_bond: Option<(BondOrder, usize)>,
    rings: HashMap<u32, (usize, Option<BondOrder>)>,
}

/// Parse a SMILES string into a molecule with implicit hydrogens assigned
pub fn parse(smiles: &str) -> Result<Molecule, SmilesError> {
    let trimmed = smiles.trim();
    if trimmed.is_empty() {
        return Err(SmilesError::Empty);
    }
    let mut parser = Parser {
        chars: trimmed.chars().collect(),
        pos: 0,
        mol: Molecule::new(),
        bracketed: Vec::new(),
        prev: None,
        branches: Vec::new(),
        pending_bond: None,
        rings: HashMap::new(),
    };
    parser.run()?;
    parser.finish()
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn run(&mut self) -> Result<(), SmilesError> {
        while let Some(ch) = self.peek() {
            match ch {
                '(' => {
                    if self.prev.is_none() {
                        return Err(SmilesError::Unexpected { ch, pos: self.pos });
                    }
                    self.branches.push(self.prev);
                    self.pos += 1;
                }
                ')' => {
                    let restored = self
                        .branches
                        .pop()
                        .ok_or(SmilesError::UnbalancedBranch(self.pos))?;
                    if self.pending_bond.is_some() {
                        return Err(SmilesError::DanglingBond(self.pos));
                    }
                    self.prev = restored;
                    self.pos += 1;
                }
                '-' | '=' | '#' | ':' | '/' | '\\' => {
                    let order = match ch {
                        '=' => BondOrder::Double,
                        '#' => BondOrder::Triple,
                        ':' => BondOrder::Aromatic,
                        _ => BondOrder::Single,
                    };
                    self.pending_bond = Some((order, self.pos));
                    self.pos += 1;
                }
                '.' => {
                    if self.pending_bond.is_some() {
                        return Err(SmilesError::DanglingBond(self.pos));
                    }
                    self.prev = None;
                    self.pos += 1;
                }
                '0'..='9' | '%' => self.ring_closure()?,
                '[' => {
                    let atom = self.bracket_atom()?;
                    self.attach(atom, true);
                }
                _ => {
                    let atom = self.organic_atom()?;
                    self.attach(atom, false);
                }
            }
        }
        Ok(())
    }

    fn attach(&mut self, atom: Atom, bracketed: bool) {
        let aromatic = atom.aromatic;
        let idx = self.mol.add_atom(atom);
        self.bracketed.push(bracketed);

        if let Some(prev) = self.prev {
            let order = match self.pending_bond.take() {
                Some((order, _)) => order,
                None => self.default_order(prev, aromatic),
            };
            self.mol.add_bond(prev, idx, order);
        }
        self.pending_bond = None;
        self.prev = Some(idx);
    }

    fn default_order(&self, prev: usize, aromatic: bool) -> BondOrder {
        if aromatic && self.mol.atoms()[prev].aromatic {
            BondOrder::Aromatic
        } else {
            BondOrder::Single
        }
    }

    fn ring_closure(&mut self) -> Result<(), SmilesError> {
        let start = self.pos;
        let digit = if self.chars[self.pos] == '%' {
            let tens = self.chars.get(self.pos + 1).and_then(|c| c.to_digit(10));
            let ones = self.chars.get(self.pos + 2).and_then(|c| c.to_digit(10));
            match (tens, ones) {
                (Some(t), Some(o)) => {
                    self.pos += 3;
                    t * 10 + o
                }
                _ => return Err(SmilesError::Unexpected { ch: '%', pos: start }),
            }
        } else {
            let d = self.chars[self.pos].to_digit(10).unwrap_or(0);
            self.pos += 1;
            d
        };

        let current = self.prev.ok_or(SmilesError::Unexpected {
            ch: self.chars[start],
            pos: start,
        })?;
        let bond = self.pending_bond.take().map(|(order, _)| order);

        match self.rings.remove(&digit) {
            Some((opener, open_bond)) => {
                if opener == current || self.mol.has_bond(opener, current) {
                    return Err(SmilesError::InvalidRingClosure { digit, pos: start });
                }
                let order = bond.or(open_bond).unwrap_or_else(|| {
                    let atoms = self.mol.atoms();
                    if atoms[opener].aromatic && atoms[current].aromatic {
                        BondOrder::Aromatic
                    } else {
                        BondOrder::Single
                    }
                });
                self.mol.add_bond(opener, current, order);
            }
            None => {
                self.rings.insert(digit, (current, bond));
            }
        }
        Ok(())
    }

    fn organic_atom(&mut self) -> Result<Atom, SmilesError> {
        let pos = self.pos;
        let ch = self.chars[pos];
        let next = self.chars.get(pos + 1).copied();

        let (symbol, aromatic, len) = match (ch, next) {
            ('C', Some('l')) => ("Cl", false, 2),
            ('B', Some('r')) => ("Br", false, 2),
            ('B', _) => ("B", false, 1),
            ('C', _) => ("C", false, 1),
            ('N', _) => ("N", false, 1),
            ('O', _) => ("O", false, 1),
            ('P', _) => ("P", false, 1),
            ('S', _) => ("S", false, 1),
            ('F', _) => ("F", false, 1),
            ('I', _) => ("I", false, 1),
            ('b', _) => ("B", true, 1),
            ('c', _) => ("C", true, 1),
            ('n', _) => ("N", true, 1),
            ('o', _) => ("O", true, 1),
            ('p', _) => ("P", true, 1),
            ('s', _) => ("S", true, 1),
            _ => return Err(SmilesError::Unexpected { ch, pos }),
        };
        self.pos += len;

        let info = element::by_symbol(symbol).ok_or_else(|| SmilesError::UnknownElement {
            symbol: symbol.to_string(),
            pos,
        })?;
        Ok(Atom {
            element: info.number,
            aromatic,
            isotope: None,
            charge: 0,
            hydrogens: 0,
        })
    }

    /// Read a run of digits as `T`; a value that does not fit is an error
    fn read_number<T: std::str::FromStr>(
        &mut self,
        field: &'static str,
    ) -> Result<Option<T>, SmilesError> {
        let start = self.pos;
        while self.peek().map_or(false, |c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return Ok(None);
        }
        let digits: String = self.chars[start..self.pos].iter().collect();
        match digits.parse() {
            Ok(n) => Ok(Some(n)),
            Err(_) => Err(SmilesError::OutOfRange {
                field,
                value: digits,
                pos: start,
            }),
        }
    }

    fn bracket_atom(&mut self) -> Result<Atom, SmilesError> {
        let open = self.pos;
        self.pos += 1;

        let isotope = self.read_number::<u16>("isotope")?;

        // Element symbol: uppercase + optional lowercase, or an aromatic lowercase form
        let sym_pos = self.pos;
        let first = self.peek().ok_or(SmilesError::UnclosedBracket(open))?;
        let (symbol, aromatic) = if first.is_ascii_uppercase() {
            self.pos += 1;
            let mut symbol = first.to_string();
            if let Some(second) = self.peek().filter(|c| c.is_ascii_lowercase()) {
                let two = format!("{}{}", first, second);
                if element::by_symbol(&two).is_some() {
                    symbol = two;
                    self.pos += 1;
                }
            }
            (symbol, false)
        } else if first.is_ascii_lowercase() {
            self.pos += 1;
            let mut symbol = first.to_ascii_uppercase().to_string();
            if let Some(second) = self.peek().filter(|c| c.is_ascii_lowercase()) {
                let two = format!("{}{}", first.to_ascii_uppercase(), second);
                if matches!(two.as_str(), "Se" | "As") {
                    symbol = two;
                    self.pos += 1;
                }
            }
            (symbol, true)
        } else {
            return Err(SmilesError::Unexpected {
                ch: first,
                pos: sym_pos,
            });
        };
        let info = element::by_symbol(&symbol).ok_or_else(|| SmilesError::UnknownElement {
            symbol: symbol.clone(),
            pos: sym_pos,
        })?;

        // Chirality marks (@, @@, @TH1, ...) are skipped
        while self.peek() == Some('@') {
            self.pos += 1;
            while self.peek().map_or(false, |c| c.is_ascii_alphanumeric() && c != 'H') {
                self.pos += 1;
            }
        }

        let mut hydrogens = 0u8;
        if self.peek() == Some('H') {
            self.pos += 1;
            hydrogens = self.read_number::<u8>("hydrogen count")?.unwrap_or(1);
        }

        let charge_pos = self.pos;
        let mut charge = 0i8;
        while let Some(sign @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let magnitude = self.read_number::<i8>("charge")?.unwrap_or(1);
            let step = if sign == '+' { magnitude } else { -magnitude };
            charge = charge.checked_add(step).ok_or_else(|| SmilesError::OutOfRange {
                field: "charge",
                value: self.chars[charge_pos..self.pos].iter().collect(),
                pos: charge_pos,
            })?;
        }

        if self.peek() == Some(':') {
            self.pos += 1;
            self.read_number::<u32>("atom class")?;
        }

        if self.peek() != Some(']') {
            return match self.peek() {
                Some(ch) => Err(SmilesError::Unexpected { ch, pos: self.pos }),
                None => Err(SmilesError::UnclosedBracket(open)),
            };
        }
        self.pos += 1;

        Ok(Atom {
            element: info.number,
            aromatic,
            isotope,
            charge,
            hydrogens,
        })
    }

    fn finish(mut self) -> Result<Molecule, SmilesError> {
        if let Some((_, pos)) = self.pending_bond {
            return Err(SmilesError::DanglingBond(pos));
        }
        if !self.branches.is_empty() {
            return Err(SmilesError::UnbalancedBranch(self.chars.len()));
        }
        if let Some(digit) = self.rings.keys().min() {
            return Err(SmilesError::UnclosedRing(*digit));
        }
        if self.mol.is_empty() {
            return Err(SmilesError::Empty);
        }

        let implicit: Vec<u8> = (0..self.mol.atom_count())
            .map(|i| {
                if self.bracketed[i] {
                    self.mol.atoms()[i].hydrogens
                } else {
                    implicit_hydrogens(&self.mol, i)
                }
            })
            .collect();
        for (atom, h) in self.mol.atoms_mut().iter_mut().zip(implicit) {
            atom.hydrogens = h;
        }
        Ok(self.mol)
    }
}

/// Implicit hydrogens for an organic-subset atom.
///
/// Aliphatic atoms take the smallest allowed valence that fits their bonds.
/// Aromatic atoms use their first valence and reserve one unit for the ring.
fn implicit_hydrogens(mol: &Molecule, atom: usize) -> u8 {
    let a = &mol.atoms()[atom];
    let Some(info) = element::by_number(a.element) else {
        return 0;
    };
    let used = mol.bond_valence(atom);

    if a.aromatic {
        let base = info.valences.first().copied().unwrap_or(0);
        return base.saturating_sub(used.saturating_add(1));
    }
    info.valences
        .iter()
        .find(|&&v| v >= used)
        .map(|v| v - used)
        .unwrap_or(0)
}
