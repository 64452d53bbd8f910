//! molvault-chem – Reference molecule model
//!
//! SMILES parsing, ring perception, whole-molecule properties and structural
//! keys. This is the entity side of a descriptor store: the storage engine only
//! ever sees what these functions produce.

pub mod element;
pub mod key;
pub mod molecule;
pub mod properties;
pub mod rings;
pub mod smiles;

pub use key::structural_key;
pub use molecule::{Atom, Bond, BondOrder, Molecule};
pub use rings::RingInfo;
pub use smiles::{parse, SmilesError};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_molecule_survives_bincode() {
        let mol = parse("CC(=O)[O-].[Na+]").unwrap();
        let bytes = bincode::serialize(&mol).unwrap();
        let back: Molecule = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, mol);
        assert_eq!(structural_key(&back), structural_key(&mol));
    }
}
