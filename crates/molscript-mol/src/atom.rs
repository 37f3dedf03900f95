//! Atom and bond records
//!
//! An [`Atom`] carries every scalar property the script evaluator can
//! compare against: identity (serial number, name, element), residue and
//! chain membership, model number, coordinates and crystallographic data.

use lin_alg::f32::Vec3;
use serde::{Deserialize, Serialize};

use crate::element::Element;
use crate::index::AtomIndex;
use crate::residue;

/// Secondary structure assigned to the residue an atom belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecondaryStructure {
    #[default]
    None,
    Helix,
    Sheet,
    Turn,
}

impl SecondaryStructure {
    pub fn name(&self) -> &'static str {
        match self {
            SecondaryStructure::None => "none",
            SecondaryStructure::Helix => "helix",
            SecondaryStructure::Sheet => "sheet",
            SecondaryStructure::Turn => "turn",
        }
    }
}

/// A single atom
#[derive(Debug, Clone)]
pub struct Atom {
    /// Atom name, e.g. `CA`
    pub name: String,
    pub element: Element,
    /// Serial number from the source file (`atomno`)
    pub serial: i32,
    /// Residue name, e.g. `ALA`
    pub resn: String,
    /// Residue sequence number
    pub resv: i32,
    /// Insertion code, `'\0'` when absent
    pub inscode: char,
    pub chain: String,
    /// Alternate location indicator, `'\0'` when absent
    pub altloc: char,
    /// 1-based model number
    pub model: i32,
    pub coord: Vec3,
    pub b_factor: f32,
    pub occupancy: f32,
    pub formal_charge: i8,
    pub partial_charge: f32,
    /// HETATM record
    pub hetatm: bool,
    pub ss: SecondaryStructure,
    /// Crystallographic site; symmetry copies share a site number
    pub site: i32,
}

impl Atom {
    /// New atom at the origin with defaults for everything but name and element
    pub fn new(name: impl Into<String>, element: Element) -> Self {
        Atom {
            name: name.into(),
            element,
            serial: 0,
            resn: String::new(),
            resv: 0,
            inscode: '\0',
            chain: String::new(),
            altloc: '\0',
            model: 1,
            coord: Vec3::new(0.0, 0.0, 0.0),
            b_factor: 0.0,
            occupancy: 1.0,
            formal_charge: 0,
            partial_charge: 0.0,
            hetatm: false,
            ss: SecondaryStructure::None,
            site: 0,
        }
    }

    pub fn with_residue(mut self, resn: impl Into<String>, resv: i32, chain: impl Into<String>) -> Self {
        self.resn = resn.into();
        self.resv = resv;
        self.chain = chain.into();
        self
    }

    pub fn at(mut self, x: f32, y: f32, z: f32) -> Self {
        self.coord = Vec3::new(x, y, z);
        self
    }

    pub fn with_serial(mut self, serial: i32) -> Self {
        self.serial = serial;
        self
    }

    pub fn with_model(mut self, model: i32) -> Self {
        self.model = model;
        self
    }

    pub fn hetatm(mut self) -> Self {
        self.hetatm = true;
        self
    }

    #[inline]
    pub fn is_hydrogen(&self) -> bool {
        self.element.is_hydrogen()
    }

    pub fn is_protein(&self) -> bool {
        residue::is_amino_acid(&self.resn)
    }

    pub fn is_nucleic(&self) -> bool {
        residue::is_nucleotide(&self.resn)
    }

    pub fn is_water(&self) -> bool {
        residue::is_water(&self.resn)
    }

    /// Water or a recognised ion
    pub fn is_solvent(&self) -> bool {
        self.is_water() || residue::is_ion(&self.resn)
    }

    pub fn is_backbone(&self) -> bool {
        (self.is_protein() || self.is_nucleic()) && residue::is_backbone_name(&self.name)
    }

    /// Hetero group that is neither water nor ion
    pub fn is_ligand(&self) -> bool {
        self.hetatm && !self.is_solvent() && !self.is_protein() && !self.is_nucleic()
    }

    /// Key identifying the residue this atom belongs to
    pub fn residue_key(&self) -> (i32, &str, i32, char) {
        (self.model, self.chain.as_str(), self.resv, self.inscode)
    }

    /// Sequence code as written in scripts: `12` or `12^A`
    pub fn seqcode(&self) -> String {
        if self.inscode == '\0' || self.inscode == ' ' {
            self.resv.to_string()
        } else {
            format!("{}^{}", self.resv, self.inscode)
        }
    }
}

/// Bond order as used by `connected(...)` filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BondOrder {
    #[default]
    Single,
    Double,
    Triple,
    Aromatic,
    Hbond,
}

impl BondOrder {
    /// Parse the bond-type names accepted by scripts
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "single" => Some(BondOrder::Single),
            "double" => Some(BondOrder::Double),
            "triple" => Some(BondOrder::Triple),
            "aromatic" => Some(BondOrder::Aromatic),
            "hbond" => Some(BondOrder::Hbond),
            _ => None,
        }
    }

    /// Covalent bonds, everything but hydrogen bonds
    pub fn is_covalent(&self) -> bool {
        !matches!(self, BondOrder::Hbond)
    }
}

/// A bond between two atoms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bond {
    pub atom1: AtomIndex,
    pub atom2: AtomIndex,
    pub order: BondOrder,
}

impl Bond {
    pub fn new(atom1: AtomIndex, atom2: AtomIndex, order: BondOrder) -> Self {
        Bond { atom1, atom2, order }
    }

    /// The other end of the bond, if `atom` is one of its ends
    pub fn partner(&self, atom: AtomIndex) -> Option<AtomIndex> {
        if self.atom1 == atom {
            Some(self.atom2)
        } else if self.atom2 == atom {
            Some(self.atom1)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atom_builders() {
        let atom = Atom::new("CA", Element::CARBON)
            .with_residue("ALA", 12, "A")
            .at(1.0, 2.0, 3.0)
            .with_serial(5);
        assert_eq!(atom.resn, "ALA");
        assert_eq!(atom.serial, 5);
        assert!(atom.is_protein());
        assert!(atom.is_backbone());
        assert_eq!(atom.seqcode(), "12");
    }

    #[test]
    fn test_classification_flags() {
        let water = Atom::new("O", Element::OXYGEN).with_residue("HOH", 1, "W").hetatm();
        assert!(water.is_solvent());
        assert!(!water.is_ligand());

        let heme = Atom::new("FE", Element(26)).with_residue("HEM", 200, "A").hetatm();
        assert!(heme.is_ligand());
    }

    #[test]
    fn test_seqcode_with_insertion() {
        let mut atom = Atom::new("N", Element::NITROGEN).with_residue("GLY", 52, "A");
        atom.inscode = 'B';
        assert_eq!(atom.seqcode(), "52^B");
    }

    #[test]
    fn test_bond_partner() {
        let bond = Bond::new(AtomIndex(1), AtomIndex(4), BondOrder::Double);
        assert_eq!(bond.partner(AtomIndex(1)), Some(AtomIndex(4)));
        assert_eq!(bond.partner(AtomIndex(4)), Some(AtomIndex(1)));
        assert_eq!(bond.partner(AtomIndex(2)), None);
        assert_eq!(BondOrder::from_name("AROMATIC"), Some(BondOrder::Aromatic));
    }
}
