//! In-memory model implementation
//!
//! [`Molecule`] is the concrete [`AtomModel`] used by the CLI and tests. It
//! keeps a per-atom adjacency list next to the bond array so neighbor
//! queries are cheap during `connected(...)` and substructure evaluation.

use std::path::Path;

use lin_alg::f32::Vec3;
use serde::{Deserialize, Serialize};

use crate::atom::{Atom, Bond, BondOrder, SecondaryStructure};
use crate::cell::UnitCell;
use crate::element::Element;
use crate::error::{ModelError, ModelResult};
use crate::index::{AtomIndex, BondIndex};
use crate::model::AtomModel;

#[derive(Debug, Clone, Default)]
pub struct Molecule {
    pub name: String,
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    adjacency: Vec<Vec<(usize, BondOrder)>>,
    cell: Option<UnitCell>,
}

impl Molecule {
    pub fn new(name: impl Into<String>) -> Self {
        Molecule {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Append an atom; a zero serial number is replaced by its 1-based position
    pub fn add_atom(&mut self, mut atom: Atom) -> AtomIndex {
        let index = AtomIndex(self.atoms.len() as u32);
        if atom.serial == 0 {
            atom.serial = self.atoms.len() as i32 + 1;
        }
        self.atoms.push(atom);
        self.adjacency.push(Vec::new());
        index
    }

    pub fn add_bond(&mut self, a: AtomIndex, b: AtomIndex, order: BondOrder) -> ModelResult<BondIndex> {
        let n = self.atoms.len();
        for idx in [a, b] {
            if idx.as_usize() >= n {
                return Err(ModelError::BondOutOfRange(idx.as_usize(), n));
            }
        }
        self.bonds.push(Bond::new(a, b, order));
        self.adjacency[a.as_usize()].push((b.as_usize(), order));
        self.adjacency[b.as_usize()].push((a.as_usize(), order));
        Ok(BondIndex(self.bonds.len() as u32 - 1))
    }

    pub fn set_unit_cell(&mut self, cell: UnitCell) {
        self.cell = Some(cell);
    }

    pub fn atoms_mut(&mut self) -> &mut [Atom] {
        &mut self.atoms
    }

    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }

    /// Parse the JSON model description used by the CLI
    pub fn from_json(text: &str) -> ModelResult<Self> {
        let record: MoleculeRecord = serde_json::from_str(text)?;
        record.into_molecule()
    }

    pub fn load(path: impl AsRef<Path>) -> ModelResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

impl AtomModel for Molecule {
    fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    fn unit_cell(&self) -> Option<&UnitCell> {
        self.cell.as_ref()
    }

    fn neighbors(&self, index: usize) -> Vec<(usize, BondOrder)> {
        self.adjacency.get(index).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct MoleculeRecord {
    #[serde(default)]
    name: String,
    #[serde(default)]
    cell: Option<UnitCell>,
    atoms: Vec<AtomRecord>,
    #[serde(default)]
    bonds: Vec<BondRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AtomRecord {
    name: String,
    element: String,
    #[serde(default)]
    serial: i32,
    #[serde(default)]
    resn: String,
    #[serde(default)]
    resv: i32,
    #[serde(default)]
    inscode: Option<char>,
    #[serde(default)]
    chain: String,
    #[serde(default)]
    altloc: Option<char>,
    #[serde(default = "default_model")]
    model: i32,
    coord: [f32; 3],
    #[serde(default)]
    b_factor: f32,
    #[serde(default = "default_occupancy")]
    occupancy: f32,
    #[serde(default)]
    formal_charge: i8,
    #[serde(default)]
    partial_charge: f32,
    #[serde(default)]
    hetatm: bool,
    #[serde(default)]
    ss: SecondaryStructure,
    #[serde(default)]
    site: i32,
}

fn default_model() -> i32 {
    1
}

fn default_occupancy() -> f32 {
    1.0
}

#[derive(Debug, Serialize, Deserialize)]
struct BondRecord {
    a: usize,
    b: usize,
    #[serde(default)]
    order: BondOrder,
}

impl MoleculeRecord {
    fn into_molecule(self) -> ModelResult<Molecule> {
        let mut mol = Molecule::new(self.name);
        if let Some(cell) = self.cell {
            mol.set_unit_cell(cell);
        }
        for rec in self.atoms {
            let element = Element::from_symbol(&rec.element)
                .ok_or_else(|| ModelError::UnknownElement(rec.element.clone()))?;
            let mut atom = Atom::new(rec.name, element)
                .with_residue(rec.resn, rec.resv, rec.chain)
                .with_serial(rec.serial)
                .with_model(rec.model);
            atom.coord = Vec3::new(rec.coord[0], rec.coord[1], rec.coord[2]);
            atom.inscode = rec.inscode.unwrap_or('\0');
            atom.altloc = rec.altloc.unwrap_or('\0');
            atom.b_factor = rec.b_factor;
            atom.occupancy = rec.occupancy;
            atom.formal_charge = rec.formal_charge;
            atom.partial_charge = rec.partial_charge;
            atom.hetatm = rec.hetatm;
            atom.ss = rec.ss;
            atom.site = rec.site;
            mol.add_atom(atom);
        }
        for bond in self.bonds {
            mol.add_bond(AtomIndex(bond.a as u32), AtomIndex(bond.b as u32), bond.order)?;
        }
        Ok(mol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ethanol() -> Molecule {
        let mut mol = Molecule::new("ethanol");
        let c1 = mol.add_atom(Atom::new("C1", Element::CARBON).at(0.0, 0.0, 0.0));
        let c2 = mol.add_atom(Atom::new("C2", Element::CARBON).at(1.5, 0.0, 0.0));
        let o = mol.add_atom(Atom::new("O", Element::OXYGEN).at(2.2, 1.2, 0.0));
        let h = mol.add_atom(Atom::new("HO", Element::HYDROGEN).at(3.1, 1.1, 0.0));
        mol.add_bond(c1, c2, BondOrder::Single).unwrap();
        mol.add_bond(c2, o, BondOrder::Single).unwrap();
        mol.add_bond(o, h, BondOrder::Single).unwrap();
        mol
    }

    #[test]
    fn test_serials_default_to_position() {
        let mol = ethanol();
        assert_eq!(mol.atoms()[0].serial, 1);
        assert_eq!(mol.atoms()[3].serial, 4);
    }

    #[test]
    fn test_bond_out_of_range() {
        let mut mol = ethanol();
        assert!(mol.add_bond(AtomIndex(0), AtomIndex(9), BondOrder::Single).is_err());
    }

    #[test]
    fn test_neighbors_and_molecules() {
        let mut mol = ethanol();
        mol.add_atom(Atom::new("NA", Element(11)).at(10.0, 0.0, 0.0));
        let mut n: Vec<usize> = mol.neighbors(1).into_iter().map(|(i, _)| i).collect();
        n.sort();
        assert_eq!(n, vec![0, 2]);
        assert_eq!(mol.molecule_ids(), vec![0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_substructure() {
        let mol = ethanol();
        let hits = mol.substructure("CO").unwrap();
        assert_eq!(hits.iter().collect::<Vec<_>>(), vec![1, 2]);
        let hits = mol.substructure("C=O").unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "name": "water",
            "atoms": [
                {"name": "O", "element": "O", "resn": "HOH", "resv": 1, "coord": [0, 0, 0], "hetatm": true},
                {"name": "H1", "element": "H", "resn": "HOH", "resv": 1, "coord": [0.96, 0, 0]}
            ],
            "bonds": [{"a": 0, "b": 1}]
        }"#;
        let mol = Molecule::from_json(json).unwrap();
        assert_eq!(mol.atom_count(), 2);
        assert_eq!(mol.bond_count(), 1);
        assert!(mol.atoms()[0].is_water());
        assert_eq!(mol.atoms()[1].model, 1);
    }

    #[test]
    fn test_from_json_unknown_element() {
        let json = r#"{"atoms": [{"name": "X", "element": "Qq", "coord": [0, 0, 0]}]}"#;
        assert!(matches!(Molecule::from_json(json), Err(ModelError::UnknownElement(_))));
    }
}
