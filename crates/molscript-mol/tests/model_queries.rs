//! End-to-end checks of the model collaborator through the public API

use molscript_mol::prelude::*;
use molscript_mol::{SecondaryStructure, UnitCell};

fn dipeptide() -> Molecule {
    let json = r#"{
        "name": "dipeptide",
        "cell": {"a": 20, "b": 20, "c": 20, "alpha": 90, "beta": 90, "gamma": 90},
        "atoms": [
            {"name": "N",  "element": "N", "resn": "ALA", "resv": 1, "chain": "A", "coord": [0, 0, 0], "ss": "helix"},
            {"name": "CA", "element": "C", "resn": "ALA", "resv": 1, "chain": "A", "coord": [1.4, 0, 0], "ss": "helix"},
            {"name": "C",  "element": "C", "resn": "ALA", "resv": 1, "chain": "A", "coord": [2.0, 1.3, 0], "ss": "helix"},
            {"name": "O",  "element": "O", "resn": "ALA", "resv": 1, "chain": "A", "coord": [1.4, 2.3, 0], "ss": "helix"},
            {"name": "N",  "element": "N", "resn": "GLY", "resv": 2, "chain": "A", "coord": [3.3, 1.4, 0]},
            {"name": "O",  "element": "O", "resn": "HOH", "resv": 100, "chain": "W", "coord": [25, 5, 5], "hetatm": true}
        ],
        "bonds": [
            {"a": 0, "b": 1}, {"a": 1, "b": 2}, {"a": 2, "b": 3, "order": "double"}, {"a": 2, "b": 4}
        ]
    }"#;
    Molecule::from_json(json).expect("valid model")
}

#[test]
fn test_json_model_exposes_properties() {
    let mol = dipeptide();
    assert_eq!(mol.atom_count(), 6);
    assert_eq!(mol.atoms()[1].ss, SecondaryStructure::Helix);
    assert!(mol.atoms()[1].is_backbone());
    assert!(mol.atoms()[5].is_solvent());
}

#[test]
fn test_unit_cell_assignment() {
    let mol = dipeptide();
    let cell: &UnitCell = mol.unit_cell().expect("cell");
    assert_eq!(cell.cell_of(mol.atoms()[0].coord), [1, 1, 1]);
    assert_eq!(cell.cell_of(mol.atoms()[5].coord), [2, 1, 1]);
}

#[test]
fn test_carbonyl_substructure() {
    let mol = dipeptide();
    let hits = mol.substructure("C=O").expect("pattern");
    assert_eq!(hits.iter().collect::<Vec<_>>(), vec![2, 3]);
}

#[test]
fn test_molecule_ids_split_water() {
    let mol = dipeptide();
    assert_eq!(mol.molecule_ids(), vec![0, 0, 0, 0, 0, 1]);
}
