//! Molscript atom and model data
//!
//! The script engine never owns molecular data; it evaluates against an
//! [`AtomModel`]. This crate provides that trait together with the record
//! types it exposes and an in-memory [`Molecule`] implementation:
//!
//! - [`Atom`] / [`Bond`] - per-atom scalar properties and connectivity
//! - [`AtomSet`] - growable bitset over atom indices, the selection currency
//! - [`UnitCell`] - fractional coordinates for `cell=` and `hkl` planes
//! - [`SpatialGrid`] - radius queries for `within(distance, ...)`
//!
//! # Example
//!
//! ```rust
//! use molscript_mol::{Atom, AtomModel, BondOrder, Element, Molecule};
//!
//! let mut mol = Molecule::new("water");
//! let o = mol.add_atom(Atom::new("O", Element::OXYGEN));
//! let h = mol.add_atom(Atom::new("H1", Element::HYDROGEN).at(0.96, 0.0, 0.0));
//! mol.add_bond(o, h, BondOrder::Single).unwrap();
//!
//! assert_eq!(mol.atom_count(), 2);
//! assert_eq!(mol.neighbors(0).len(), 1);
//! ```

mod atom;
mod atomset;
mod cell;
mod element;
mod error;
mod index;
mod model;
mod molecule;
pub mod residue;
mod spatial;
mod substructure;

pub use atom::{Atom, Bond, BondOrder, SecondaryStructure};
pub use atomset::AtomSet;
pub use cell::UnitCell;
pub use element::Element;
pub use error::{ModelError, ModelResult};
pub use index::{AtomIndex, BondIndex, INVALID_INDEX};
pub use model::AtomModel;
pub use molecule::Molecule;
pub use spatial::SpatialGrid;

pub use lin_alg::f32::Vec3;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{Atom, AtomIndex, AtomModel, AtomSet, BondOrder, Element, Molecule, Vec3};
}
