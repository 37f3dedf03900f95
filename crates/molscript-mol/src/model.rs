//! The read-only view of a model that scripts evaluate against

use crate::atom::{Atom, Bond, BondOrder};
use crate::atomset::AtomSet;
use crate::cell::UnitCell;
use crate::error::ModelResult;
use crate::substructure;

/// Atom/model collaborator consumed by the evaluator.
///
/// Atoms are addressed by their position in [`AtomModel::atoms`]; every
/// bitset handed around by the engine uses the same numbering.
pub trait AtomModel: Send + Sync {
    fn atoms(&self) -> &[Atom];

    fn bonds(&self) -> &[Bond];

    fn unit_cell(&self) -> Option<&UnitCell> {
        None
    }

    fn atom_count(&self) -> usize {
        self.atoms().len()
    }

    fn atom(&self, index: usize) -> Option<&Atom> {
        self.atoms().get(index)
    }

    /// Bonded partners of an atom with the bond order
    fn neighbors(&self, index: usize) -> Vec<(usize, BondOrder)> {
        self.bonds()
            .iter()
            .filter_map(|b| {
                b.partner(crate::AtomIndex(index as u32))
                    .map(|p| (p.as_usize(), b.order))
            })
            .collect()
    }

    /// Connected-component id per atom over covalent bonds
    fn molecule_ids(&self) -> Vec<usize> {
        let n = self.atom_count();
        let mut parent: Vec<usize> = (0..n).collect();
        fn find(parent: &mut [usize], mut i: usize) -> usize {
            while parent[i] != i {
                parent[i] = parent[parent[i]];
                i = parent[i];
            }
            i
        }
        for bond in self.bonds().iter().filter(|b| b.order.is_covalent()) {
            let (a, b) = (bond.atom1.as_usize(), bond.atom2.as_usize());
            if a >= n || b >= n {
                continue;
            }
            let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
            if ra != rb {
                parent[ra.max(rb)] = ra.min(rb);
            }
        }
        // Renumber roots densely in atom order
        let mut ids = vec![usize::MAX; n];
        let mut root_ids = ahash::AHashMap::new();
        for i in 0..n {
            let root = find(&mut parent, i);
            let next = root_ids.len();
            ids[i] = *root_ids.entry(root).or_insert(next);
        }
        ids
    }

    /// Atoms matching a linear element-path pattern such as `"C=O"`
    fn substructure(&self, pattern: &str) -> ModelResult<AtomSet> {
        substructure::find_matches(self, pattern)
    }
}
