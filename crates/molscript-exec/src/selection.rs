//! Selection engine
//!
//! Owns the selected atom set and the hidden / deleted / subset overlays.
//! Every overlay is an `Arc<AtomSet>` that is replaced wholesale, never
//! edited in place, so a reader holding a [`SelectionSnapshot`] keeps a
//! consistent view while the execution thread commits changes.
//!
//! Invariant: no deleted atom is ever selected or hidden.

use std::cell::Cell;
use std::sync::Arc;

use molscript_mol::AtomSet;

/// Receives the committed selection after every non-quiet change
pub trait SelectionListener: Send {
    fn selection_changed(&mut self, selected: &AtomSet);
}

impl<F> SelectionListener for F
where
    F: FnMut(&AtomSet) + Send,
{
    fn selection_changed(&mut self, selected: &AtomSet) {
        self(selected)
    }
}

/// Handle returned by [`SelectionEngine::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Cached answer to "is the effective selection empty"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Emptiness {
    Unknown,
    Empty,
    NonEmpty,
}

/// Stable references to the overlays at one point in time
#[derive(Debug, Clone)]
pub struct SelectionSnapshot {
    pub selected: Arc<AtomSet>,
    pub hidden: Arc<AtomSet>,
    pub deleted: Arc<AtomSet>,
    pub subset: Option<Arc<AtomSet>>,
    pub atom_count: usize,
}

impl SelectionSnapshot {
    /// Atoms that are neither deleted nor hidden
    pub fn displayed(&self) -> AtomSet {
        AtomSet::all(self.atom_count)
            .difference(&self.hidden)
            .difference(&self.deleted)
    }

    /// Every atom not deleted
    pub fn live(&self) -> AtomSet {
        AtomSet::all(self.atom_count).difference(&self.deleted)
    }
}

pub struct SelectionEngine {
    atom_count: usize,
    selected: Arc<AtomSet>,
    hidden: Arc<AtomSet>,
    deleted: Arc<AtomSet>,
    subset: Option<Arc<AtomSet>>,
    /// Atoms left out by `select` with no argument
    hydrogens: AtomSet,
    hetero: AtomSet,
    pub select_hydrogen: bool,
    pub select_hetero: bool,
    empty: Cell<Emptiness>,
    listeners: Vec<(ListenerId, Box<dyn SelectionListener>)>,
    next_listener: u64,
}

impl std::fmt::Debug for SelectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionEngine")
            .field("atom_count", &self.atom_count)
            .field("selected", &self.selected)
            .field("hidden", &self.hidden)
            .field("deleted", &self.deleted)
            .field("subset", &self.subset)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl SelectionEngine {
    pub fn new(atom_count: usize) -> Self {
        SelectionEngine {
            atom_count,
            selected: Arc::new(AtomSet::new(atom_count)),
            hidden: Arc::new(AtomSet::new(atom_count)),
            deleted: Arc::new(AtomSet::new(atom_count)),
            subset: None,
            hydrogens: AtomSet::new(atom_count),
            hetero: AtomSet::new(atom_count),
            select_hydrogen: true,
            select_hetero: true,
            empty: Cell::new(Emptiness::Unknown),
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    /// Atoms `select` with no argument leaves out when the toggles are off
    pub fn set_default_exclusions(&mut self, hydrogens: AtomSet, hetero: AtomSet) {
        self.hydrogens = hydrogens;
        self.hetero = hetero;
    }

    pub fn atom_count(&self) -> usize {
        self.atom_count
    }

    /// Clear every overlay, as after a model reset
    pub fn zap(&mut self, atom_count: usize) {
        self.atom_count = atom_count;
        self.selected = Arc::new(AtomSet::new(atom_count));
        self.hidden = Arc::new(AtomSet::new(atom_count));
        self.deleted = Arc::new(AtomSet::new(atom_count));
        self.subset = None;
        self.hydrogens = AtomSet::new(atom_count);
        self.hetero = AtomSet::new(atom_count);
        self.empty.set(Emptiness::Empty);
        log::info!("selection state reset for {} atoms", atom_count);
    }

    pub fn snapshot(&self) -> SelectionSnapshot {
        SelectionSnapshot {
            selected: Arc::clone(&self.selected),
            hidden: Arc::clone(&self.hidden),
            deleted: Arc::clone(&self.deleted),
            subset: self.subset.clone(),
            atom_count: self.atom_count,
        }
    }

    pub fn selected(&self) -> &AtomSet {
        &self.selected
    }

    pub fn hidden(&self) -> &AtomSet {
        &self.hidden
    }

    pub fn deleted(&self) -> &AtomSet {
        &self.deleted
    }

    pub fn subset(&self) -> Option<&AtomSet> {
        self.subset.as_deref()
    }

    fn live(&self) -> AtomSet {
        AtomSet::all(self.atom_count).difference(&self.deleted)
    }

    /// Replace the selection; `None` selects every live atom, minus
    /// hydrogens and hetero atoms when their toggles are off
    pub fn select(&mut self, selection: Option<&AtomSet>, quiet: bool) {
        let next = match selection {
            Some(bs) => bs.difference(&self.deleted),
            None => {
                let mut all = self.live();
                if !self.select_hydrogen {
                    all = all.difference(&self.hydrogens);
                }
                if !self.select_hetero {
                    all = all.difference(&self.hetero);
                }
                all
            }
        };
        self.commit_selection(next, quiet);
    }

    /// Complement the selection over every live atom
    pub fn invert_selection(&mut self, quiet: bool) {
        let next = self
            .selected
            .complement(self.atom_count)
            .difference(&self.deleted);
        self.commit_selection(next, quiet);
    }

    /// Recompute the hidden overlay from scratch
    pub fn hide(&mut self, atoms: &AtomSet, quiet: bool) {
        self.hidden = Arc::new(atoms.difference(&self.deleted).resized(self.atom_count));
        self.changed(quiet);
    }

    /// Show exactly `show`: hide every other live atom
    pub fn display(&mut self, show: &AtomSet, quiet: bool) {
        let hide = self.live().difference(show);
        self.hide(&hide, quiet);
    }

    /// Add to the deleted overlay; returns how many atoms were newly deleted
    ///
    /// Listeners hear about every call, including one that deletes nothing.
    pub fn delete_atoms(&mut self, atoms: &AtomSet, quiet: bool) -> usize {
        let fresh = atoms.difference(&self.deleted);
        let count = fresh.count();
        if count > 0 {
            let deleted = self.deleted.union(&fresh);
            self.selected = Arc::new(self.selected.difference(&deleted));
            self.hidden = Arc::new(self.hidden.difference(&deleted));
            self.deleted = Arc::new(deleted);
        }
        self.changed(quiet);
        count
    }

    /// Set or clear the advisory subset
    pub fn set_subset(&mut self, subset: Option<&AtomSet>, quiet: bool) {
        self.subset = subset.map(|bs| Arc::new(bs.clone()));
        self.changed(quiet);
    }

    /// Selected atoms, restricted to the subset when one is active
    pub fn effective_selection(&self) -> AtomSet {
        match &self.subset {
            Some(subset) => self.selected.intersection(subset),
            None => (*self.selected).clone(),
        }
    }

    pub fn selection_count(&self) -> usize {
        let count = self.effective_selection().count();
        self.empty.set(if count == 0 {
            Emptiness::Empty
        } else {
            Emptiness::NonEmpty
        });
        count
    }

    pub fn is_empty(&self) -> bool {
        match self.empty.get() {
            Emptiness::Empty => true,
            Emptiness::NonEmpty => false,
            Emptiness::Unknown => self.selection_count() == 0,
        }
    }

    pub fn subscribe(&mut self, listener: Box<dyn SelectionListener>) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, listener));
        id
    }

    /// Returns `false` when the id is not registered
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        if self.listeners.len() == before {
            log::warn!("selection listener {:?} is not registered", id);
            return false;
        }
        true
    }

    fn commit_selection(&mut self, next: AtomSet, quiet: bool) {
        self.selected = Arc::new(next.resized(self.atom_count));
        self.changed(quiet);
    }

    fn changed(&mut self, quiet: bool) {
        self.empty.set(Emptiness::Unknown);
        if quiet {
            return;
        }
        let selected = Arc::clone(&self.selected);
        for (_, listener) in &mut self.listeners {
            listener.selection_changed(&selected);
        }
    }
}
