//! Bitsets over atom indices
//!
//! [`AtomSet`] is the currency passed between compiler, evaluator and the
//! selection engine. Unlike a fixed-size mask it grows on demand, so a set
//! written as a literal (`({0 2:4})`) can be combined with one sized to the
//! current model without either side knowing the other's length.

use bitvec::prelude::*;
use std::fmt;

use crate::index::AtomIndex;

#[derive(Clone, Default)]
pub struct AtomSet {
    bits: BitVec<u64, Lsb0>,
}

impl AtomSet {
    /// Empty set with room for `len` atoms
    pub fn new(len: usize) -> Self {
        AtomSet {
            bits: bitvec![u64, Lsb0; 0; len],
        }
    }

    /// Every index in `0..len`
    pub fn all(len: usize) -> Self {
        AtomSet {
            bits: bitvec![u64, Lsb0; 1; len],
        }
    }

    pub fn from_indices(len: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut set = Self::new(len);
        for i in indices {
            set.insert(i);
        }
        set
    }

    /// Build a set from a predicate evaluated for every index in `0..len`
    pub fn from_fn(len: usize, mut f: impl FnMut(usize) -> bool) -> Self {
        let mut set = Self::new(len);
        for i in 0..len {
            if f(i) {
                set.bits.set(i, true);
            }
        }
        set
    }

    /// Capacity in atoms; bits past it read as unset
    #[inline]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    #[inline]
    pub fn contains(&self, idx: usize) -> bool {
        self.bits.get(idx).map(|b| *b).unwrap_or(false)
    }

    #[inline]
    pub fn contains_atom(&self, idx: AtomIndex) -> bool {
        self.contains(idx.as_usize())
    }

    /// Set a bit, growing the set when needed
    pub fn insert(&mut self, idx: usize) {
        if idx >= self.bits.len() {
            self.bits.resize(idx + 1, false);
        }
        self.bits.set(idx, true);
    }

    /// Set every bit in `range`, growing the set when needed
    pub fn insert_range(&mut self, range: std::ops::RangeInclusive<usize>) {
        let (from, to) = (*range.start(), *range.end());
        if from > to {
            return;
        }
        if to >= self.bits.len() {
            self.bits.resize(to + 1, false);
        }
        self.bits[from..=to].fill(true);
    }

    pub fn remove(&mut self, idx: usize) {
        if idx < self.bits.len() {
            self.bits.set(idx, false);
        }
    }

    /// Number of set bits
    pub fn count(&self) -> usize {
        self.bits.count_ones()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits.not_any()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.iter_ones()
    }

    pub fn first(&self) -> Option<usize> {
        self.bits.first_one()
    }

    pub fn last(&self) -> Option<usize> {
        self.bits.last_one()
    }

    /// The `n`th set bit, counting from zero
    pub fn nth(&self, n: usize) -> Option<usize> {
        self.bits.iter_ones().nth(n)
    }

    /// Resize to exactly `len`, dropping bits past the end
    pub fn resized(&self, len: usize) -> Self {
        let mut bits = self.bits.clone();
        bits.resize(len, false);
        AtomSet { bits }
    }

    fn padded_pair(&self, other: &Self) -> (BitVec<u64, Lsb0>, BitVec<u64, Lsb0>) {
        let len = self.len().max(other.len());
        let mut a = self.bits.clone();
        let mut b = other.bits.clone();
        a.resize(len, false);
        b.resize(len, false);
        (a, b)
    }

    pub fn union(&self, other: &Self) -> Self {
        let (mut a, b) = self.padded_pair(other);
        a |= &b;
        AtomSet { bits: a }
    }

    pub fn intersection(&self, other: &Self) -> Self {
        let (mut a, b) = self.padded_pair(other);
        a &= &b;
        AtomSet { bits: a }
    }

    /// `self` minus `other`
    pub fn difference(&self, other: &Self) -> Self {
        let (mut a, b) = self.padded_pair(other);
        a &= !b;
        AtomSet { bits: a }
    }

    pub fn symmetric_difference(&self, other: &Self) -> Self {
        let (mut a, b) = self.padded_pair(other);
        a ^= &b;
        AtomSet { bits: a }
    }

    /// Complement over `0..len`
    pub fn complement(&self, len: usize) -> Self {
        let mut bits = self.bits.clone();
        bits.resize(len, false);
        AtomSet { bits: !bits }
    }

    pub fn union_with(&mut self, other: &Self) {
        *self = self.union(other);
    }

    pub fn is_subset(&self, other: &Self) -> bool {
        self.difference(other).is_empty()
    }

    /// Script literal form, `({0 2:4 9})`, with runs collapsed to ranges
    pub fn to_escaped(&self) -> String {
        let mut out = String::from("({");
        let mut first = true;
        let mut iter = self.iter().peekable();
        while let Some(start) = iter.next() {
            let mut end = start;
            while iter.peek() == Some(&(end + 1)) {
                end += 1;
                iter.next();
            }
            if !first {
                out.push(' ');
            }
            first = false;
            if end > start {
                out.push_str(&format!("{}:{}", start, end));
            } else {
                out.push_str(&start.to_string());
            }
        }
        out.push_str("})");
        out
    }
}

impl PartialEq for AtomSet {
    /// Sets are equal when the same bits are set, whatever their capacity
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for AtomSet {}

impl fmt::Debug for AtomSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AtomSet{}", self.to_escaped())
    }
}

impl fmt::Display for AtomSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_escaped())
    }
}

impl FromIterator<usize> for AtomSet {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        let mut set = AtomSet::default();
        for i in iter {
            set.insert(i);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_operations_pad_lengths() {
        let a = AtomSet::from_indices(4, [0, 2]);
        let b: AtomSet = [2usize, 9].into_iter().collect();
        assert_eq!(a.union(&b).iter().collect::<Vec<_>>(), vec![0, 2, 9]);
        assert_eq!(a.intersection(&b).iter().collect::<Vec<_>>(), vec![2]);
        assert_eq!(b.difference(&a).iter().collect::<Vec<_>>(), vec![9]);
        assert_eq!(a.symmetric_difference(&b).count(), 2);
    }

    #[test]
    fn test_complement_and_equality() {
        let a = AtomSet::from_indices(5, [1, 3]);
        let c = a.complement(5);
        assert_eq!(c.iter().collect::<Vec<_>>(), vec![0, 2, 4]);
        assert_eq!(c.complement(5), a);
        assert_eq!(AtomSet::new(3), AtomSet::new(10));
    }

    #[test]
    fn test_nth_set_bit() {
        let a = AtomSet::from_indices(10, [3, 7, 9]);
        assert_eq!(a.nth(1), Some(7));
        assert_eq!(a.nth(3), None);
        assert_eq!(a.first(), Some(3));
        assert_eq!(a.last(), Some(9));
    }

    #[test]
    fn test_escaped_form_collapses_runs() {
        let a = AtomSet::from_indices(12, [0, 2, 3, 4, 9]);
        assert_eq!(a.to_escaped(), "({0 2:4 9})");
        assert_eq!(AtomSet::new(4).to_escaped(), "({})");
    }

    #[test]
    fn test_insert_grows() {
        let mut a = AtomSet::new(2);
        a.insert(5);
        assert!(a.contains(5));
        assert_eq!(a.len(), 6);
        a.remove(5);
        assert!(a.is_empty());
        assert!(!a.contains(100));
    }

    #[test]
    fn test_insert_range() {
        let mut a = AtomSet::new(0);
        a.insert_range(2..=4);
        a.insert_range(7..=7);
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![2, 3, 4, 7]);
        assert_eq!(a.len(), 8);
        a.insert_range(5..=3);
        assert_eq!(a.count(), 4);
    }
}
