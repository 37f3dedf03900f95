//! Typed indices into the atom and bond arrays

use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker for an index that does not point anywhere
pub const INVALID_INDEX: u32 = u32::MAX;

macro_rules! define_index {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub const fn new(index: u32) -> Self {
                $name(index)
            }

            #[inline]
            pub const fn as_usize(&self) -> usize {
                self.0 as usize
            }

            #[inline]
            pub const fn is_valid(&self) -> bool {
                self.0 != INVALID_INDEX
            }

            #[inline]
            pub const fn invalid() -> Self {
                $name(INVALID_INDEX)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, "{}({})", $label, self.0)
                } else {
                    write!(f, "{}(INVALID)", $label)
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<usize> for $name {
            #[inline]
            fn from(index: usize) -> Self {
                $name(index as u32)
            }
        }

        impl From<$name> for usize {
            #[inline]
            fn from(index: $name) -> Self {
                index.0 as usize
            }
        }
    };
}

define_index!(
    /// Position of an atom in a model's atom array; the unit of every bitset
    AtomIndex, "AtomIndex"
);

define_index!(
    /// Position of a bond in a model's bond array
    BondIndex, "BondIndex"
);
