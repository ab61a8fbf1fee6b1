//! Stable integer handles for cross-referenced entities.
//!
//! Assignments reference slots and employees, slots reference requirements,
//! requirements reference demand items. All of them live in arenas owned by
//! one solve; the handles below index into those arenas. The result document
//! carries a de-indexed projection with string IDs.

use std::fmt;

macro_rules! arena_index {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(usize);

        impl $name {
            #[inline]
            pub const fn new(index: usize) -> Self {
                $name(index)
            }

            #[inline]
            pub const fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }

        impl From<usize> for $name {
            fn from(index: usize) -> Self {
                $name(index)
            }
        }
    };
}

arena_index!(
    /// Index into the employee pool of one solve.
    EmpIdx
);
arena_index!(
    /// Index into the flattened requirement list of one solve.
    ReqIdx
);
arena_index!(
    /// Index into the slot table of one solve.
    SlotIdx
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_index() {
        let e = EmpIdx::new(7);
        assert_eq!(e.index(), 7);
        assert_eq!(SlotIdx::from(3).index(), 3);
        assert_ne!(ReqIdx::new(1), ReqIdx::new(2));
    }
}
