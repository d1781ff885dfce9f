//! Dirty-path sets.
//!
//! Paths are opaque ordinals assigned by the embedder's metadata layer.
//! The engine only unions and intersects them to decide whether a change
//! can affect an indexed document.

use bit_vec::BitVec;

/// Growable bit set of dirty-path ordinals.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PathSet {
    bits: BitVec,
}

impl PathSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self { bits: BitVec::new() }
    }

    /// Build a set from path ordinals.
    pub fn from_paths<I>(paths: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        let mut set = Self::new();
        for path in paths {
            set.insert(path);
        }
        set
    }

    /// Mark one path as dirty, growing the set as needed.
    pub fn insert(&mut self, path: usize) {
        if path >= self.bits.len() {
            self.bits.grow(path + 1 - self.bits.len(), false);
        }
        self.bits.set(path, true);
    }

    /// Whether the given path is dirty.
    pub fn contains(&self, path: usize) -> bool {
        self.bits.get(path).unwrap_or(false)
    }

    /// Union another set into this one.
    ///
    /// Element-wise insertion rather than `BitVec` bit-ops: the two sets
    /// routinely differ in length.
    pub fn union_with(&mut self, other: &PathSet) {
        for path in other.iter() {
            self.insert(path);
        }
    }

    /// Whether any path is dirty in both sets.
    pub fn intersects(&self, other: &PathSet) -> bool {
        self.bits
            .blocks()
            .zip(other.bits.blocks())
            .any(|(a, b)| a & b != 0)
    }

    /// Whether no path is dirty.
    pub fn is_empty(&self) -> bool {
        self.bits.none()
    }

    /// Iterate dirty path ordinals in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits
            .iter()
            .enumerate()
            .filter_map(|(path, bit)| if bit { Some(path) } else { None })
    }
}
