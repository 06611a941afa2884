//! A fixed-universe bit vector.
//!
//! Dataflow facts in this crate are sets of small dense integers: live
//! [`crate::dataflow::DataFlowVar`]s, dirty bindings, dead instruction
//! indices, pending worklist entries. [`BitSet`] stores 64 of them per word and
//! reports whether in-place set operations changed anything, which is what the
//! fixed-point solver needs to decide on re-enqueueing.
//!
//! # Example
//!
//! ```rust
//! use irscope::utils::BitSet;
//!
//! let mut live = BitSet::new(70);
//! live.insert(3);
//! live.insert(66);
//!
//! let mut other = BitSet::new(70);
//! other.insert(66);
//!
//! assert!(!live.union_with(&other));
//! assert_eq!(live.iter().collect::<Vec<_>>(), vec![3, 66]);
//! ```

use serde::{Deserialize, Serialize};

const WORD_BITS: usize = 64;

/// A set of indices in `0..len`, one bit per index.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BitSet {
    words: Vec<u64>,
    len: usize,
}

impl BitSet {
    /// Creates an empty set over the universe `0..len`.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(WORD_BITS)],
            len,
        }
    }

    /// Creates a set containing every index in `0..len`.
    #[must_use]
    pub fn full(len: usize) -> Self {
        let mut set = Self::new(len);
        set.fill();
        set
    }

    /// Size of the universe.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no index is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Extends the universe to `len`, keeping existing members. Shrinking is a no-op.
    pub fn grow(&mut self, len: usize) {
        if len > self.len {
            self.words.resize(len.div_ceil(WORD_BITS), 0);
            self.len = len;
        }
    }

    /// Adds `index`, returning `true` if it was not present.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn insert(&mut self, index: usize) -> bool {
        assert!(index < self.len, "index {index} out of bounds for {}", self.len);
        let (word, mask) = Self::locate(index);
        let was_set = self.words[word] & mask != 0;
        self.words[word] |= mask;
        !was_set
    }

    /// Removes `index`, returning `true` if it was present.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    pub fn remove(&mut self, index: usize) -> bool {
        assert!(index < self.len, "index {index} out of bounds for {}", self.len);
        let (word, mask) = Self::locate(index);
        let was_set = self.words[word] & mask != 0;
        self.words[word] &= !mask;
        was_set
    }

    /// Returns `true` if `index` is a member. Indices outside the universe are never members.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        if index >= self.len {
            return false;
        }
        let (word, mask) = Self::locate(index);
        self.words[word] & mask != 0
    }

    /// Number of members.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Removes every member.
    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    /// Adds every index of the universe.
    pub fn fill(&mut self) {
        self.words.iter_mut().for_each(|w| *w = u64::MAX);
        let tail = self.len % WORD_BITS;
        if tail != 0 {
            if let Some(last) = self.words.last_mut() {
                *last = (1u64 << tail) - 1;
            }
        }
    }

    /// In-place union. Returns `true` if `self` changed.
    pub fn union_with(&mut self, other: &Self) -> bool {
        self.combine(other, |a, b| a | b)
    }

    /// In-place intersection. Returns `true` if `self` changed.
    pub fn intersect_with(&mut self, other: &Self) -> bool {
        self.combine(other, |a, b| a & b)
    }

    /// Removes every member of `other`. Returns `true` if `self` changed.
    pub fn difference_with(&mut self, other: &Self) -> bool {
        self.combine(other, |a, b| a & !b)
    }

    /// Returns `true` if every member of `self` is also in `other`.
    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter().chain(std::iter::repeat(&0)))
            .all(|(a, b)| a & !b == 0)
    }

    /// Iterates members in increasing order.
    pub fn iter(&self) -> BitSetIter<'_> {
        BitSetIter {
            words: &self.words,
            word_idx: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }

    fn combine(&mut self, other: &Self, op: impl Fn(u64, u64) -> u64) -> bool {
        if other.len > self.len {
            self.grow(other.len);
        }
        let mut changed = false;
        for (idx, word) in self.words.iter_mut().enumerate() {
            let rhs = other.words.get(idx).copied().unwrap_or(0);
            let next = op(*word, rhs);
            changed |= next != *word;
            *word = next;
        }
        changed
    }

    #[inline]
    fn locate(index: usize) -> (usize, u64) {
        (index / WORD_BITS, 1u64 << (index % WORD_BITS))
    }
}

impl std::fmt::Debug for BitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<usize> for BitSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let members: Vec<usize> = iter.into_iter().collect();
        let len = members.iter().max().map_or(0, |m| m + 1);
        let mut set = BitSet::new(len);
        for m in members {
            set.insert(m);
        }
        set
    }
}

/// Iterator over the members of a [`BitSet`].
pub struct BitSetIter<'a> {
    words: &'a [u64],
    word_idx: usize,
    current: u64,
}

impl Iterator for BitSetIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(self.word_idx * WORD_BITS + bit);
            }
            self.word_idx += 1;
            self.current = *self.words.get(self.word_idx)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_insert_remove() {
        let mut bs = BitSet::new(100);
        assert!(bs.is_empty());
        assert!(bs.insert(0));
        assert!(bs.insert(64));
        assert!(!bs.insert(64));
        assert_eq!(bs.count(), 2);
        assert!(bs.remove(0));
        assert!(!bs.remove(0));
        assert!(bs.contains(64));
        assert!(!bs.contains(500));
    }

    #[test]
    fn test_bitset_full_masks_tail() {
        let bs = BitSet::full(70);
        assert_eq!(bs.count(), 70);
        assert!(bs.contains(69));
        assert!(!bs.contains(70));
    }

    #[test]
    fn test_bitset_set_ops_report_change() {
        let mut a: BitSet = [0, 1].into_iter().collect();
        a.grow(10);
        let mut b = BitSet::new(10);
        b.insert(1);
        b.insert(2);

        assert!(a.union_with(&b));
        assert!(!a.union_with(&b));
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![0, 1, 2]);

        assert!(a.intersect_with(&b));
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![1, 2]);

        let mut one = BitSet::new(10);
        one.insert(1);
        assert!(a.difference_with(&one));
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![2]);
        assert!(a.is_subset(&b));
        assert!(!b.is_subset(&a));
    }

    #[test]
    fn test_bitset_grow_keeps_members() {
        let mut bs = BitSet::new(3);
        bs.insert(2);
        bs.grow(200);
        bs.insert(150);
        assert_eq!(bs.iter().collect::<Vec<_>>(), vec![2, 150]);
        assert_eq!(format!("{bs:?}"), "{2, 150}");
    }
}
