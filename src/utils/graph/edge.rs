//! Edge identifiers for directed graphs.

use std::fmt;

/// Identifier of an edge in a directed graph.
///
/// Edge slots are tombstoned on removal, so an [`EdgeId`] stays unique for the
/// lifetime of its graph.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(pub(crate) usize);

impl EdgeId {
    /// Creates an edge identifier from a raw slot index.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        EdgeId(index)
    }

    /// Returns the raw slot index.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EdgeId({})", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_id_formatting() {
        let edge = EdgeId::new(3);
        assert_eq!(edge.index(), 3);
        assert_eq!(format!("{edge}"), "e3");
        assert_eq!(format!("{edge:?}"), "EdgeId(3)");
    }
}
