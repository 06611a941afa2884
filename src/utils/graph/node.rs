//! Strongly-typed vertex identifiers.
//!
//! Every vertex of a [`super::DirectedGraph`] lives in an arena slot and is
//! addressed by its [`NodeId`]. Identifiers are never reused after a vertex is
//! removed, so a stale id can be detected instead of silently aliasing a new
//! vertex.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a vertex in a directed graph.
///
/// Basic blocks use this type directly as their block id.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creates a node identifier from a raw arena index.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Returns the raw arena index.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for NodeId {
    #[inline]
    fn from(index: usize) -> Self {
        NodeId(index)
    }
}

impl From<NodeId> for usize {
    #[inline]
    fn from(node: NodeId) -> Self {
        node.0
    }
}
