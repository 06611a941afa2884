//! Arena-backed directed graph with vertex and edge removal.
//!
//! [`DirectedGraph`] stores node payloads and edge payloads in slot vectors and
//! keeps per-node adjacency lists of [`EdgeId`]s in both directions. Removing a
//! vertex first detaches every incident edge from *both* endpoints' adjacency
//! lists, then tombstones the slot, so no surviving edge can reference it.
//!
//! Adjacency lists preserve insertion order, which makes every traversal built
//! on top of this type deterministic for a given construction sequence.

use crate::{
    utils::graph::{EdgeId, GraphBase, NodeId, Predecessors, Successors},
    Error::GraphError,
    Result,
};

/// Endpoints and payload of a single edge.
#[derive(Debug, Clone)]
struct EdgeData<E> {
    source: NodeId,
    target: NodeId,
    data: E,
}

/// A directed multigraph over arena slots.
///
/// # Type Parameters
///
/// * `N` - Node payload (for a CFG, the basic block)
/// * `E` - Edge payload (for a CFG, the edge type)
///
/// # Examples
///
/// ```rust
/// use irscope::utils::graph::DirectedGraph;
///
/// let mut graph: DirectedGraph<&str, ()> = DirectedGraph::new();
/// let a = graph.add_node("A");
/// let b = graph.add_node("B");
/// graph.add_edge(a, b, ())?;
///
/// graph.remove_node(b);
/// assert_eq!(graph.node_count(), 1);
/// assert_eq!(graph.out_degree(a), 0);
/// # Ok::<(), irscope::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct DirectedGraph<N, E> {
    nodes: Vec<Option<N>>,
    edges: Vec<Option<EdgeData<E>>>,
    outgoing: Vec<Vec<EdgeId>>,
    incoming: Vec<Vec<EdgeId>>,
    live_nodes: usize,
    live_edges: usize,
}

impl<N, E> Default for DirectedGraph<N, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N, E> DirectedGraph<N, E> {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0, 0)
    }

    /// Creates an empty graph with room for the given number of nodes and edges.
    #[must_use]
    pub fn with_capacity(nodes: usize, edges: usize) -> Self {
        DirectedGraph {
            nodes: Vec::with_capacity(nodes),
            edges: Vec::with_capacity(edges),
            outgoing: Vec::with_capacity(nodes),
            incoming: Vec::with_capacity(nodes),
            live_nodes: 0,
            live_edges: 0,
        }
    }

    /// Adds a node and returns its identifier.
    pub fn add_node(&mut self, data: N) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(Some(data));
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        self.live_nodes += 1;
        id
    }

    /// Returns `true` if `node` refers to a live vertex.
    #[must_use]
    pub fn contains_node(&self, node: NodeId) -> bool {
        matches!(self.nodes.get(node.index()), Some(Some(_)))
    }

    /// Returns the payload of a live node.
    #[must_use]
    pub fn node(&self, node: NodeId) -> Option<&N> {
        self.nodes.get(node.index()).and_then(Option::as_ref)
    }

    /// Returns the payload of a live node mutably.
    pub fn node_mut(&mut self, node: NodeId) -> Option<&mut N> {
        self.nodes.get_mut(node.index()).and_then(Option::as_mut)
    }

    /// Number of live nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.live_nodes
    }

    /// Number of live edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.live_edges
    }

    /// Iterates live nodes and their payloads in index order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &N)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|n| (NodeId::new(idx), n)))
    }

    /// Iterates live nodes mutably in index order.
    pub fn nodes_mut(&mut self) -> impl Iterator<Item = (NodeId, &mut N)> {
        self.nodes
            .iter_mut()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_mut().map(|n| (NodeId::new(idx), n)))
    }

    /// Adds an edge from `source` to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphError`] if either endpoint is not a live node.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, data: E) -> Result<EdgeId> {
        if !self.contains_node(source) {
            return Err(GraphError(format!(
                "source node {} does not exist in graph with {} nodes",
                source.index(),
                self.live_nodes
            )));
        }
        if !self.contains_node(target) {
            return Err(GraphError(format!(
                "target node {} does not exist in graph with {} nodes",
                target.index(),
                self.live_nodes
            )));
        }

        let id = EdgeId::new(self.edges.len());
        self.edges.push(Some(EdgeData {
            source,
            target,
            data,
        }));
        self.outgoing[source.index()].push(id);
        self.incoming[target.index()].push(id);
        self.live_edges += 1;
        Ok(id)
    }

    /// Finds the first edge from `source` to `target`.
    #[must_use]
    pub fn find_edge(&self, source: NodeId, target: NodeId) -> Option<EdgeId> {
        self.outgoing
            .get(source.index())?
            .iter()
            .copied()
            .find(|&e| self.edge_endpoints(e).is_some_and(|(_, t)| t == target))
    }

    /// Removes the first edge from `source` to `target`, returning its payload.
    pub fn remove_edge(&mut self, source: NodeId, target: NodeId) -> Option<E> {
        let edge = self.find_edge(source, target)?;
        self.remove_edge_by_id(edge)
    }

    /// Removes an edge by identifier, detaching it from both endpoints.
    pub fn remove_edge_by_id(&mut self, edge: EdgeId) -> Option<E> {
        let data = self.edges.get_mut(edge.index())?.take()?;
        self.outgoing[data.source.index()].retain(|&e| e != edge);
        self.incoming[data.target.index()].retain(|&e| e != edge);
        self.live_edges -= 1;
        Some(data.data)
    }

    /// Removes a node together with every incident edge, returning its payload.
    ///
    /// Incident edges are removed from the adjacency lists of both endpoints
    /// before the slot is dropped.
    pub fn remove_node(&mut self, node: NodeId) -> Option<N> {
        if !self.contains_node(node) {
            return None;
        }

        let mut incident: Vec<EdgeId> = self.outgoing[node.index()].clone();
        incident.extend(self.incoming[node.index()].iter().copied());
        incident.sort_unstable();
        incident.dedup();
        for edge in incident {
            self.remove_edge_by_id(edge);
        }

        self.live_nodes -= 1;
        self.nodes[node.index()].take()
    }

    /// Returns an edge payload.
    #[must_use]
    pub fn edge(&self, edge: EdgeId) -> Option<&E> {
        self.edges
            .get(edge.index())
            .and_then(Option::as_ref)
            .map(|e| &e.data)
    }

    /// Returns an edge payload mutably.
    pub fn edge_mut(&mut self, edge: EdgeId) -> Option<&mut E> {
        self.edges
            .get_mut(edge.index())
            .and_then(Option::as_mut)
            .map(|e| &mut e.data)
    }

    /// Returns `(source, target)` of a live edge.
    #[must_use]
    pub fn edge_endpoints(&self, edge: EdgeId) -> Option<(NodeId, NodeId)> {
        self.edges
            .get(edge.index())
            .and_then(Option::as_ref)
            .map(|e| (e.source, e.target))
    }

    /// Iterates `(edge, target, payload)` for the outgoing edges of `node`.
    pub fn outgoing_edges(&self, node: NodeId) -> impl Iterator<Item = (EdgeId, NodeId, &E)> {
        self.outgoing
            .get(node.index())
            .into_iter()
            .flatten()
            .filter_map(move |&id| {
                let e = self.edges[id.index()].as_ref()?;
                Some((id, e.target, &e.data))
            })
    }

    /// Iterates `(edge, source, payload)` for the incoming edges of `node`.
    pub fn incoming_edges(&self, node: NodeId) -> impl Iterator<Item = (EdgeId, NodeId, &E)> {
        self.incoming
            .get(node.index())
            .into_iter()
            .flatten()
            .filter_map(move |&id| {
                let e = self.edges[id.index()].as_ref()?;
                Some((id, e.source, &e.data))
            })
    }

    /// Number of outgoing edges of `node`.
    #[must_use]
    pub fn out_degree(&self, node: NodeId) -> usize {
        self.outgoing.get(node.index()).map_or(0, Vec::len)
    }

    /// Number of incoming edges of `node`.
    #[must_use]
    pub fn in_degree(&self, node: NodeId) -> usize {
        self.incoming.get(node.index()).map_or(0, Vec::len)
    }
}

impl<N, E> GraphBase for DirectedGraph<N, E> {
    fn node_bound(&self) -> usize {
        self.nodes.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(idx, _)| NodeId::new(idx))
    }
}

impl<N, E> Successors for DirectedGraph<N, E> {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.outgoing_edges(node).map(|(_, target, _)| target)
    }
}

impl<N, E> Predecessors for DirectedGraph<N, E> {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.incoming_edges(node).map(|(_, source, _)| source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> (DirectedGraph<&'static str, u8>, [NodeId; 4]) {
        let mut graph = DirectedGraph::new();
        let a = graph.add_node("A");
        let b = graph.add_node("B");
        let c = graph.add_node("C");
        let d = graph.add_node("D");
        graph.add_edge(a, b, 1).unwrap();
        graph.add_edge(a, c, 2).unwrap();
        graph.add_edge(b, d, 3).unwrap();
        graph.add_edge(c, d, 4).unwrap();
        (graph, [a, b, c, d])
    }

    #[test]
    fn test_add_nodes_and_edges() {
        let (graph, [a, b, c, d]) = diamond();
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.successors(a).collect::<Vec<_>>(), vec![b, c]);
        assert_eq!(graph.predecessors(d).collect::<Vec<_>>(), vec![b, c]);
        assert_eq!(graph.out_degree(a), 2);
        assert_eq!(graph.in_degree(a), 0);
        assert_eq!(graph.node(c), Some(&"C"));
    }

    #[test]
    fn test_add_edge_invalid_node() {
        let mut graph: DirectedGraph<(), ()> = DirectedGraph::new();
        let a = graph.add_node(());
        let err = graph.add_edge(a, NodeId::new(9), ()).unwrap_err();
        assert!(err.to_string().contains("target node 9"));
    }

    #[test]
    fn test_remove_edge() {
        let (mut graph, [a, b, c, _]) = diamond();
        assert_eq!(graph.remove_edge(a, b), Some(1));
        assert_eq!(graph.remove_edge(a, b), None);
        assert_eq!(graph.successors(a).collect::<Vec<_>>(), vec![c]);
        assert_eq!(graph.in_degree(b), 0);
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn test_remove_node_detaches_both_directions() {
        let (mut graph, [a, b, c, d]) = diamond();
        assert_eq!(graph.remove_node(b), Some("B"));
        assert!(!graph.contains_node(b));
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.successors(a).collect::<Vec<_>>(), vec![c]);
        assert_eq!(graph.predecessors(d).collect::<Vec<_>>(), vec![c]);
        assert!(graph.add_edge(a, b, 0).is_err());
        assert_eq!(graph.node_bound(), 4);
        assert_eq!(graph.node_ids().collect::<Vec<_>>(), vec![a, c, d]);
    }

    #[test]
    fn test_remove_node_with_self_loop() {
        let mut graph: DirectedGraph<(), ()> = DirectedGraph::new();
        let a = graph.add_node(());
        let b = graph.add_node(());
        graph.add_edge(a, a, ()).unwrap();
        graph.add_edge(a, b, ()).unwrap();
        graph.remove_node(a);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.in_degree(b), 0);
    }

    #[test]
    fn test_edge_payload_access() {
        let (mut graph, [a, _, c, _]) = diamond();
        let edge = graph.find_edge(a, c).unwrap();
        assert_eq!(graph.edge(edge), Some(&2));
        *graph.edge_mut(edge).unwrap() = 7;
        assert_eq!(
            graph.outgoing_edges(a).map(|(_, _, w)| *w).collect::<Vec<_>>(),
            vec![1, 7]
        );
        assert_eq!(graph.edge_endpoints(edge), Some((a, c)));
    }
}
