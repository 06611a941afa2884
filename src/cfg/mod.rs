//! Control flow graphs over IR basic blocks.
//!
//! A [`Cfg`] is a thin, block-aware layer over
//! [`crate::utils::graph::DirectedGraph`]. Blocks live in the graph's arena and
//! are addressed by [`BlockId`]; labels map to block ids through a side table
//! rather than through owning references, so splicing and removal never have
//! to chase back-pointers.
//!
//! # Key Components
//!
//! - [`Cfg`] - The graph, with ENTRY/EXIT sentinels and rescuer maps
//! - [`EdgeType`] - Why control flows along an edge
//! - [`Cfg::build`] - Construction from a flat instruction list
//! - [`Cfg::optimize`] - Exception edge pruning, orphan removal, block merging
//! - [`linearize`] / [`InterpreterContext`] - Block ordering for the interpreter
//!
//! # Structure
//!
//! Every CFG has exactly one ENTRY and one EXIT block, both empty. ENTRY has an
//! edge to the first real block and one directly to EXIT. Blocks that return
//! or throw have an [`EdgeType::Exit`] edge to EXIT. Blocks inside an
//! exception region have an [`EdgeType::Exception`] edge to their rescuer.

mod builder;
mod linearize;
mod optimize;
mod printer;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    ir::{BasicBlock, BlockId, Instr, Label, Renamer},
    utils::graph::{
        algorithms::{postorder_all, reverse_postorder},
        DirectedGraph, GraphBase, NodeId, Predecessors, RootedGraph, Successors,
    },
    Result,
};

pub use linearize::{linearize, InterpreterContext};

/// Label of the ENTRY sentinel.
pub const ENTRY_LABEL: &str = "_ENTRY";
/// Label of the EXIT sentinel.
pub const EXIT_LABEL: &str = "_EXIT";

/// The kind of control flow an edge represents.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
pub enum EdgeType {
    /// Explicit jump or branch target
    Regular,
    /// Execution continues into the next block without a jump
    FallThrough,
    /// An instruction in the source block may raise into the target
    Exception,
    /// The source block leaves the scope
    Exit,
}

impl EdgeType {
    /// Returns `true` for exception edges.
    #[must_use]
    pub const fn is_exceptional(self) -> bool {
        matches!(self, EdgeType::Exception)
    }
}

/// A control flow graph for one scope.
#[derive(Debug, Clone)]
pub struct Cfg {
    graph: DirectedGraph<BasicBlock, EdgeType>,
    entry: BlockId,
    exit: BlockId,
    labels: FxHashMap<Label, BlockId>,
    rescuers: FxHashMap<BlockId, BlockId>,
    ensurers: FxHashMap<BlockId, BlockId>,
    global_ensure: Option<BlockId>,
}

impl Cfg {
    /// Creates a graph holding only the ENTRY and EXIT sentinels, unconnected.
    fn with_sentinels() -> Self {
        let mut cfg = Cfg {
            graph: DirectedGraph::new(),
            entry: NodeId::new(0),
            exit: NodeId::new(1),
            labels: FxHashMap::default(),
            rescuers: FxHashMap::default(),
            ensurers: FxHashMap::default(),
            global_ensure: None,
        };
        cfg.entry = cfg.create_block(Label::new(ENTRY_LABEL));
        cfg.exit = cfg.create_block(Label::new(EXIT_LABEL));
        cfg
    }

    fn create_block(&mut self, label: Label) -> BlockId {
        let id = NodeId::new(self.graph.node_bound());
        let added = self.graph.add_node(BasicBlock::new(id, label.clone()));
        self.labels.insert(label, added);
        added
    }

    /// The ENTRY sentinel.
    #[must_use]
    pub fn entry(&self) -> BlockId {
        self.entry
    }

    /// The EXIT sentinel.
    #[must_use]
    pub fn exit(&self) -> BlockId {
        self.exit
    }

    /// Returns `true` for ENTRY and EXIT.
    #[must_use]
    pub fn is_sentinel(&self, id: BlockId) -> bool {
        id == self.entry || id == self.exit
    }

    /// Looks up a block.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.graph.node(id)
    }

    /// Looks up a block mutably.
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.graph.node_mut(id)
    }

    /// The block a label names.
    #[must_use]
    pub fn block_for(&self, label: &Label) -> Option<BlockId> {
        self.labels.get(label).copied()
    }

    /// Live blocks in id order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.graph.nodes().map(|(_, b)| b)
    }

    /// Live blocks in id order, mutably.
    pub fn blocks_mut(&mut self) -> impl Iterator<Item = &mut BasicBlock> {
        self.graph.nodes_mut().map(|(_, b)| b)
    }

    /// Live block ids in id order.
    #[must_use]
    pub fn block_ids(&self) -> Vec<BlockId> {
        self.graph.node_ids().collect()
    }

    /// Number of live blocks, sentinels included.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Total number of instructions across all blocks.
    #[must_use]
    pub fn instr_count(&self) -> usize {
        self.blocks().map(BasicBlock::len).sum()
    }

    // ── Edges ───────────────────────────────────────────────────────────

    /// Adds an edge of the given type.
    ///
    /// At most one edge connects any ordered pair of blocks. Adding a second
    /// one keeps the first, except that a fall-through edge replaces whatever
    /// was there: the linearizer must know a fall-through exists.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphError`] if either block does not exist.
    pub fn add_edge(&mut self, src: BlockId, dst: BlockId, ty: EdgeType) -> Result<()> {
        if let Some(existing) = self.graph.find_edge(src, dst) {
            if ty == EdgeType::FallThrough {
                if let Some(data) = self.graph.edge_mut(existing) {
                    *data = ty;
                }
            }
            return Ok(());
        }
        self.graph.add_edge(src, dst, ty)?;
        Ok(())
    }

    /// Removes the edge `src -> dst`. Returns `true` if one existed.
    pub fn remove_edge(&mut self, src: BlockId, dst: BlockId) -> bool {
        self.graph.remove_edge(src, dst).is_some()
    }

    /// Type of the edge `src -> dst`, if any.
    #[must_use]
    pub fn edge_type(&self, src: BlockId, dst: BlockId) -> Option<EdgeType> {
        self.graph
            .find_edge(src, dst)
            .and_then(|e| self.graph.edge(e))
            .copied()
    }

    /// Changes the type of an existing edge.
    pub fn set_edge_type(&mut self, src: BlockId, dst: BlockId, ty: EdgeType) {
        if let Some(edge) = self.graph.find_edge(src, dst) {
            if let Some(data) = self.graph.edge_mut(edge) {
                *data = ty;
            }
        }
    }

    /// Outgoing `(target, type)` pairs in insertion order.
    pub fn outgoing(&self, id: BlockId) -> impl Iterator<Item = (BlockId, EdgeType)> + '_ {
        self.graph.outgoing_edges(id).map(|(_, dst, ty)| (dst, *ty))
    }

    /// Incoming `(source, type)` pairs in insertion order.
    pub fn incoming(&self, id: BlockId) -> impl Iterator<Item = (BlockId, EdgeType)> + '_ {
        self.graph.incoming_edges(id).map(|(_, src, ty)| (src, *ty))
    }

    /// Successors reached through edges of type `ty`.
    #[must_use]
    pub fn successors_of_type(&self, id: BlockId, ty: EdgeType) -> Vec<BlockId> {
        self.outgoing(id)
            .filter(|(_, t)| *t == ty)
            .map(|(dst, _)| dst)
            .collect()
    }

    /// Predecessors reaching `id` through edges of type `ty`.
    #[must_use]
    pub fn predecessors_of_type(&self, id: BlockId, ty: EdgeType) -> Vec<BlockId> {
        self.incoming(id)
            .filter(|(_, t)| *t == ty)
            .map(|(src, _)| src)
            .collect()
    }

    /// The block `id` falls through to, if any.
    #[must_use]
    pub fn fall_through_successor(&self, id: BlockId) -> Option<BlockId> {
        self.outgoing(id)
            .find(|(_, t)| *t == EdgeType::FallThrough)
            .map(|(dst, _)| dst)
    }

    /// The block that falls through into `id`, if any.
    #[must_use]
    pub fn fall_through_predecessor(&self, id: BlockId) -> Option<BlockId> {
        self.incoming(id)
            .find(|(_, t)| *t == EdgeType::FallThrough)
            .map(|(src, _)| src)
    }

    /// Number of outgoing edges.
    #[must_use]
    pub fn out_degree(&self, id: BlockId) -> usize {
        self.graph.out_degree(id)
    }

    /// Number of incoming edges.
    #[must_use]
    pub fn in_degree(&self, id: BlockId) -> usize {
        self.graph.in_degree(id)
    }

    // ── Vertices ────────────────────────────────────────────────────────

    /// Returns the block labelled `label`, creating an empty one if needed.
    pub fn vertex_for(&mut self, label: &Label) -> BlockId {
        match self.block_for(label) {
            Some(id) => id,
            None => self.create_block(label.clone()),
        }
    }

    /// Detaches `id` from every neighbour and drops it.
    ///
    /// The sentinels cannot be removed. Rescuer and ensurer entries that
    /// mention the block are dropped along with its label.
    pub fn remove_vertex_for(&mut self, id: BlockId) -> Option<BasicBlock> {
        if self.is_sentinel(id) {
            return None;
        }
        let block = self.graph.remove_node(id)?;
        self.labels.remove(block.label());
        self.rescuers.retain(|k, v| *k != id && *v != id);
        self.ensurers.retain(|k, v| *k != id && *v != id);
        if self.global_ensure == Some(id) {
            self.global_ensure = None;
        }
        Some(block)
    }

    /// Splits `id` before instruction `at`.
    ///
    /// The tail moves into a new block labelled `label`, which takes over the
    /// normal outgoing edges of `id`. Exception edges are copied rather than
    /// moved: both halves stay protected by the rescuer of `id`. No edge
    /// connects the two halves; the caller decides how control gets from one
    /// to the other.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if `id` does not exist.
    pub fn split_block(&mut self, id: BlockId, at: usize, label: Label) -> Result<BlockId> {
        let tail = self
            .block_mut(id)
            .ok_or_else(|| malformed_error!("cannot split missing block {}", id))?
            .split_off(at);
        let outgoing: Vec<(BlockId, EdgeType)> = self.outgoing(id).collect();

        let new_id = self.create_block(label);
        if let Some(block) = self.block_mut(new_id) {
            block.instrs_mut().extend(tail);
        }
        for (dst, ty) in outgoing {
            if ty != EdgeType::Exception {
                self.remove_edge(id, dst);
            }
            let dst = if dst == id { new_id } else { dst };
            self.add_edge(new_id, dst, ty)?;
        }
        if let Some(rescuer) = self.rescuers.get(&id).copied() {
            self.rescuers.insert(new_id, rescuer);
        }
        if let Some(ensurer) = self.ensurers.get(&id).copied() {
            self.ensurers.insert(new_id, ensurer);
        }
        Ok(new_id)
    }

    /// Creates a new empty block with `label`.
    pub fn add_block(&mut self, label: Label) -> BlockId {
        self.create_block(label)
    }

    // ── Exception handling ──────────────────────────────────────────────

    /// The rescue-entry block protecting `id`.
    #[must_use]
    pub fn rescuer_for(&self, id: BlockId) -> Option<BlockId> {
        self.rescuers.get(&id).copied()
    }

    /// The ensure block protecting `id`.
    #[must_use]
    pub fn ensurer_for(&self, id: BlockId) -> Option<BlockId> {
        self.ensurers.get(&id).copied()
    }

    /// Makes `rescuer` the handler of `id` and adds the exception edge.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphError`] if either block does not exist.
    pub fn set_rescuer(&mut self, id: BlockId, rescuer: BlockId) -> Result<()> {
        self.add_edge(id, rescuer, EdgeType::Exception)?;
        self.rescuers.insert(id, rescuer);
        if let Some(block) = self.block_mut(rescuer) {
            block.mark_rescue_entry();
        }
        Ok(())
    }

    /// The scope-wide ensure block, if installed.
    #[must_use]
    pub fn global_ensure_block(&self) -> Option<BlockId> {
        self.global_ensure
    }

    /// Installs a scope-wide handler holding `instrs`.
    ///
    /// The block becomes the rescuer of every block that has none and that
    /// may raise, and flows to EXIT.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if a global ensure block already
    /// exists.
    pub fn add_global_ensure_block(&mut self, label: Label, instrs: Vec<Instr>) -> Result<BlockId> {
        if self.global_ensure.is_some() {
            return Err(malformed_error!("scope already has a global ensure block"));
        }
        let geb = self.create_block(label);
        if let Some(block) = self.block_mut(geb) {
            block.instrs_mut().extend(instrs);
        }
        self.add_edge(geb, self.exit, EdgeType::Exit)?;

        let unprotected: Vec<BlockId> = self
            .blocks()
            .filter(|b| {
                let id = b.id();
                id != geb
                    && !self.is_sentinel(id)
                    && !self.rescuers.contains_key(&id)
                    && b.can_raise_exception()
            })
            .map(BasicBlock::id)
            .collect();
        for id in unprotected {
            self.set_rescuer(id, geb)?;
        }
        self.global_ensure = Some(geb);
        Ok(geb)
    }

    // ── Traversal ───────────────────────────────────────────────────────

    /// Post-order from ENTRY; unreachable blocks follow in id order.
    #[must_use]
    pub fn postorder(&self) -> Vec<BlockId> {
        postorder_all(&self.graph, self.entry)
    }

    /// Reverse post-order from ENTRY; unreachable blocks follow in id order.
    #[must_use]
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut order = reverse_postorder(&self.graph, self.entry);
        let mut seen = vec![false; self.graph.node_bound()];
        for id in &order {
            seen[id.index()] = true;
        }
        order.extend(self.graph.node_ids().filter(|id| !seen[id.index()]));
        order
    }

    // ── Cloning ─────────────────────────────────────────────────────────

    /// Deep-copies the graph, passing every instruction and block label
    /// through `renamer`.
    #[must_use]
    pub fn clone_for_cloning_closure(&self, renamer: &mut Renamer<'_>) -> Cfg {
        let mut cloned = self.clone();
        let (entry, exit) = (cloned.entry, cloned.exit);
        for block in cloned.blocks_mut() {
            if block.id() == entry || block.id() == exit {
                continue;
            }
            let label = renamer.label(block.label());
            block.set_label(label);
            let instrs: Vec<Instr> = block
                .instrs()
                .iter()
                .map(|i| i.clone_for_inlining(renamer))
                .collect();
            *block.instrs_mut() = instrs;
        }
        cloned.labels = cloned
            .blocks()
            .map(|b| (b.label().clone(), b.id()))
            .collect();
        cloned
    }
}

impl GraphBase for Cfg {
    fn node_bound(&self) -> usize {
        self.graph.node_bound()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        self.graph.node_ids()
    }
}

impl Successors for Cfg {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.graph.successors(node)
    }
}

impl Predecessors for Cfg {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.graph.predecessors(node)
    }
}

impl RootedGraph for Cfg {
    fn entry(&self) -> NodeId {
        self.entry
    }
}
