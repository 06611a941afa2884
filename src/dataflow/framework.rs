//! Dataflow problem trait, per-block nodes and solutions.
//!
//! Any specific analysis implements [`DataFlowProblem`] to plug into
//! [`DataFlowSolver`](crate::dataflow::DataFlowSolver). The problem owns its
//! fact layout: before solving, every block is shown to
//! [`build_data_flow_vars`](DataFlowProblem::build_data_flow_vars) so the
//! problem can hand out dense [`DataFlowVar`] slots, typically one per IR
//! variable.

use std::fmt::{self, Debug};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    cfg::{Cfg, EdgeType},
    ir::{BasicBlock, BlockId, Variable},
    utils::BitSet,
};

/// Direction in which facts propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From ENTRY towards EXIT; IN is the meet over predecessors.
    Forward,
    /// From EXIT towards ENTRY; OUT is the meet over successors.
    Backward,
    /// Both at once. Not supported by the solver.
    Bidirectional,
}

/// Dense index of one fact slot within a single problem instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataFlowVar(pub u32);

impl DataFlowVar {
    /// Slot index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for DataFlowVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dfv{}", self.0)
    }
}

/// Bidirectional map between IR variables and [`DataFlowVar`] slots.
///
/// Slots are handed out in registration order and never reused.
#[derive(Debug, Clone, Default)]
pub struct DataFlowVars {
    ids: FxHashMap<Variable, DataFlowVar>,
    vars: Vec<Variable>,
}

impl DataFlowVars {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot of `var`, allocating one on first sight.
    pub fn register(&mut self, var: &Variable) -> DataFlowVar {
        if let Some(id) = self.ids.get(var) {
            return *id;
        }
        #[allow(clippy::cast_possible_truncation)]
        let id = DataFlowVar(self.vars.len() as u32);
        self.ids.insert(var.clone(), id);
        self.vars.push(var.clone());
        id
    }

    /// Slot of `var`, if registered.
    #[must_use]
    pub fn get(&self, var: &Variable) -> Option<DataFlowVar> {
        self.ids.get(var).copied()
    }

    /// Slot index of `var`, if registered.
    #[must_use]
    pub fn index_of(&self, var: &Variable) -> Option<usize> {
        self.get(var).map(DataFlowVar::index)
    }

    /// Variable in slot `id`.
    #[must_use]
    pub fn variable(&self, id: DataFlowVar) -> Option<&Variable> {
        self.vars.get(id.index())
    }

    /// Variable in slot `index`.
    #[must_use]
    pub fn variable_at(&self, index: usize) -> Option<&Variable> {
        self.vars.get(index)
    }

    /// Number of registered slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns `true` if nothing was registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Registered variables in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.vars.iter()
    }

    /// Builds a set holding the slots of every registered variable in `vars`.
    #[must_use]
    pub fn set_of<'a>(&self, vars: impl IntoIterator<Item = &'a Variable>) -> BitSet {
        let mut set = BitSet::new(self.len());
        for var in vars {
            if let Some(i) = self.index_of(var) {
                set.insert(i);
            }
        }
        set
    }

    /// The variables whose slots are set in `set`, in slot order.
    #[must_use]
    pub fn variables_in(&self, set: &BitSet) -> Vec<Variable> {
        set.iter()
            .filter_map(|i| self.vars.get(i).cloned())
            .collect()
    }
}

/// IN and OUT facts of one block for one problem.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowGraphNode<F> {
    block: BlockId,
    input: F,
    output: F,
}

impl<F: Clone> FlowGraphNode<F> {
    /// Creates a node with both facts set to `initial`.
    #[must_use]
    pub fn new(block: BlockId, initial: F) -> Self {
        FlowGraphNode {
            block,
            input: initial.clone(),
            output: initial,
        }
    }

    /// Resets both facts to `initial`.
    pub fn init(&mut self, initial: &F) {
        self.input = initial.clone();
        self.output = initial.clone();
    }

    /// The block this node describes.
    #[must_use]
    pub fn block(&self) -> BlockId {
        self.block
    }

    /// Fact at block entry.
    #[must_use]
    pub fn input(&self) -> &F {
        &self.input
    }

    /// Fact at block exit.
    #[must_use]
    pub fn output(&self) -> &F {
        &self.output
    }

    pub(crate) fn set_input(&mut self, fact: F) {
        self.input = fact;
    }

    pub(crate) fn set_output(&mut self, fact: F) {
        self.output = fact;
    }
}

/// A dataflow analysis the solver can run.
///
/// The solver calls, in order: [`build_data_flow_vars`] on every block,
/// [`is_empty`], [`build_flow_graph_node`] and `init` on every block, then
/// iterates [`meet`] and [`transfer`] to a fixed point, and finally calls
/// [`finalize`].
///
/// [`meet`] receives the whole neighbour node and the edge type so problems
/// can treat exception edges specially; forward problems normally read the
/// neighbour's [`output`](FlowGraphNode::output), backward ones its
/// [`input`](FlowGraphNode::input).
///
/// Monotonicity of `transfer` is the implementor's obligation.
///
/// [`build_data_flow_vars`]: DataFlowProblem::build_data_flow_vars
/// [`is_empty`]: DataFlowProblem::is_empty
/// [`build_flow_graph_node`]: DataFlowProblem::build_flow_graph_node
/// [`meet`]: DataFlowProblem::meet
/// [`transfer`]: DataFlowProblem::transfer
/// [`finalize`]: DataFlowProblem::finalize
pub trait DataFlowProblem {
    /// The per-block fact.
    type Fact: Clone + PartialEq + Debug;

    /// Name the solution is cached under.
    fn name(&self) -> &'static str;

    /// Propagation direction.
    fn direction(&self) -> Direction;

    /// Returns `true` if there is nothing to compute. Checked after every
    /// block has been shown to [`build_data_flow_vars`](Self::build_data_flow_vars).
    fn is_empty(&self) -> bool {
        false
    }

    /// Registers the facts `block` mentions.
    fn build_data_flow_vars(&mut self, block: &BasicBlock);

    /// Creates the fact container for `block`.
    fn build_flow_graph_node(&self, block: &BasicBlock) -> FlowGraphNode<Self::Fact> {
        FlowGraphNode::new(block.id(), self.initial())
    }

    /// TOP: the fact before anything is known.
    fn initial(&self) -> Self::Fact;

    /// Fact at ENTRY (forward) or EXIT (backward).
    fn boundary(&self) -> Self::Fact;

    /// Folds a neighbour's fact into `acc`.
    fn meet(&self, acc: &mut Self::Fact, from: &FlowGraphNode<Self::Fact>, edge: EdgeType);

    /// Applies `block`'s effect to `input`: IN to OUT for forward problems,
    /// OUT to IN for backward ones.
    fn transfer(&self, block: &BasicBlock, input: &Self::Fact) -> Self::Fact;

    /// Called once after the fixed point is reached.
    fn finalize(&mut self, _cfg: &Cfg, _nodes: &[FlowGraphNode<Self::Fact>]) {}
}

/// The fixed point of one problem over one CFG.
#[derive(Debug, Clone)]
pub struct DataFlowSolution<F> {
    name: &'static str,
    nodes: Vec<Option<FlowGraphNode<F>>>,
    iterations: usize,
}

impl<F> DataFlowSolution<F> {
    pub(crate) fn new(
        name: &'static str,
        nodes: Vec<Option<FlowGraphNode<F>>>,
        iterations: usize,
    ) -> Self {
        DataFlowSolution {
            name,
            nodes,
            iterations,
        }
    }

    /// Solution of a problem that had nothing to compute.
    #[must_use]
    pub fn empty(name: &'static str) -> Self {
        DataFlowSolution {
            name,
            nodes: Vec::new(),
            iterations: 0,
        }
    }

    /// Name of the solved problem.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` if the problem was skipped as empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of node visits the solver made.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Node of `block`.
    #[must_use]
    pub fn node(&self, block: BlockId) -> Option<&FlowGraphNode<F>> {
        self.nodes.get(block.index()).and_then(Option::as_ref)
    }

    /// Fact at entry of `block`.
    #[must_use]
    pub fn input(&self, block: BlockId) -> Option<&F> {
        self.node(block).map(|n| &n.input)
    }

    /// Fact at exit of `block`.
    #[must_use]
    pub fn output(&self, block: BlockId) -> Option<&F> {
        self.node(block).map(|n| &n.output)
    }

    /// Every node, in block id order.
    pub fn nodes(&self) -> impl Iterator<Item = &FlowGraphNode<F>> {
        self.nodes.iter().flatten()
    }
}
