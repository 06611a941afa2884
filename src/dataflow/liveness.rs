//! Live variable analysis.
//!
//! A variable is *live* at a point if some path from that point reads it
//! before writing it. This is a backward problem with union as meet:
//!
//! - `OUT[B]` = ∪ `IN[S]` over successors `S`
//! - `IN[B]` = (`OUT[B]` − `DEF[B]`) ∪ `USE[B]`
//!
//! Three things make it more than the textbook version:
//!
//! - A call that passes a closure, and the `BuildClosure` that creates it,
//!   reads every local the closure captures.
//! - At EXIT the locals captured by nested closures and the locals this scope
//!   borrows from its parents (depth > 0) are live, since someone else reads
//!   them after the scope returns. If the binding escaped, all locals are.
//! - Variables live at the start of a rescue block are *pinned* in every
//!   block that can raise into it: an exception can come from any
//!   instruction, so no definition in the protected block may kill them.
//!
//! The solution is cached on the scope under [`LIVENESS_PROBLEM`] and answers
//! per-instruction queries.

use std::fmt::Write;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    cfg::{Cfg, EdgeType},
    dataflow::{DataFlowProblem, DataFlowSolver, DataFlowVars, Direction, FlowGraphNode},
    ir::{BasicBlock, BlockId, Instr, IrScope, Operand, ScopeFlags, ScopeId, Variable, SCOPE_CAPTURING_METHODS},
    utils::BitSet,
    Result,
};

/// Cache key of the liveness solution.
pub const LIVENESS_PROBLEM: &str = "LVP";

/// Liveness fact of one block boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveFact {
    /// Live variable slots
    pub live: BitSet,
    /// Slots that definitions in this block must not kill
    pub pinned: BitSet,
}

impl LiveFact {
    fn empty(len: usize) -> Self {
        LiveFact {
            live: BitSet::new(len),
            pinned: BitSet::new(len),
        }
    }
}

/// The liveness problem for one scope.
#[derive(Debug, Clone)]
pub struct LiveVariablesProblem {
    vars: DataFlowVars,
    closure_captures: FxHashMap<ScopeId, Vec<Variable>>,
    all_captured: Vec<Variable>,
    scope_locals: Vec<Variable>,
    exit_live: Vec<Variable>,
}

impl LiveVariablesProblem {
    /// Collects the capture information of `scope`.
    #[must_use]
    pub fn new(scope: &IrScope) -> Self {
        let closure_captures: FxHashMap<ScopeId, Vec<Variable>> = scope
            .nested()
            .iter()
            .filter(|c| c.kind().is_closure())
            .map(|c| (c.id(), scope.closure_captures(c.id())))
            .collect();

        let mut all_captured: Vec<Variable> = scope.captured_locals().into_iter().collect();
        all_captured.sort();

        let mut locals: FxHashSet<Variable> = all_captured.iter().cloned().collect();
        for instr in scope.all_instrs() {
            let defined = instr.result().into_iter().cloned();
            for var in instr.used_variables().into_iter().chain(defined) {
                if var.is_local() {
                    locals.insert(var);
                }
            }
        }
        let mut scope_locals: Vec<Variable> = locals.into_iter().collect();
        scope_locals.sort();

        let mut exit_live: FxHashSet<Variable> = all_captured.iter().cloned().collect();
        exit_live.extend(scope.parent_locals());
        if scope
            .flags()
            .intersects(ScopeFlags::BINDING_HAS_ESCAPED | ScopeFlags::USES_EVAL)
        {
            exit_live.extend(scope_locals.iter().cloned());
        }
        let mut exit_live: Vec<Variable> = exit_live.into_iter().collect();
        exit_live.sort();

        let mut vars = DataFlowVars::new();
        for var in exit_live.iter().chain(&scope_locals) {
            vars.register(var);
        }

        LiveVariablesProblem {
            vars,
            closure_captures,
            all_captured,
            scope_locals,
            exit_live,
        }
    }

    /// The variable registry.
    #[must_use]
    pub fn vars(&self) -> &DataFlowVars {
        &self.vars
    }

    /// Variables an instruction reads implicitly, through a closure or an
    /// escaped binding.
    fn implicit_uses(&self, instr: &Instr) -> &[Variable] {
        match instr {
            Instr::Call(call) => {
                if SCOPE_CAPTURING_METHODS.contains(&call.method.name.as_str()) {
                    return &self.scope_locals;
                }
                match &call.closure {
                    Some(Operand::WrappedClosure(id)) => self
                        .closure_captures
                        .get(id)
                        .map_or(&[][..], Vec::as_slice),
                    Some(_) => &self.all_captured,
                    None => &[],
                }
            }
            Instr::BuildClosure { closure, .. } => self
                .closure_captures
                .get(closure)
                .map_or(&[][..], Vec::as_slice),
            _ => &[],
        }
    }

    /// Steps `live` backward over `instr`.
    ///
    /// The result is killed unless pinned; explicit and implicit uses are
    /// added.
    pub fn step_backward(&self, instr: &Instr, live: &mut BitSet, pinned: &BitSet) {
        if let Some(i) = instr.result().and_then(|r| self.vars.index_of(r)) {
            if !pinned.contains(i) {
                live.remove(i);
            }
        }
        for var in instr.used_variables() {
            if let Some(i) = self.vars.index_of(&var) {
                live.insert(i);
            }
        }
        for var in self.implicit_uses(instr) {
            if let Some(i) = self.vars.index_of(var) {
                live.insert(i);
            }
        }
    }
}

impl DataFlowProblem for LiveVariablesProblem {
    type Fact = LiveFact;

    fn name(&self) -> &'static str {
        LIVENESS_PROBLEM
    }

    fn direction(&self) -> Direction {
        Direction::Backward
    }

    fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    fn build_data_flow_vars(&mut self, block: &BasicBlock) {
        for instr in block.instrs() {
            if let Some(result) = instr.result() {
                self.vars.register(result);
            }
            for var in instr.used_variables() {
                self.vars.register(&var);
            }
        }
    }

    fn initial(&self) -> LiveFact {
        LiveFact::empty(self.vars.len())
    }

    fn boundary(&self) -> LiveFact {
        let mut fact = self.initial();
        fact.live = self.vars.set_of(&self.exit_live);
        fact
    }

    fn meet(&self, acc: &mut LiveFact, from: &FlowGraphNode<LiveFact>, edge: EdgeType) {
        acc.live.union_with(&from.input().live);
        if edge == EdgeType::Exception {
            acc.pinned.union_with(&from.input().live);
        }
    }

    fn transfer(&self, block: &BasicBlock, output: &LiveFact) -> LiveFact {
        let mut live = output.live.clone();
        for instr in block.instrs().iter().rev() {
            self.step_backward(instr, &mut live, &output.pinned);
        }
        LiveFact {
            live,
            pinned: BitSet::new(self.vars.len()),
        }
    }
}

/// Live sets of one block at every instruction boundary.
#[derive(Debug, Clone)]
struct BlockLiveness {
    /// `points[i]` is live before instruction `i`; the last entry is live-out.
    points: Vec<BitSet>,
    pinned: BitSet,
}

/// Solved liveness for one scope.
#[derive(Debug, Clone)]
pub struct LiveVariables {
    problem: LiveVariablesProblem,
    blocks: FxHashMap<BlockId, BlockLiveness>,
    iterations: usize,
}

impl LiveVariables {
    /// Solves liveness for `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MissingDependency`] if the scope has no CFG and
    /// propagates solver failures.
    pub fn compute(scope: &IrScope, solver: &DataFlowSolver) -> Result<Self> {
        let cfg = scope.require_cfg(LIVENESS_PROBLEM)?;
        let mut problem = LiveVariablesProblem::new(scope);
        let solution = solver.compute_mop_solution(&mut problem, cfg)?;

        let mut blocks = FxHashMap::default();
        if !solution.is_empty() {
            for block in cfg.blocks() {
                let Some(out) = solution.output(block.id()) else {
                    continue;
                };
                let mut points = vec![out.live.clone(); block.len() + 1];
                let mut live = out.live.clone();
                for (i, instr) in block.instrs().iter().enumerate().rev() {
                    problem.step_backward(instr, &mut live, &out.pinned);
                    points[i] = live.clone();
                }
                blocks.insert(
                    block.id(),
                    BlockLiveness {
                        points,
                        pinned: out.pinned.clone(),
                    },
                );
            }
        }

        Ok(LiveVariables {
            problem,
            blocks,
            iterations: solution.iterations(),
        })
    }

    /// The underlying problem, for stepping through instructions.
    #[must_use]
    pub fn problem(&self) -> &LiveVariablesProblem {
        &self.problem
    }

    /// The variable registry.
    #[must_use]
    pub fn vars(&self) -> &DataFlowVars {
        &self.problem.vars
    }

    /// Number of solver iterations.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    fn point(&self, block: BlockId, index: usize) -> Option<&BitSet> {
        self.blocks.get(&block).and_then(|b| b.points.get(index))
    }

    /// Live slots and pinned slots at the end of `block`.
    #[must_use]
    pub fn exit_state(&self, block: BlockId) -> Option<(&BitSet, &BitSet)> {
        self.blocks
            .get(&block)
            .and_then(|b| Some((b.points.last()?, &b.pinned)))
    }

    /// Variables live on entry to `block`.
    #[must_use]
    pub fn live_in(&self, block: BlockId) -> Vec<Variable> {
        self.live_in_at(block, 0)
    }

    /// Variables live on exit from `block`.
    #[must_use]
    pub fn live_out(&self, block: BlockId) -> Vec<Variable> {
        self.blocks
            .get(&block)
            .and_then(|b| b.points.last())
            .map(|set| self.problem.vars.variables_in(set))
            .unwrap_or_default()
    }

    /// Variables live just before instruction `index` of `block`.
    #[must_use]
    pub fn live_in_at(&self, block: BlockId, index: usize) -> Vec<Variable> {
        self.point(block, index)
            .map(|set| self.problem.vars.variables_in(set))
            .unwrap_or_default()
    }

    /// Variables live just after instruction `index` of `block`.
    #[must_use]
    pub fn live_out_at(&self, block: BlockId, index: usize) -> Vec<Variable> {
        self.live_in_at(block, index + 1)
    }

    /// Returns `true` if `var` is live just after instruction `index`.
    #[must_use]
    pub fn is_live_out_at(&self, block: BlockId, index: usize, var: &Variable) -> bool {
        match (self.point(block, index + 1), self.problem.vars.index_of(var)) {
            (Some(set), Some(i)) => set.contains(i),
            _ => false,
        }
    }

    /// Renders every instruction with the variables live after it.
    #[must_use]
    pub fn to_string_per_instr(&self, cfg: &Cfg) -> String {
        let mut out = String::new();
        for block in cfg.blocks() {
            let _ = writeln!(out, "{block}  live-in: {}", join(&self.live_in(block.id())));
            for (i, instr) in block.instrs().iter().enumerate() {
                let _ = writeln!(out, "  {instr:<40} # {}", join(&self.live_out_at(block.id(), i)));
            }
        }
        out
    }
}

fn join(vars: &[Variable]) -> String {
    if vars.is_empty() {
        return "-".to_string();
    }
    vars.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
