//! Static core-type hints.
//!
//! A forward analysis over [`LatticeValue<ValueKind>`] per variable. Constants
//! give their kind, copies propagate it, and arithmetic or comparison calls on
//! numeric operands produce a numeric or boolean kind. Everything else the
//! scope defines becomes BOTTOM. A call that passes a closure, or that can
//! capture the binding, may rewrite every binding-backed local, so those drop
//! to BOTTOM as well.
//!
//! Local optimization uses the solution to learn receiver types of variables
//! defined in other blocks.

use rustc_hash::FxHashSet;

use crate::{
    cfg::EdgeType,
    dataflow::{
        binding_variables, DataFlowProblem, DataFlowSolution, DataFlowSolver, DataFlowVars,
        Direction, FlowGraphNode, LatticeValue,
    },
    ir::{BasicBlock, BlockId, Instr, IrScope, Operand, ValueKind, Variable, SCOPE_CAPTURING_METHODS},
    Result,
};

/// Cache key of the type hint solution.
pub const TYPE_HINTS: &str = "TypeHints";

/// One kind per registered variable slot.
pub type KindFact = Vec<LatticeValue<ValueKind>>;

/// Result kind of a core numeric method, if it is statically known.
#[must_use]
pub fn numeric_result_kind(method: &str, receiver: ValueKind, arg: ValueKind) -> Option<ValueKind> {
    let numeric = |k: ValueKind| matches!(k, ValueKind::Fixnum | ValueKind::Float);
    if !numeric(receiver) || !numeric(arg) {
        return None;
    }
    match method {
        "+" | "-" | "*" | "/" | "%" => {
            if receiver == ValueKind::Fixnum && arg == ValueKind::Fixnum {
                Some(ValueKind::Fixnum)
            } else {
                Some(ValueKind::Float)
            }
        }
        "<" | "<=" | ">" | ">=" | "==" | "!=" => Some(ValueKind::Boolean),
        _ => None,
    }
}

/// The type hint problem for one scope.
#[derive(Debug, Clone)]
pub struct TypeHints {
    vars: DataFlowVars,
    binding: FxHashSet<Variable>,
}

impl TypeHints {
    /// Prepares the problem for `scope`.
    #[must_use]
    pub fn new(scope: &IrScope) -> Self {
        TypeHints {
            vars: DataFlowVars::new(),
            binding: binding_variables(scope).into_iter().collect(),
        }
    }

    /// The variable registry.
    #[must_use]
    pub fn vars(&self) -> &DataFlowVars {
        &self.vars
    }

    /// Known kind of `var` in `fact`.
    #[must_use]
    pub fn kind_of(&self, fact: &KindFact, var: &Variable) -> Option<ValueKind> {
        self.vars
            .index_of(var)
            .and_then(|i| fact.get(i))
            .and_then(|v| v.value().copied())
    }

    fn operand_kind(&self, fact: &KindFact, op: &Operand) -> LatticeValue<ValueKind> {
        if let Some(kind) = op.value_kind() {
            return LatticeValue::Value(kind);
        }
        match op
            .as_variable()
            .and_then(|v| self.vars.index_of(v))
            .and_then(|i| fact.get(i))
        {
            Some(state) => state.clone(),
            None => LatticeValue::Bottom,
        }
    }

    fn set(&self, fact: &mut KindFact, var: &Variable, value: LatticeValue<ValueKind>) {
        if let Some(slot) = self.vars.index_of(var).and_then(|i| fact.get_mut(i)) {
            *slot = value;
        }
    }

    /// Applies `instr` to `fact`.
    pub fn step(&self, instr: &Instr, fact: &mut KindFact) {
        if let Instr::Call(call) = instr {
            let captures = call.closure.is_some()
                || SCOPE_CAPTURING_METHODS.contains(&call.method.name.as_str());
            if captures {
                for var in &self.binding {
                    self.set(fact, var, LatticeValue::Bottom);
                }
            }
        }

        let Some(result) = instr.result() else {
            return;
        };
        let value = match instr {
            Instr::Copy { value, .. } => self.operand_kind(fact, value),
            Instr::Call(call) if call.args.len() == 1 => {
                let receiver = self.operand_kind(fact, &call.receiver);
                let arg = self.operand_kind(fact, &call.args[0]);
                match (receiver.value(), arg.value()) {
                    (Some(r), Some(a)) => numeric_result_kind(&call.method.name, *r, *a)
                        .map_or(LatticeValue::Bottom, LatticeValue::Value),
                    _ => LatticeValue::Bottom,
                }
            }
            _ => LatticeValue::Bottom,
        };
        self.set(fact, result, value);
    }
}

impl DataFlowProblem for TypeHints {
    type Fact = KindFact;

    fn name(&self) -> &'static str {
        TYPE_HINTS
    }

    fn direction(&self) -> Direction {
        Direction::Forward
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

    fn initial(&self) -> KindFact {
        vec![LatticeValue::Top; self.vars.len()]
    }

    fn boundary(&self) -> KindFact {
        self.vars
            .iter()
            .map(|var| match var {
                Variable::Local { depth: 0, .. } => LatticeValue::Value(ValueKind::Nil),
                Variable::Temp(_) | Variable::Inlined { .. } => LatticeValue::Any,
                _ => LatticeValue::Bottom,
            })
            .collect()
    }

    fn meet(&self, acc: &mut KindFact, from: &FlowGraphNode<KindFact>, edge: EdgeType) {
        let mut merge = |other: &KindFact| {
            for (slot, value) in acc.iter_mut().zip(other) {
                *slot = slot.meet(value);
            }
        };
        merge(from.output());
        // A handler may observe the state at any point of the raising block.
        if edge.is_exceptional() {
            merge(from.input());
        }
    }

    fn transfer(&self, block: &BasicBlock, input: &KindFact) -> KindFact {
        let mut fact = input.clone();
        for instr in block.instrs() {
            self.step(instr, &mut fact);
        }
        fact
    }
}

/// Solved type hints for one scope.
#[derive(Debug, Clone)]
pub struct TypeHintAnalysis {
    problem: TypeHints,
    solution: DataFlowSolution<KindFact>,
}

impl TypeHintAnalysis {
    /// Solves type hints for `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MissingDependency`] without a CFG and
    /// propagates solver failures.
    pub fn compute(scope: &IrScope, solver: &DataFlowSolver) -> Result<Self> {
        let cfg = scope.require_cfg(TYPE_HINTS)?;
        let mut problem = TypeHints::new(scope);
        let solution = solver.compute_mop_solution(&mut problem, cfg)?;
        Ok(TypeHintAnalysis { problem, solution })
    }

    /// The problem, for stepping through a block.
    #[must_use]
    pub fn problem(&self) -> &TypeHints {
        &self.problem
    }

    /// Kinds on entry to `block`.
    #[must_use]
    pub fn entry_state(&self, block: BlockId) -> Option<&KindFact> {
        self.solution.input(block)
    }

    /// Known kind of `var` on entry to `block`.
    #[must_use]
    pub fn kind_at_entry(&self, block: BlockId, var: &Variable) -> Option<ValueKind> {
        self.entry_state(block)
            .and_then(|fact| self.problem.kind_of(fact, var))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CallInstr, Label, ScopeId, ScopeKind};

    fn local(name: &str) -> Variable {
        Variable::local(name)
    }

    fn analyze(instrs: Vec<Instr>) -> (IrScope, TypeHintAnalysis) {
        let mut scope = IrScope::new(ScopeId(0), ScopeKind::Method, "m");
        for instr in instrs {
            scope.add_instr(instr);
        }
        scope.compute_scope_flags();
        scope.build_cfg().unwrap();
        let hints = TypeHintAnalysis::compute(&scope, &DataFlowSolver::new()).unwrap();
        (scope, hints)
    }

    #[test]
    fn test_numeric_result_kind() {
        use ValueKind::*;
        assert_eq!(numeric_result_kind("+", Fixnum, Fixnum), Some(Fixnum));
        assert_eq!(numeric_result_kind("*", Fixnum, Float), Some(Float));
        assert_eq!(numeric_result_kind("<", Float, Fixnum), Some(Boolean));
        assert_eq!(numeric_result_kind("+", Str, Str), None);
        assert_eq!(numeric_result_kind("foo", Fixnum, Fixnum), None);
    }

    #[test]
    fn test_kinds_flow_across_blocks() {
        let (scope, hints) = analyze(vec![
            Instr::copy(local("a"), Operand::Fixnum(1)),
            Instr::Call(CallInstr::new(
                Some(local("b")),
                local("a").into(),
                "+",
                vec![Operand::Float(0.5)],
            )),
            Instr::jump(Label::new("Lnext")),
            Instr::Label(Label::new("Lnext")),
            Instr::Return {
                value: local("b").into(),
            },
        ]);
        let next = scope.cfg().unwrap().block_for(&Label::new("Lnext")).unwrap();
        assert_eq!(hints.kind_at_entry(next, &local("a")), Some(ValueKind::Fixnum));
        assert_eq!(hints.kind_at_entry(next, &local("b")), Some(ValueKind::Float));
    }

    #[test]
    fn test_conflicting_paths_fall_to_bottom() {
        // b_true(c, Lother); a = 1; jump Ljoin; Lother: a = "s"; Ljoin: return a
        let (scope, hints) = analyze(vec![
            Instr::ReceiveArg {
                result: local("c"),
                index: 0,
            },
            Instr::BTrue {
                value: local("c").into(),
                target: Label::new("Lother"),
            },
            Instr::copy(local("a"), Operand::Fixnum(1)),
            Instr::jump(Label::new("Ljoin")),
            Instr::Label(Label::new("Lother")),
            Instr::copy(local("a"), Operand::Str("s".into())),
            Instr::Label(Label::new("Ljoin")),
            Instr::Return {
                value: local("a").into(),
            },
        ]);
        let join = scope.cfg().unwrap().block_for(&Label::new("Ljoin")).unwrap();
        assert_eq!(hints.kind_at_entry(join, &local("a")), None);
        let state = hints.entry_state(join).unwrap();
        let slot = hints.problem().vars().index_of(&local("a")).unwrap();
        assert!(state[slot].is_bottom());
        assert_eq!(hints.kind_at_entry(join, &local("c")), None);
    }

    #[test]
    fn test_unassigned_local_is_nil() {
        let (scope, hints) = analyze(vec![Instr::Return {
            value: local("u").into(),
        }]);
        let cfg = scope.cfg().unwrap();
        let body = cfg.fall_through_successor(cfg.entry()).unwrap();
        assert_eq!(hints.kind_at_entry(body, &local("u")), Some(ValueKind::Nil));
    }
}
