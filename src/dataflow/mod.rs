//! Iterative dataflow over scope CFGs.
//!
//! Facts propagate along CFG edges until they stop changing. A problem
//! supplies the fact type, the direction, the meet operator and the per-block
//! transfer function; the [`DataFlowSolver`] runs a worklist to the
//! meet-over-paths fixed point.
//!
//! # Architecture
//!
//! - **Framework**: [`DataFlowProblem`] and the per-block [`FlowGraphNode`]
//! - **Lattice**: [`LatticeValue`] with TOP, BOTTOM and ANY for flat domains
//! - **Solver**: [`DataFlowSolver::compute_mop_solution`]
//!
//! # Analyses Provided
//!
//! - [`LiveVariables`]: which variables are read later, cached under `"LVP"`
//! - [`BindingStorePlacement`]: where captured locals must be written back
//! - [`BindingLoadPlacement`]: where captured locals must be reloaded
//! - [`TypeHintAnalysis`]: statically known core types
//!
//! # Example
//!
//! ```rust
//! use irscope::{
//!     dataflow::{DataFlowSolver, LiveVariables},
//!     ir::{Instr, IrScope, Operand, ScopeId, ScopeKind, Variable},
//! };
//!
//! let mut scope = IrScope::new(ScopeId(0), ScopeKind::Method, "m");
//! scope.add_instr(Instr::copy(Variable::local("a"), Operand::Fixnum(1)));
//! scope.add_instr(Instr::Return { value: Variable::local("a").into() });
//! scope.build_cfg()?;
//!
//! let liveness = LiveVariables::compute(&scope, &DataFlowSolver::new())?;
//! let cfg = scope.cfg().unwrap();
//! let body = cfg.fall_through_successor(cfg.entry()).unwrap();
//! assert_eq!(liveness.live_out_at(body, 0), vec![Variable::local("a")]);
//! # Ok::<(), irscope::Error>(())
//! ```

mod framework;
mod hints;
mod lattice;
mod liveness;
mod placement;
mod solver;

pub use framework::{
    DataFlowProblem, DataFlowSolution, DataFlowVar, DataFlowVars, Direction, FlowGraphNode,
};
pub use hints::{numeric_result_kind, KindFact, TypeHintAnalysis, TypeHints, TYPE_HINTS};
pub use lattice::LatticeValue;
pub use liveness::{LiveFact, LiveVariables, LiveVariablesProblem, LIVENESS_PROBLEM};
pub use placement::{
    binding_variables, BindingLoadPlacement, BindingStorePlacement, LOAD_PLACEMENT,
    STORE_PLACEMENT,
};
pub use solver::{DataFlowSolver, DEFAULT_MAX_ITERATIONS};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CallInstr, Instr, IrScope, Label, Operand, ScopeId, ScopeKind, Variable};

    fn nested_loops() -> IrScope {
        // i = 0; Louter: b_false(i, Ldone); j = 0;
        // Linner: b_false(j, Lstep); j = j - 1; jump Linner;
        // Lstep: i = i - 1; jump Louter; Ldone: return i
        let (i, j) = (Variable::local("i"), Variable::local("j"));
        let dec = |v: &Variable| {
            Instr::Call(CallInstr::new(
                Some(v.clone()),
                v.clone().into(),
                "-",
                vec![Operand::Fixnum(1)],
            ))
        };
        let mut scope = IrScope::new(ScopeId(0), ScopeKind::Method, "loops");
        for instr in [
            Instr::copy(i.clone(), Operand::Fixnum(3)),
            Instr::Label(Label::new("Louter")),
            Instr::BFalse {
                value: i.clone().into(),
                target: Label::new("Ldone"),
            },
            Instr::copy(j.clone(), Operand::Fixnum(3)),
            Instr::Label(Label::new("Linner")),
            Instr::BFalse {
                value: j.clone().into(),
                target: Label::new("Lstep"),
            },
            dec(&j),
            Instr::jump(Label::new("Linner")),
            Instr::Label(Label::new("Lstep")),
            dec(&i),
            Instr::jump(Label::new("Louter")),
            Instr::Label(Label::new("Ldone")),
            Instr::Return { value: i.into() },
        ] {
            scope.add_instr(instr);
        }
        scope.compute_scope_flags();
        scope.build_cfg().unwrap();
        scope
    }

    #[test]
    fn test_analyses_converge_on_nested_loops() {
        let scope = nested_loops();
        let solver = DataFlowSolver::new();

        let liveness = LiveVariables::compute(&scope, &solver).unwrap();
        let cfg = scope.cfg().unwrap();
        let inner = cfg.block_for(&Label::new("Linner")).unwrap();
        let mut live = liveness.live_in(inner);
        live.sort();
        assert_eq!(live, vec![Variable::local("i"), Variable::local("j")]);

        let hints = TypeHintAnalysis::compute(&scope, &solver).unwrap();
        assert_eq!(
            hints.kind_at_entry(inner, &Variable::local("j")),
            Some(crate::ir::ValueKind::Fixnum)
        );
    }

    #[test]
    fn test_liveness_fixed_point_is_stable() {
        let scope = nested_loops();
        let cfg = scope.cfg().unwrap();
        let mut problem = LiveVariablesProblem::new(&scope);
        let solution = DataFlowSolver::new()
            .compute_mop_solution(&mut problem, cfg)
            .unwrap();

        for block in cfg.blocks() {
            if block.id() == cfg.exit() {
                continue;
            }
            let mut acc = problem.initial();
            for (succ, ty) in cfg.outgoing(block.id()) {
                problem.meet(&mut acc, solution.node(succ).unwrap(), ty);
            }
            assert_eq!(Some(&acc), solution.output(block.id()));
            assert_eq!(
                Some(&problem.transfer(block, &acc)),
                solution.input(block.id())
            );
        }
    }
}
