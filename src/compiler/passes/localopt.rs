//! Block-local value propagation and guarded constant folding.
//!
//! Each block is walked forward with a map from variables to the value they
//! are known to hold. The map is emptied at labels, calls that stay calls,
//! and control transfers; writes to a variable drop every fact mentioning it.
//!
//! A call whose receiver and arguments are constants is folded when the
//! resolver provides a folder for it. The fold is only valid while the method
//! keeps its current definition, so an `assert_method_version` guard is
//! emitted in front of the first fold of each method version in a window:
//!
//! ```text
//! %v_0 = copy(1)                       %v_0 = copy(1)
//! %v_1 = call(%v_0, '+', 2)     ==>    assert_method_version(Fixnum#+, v0)
//!                                      %v_1 = copy(3)
//! ```
//!
//! Calls that cannot be folded but whose receiver kind is known, from a
//! constant or from the scope's type hints, get the kind attached to their
//! method address.

use log::debug;
use rustc_hash::FxHashSet;

use crate::{
    compiler::{
        events::{EventKind, EventLog},
        CompilationContext, CompilerPass, MethodResolver,
    },
    dataflow::{KindFact, TypeHintAnalysis},
    ir::{
        CallInstr, Instr, IrScope, MethAddr, Operand, ScopeId, ValueKind, ValueMap, Variable,
        VersionToken,
    },
    Result,
};

/// Simplifies operands and folds calls on constants.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalOptimizationPass;

/// Per-block rewriting state.
struct Window<'a> {
    scope: ScopeId,
    resolver: &'a dyn MethodResolver,
    hints: Option<&'a TypeHintAnalysis>,
    fact: Option<KindFact>,
    values: ValueMap,
    guards: FxHashSet<(MethAddr, VersionToken)>,
    changes: &'a EventLog,
}

impl Window<'_> {
    fn reset(&mut self) {
        self.values.clear();
        self.guards.clear();
    }

    fn kill(&mut self, var: &Variable) {
        self.values.remove(var);
        self.values.retain(|_, value| {
            let mut used = Vec::new();
            value.collect_variables(&mut used);
            !used.contains(var)
        });
    }

    fn receiver_kind(&self, receiver: &Operand) -> Option<ValueKind> {
        receiver.value_kind().or_else(|| {
            let (hints, fact) = (self.hints?, self.fact.as_ref()?);
            hints.problem().kind_of(fact, receiver.as_variable()?)
        })
    }

    /// Rewrites a call, returning the replacement instructions.
    fn call(&mut self, index: usize, mut call: CallInstr, out: &mut Vec<Instr>) -> bool {
        let Some(kind) = self.receiver_kind(&call.receiver) else {
            out.push(Instr::Call(call));
            return false;
        };
        let resolved = self.resolver.resolve(kind, &call.method.name);

        let foldable = call.closure.is_none()
            && call.receiver.is_constant()
            && call.args.iter().all(Operand::is_constant);
        if let (true, Some(method), Some(result)) = (foldable, &resolved, &call.result) {
            if let Some(value) = method
                .folder
                .and_then(|fold| fold(&call.receiver, &call.args))
            {
                if self.guards.insert((method.handle.clone(), method.version)) {
                    out.push(Instr::AssertMethodVersion {
                        method: method.handle.clone(),
                        version: method.version,
                    });
                    self.changes
                        .record(EventKind::GuardInserted)
                        .at(self.scope, index)
                        .message(format!("{} at {}", method.handle, method.version));
                }
                self.changes
                    .record(EventKind::ConstantFolded)
                    .at(self.scope, index)
                    .message(format!("{} => {value}", call.method.name));
                out.push(Instr::copy(result.clone(), value));
                return true;
            }
        }

        let changed = call.method.receiver_hint.is_none();
        if changed {
            call.method = call.method.with_hint(kind);
        }
        out.push(Instr::Call(call));
        changed
    }

    fn run(&mut self, instrs: Vec<Instr>) -> (Vec<Instr>, bool) {
        let mut out = Vec::with_capacity(instrs.len());
        let mut changed = false;

        for (index, mut instr) in instrs.into_iter().enumerate() {
            let before = out.len();
            let original = instr.clone();

            let known = instr.simplify_and_get_result(&self.values);
            if instr != original {
                changed = true;
                self.changes
                    .record(EventKind::CopyPropagated)
                    .at(self.scope, index)
                    .message(format!("{original} => {instr}"));
            }

            match instr {
                Instr::Call(call) => changed |= self.call(index, call, &mut out),
                other => out.push(other),
            }

            for emitted in &out[before..] {
                if let Some(result) = emitted.result() {
                    self.kill(result);
                }
                if let (Some(hints), Some(fact)) = (self.hints, self.fact.as_mut()) {
                    hints.problem().step(emitted, fact);
                }
            }
            let last = &out[out.len() - 1];
            if last.is_hard_boundary() {
                self.reset();
                continue;
            }
            let value = match last {
                Instr::Copy { value, .. } => Some(value.clone()),
                _ => known,
            };
            if let (Some(result), Some(value)) = (last.result(), value) {
                let mut reads = Vec::new();
                value.collect_variables(&mut reads);
                if !reads.contains(result) {
                    self.values.insert(result.clone(), value);
                }
            }
        }
        (out, changed)
    }
}

impl CompilerPass for LocalOptimizationPass {
    fn name(&self) -> &'static str {
        "LocalOptimization"
    }

    fn description(&self) -> &'static str {
        "Propagates known values and folds guarded constant calls"
    }

    fn run(&self, scope: &mut IrScope, ctx: &CompilationContext) -> Result<bool> {
        scope.require_cfg(self.name())?;
        scope.sweep_dead_instructions();
        let hints = TypeHintAnalysis::compute(scope, &ctx.solver())?;
        let changes = EventLog::new();
        let scope_id = scope.id();

        let cfg = scope.require_cfg_mut(self.name())?;
        let mut changed = false;
        for id in cfg.block_ids() {
            let Some(block) = cfg.block_mut(id) else {
                continue;
            };
            let mut window = Window {
                scope: scope_id,
                resolver: ctx.resolver(),
                hints: Some(&hints),
                fact: hints.entry_state(id).cloned(),
                values: ValueMap::default(),
                guards: FxHashSet::default(),
                changes: &changes,
            };
            let (instrs, block_changed) = window.run(std::mem::take(block.instrs_mut()));
            *block.instrs_mut() = instrs;
            changed |= block_changed;
        }

        if changed {
            debug!(
                "{}: {} folds, {} guards",
                scope.name(),
                changes.count_kind(EventKind::ConstantFolded),
                changes.count_kind(EventKind::GuardInserted)
            );
            scope.invalidate_analyses();
            ctx.events().merge(&changes);
        }
        Ok(changed)
    }
}
