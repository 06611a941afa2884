//! Single-site method inlining.
//!
//! The pass looks for the first call to its target method (blocks in reverse
//! post-order, instructions in order) and splices a renamed copy of the
//! registered callee CFG in its place:
//!
//! ```text
//! host:   ...; %r = call(%recv, 'm', a0)    ; rest
//!
//! after:  ...; %s = copy(%recv)
//!         guard_method_version(%s, 'm', v3, Lf)      (falls into callee)
//! callee: %i0_x = copy(a0); ...; %r = copy(v); jump(Lk)
//! Lf:     %r = call(%s, 'm', a0); jump(Lk)
//! Lk:     rest
//! ```
//!
//! Callee variables get fresh names in the host ([`Renamer::for_inlining`]),
//! so nothing the callee writes can alias a host variable. Receives become
//! copies from the call operands; returns become a copy into the call's
//! result and a jump to the continuation. Cloned blocks without a handler of
//! their own inherit the call block's rescuer.
//!
//! The guard carries the body's version from the [`CompilationContext`].
//! Once the method is registered again the guard fails and the fallback
//! block makes the original call. Calls in a fallback block are never
//! inlined.
//!
//! Splicing invalidates every cached analysis; the pass then reruns local
//! optimization, liveness and dead code elimination on the host so the
//! spliced code is cleaned up before the next pass sees it.
//!
//! One invocation inlines at most one site. Callees that capture their
//! caller's frame, take or build closures, or leave non-locally are refused.

use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    cfg::{Cfg, EdgeType},
    compiler::{
        events::EventKind,
        passes::{DeadCodeEliminationPass, LiveVariableAnalysisPass, LocalOptimizationPass},
        CompilationContext, CompilerPass,
    },
    ir::{BlockId, CallInstr, Instr, IrScope, Label, Operand, Renamer, Variable},
    Result,
};

/// Passes rerun on the host after a splice.
const AFTER_INLINING: &[&dyn CompilerPass] = &[
    &LocalOptimizationPass,
    &LiveVariableAnalysisPass,
    &DeadCodeEliminationPass,
];

/// Inlines one call to `method_name` per run.
#[derive(Debug, Clone, Default)]
pub struct InlinePass {
    method_name: String,
}

impl InlinePass {
    /// Creates a pass inlining calls to `method_name`.
    #[must_use]
    pub fn new(method_name: impl Into<String>) -> Self {
        InlinePass {
            method_name: method_name.into(),
        }
    }

    /// The target method.
    #[must_use]
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// Returns `true` if `callee` can be spliced into another scope.
    #[must_use]
    pub fn is_inlinable(callee: &IrScope) -> bool {
        let Some(cfg) = callee.cfg() else {
            return false;
        };
        if callee.requires_frame() || callee.requires_binding() {
            return false;
        }
        cfg.blocks().flat_map(|b| b.instrs()).all(|instr| match instr {
            Instr::BuildClosure { .. }
            | Instr::ReceiveClosure { .. }
            | Instr::NonlocalReturn { .. }
            | Instr::Break { .. }
            | Instr::DefineMethod { .. }
            | Instr::RecordEndBlock { .. }
            | Instr::PushFrame
            | Instr::PopFrame
            | Instr::PushBinding
            | Instr::PopBinding => false,
            Instr::Call(call) => call.closure.is_none(),
            _ => true,
        })
    }

    /// Labels of the fallback blocks of earlier splices of the target.
    fn fallbacks(&self, cfg: &Cfg) -> FxHashSet<Label> {
        cfg.blocks()
            .flat_map(|b| b.instrs())
            .filter_map(|instr| match instr {
                Instr::GuardMethodVersion {
                    method, fallback, ..
                } if method.name == self.method_name => Some(fallback.clone()),
                _ => None,
            })
            .collect()
    }

    fn find_site(&self, cfg: &Cfg) -> Option<(BlockId, usize, CallInstr)> {
        let fallbacks = self.fallbacks(cfg);
        cfg.reverse_postorder().into_iter().find_map(|id| {
            let block = cfg.block(id)?;
            if fallbacks.contains(block.label()) {
                return None;
            }
            block
                .instrs()
                .iter()
                .enumerate()
                .find_map(|(index, instr)| match instr {
                    Instr::Call(call)
                        if call.method.name == self.method_name && call.closure.is_none() =>
                    {
                        Some((id, index, call.clone()))
                    }
                    _ => None,
                })
        })
    }
}

/// Rewrites one callee instruction for the host.
fn translate(
    instr: &Instr,
    call: &CallInstr,
    self_temp: &Variable,
    continuation: &Label,
    renamer: &mut Renamer<'_>,
) -> Vec<Instr> {
    let arg = |position: usize| call.args.get(position).cloned().unwrap_or(Operand::Nil);
    match instr {
        Instr::ReceiveSelf { result } => {
            let result = renamer.variable(result);
            if result == *self_temp {
                Vec::new()
            } else {
                vec![Instr::copy(result, self_temp.clone())]
            }
        }
        Instr::ReceiveArg { result, index } => {
            vec![Instr::copy(renamer.variable(result), arg(*index as usize))]
        }
        Instr::ReceiveOptArg {
            result,
            index,
            min_args,
        } => {
            let position = (*min_args + *index) as usize;
            let value = if call.args.len() > position {
                arg(position)
            } else {
                Operand::Nil
            };
            vec![Instr::copy(renamer.variable(result), value)]
        }
        Instr::Return { value } => {
            let mut out = Vec::with_capacity(2);
            if let Some(result) = &call.result {
                out.push(Instr::copy(result.clone(), renamer.operand(value)));
            }
            out.push(Instr::jump(continuation.clone()));
            out
        }
        other => vec![other.clone_for_inlining(renamer)],
    }
}

impl CompilerPass for InlinePass {
    fn name(&self) -> &'static str {
        "Inline"
    }

    fn description(&self) -> &'static str {
        "Inlines the first call to the configured method"
    }

    fn run(&self, scope: &mut IrScope, ctx: &CompilationContext) -> Result<bool> {
        if self.method_name.is_empty() {
            return Ok(false);
        }
        scope.require_cfg(self.name())?;
        let (Some(callee), Some(version)) = (
            ctx.method_body(&self.method_name),
            ctx.method_version(&self.method_name),
        ) else {
            return Ok(false);
        };
        if callee.id() == scope.id() {
            return Ok(false);
        }
        scope.sweep_dead_instructions();
        let Some((site, index, call)) = self.find_site(scope.require_cfg(self.name())?) else {
            return Ok(false);
        };
        if !Self::is_inlinable(&callee) {
            ctx.events()
                .record(EventKind::Warning)
                .scope(scope.id())
                .pass(self.name())
                .message(format!("{} cannot be inlined", self.method_name));
            return Ok(false);
        }
        let callee_cfg = callee.require_cfg(self.name())?;

        let scope_id = scope.id();
        let (cfg, alloc) = scope
            .cfg_and_allocator_mut()
            .ok_or_else(|| malformed_error!("inlining into a scope without a CFG"))?;

        let host_rescuer = cfg.rescuer_for(site);
        let continuation = alloc.new_label();
        let cont = cfg.split_block(site, index + 1, continuation.clone())?;
        let self_temp = alloc.new_temp();
        let fallback_label = alloc.new_label();
        if let Some(block) = cfg.block_mut(site) {
            block.instrs_mut().pop();
            block.push(Instr::copy(self_temp.clone(), call.receiver.clone()));
            block.push(Instr::GuardMethodVersion {
                method: call.method.clone(),
                version,
                receiver: self_temp.clone().into(),
                fallback: fallback_label.clone(),
            });
        }

        // The fallback keeps the dynamic call for when the method is redefined.
        let fallback = cfg.add_block(fallback_label);
        if let Some(block) = cfg.block_mut(fallback) {
            block.push(Instr::Call(CallInstr {
                receiver: self_temp.clone().into(),
                ..call.clone()
            }));
            block.push(Instr::jump(continuation.clone()));
        }
        cfg.add_edge(site, fallback, EdgeType::Regular)?;
        cfg.add_edge(fallback, cont, EdgeType::Regular)?;
        if let Some(rescuer) = host_rescuer {
            cfg.set_rescuer(fallback, rescuer)?;
        }

        let mut renamer = Renamer::for_inlining(alloc);
        renamer.bind(Variable::SelfValue, self_temp.clone());

        let mut blocks: FxHashMap<BlockId, BlockId> = FxHashMap::default();
        for block in callee_cfg.blocks() {
            if callee_cfg.is_sentinel(block.id()) {
                continue;
            }
            let label = renamer.label(block.label());
            blocks.insert(block.id(), cfg.add_block(label));
        }

        for block in callee_cfg.blocks() {
            let Some(&target) = blocks.get(&block.id()) else {
                continue;
            };
            let mut instrs: Vec<Instr> = block
                .instrs()
                .iter()
                .flat_map(|i| translate(i, &call, &self_temp, &continuation, &mut renamer))
                .collect();

            for (succ, ty) in callee_cfg.outgoing(block.id()) {
                if succ == callee_cfg.exit() {
                    match ty {
                        EdgeType::FallThrough => {
                            if let Some(result) = &call.result {
                                instrs.push(Instr::copy(result.clone(), Operand::Nil));
                            }
                            instrs.push(Instr::jump(continuation.clone()));
                            cfg.add_edge(target, cont, EdgeType::Regular)?;
                        }
                        _ if matches!(block.last(), Some(Instr::Return { .. })) => {
                            cfg.add_edge(target, cont, EdgeType::Regular)?;
                        }
                        _ => {
                            let exit = cfg.exit();
                            cfg.add_edge(target, exit, ty)?;
                        }
                    }
                } else if !ty.is_exceptional() {
                    if let Some(&dst) = blocks.get(&succ) {
                        cfg.add_edge(target, dst, ty)?;
                    }
                }
            }
            if let Some(bb) = cfg.block_mut(target) {
                *bb.instrs_mut() = instrs;
            }

            let rescuer = callee_cfg
                .rescuer_for(block.id())
                .and_then(|r| blocks.get(&r).copied())
                .or(host_rescuer);
            if let Some(rescuer) = rescuer {
                cfg.set_rescuer(target, rescuer)?;
            }
        }

        let first = callee_cfg
            .fall_through_successor(callee_cfg.entry())
            .and_then(|id| blocks.get(&id).copied());
        let first = match first {
            Some(first) => first,
            None => {
                // Empty body: the guarded path only produces nil.
                let empty = cfg.add_block(renamer.new_label());
                if let Some(block) = cfg.block_mut(empty) {
                    if let Some(result) = &call.result {
                        block.push(Instr::copy(result.clone(), Operand::Nil));
                    }
                    block.push(Instr::jump(continuation.clone()));
                }
                cfg.add_edge(empty, cont, EdgeType::Regular)?;
                empty
            }
        };
        cfg.add_edge(site, first, EdgeType::FallThrough)?;

        debug!(
            "inlined {} ({} blocks) into {} behind {}",
            self.method_name,
            blocks.len(),
            scope.name(),
            version
        );
        scope.invalidate_analyses();
        ctx.events()
            .record(EventKind::GuardInserted)
            .at(scope_id, index)
            .pass(self.name())
            .message(format!("{} at {version}", call.method));
        ctx.events()
            .record(EventKind::MethodInlined)
            .at(scope_id, index)
            .pass(self.name())
            .message(format!("{} at block {}", self.method_name, site));

        for pass in AFTER_INLINING {
            pass.run(scope, ctx)?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::CompilerConfig,
        dataflow::{LiveVariables, LIVENESS_PROBLEM},
        ir::{ScopeId, ScopeKind, VersionToken},
    };

    fn add_one() -> IrScope {
        let x = Variable::local("x");
        let t = Variable::Temp(0);
        let mut callee = IrScope::new(ScopeId(5), ScopeKind::Method, "add_one");
        callee.add_instr(Instr::ReceiveSelf {
            result: Variable::SelfValue,
        });
        callee.add_instr(Instr::ReceiveArg {
            result: x.clone(),
            index: 0,
        });
        callee.add_instr(Instr::Call(CallInstr::new(
            Some(t.clone()),
            x.into(),
            "+",
            vec![Operand::Fixnum(1)],
        )));
        callee.add_instr(Instr::Return { value: t.into() });
        callee
    }

    fn add_one_call(result: Variable, arg: Operand) -> Instr {
        Instr::Call(CallInstr::new(
            Some(result),
            Operand::Variable(Variable::SelfValue),
            "add_one",
            vec![arg],
        ))
    }

    fn scope_of(instrs: Vec<Instr>) -> IrScope {
        let mut scope = IrScope::new(ScopeId(0), ScopeKind::Method, "host");
        for instr in instrs {
            scope.add_instr(instr);
        }
        scope.compute_scope_flags();
        scope.build_cfg().unwrap();
        scope
    }

    fn host() -> IrScope {
        let x = Variable::local("x");
        scope_of(vec![
            Instr::copy(x.clone(), Operand::Fixnum(10)),
            add_one_call(Variable::Temp(0), Operand::Fixnum(5)),
            Instr::Call(CallInstr::new(
                Some(Variable::Temp(1)),
                x.into(),
                "+",
                vec![Variable::Temp(0).into()],
            )),
            Instr::Return {
                value: Variable::Temp(1).into(),
            },
        ])
    }

    fn first_block(scope: &IrScope) -> BlockId {
        let cfg = scope.cfg().unwrap();
        cfg.fall_through_successor(cfg.entry()).unwrap()
    }

    fn calls_to(scope: &IrScope, name: &str) -> usize {
        scope
            .cfg()
            .unwrap()
            .blocks()
            .flat_map(|b| b.instrs())
            .filter(|i| matches!(i, Instr::Call(c) if c.method.name == name))
            .count()
    }

    fn guard_of(cfg: &Cfg, block: BlockId) -> (VersionToken, Label) {
        match cfg.block(block).unwrap().last() {
            Some(Instr::GuardMethodVersion {
                version, fallback, ..
            }) => (*version, fallback.clone()),
            other => panic!("block {block} ends in {other:?}"),
        }
    }

    fn assert_well_formed(cfg: &Cfg) {
        for id in cfg.block_ids() {
            if id != cfg.exit() {
                assert!(cfg.out_degree(id) > 0, "block {id} has no successor");
            }
            if id != cfg.entry() {
                assert!(cfg.in_degree(id) > 0, "block {id} has no predecessor");
            }
            for (succ, ty) in cfg.outgoing(id) {
                if ty == EdgeType::Exception {
                    assert_eq!(cfg.rescuer_for(id), Some(succ), "block {id}");
                }
            }
        }
    }

    #[test]
    fn test_inline_splices_callee() {
        let ctx = CompilationContext::new(CompilerConfig::disabled());
        ctx.register_method(&add_one()).unwrap();
        let mut scope = host();

        assert!(InlinePass::new("add_one").run(&mut scope, &ctx).unwrap());
        // Only the fallback keeps a dynamic call; the callee's `5 + 1` folds
        assert_eq!(calls_to(&scope, "add_one"), 1);
        assert_eq!(calls_to(&scope, "+"), 1);
        assert!(ctx.events().has(EventKind::MethodInlined));
        assert!(ctx.events().has(EventKind::ConstantFolded));
        assert_well_formed(scope.cfg().unwrap());

        // The callee's `x` is renamed and never aliases the host's `x`
        let cfg = scope.cfg().unwrap();
        let inlined_x = cfg
            .blocks()
            .flat_map(|b| b.instrs())
            .find_map(|i| match i {
                Instr::Copy {
                    result: r @ Variable::Inlined { .. },
                    value: Operand::Fixnum(5),
                } => Some(r.clone()),
                _ => None,
            });
        assert!(inlined_x.is_some());
        let host_x_writes = cfg
            .blocks()
            .flat_map(|b| b.instrs())
            .filter(|i| i.result() == Some(&Variable::local("x")))
            .count();
        assert_eq!(host_x_writes, 1);

        // The return became a copy into the call result
        assert!(cfg
            .blocks()
            .flat_map(|b| b.instrs())
            .any(|i| matches!(i, Instr::Copy { result: Variable::Temp(0), .. })));
    }

    #[test]
    fn test_guard_falls_back_to_the_original_call() {
        let ctx = CompilationContext::new(CompilerConfig::disabled());
        ctx.register_method(&add_one()).unwrap();
        let mut scope = host();
        let site = first_block(&scope);

        assert!(InlinePass::new("add_one").run(&mut scope, &ctx).unwrap());
        assert!(ctx.events().has(EventKind::GuardInserted));
        let cfg = scope.cfg().unwrap();
        let (version, fallback_label) = guard_of(cfg, site);
        assert_eq!(Some(version), ctx.method_version("add_one"));

        let fallback = cfg.block_for(&fallback_label).unwrap();
        assert_eq!(cfg.edge_type(site, fallback), Some(EdgeType::Regular));
        let instrs = cfg.block(fallback).unwrap().instrs();
        assert_eq!(instrs.len(), 2);
        match &instrs[0] {
            Instr::Call(call) => {
                assert_eq!(call.method.name, "add_one");
                assert_eq!(call.result, Some(Variable::Temp(0)));
                assert_eq!(call.args, vec![Operand::Fixnum(5)]);
            }
            other => panic!("fallback starts with {other}"),
        }
        let Some(Instr::Jump { target }) = instrs.last() else {
            panic!("fallback does not jump back");
        };
        let cont = cfg.block_for(target).unwrap();
        assert_eq!(cfg.edge_type(fallback, cont), Some(EdgeType::Regular));

        // Inlined code and fallback meet again at the continuation
        let callee_entry = cfg.fall_through_successor(site).unwrap();
        assert_ne!(callee_entry, fallback);
        assert!(cfg.in_degree(cont) >= 2);
    }

    #[test]
    fn test_redefinition_changes_the_guarded_version() {
        let ctx = CompilationContext::new(CompilerConfig::disabled());
        ctx.register_method(&add_one()).unwrap();
        ctx.register_method(&add_one()).unwrap();
        let mut scope = host();
        let site = first_block(&scope);

        assert!(InlinePass::new("add_one").run(&mut scope, &ctx).unwrap());
        let (version, _) = guard_of(scope.cfg().unwrap(), site);
        assert_eq!(version, VersionToken(1));
    }

    #[test]
    fn test_cleanup_passes_run_after_splicing() {
        let ctx = CompilationContext::new(CompilerConfig::disabled());
        ctx.register_method(&add_one()).unwrap();
        let mut scope = host();

        assert!(InlinePass::new("add_one").run(&mut scope, &ctx).unwrap());
        assert!(scope
            .data_flow_solution::<LiveVariables>(LIVENESS_PROBLEM)
            .is_some());

        // `%i_x = copy(5)` only fed the folded call
        let cfg = scope.cfg().unwrap();
        let (block, index) = cfg
            .blocks()
            .find_map(|b| {
                b.instrs()
                    .iter()
                    .position(|i| {
                        matches!(
                            i,
                            Instr::Copy {
                                result: Variable::Inlined { .. },
                                value: Operand::Fixnum(5)
                            }
                        )
                    })
                    .map(|index| (b.id(), index))
            })
            .unwrap();
        assert!(scope.dead_instructions().is_dead(block, index));
        assert!(ctx.events().has(EventKind::InstructionRemoved));
    }

    #[test]
    fn test_inlining_keeps_protected_definitions_live() {
        // begin; x = 1; risky(); x = 2; t = add_one(5); end; return x
        // rescue: return x
        let x = Variable::local("x");
        let ctx = CompilationContext::new(CompilerConfig::disabled());
        ctx.register_method(&add_one()).unwrap();
        let mut scope = scope_of(vec![
            Instr::ExceptionRegionStart {
                begin: Label::new("Lb"),
                end: Label::new("Le"),
                rescue: Label::new("Lr"),
                ensure: None,
            },
            Instr::copy(x.clone(), Operand::Fixnum(1)),
            Instr::Call(CallInstr::new(
                None,
                Operand::Variable(Variable::SelfValue),
                "risky",
                vec![],
            )),
            Instr::copy(x.clone(), Operand::Fixnum(2)),
            add_one_call(Variable::Temp(0), Operand::Fixnum(5)),
            Instr::ExceptionRegionEnd,
            Instr::Return {
                value: x.clone().into(),
            },
            Instr::Label(Label::new("Lr")),
            Instr::Return { value: x.clone().into() },
        ]);

        assert!(InlinePass::new("add_one").run(&mut scope, &ctx).unwrap());
        let cfg = scope.cfg().unwrap();
        assert_well_formed(cfg);
        let site = cfg.block_for(&Label::new("Lb")).unwrap();
        let rescue = cfg.block_for(&Label::new("Lr")).unwrap();
        assert_eq!(cfg.edge_type(site, rescue), Some(EdgeType::Exception));
        assert_eq!(
            cfg.block(site).unwrap().instrs()[0],
            Instr::copy(x, Operand::Fixnum(1))
        );
        assert!(!scope.dead_instructions().is_dead(site, 0));
    }

    #[test]
    fn test_inline_is_single_shot() {
        let ctx = CompilationContext::new(CompilerConfig::disabled());
        ctx.register_method(&add_one()).unwrap();
        let mut scope = scope_of(vec![
            add_one_call(Variable::Temp(0), Operand::Fixnum(1)),
            add_one_call(Variable::Temp(1), Operand::Fixnum(1)),
            Instr::Return {
                value: Variable::Temp(1).into(),
            },
        ]);

        let pass = InlinePass::new("add_one");
        assert!(pass.run(&mut scope, &ctx).unwrap());
        assert_eq!(ctx.events().count_kind(EventKind::MethodInlined), 1);
        assert!(pass.run(&mut scope, &ctx).unwrap());
        assert_eq!(ctx.events().count_kind(EventKind::MethodInlined), 2);
        // What is left sits behind the two guards
        assert_eq!(calls_to(&scope, "add_one"), 2);
        assert!(!pass.run(&mut scope, &ctx).unwrap());
        assert_well_formed(scope.cfg().unwrap());
    }

    #[test]
    fn test_inlined_blocks_inherit_rescuer() {
        let ctx = CompilationContext::new(CompilerConfig::disabled());
        ctx.register_method(&add_one()).unwrap();
        let mut scope = scope_of(vec![
            Instr::ExceptionRegionStart {
                begin: Label::new("Lb"),
                end: Label::new("Le"),
                rescue: Label::new("Lr"),
                ensure: None,
            },
            add_one_call(Variable::Temp(0), Operand::Fixnum(1)),
            Instr::ExceptionRegionEnd,
            Instr::Return {
                value: Variable::Temp(0).into(),
            },
            Instr::Label(Label::new("Lr")),
            Instr::Return {
                value: Operand::Nil,
            },
        ]);

        assert!(InlinePass::new("add_one").run(&mut scope, &ctx).unwrap());
        let cfg = scope.cfg().unwrap();
        let rescue = cfg.block_for(&Label::new("Lr")).unwrap();
        let site = cfg.block_for(&Label::new("Lb")).unwrap();
        let callee_block = cfg
            .blocks()
            .find(|b| {
                b.instrs()
                    .iter()
                    .any(|i| matches!(i.result(), Some(Variable::Inlined { .. })))
            })
            .unwrap();
        assert_eq!(cfg.rescuer_for(callee_block.id()), Some(rescue));
        assert_eq!(cfg.rescuer_for(site), Some(rescue));
        let (_, fallback) = guard_of(cfg, site);
        assert_eq!(cfg.rescuer_for(cfg.block_for(&fallback).unwrap()), Some(rescue));
        assert_well_formed(cfg);
    }

    #[test]
    fn test_empty_callee_still_gets_a_fallback() {
        let ctx = CompilationContext::new(CompilerConfig::disabled());
        ctx.register_method(&IrScope::new(ScopeId(6), ScopeKind::Method, "noop"))
            .unwrap();
        let mut scope = scope_of(vec![
            Instr::Call(CallInstr::new(
                Some(Variable::Temp(0)),
                Operand::Variable(Variable::SelfValue),
                "noop",
                vec![],
            )),
            Instr::Return {
                value: Variable::Temp(0).into(),
            },
        ]);
        let site = first_block(&scope);

        assert!(InlinePass::new("noop").run(&mut scope, &ctx).unwrap());
        let cfg = scope.cfg().unwrap();
        assert_well_formed(cfg);
        let (_, fallback) = guard_of(cfg, site);
        assert!(cfg.block_for(&fallback).is_some());
        let guarded = cfg.fall_through_successor(site).unwrap();
        assert_eq!(
            cfg.block(guarded).unwrap().instrs()[0],
            Instr::copy(Variable::Temp(0), Operand::Nil)
        );
    }

    #[test]
    fn test_refuses_closure_callee() {
        let ctx = CompilationContext::new(CompilerConfig::disabled());
        let mut callee = IrScope::new(ScopeId(5), ScopeKind::Method, "yielder");
        callee.add_instr(Instr::ReceiveClosure {
            result: Variable::local("blk"),
        });
        callee.add_instr(Instr::Return {
            value: Operand::Nil,
        });
        ctx.register_method(&callee).unwrap();
        assert!(!InlinePass::is_inlinable(&ctx.method_body("yielder").unwrap()));

        let mut scope = scope_of(vec![
            Instr::Call(CallInstr::new(
                None,
                Operand::Variable(Variable::SelfValue),
                "yielder",
                vec![],
            )),
            Instr::Return {
                value: Operand::Nil,
            },
        ]);
        assert!(!InlinePass::new("yielder").run(&mut scope, &ctx).unwrap());
        assert!(ctx.events().has(EventKind::Warning));
    }

    #[test]
    fn test_inlined_scope_linearizes() {
        let ctx = CompilationContext::new(CompilerConfig::disabled());
        ctx.register_method(&add_one()).unwrap();
        let mut scope = host();
        InlinePass::new("add_one").run(&mut scope, &ctx).unwrap();
        crate::compiler::linearize_scope(&mut scope).unwrap();
        assert_well_formed(scope.cfg().unwrap());
        let interpreter = scope.interpreter_context().unwrap();
        for instr in interpreter.instrs() {
            if let Some(target) = instr.branch_target() {
                assert!(interpreter.label_ipc(target).is_some(), "{instr}");
            }
        }
        assert!(interpreter
            .instrs()
            .iter()
            .any(|i| matches!(i, Instr::GuardMethodVersion { .. })));
    }
}
