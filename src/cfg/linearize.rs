//! Block ordering for the interpreter.
//!
//! [`linearize`] picks an order for the blocks of a CFG such that every
//! fall-through edge connects adjacent blocks, inserting or removing jumps
//! where the order forces it. [`InterpreterContext`] flattens that order into
//! one instruction list with label offsets and per-instruction rescue targets.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::{
    cfg::{Cfg, EdgeType},
    ir::{BlockId, DeadInstructions, Instr, Label, ScopeAllocator},
    utils::{
        graph::{algorithms::reverse_postorder, GraphBase},
        BitSet,
    },
    Result,
};

/// Orders the blocks of `cfg` for straight-line emission.
///
/// ENTRY comes first and EXIT last. Blocks are placed depth-first, preferring
/// the fall-through successor, then regular, exception and exit successors.
/// A block whose fall-through predecessor has not been placed yet is
/// deferred to that predecessor. Blocks unreachable from ENTRY are not
/// placed.
///
/// After ordering, a block that falls through to a block other than the next
/// one gets an explicit jump (a conditional branch gets a new one-jump block
/// for this), and a trailing jump to the next block is removed. This includes
/// blocks falling through to EXIT that are not placed last: they jump to
/// EXIT's label, which resolves past the final instruction.
///
/// # Errors
///
/// Returns [`crate::Error::GraphError`] if edge rewiring fails.
pub fn linearize(cfg: &mut Cfg, alloc: &mut ScopeAllocator) -> Result<Vec<BlockId>> {
    let mut order = place_blocks(cfg);
    fix_up_jumps(cfg, alloc, &mut order)?;
    Ok(order)
}

fn place_blocks(cfg: &Cfg) -> Vec<BlockId> {
    let mut placed = BitSet::new(cfg.node_bound());
    let mut order = Vec::with_capacity(cfg.block_count());
    let mut stack = vec![cfg.entry()];
    let exit = cfg.exit();

    while let Some(id) = stack.pop() {
        if placed.contains(id.index()) || id == exit {
            continue;
        }
        if let Some(pred) = cfg.fall_through_predecessor(id) {
            if !placed.contains(pred.index()) && pred != id {
                continue;
            }
        }
        placed.insert(id.index());
        order.push(id);

        // Pushed in reverse priority so the fall-through successor pops first.
        for ty in [
            EdgeType::Exit,
            EdgeType::Exception,
            EdgeType::Regular,
            EdgeType::FallThrough,
        ] {
            let mut succs = cfg.successors_of_type(id, ty);
            succs.reverse();
            for succ in succs {
                if !placed.contains(succ.index()) {
                    stack.push(succ);
                }
            }
        }
    }

    // A fall-through chain whose head is unreachable never releases its
    // tail; place any such reachable block at the end.
    for id in reverse_postorder(cfg, cfg.entry()) {
        if id != exit && !placed.contains(id.index()) {
            placed.insert(id.index());
            order.push(id);
        }
    }

    order.push(exit);
    order
}

fn fix_up_jumps(cfg: &mut Cfg, alloc: &mut ScopeAllocator, order: &mut Vec<BlockId>) -> Result<()> {
    let exit = cfg.exit();
    let mut i = 0;
    while i < order.len() {
        let id = order[i];
        let next = order.get(i + 1).copied();
        if id == exit {
            i += 1;
            continue;
        }

        let next_label = next.and_then(|n| cfg.block(n)).map(|b| b.label().clone());
        let jumps_to_next = match (cfg.block(id).and_then(|b| b.last()), &next_label) {
            (Some(Instr::Jump { target }), Some(label)) => target == label,
            _ => false,
        };
        if let (true, Some(next)) = (jumps_to_next, next) {
            if let Some(block) = cfg.block_mut(id) {
                block.instrs_mut().pop();
            }
            cfg.set_edge_type(id, next, EdgeType::FallThrough);
        }

        let Some(target) = cfg.fall_through_successor(id) else {
            i += 1;
            continue;
        };
        if Some(target) == next {
            i += 1;
            continue;
        }
        let Some(target_label) = cfg.block(target).map(|b| b.label().clone()) else {
            i += 1;
            continue;
        };

        let ends_in_branch = cfg
            .block(id)
            .and_then(|b| b.last())
            .is_some_and(Instr::transfers_control);
        if ends_in_branch {
            let trampoline = cfg.add_block(alloc.new_label());
            if let Some(block) = cfg.block_mut(trampoline) {
                block.push(Instr::jump(target_label));
            }
            cfg.remove_edge(id, target);
            cfg.add_edge(id, trampoline, EdgeType::FallThrough)?;
            cfg.add_edge(trampoline, target, EdgeType::Regular)?;
            order.insert(i + 1, trampoline);
        } else {
            if let Some(block) = cfg.block_mut(id) {
                block.push(Instr::jump(target_label));
            }
            cfg.set_edge_type(id, target, EdgeType::Regular);
        }
        i += 1;
    }
    Ok(())
}

/// The interpreter-ready form of a linearized scope.
///
/// Instruction positions are called IPCs. Branch targets resolve through
/// [`label_ipc`](Self::label_ipc); exceptions raised at an IPC unwind to
/// [`rescue_ipc`](Self::rescue_ipc).
#[derive(Debug, Clone, Default, Serialize)]
pub struct InterpreterContext {
    instrs: Vec<Instr>,
    label_ipcs: FxHashMap<Label, usize>,
    rescue_ipcs: Vec<Option<usize>>,
}

impl InterpreterContext {
    /// Flattens `order`, skipping instructions marked in `dead`.
    #[must_use]
    pub fn build(cfg: &Cfg, order: &[BlockId], dead: &DeadInstructions) -> Self {
        let mut instrs = Vec::new();
        let mut label_ipcs = FxHashMap::default();
        let mut block_rescuers = Vec::new();

        for &id in order {
            let Some(block) = cfg.block(id) else {
                continue;
            };
            label_ipcs.insert(block.label().clone(), instrs.len());
            let rescuer = cfg.rescuer_for(id);
            for (index, instr) in block.instrs().iter().enumerate() {
                if dead.is_dead(id, index) {
                    continue;
                }
                instrs.push(instr.clone());
                block_rescuers.push(rescuer);
            }
        }

        let rescue_ipcs = block_rescuers
            .into_iter()
            .map(|rescuer| {
                rescuer
                    .and_then(|r| cfg.block(r))
                    .and_then(|b| label_ipcs.get(b.label()).copied())
            })
            .collect();

        InterpreterContext {
            instrs,
            label_ipcs,
            rescue_ipcs,
        }
    }

    /// The flat instruction list.
    #[must_use]
    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    /// Returns `true` if there are no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// IPC of the first instruction of the block labelled `label`.
    #[must_use]
    pub fn label_ipc(&self, label: &Label) -> Option<usize> {
        self.label_ipcs.get(label).copied()
    }

    /// IPC of the handler for an exception raised at `ipc`.
    #[must_use]
    pub fn rescue_ipc(&self, ipc: usize) -> Option<usize> {
        self.rescue_ipcs.get(ipc).copied().flatten()
    }

    /// Handler IPC for every instruction, `-1` where nothing catches.
    #[must_use]
    pub fn rescue_map(&self) -> Vec<isize> {
        self.rescue_ipcs
            .iter()
            .map(|r| r.and_then(|ipc| isize::try_from(ipc).ok()).unwrap_or(-1))
            .collect()
    }
}

impl fmt::Display for InterpreterContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut labels: Vec<(&Label, usize)> =
            self.label_ipcs.iter().map(|(l, ipc)| (l, *ipc)).collect();
        labels.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.name().cmp(b.0.name())));
        let mut pending = labels.into_iter().peekable();

        for (ipc, instr) in self.instrs.iter().enumerate() {
            while let Some((label, _)) = pending.next_if(|(_, at)| *at == ipc) {
                writeln!(f, "{label}:")?;
            }
            write!(f, "  {ipc:>4}: {instr}")?;
            if let Some(rescue) = self.rescue_ipc(ipc) {
                write!(f, "  [rescue -> {rescue}]")?;
            }
            writeln!(f)?;
        }
        for (label, _) in pending {
            writeln!(f, "{label}:")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CallInstr, Operand, Variable};

    fn lbl(name: &str) -> Label {
        Label::new(name)
    }

    fn ret(value: Operand) -> Instr {
        Instr::Return { value }
    }

    fn check_fall_throughs(cfg: &Cfg, order: &[BlockId]) {
        for (i, id) in order.iter().enumerate() {
            if let Some(target) = cfg.fall_through_successor(*id) {
                if target != cfg.exit() {
                    assert_eq!(order.get(i + 1), Some(&target), "block {id} falls out of order");
                }
            }
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
        }
    }

    #[test]
    fn test_entry_first_exit_last() {
        let instrs = vec![Instr::copy(Variable::local("a"), Operand::Fixnum(1)), ret(Operand::Nil)];
        let mut alloc = ScopeAllocator::default();
        let mut cfg = Cfg::build(instrs, &mut alloc).unwrap();
        let order = linearize(&mut cfg, &mut alloc).unwrap();
        assert_eq!(order.first(), Some(&cfg.entry()));
        assert_eq!(order.last(), Some(&cfg.exit()));
        assert_eq!(order.len(), 3);
    }

    #[test]
    fn test_loop_fall_throughs_adjacent() {
        // Lhead: b_false(c, Ldone); body; jump Lhead; Ldone: return
        let instrs = vec![
            Instr::Label(lbl("Lhead")),
            Instr::BFalse {
                value: Variable::local("c").into(),
                target: lbl("Ldone"),
            },
            Instr::copy(Variable::local("i"), Operand::Fixnum(2)),
            Instr::jump(lbl("Lhead")),
            Instr::Label(lbl("Ldone")),
            ret(Variable::local("i").into()),
        ];
        let mut alloc = ScopeAllocator::default();
        let mut cfg = Cfg::build(instrs, &mut alloc).unwrap();
        let order = linearize(&mut cfg, &mut alloc).unwrap();
        check_fall_throughs(&cfg, &order);
        assert_well_formed(&cfg);
        assert_eq!(order.len(), cfg.block_count());
    }

    #[test]
    fn test_jump_to_next_block_removed() {
        let instrs = vec![
            Instr::copy(Variable::local("a"), Operand::Fixnum(1)),
            Instr::jump(lbl("Lnext")),
            Instr::Label(lbl("Lnext")),
            ret(Variable::local("a").into()),
        ];
        let mut alloc = ScopeAllocator::default();
        let mut cfg = Cfg::build(instrs, &mut alloc).unwrap();
        let order = linearize(&mut cfg, &mut alloc).unwrap();
        let first = order[1];
        assert_eq!(cfg.block(first).unwrap().len(), 1);
        assert_eq!(
            cfg.edge_type(first, cfg.block_for(&lbl("Lnext")).unwrap()),
            Some(EdgeType::FallThrough)
        );
    }

    #[test]
    fn test_misplaced_fall_through_gets_jump() {
        let mut alloc = ScopeAllocator::default();
        let instrs = vec![
            Instr::copy(Variable::local("a"), Operand::Fixnum(1)),
            Instr::Label(lbl("Lb")),
            ret(Variable::local("a").into()),
        ];
        let mut cfg = Cfg::build(instrs, &mut alloc).unwrap();
        let first = cfg.fall_through_successor(cfg.entry()).unwrap();
        let lb = cfg.block_for(&lbl("Lb")).unwrap();
        // Force a non-adjacent order.
        let mut order = vec![cfg.entry(), first, cfg.exit(), lb];
        fix_up_jumps(&mut cfg, &mut alloc, &mut order).unwrap();
        assert_eq!(cfg.block(first).unwrap().last(), Some(&Instr::jump(lbl("Lb"))));
        assert_eq!(cfg.edge_type(first, lb), Some(EdgeType::Regular));
    }

    /// Follows the path taken when no call raises and no branch is taken.
    fn straight_path(ctx: &InterpreterContext) -> Vec<String> {
        let mut path = Vec::new();
        let mut ipc = 0;
        while let Some(instr) = ctx.instrs().get(ipc) {
            path.push(instr.to_string());
            assert!(path.len() <= ctx.len(), "no exit reached: {path:?}");
            ipc = match instr {
                Instr::Jump { target } => ctx.label_ipc(target).unwrap(),
                other if other.is_scope_exit() => break,
                _ => ipc + 1,
            };
        }
        path
    }

    #[test]
    fn test_fall_through_to_exit_out_of_last_place_jumps() {
        // begin; risky(); end; jump Lend; Lr: return 2; Lend: x = 1
        let instrs = vec![
            Instr::ExceptionRegionStart {
                begin: lbl("Lb"),
                end: lbl("Le"),
                rescue: lbl("Lr"),
                ensure: None,
            },
            Instr::Call(CallInstr::new(
                None,
                Operand::Variable(Variable::SelfValue),
                "risky",
                vec![],
            )),
            Instr::ExceptionRegionEnd,
            Instr::jump(lbl("Lend")),
            Instr::Label(lbl("Lr")),
            ret(Operand::Fixnum(2)),
            Instr::Label(lbl("Lend")),
            Instr::copy(Variable::local("x"), Operand::Fixnum(1)),
        ];
        let mut alloc = ScopeAllocator::default();
        let mut cfg = Cfg::build(instrs, &mut alloc).unwrap();
        let lend = cfg.block_for(&lbl("Lend")).unwrap();
        assert_eq!(cfg.fall_through_successor(lend), Some(cfg.exit()));

        let order = linearize(&mut cfg, &mut alloc).unwrap();
        check_fall_throughs(&cfg, &order);
        assert_well_formed(&cfg);
        let lend_at = order.iter().position(|&id| id == lend).unwrap();
        assert_ne!(order[lend_at + 1], cfg.exit());
        assert_eq!(
            cfg.block(lend).unwrap().last(),
            Some(&Instr::jump(lbl("_EXIT")))
        );
        assert_eq!(cfg.edge_type(lend, cfg.exit()), Some(EdgeType::Regular));

        let ctx = InterpreterContext::build(&cfg, &order, &DeadInstructions::default());
        assert_eq!(ctx.label_ipc(&lbl("_EXIT")), Some(ctx.len()));
        let path = straight_path(&ctx);
        assert_eq!(
            path,
            vec!["call(%self, 'risky')", "x = copy(1)", "jump(_EXIT)"]
        );
    }

    #[test]
    fn test_interpreter_context_offsets_and_rescue() {
        let call = Instr::Call(CallInstr::new(
            Some(Variable::Temp(0)),
            Operand::Variable(Variable::SelfValue),
            "work",
            vec![],
        ));
        let instrs = vec![
            Instr::ExceptionRegionStart {
                begin: lbl("Lb"),
                end: lbl("Le"),
                rescue: lbl("Lr"),
                ensure: None,
            },
            call,
            Instr::ExceptionRegionEnd,
            ret(Variable::Temp(0).into()),
            Instr::Label(lbl("Lr")),
            Instr::ReceiveException {
                result: Variable::Temp(1),
            },
            ret(Operand::Nil),
        ];
        let mut alloc = ScopeAllocator::default();
        let mut cfg = Cfg::build(instrs, &mut alloc).unwrap();
        let order = linearize(&mut cfg, &mut alloc).unwrap();
        let ctx = InterpreterContext::build(&cfg, &order, &DeadInstructions::default());

        assert_eq!(ctx.len(), 4);
        assert_eq!(ctx.label_ipc(&lbl("Lb")), Some(0));
        let rescue = ctx.label_ipc(&lbl("Lr")).unwrap();
        assert!(matches!(ctx.instrs()[rescue], Instr::ReceiveException { .. }));
        assert_eq!(ctx.rescue_ipc(0), Some(rescue));
        assert_eq!(ctx.rescue_ipc(rescue), None);
        let map = ctx.rescue_map();
        assert_eq!(map.len(), ctx.len());
        assert_eq!(map[0], rescue as isize);
        assert_eq!(map[rescue], -1);
        assert!(ctx.to_string().contains("[rescue -> "));
    }

    #[test]
    fn test_dead_instructions_skipped() {
        let instrs = vec![
            Instr::copy(Variable::local("a"), Operand::Fixnum(1)),
            Instr::copy(Variable::local("b"), Operand::Fixnum(2)),
            ret(Variable::local("b").into()),
        ];
        let mut alloc = ScopeAllocator::default();
        let mut cfg = Cfg::build(instrs, &mut alloc).unwrap();
        let order = linearize(&mut cfg, &mut alloc).unwrap();
        let mut dead = DeadInstructions::default();
        dead.mark(order[1], 0);
        let ctx = InterpreterContext::build(&cfg, &order, &dead);
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.label_ipc(&lbl("_EXIT")), Some(2));
    }
}
