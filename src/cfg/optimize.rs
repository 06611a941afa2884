//! Structural clean-up of a built CFG.

use log::debug;

use crate::{
    cfg::{Cfg, EdgeType},
    ir::{BlockId, Instr},
    Result,
};

impl Cfg {
    /// Simplifies the graph in place.
    ///
    /// 1. Exception edges leaving blocks that cannot raise are removed.
    /// 2. Blocks with no predecessors, other than ENTRY, are removed until
    ///    none remain.
    /// 3. A block `a` whose only successor is `b` absorbs `b` when `b` has
    ///    no other predecessor, the edge is not an exception edge, `b` is
    ///    neither EXIT nor a rescue entry, and both blocks share a rescuer
    ///    (or one of them is empty). A trailing jump from `a` to `b` is
    ///    dropped.
    ///
    /// Returns `true` if anything changed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::GraphError`] if edge rewiring fails.
    pub fn optimize(&mut self) -> Result<bool> {
        let pruned = self.prune_exception_edges();
        let removed = self.remove_orphans();
        let mut merged = 0;
        while let Some((a, b)) = self.find_mergeable_pair() {
            self.merge_blocks(a, b)?;
            merged += 1;
        }
        debug!(
            "cfg optimize: {} exception edges pruned, {} orphans removed, {} blocks merged",
            pruned, removed, merged
        );
        Ok(pruned + removed + merged > 0)
    }

    fn prune_exception_edges(&mut self) -> usize {
        let mut doomed = Vec::new();
        for block in self.blocks() {
            if block.can_raise_exception() {
                continue;
            }
            for (dst, ty) in self.outgoing(block.id()) {
                if ty == EdgeType::Exception {
                    doomed.push((block.id(), dst));
                }
            }
        }
        for (src, dst) in &doomed {
            self.remove_edge(*src, *dst);
            if self.rescuers.get(src) == Some(dst) {
                self.rescuers.remove(src);
            }
        }
        doomed.len()
    }

    fn remove_orphans(&mut self) -> usize {
        let mut removed = 0;
        loop {
            let orphans: Vec<BlockId> = self
                .block_ids()
                .into_iter()
                .filter(|id| *id != self.entry && *id != self.exit && self.in_degree(*id) == 0)
                .collect();
            if orphans.is_empty() {
                return removed;
            }
            for id in orphans {
                self.remove_vertex_for(id);
                removed += 1;
            }
        }
    }

    fn find_mergeable_pair(&self) -> Option<(BlockId, BlockId)> {
        self.block_ids().into_iter().find_map(|a| {
            if a == self.entry || self.out_degree(a) != 1 {
                return None;
            }
            let (b, ty) = self.outgoing(a).next()?;
            if b == a || b == self.exit || ty == EdgeType::Exception || self.in_degree(b) != 1 {
                return None;
            }
            let (block_a, block_b) = (self.block(a)?, self.block(b)?);
            if block_b.is_rescue_entry() {
                return None;
            }
            let compatible = self.rescuer_for(a) == self.rescuer_for(b)
                || block_a.is_empty()
                || block_b.is_empty();
            compatible.then_some((a, b))
        })
    }

    fn merge_blocks(&mut self, a: BlockId, b: BlockId) -> Result<()> {
        let b_label = match self.block(b) {
            Some(block) => block.label().clone(),
            None => return Ok(()),
        };
        let outgoing: Vec<(BlockId, EdgeType)> = self.outgoing(b).collect();
        self.remove_edge(a, b);

        if let Some(block) = self.block_mut(a) {
            if matches!(block.last(), Some(Instr::Jump { target }) if *target == b_label) {
                block.instrs_mut().pop();
            }
        }
        let a_was_empty = self.block(a).is_some_and(|blk| blk.is_empty());

        let b_rescuer = self.rescuers.get(&b).copied();
        let b_ensurer = self.ensurers.get(&b).copied();
        let Some(b_block) = self.graph.remove_node(b) else {
            return Ok(());
        };
        self.labels.remove(&b_label);
        self.rescuers.remove(&b);
        self.ensurers.remove(&b);

        if let Some(block) = self.block_mut(a) {
            block.absorb(b_block);
        }
        if a_was_empty {
            match b_rescuer {
                Some(r) => self.rescuers.insert(a, r),
                None => self.rescuers.remove(&a),
            };
            match b_ensurer {
                Some(e) => self.ensurers.insert(a, e),
                None => self.ensurers.remove(&a),
            };
            if b_rescuer.is_none() {
                let stale: Vec<BlockId> = self
                    .outgoing(a)
                    .filter(|(_, ty)| *ty == EdgeType::Exception)
                    .map(|(dst, _)| dst)
                    .collect();
                for dst in stale {
                    self.remove_edge(a, dst);
                }
            }
        }
        for (dst, ty) in outgoing {
            let dst = if dst == b { a } else { dst };
            self.add_edge(a, dst, ty)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        cfg::{Cfg, EdgeType},
        ir::{CallInstr, Instr, Label, Operand, ScopeAllocator, Variable},
    };

    fn lbl(name: &str) -> Label {
        Label::new(name)
    }

    fn well_formed(cfg: &Cfg) {
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
    fn test_straight_jumps_merge() {
        // a = 1; jump Lmid; Lmid: b = 2; jump Llast; Llast: return b
        let instrs = vec![
            Instr::copy(Variable::local("a"), Operand::Fixnum(1)),
            Instr::jump(lbl("Lmid")),
            Instr::Label(lbl("Lmid")),
            Instr::copy(Variable::local("b"), Operand::Fixnum(2)),
            Instr::jump(lbl("Llast")),
            Instr::Label(lbl("Llast")),
            Instr::Return {
                value: Variable::local("b").into(),
            },
        ];
        let mut cfg = Cfg::build(instrs, &mut ScopeAllocator::default()).unwrap();
        assert_eq!(cfg.block_count(), 5);
        assert!(cfg.optimize().unwrap());
        assert_eq!(cfg.block_count(), 3);

        let body = cfg.fall_through_successor(cfg.entry()).unwrap();
        let block = cfg.block(body).unwrap();
        assert_eq!(block.len(), 3);
        assert!(block
            .instrs()
            .iter()
            .all(|i| !matches!(i, Instr::Jump { .. })));
        assert_eq!(cfg.edge_type(body, cfg.exit()), Some(EdgeType::Exit));
        well_formed(&cfg);
    }

    #[test]
    fn test_orphans_removed_to_fixed_point() {
        let instrs = vec![
            Instr::Return {
                value: Operand::Nil,
            },
            Instr::copy(Variable::local("x"), Operand::Fixnum(1)),
            Instr::jump(lbl("Lnext")),
            Instr::Label(lbl("Lnext")),
            Instr::Return {
                value: Operand::Nil,
            },
        ];
        let mut cfg = Cfg::build(instrs, &mut ScopeAllocator::default()).unwrap();
        cfg.optimize().unwrap();
        assert!(cfg.block_for(&lbl("Lnext")).is_none());
        assert_eq!(cfg.block_count(), 3);
        well_formed(&cfg);
    }

    #[test]
    fn test_exception_edges_pruned_when_nothing_raises() {
        let instrs = vec![
            Instr::ExceptionRegionStart {
                begin: lbl("Lb"),
                end: lbl("Le"),
                rescue: lbl("Lr"),
                ensure: None,
            },
            Instr::copy(Variable::local("x"), Operand::Fixnum(1)),
            Instr::ExceptionRegionEnd,
            Instr::Return {
                value: Operand::Nil,
            },
            Instr::Label(lbl("Lr")),
            Instr::ReceiveException {
                result: Variable::Temp(0),
            },
            Instr::Return {
                value: Operand::Nil,
            },
        ];
        let mut cfg = Cfg::build(instrs, &mut ScopeAllocator::default()).unwrap();
        assert!(cfg.block_for(&lbl("Lr")).is_some());
        cfg.optimize().unwrap();
        assert!(cfg.block_for(&lbl("Lr")).is_none());
        well_formed(&cfg);
    }

    #[test]
    fn test_rescue_entry_not_merged() {
        let call = Instr::Call(CallInstr::new(
            None,
            Operand::Variable(Variable::SelfValue),
            "risky",
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
            Instr::Return {
                value: Operand::Nil,
            },
            Instr::Label(lbl("Lr")),
            Instr::ReceiveException {
                result: Variable::Temp(0),
            },
            Instr::Return {
                value: Operand::Nil,
            },
        ];
        let mut cfg = Cfg::build(instrs, &mut ScopeAllocator::default()).unwrap();
        cfg.optimize().unwrap();
        let rescue = cfg.block_for(&lbl("Lr")).unwrap();
        assert!(cfg.block(rescue).unwrap().is_rescue_entry());
        assert_eq!(cfg.predecessors_of_type(rescue, EdgeType::Exception).len(), 1);
        well_formed(&cfg);
    }
}
