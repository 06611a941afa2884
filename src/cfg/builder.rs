//! CFG construction from a flat instruction list.

use rustc_hash::FxHashMap;

use crate::{
    cfg::{Cfg, EdgeType},
    ir::{BlockId, Instr, Label, ScopeAllocator, Variable},
    Result,
};

/// An exception region that is open while scanning.
struct OpenRegion {
    end: Label,
    rescue: Label,
    ensure: Option<Label>,
}

/// Scan state: the block receiving instructions and the pending edges that
/// can only be resolved once every label has a block.
struct CfgBuilder<'a> {
    cfg: Cfg,
    alloc: &'a mut ScopeAllocator,
    current: Option<BlockId>,
    falls_into_next: Option<BlockId>,
    first: Option<BlockId>,
    regions: Vec<OpenRegion>,
    branches: Vec<(BlockId, Label)>,
    protected: Vec<(BlockId, Label, Option<Label>)>,
}

impl<'a> CfgBuilder<'a> {
    fn new(alloc: &'a mut ScopeAllocator) -> Self {
        CfgBuilder {
            cfg: Cfg::with_sentinels(),
            alloc,
            current: None,
            falls_into_next: None,
            first: None,
            regions: Vec::new(),
            branches: Vec::new(),
            protected: Vec::new(),
        }
    }

    /// Closes the current block, which flows into whatever comes next.
    fn close_falling_through(&mut self) {
        if let Some(current) = self.current.take() {
            self.falls_into_next = Some(current);
        }
    }

    fn start_block(&mut self, label: Label) -> Result<BlockId> {
        if self.cfg.block_for(&label).is_some() {
            return Err(malformed_error!("label {} defines more than one block", label));
        }
        let id = self.cfg.create_block(label);
        if let Some(prev) = self.falls_into_next.take() {
            self.cfg.add_edge(prev, id, EdgeType::FallThrough)?;
        }
        if self.first.is_none() {
            self.first = Some(id);
        }
        if let Some(region) = self.regions.last() {
            self.protected
                .push((id, region.rescue.clone(), region.ensure.clone()));
        }
        self.current = Some(id);
        Ok(id)
    }

    fn scan(&mut self, instrs: Vec<Instr>) -> Result<()> {
        for instr in instrs {
            match instr {
                Instr::Label(label) => {
                    self.close_falling_through();
                    self.start_block(label)?;
                }
                Instr::ExceptionRegionStart {
                    begin,
                    end,
                    rescue,
                    ensure,
                } => {
                    self.close_falling_through();
                    self.regions.push(OpenRegion {
                        end,
                        rescue,
                        ensure,
                    });
                    self.start_block(begin)?;
                }
                Instr::ExceptionRegionEnd => {
                    let region = self
                        .regions
                        .pop()
                        .ok_or_else(|| malformed_error!("exception region end without a start"))?;
                    self.close_falling_through();
                    self.start_block(region.end)?;
                }
                other => self.append(other)?,
            }
        }
        Ok(())
    }

    fn append(&mut self, instr: Instr) -> Result<()> {
        if let Instr::Copy {
            result: Variable::SelfValue,
            ..
        } = &instr
        {
            return Err(malformed_error!("assignment to self: {}", instr));
        }

        let block = match self.current {
            Some(block) => block,
            None => {
                let label = self.alloc.new_label();
                self.start_block(label)?
            }
        };

        let transfers = instr.transfers_control();
        let unconditional = instr.is_unconditional_transfer();
        let exits = instr.is_scope_exit();
        let target = instr.branch_target().cloned();
        if let Some(bb) = self.cfg.block_mut(block) {
            bb.push(instr);
        }

        if transfers {
            self.current = None;
            if !unconditional {
                self.falls_into_next = Some(block);
            }
            if let Some(target) = target {
                self.branches.push((block, target));
            }
            if exits {
                let exit = self.cfg.exit();
                self.cfg.add_edge(block, exit, EdgeType::Exit)?;
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Cfg> {
        if let Some(region) = self.regions.last() {
            return Err(malformed_error!(
                "exception region ending at {} is never closed",
                region.end
            ));
        }

        let (entry, exit) = (self.cfg.entry(), self.cfg.exit());
        if let Some(last) = self.current.take().or(self.falls_into_next.take()) {
            self.cfg.add_edge(last, exit, EdgeType::FallThrough)?;
        }
        if let Some(first) = self.first {
            self.cfg.add_edge(entry, first, EdgeType::FallThrough)?;
        }
        self.cfg.add_edge(entry, exit, EdgeType::Exit)?;

        for (block, label) in std::mem::take(&mut self.branches) {
            let target = self
                .cfg
                .block_for(&label)
                .ok_or_else(|| malformed_error!("branch target {} has no basic block", label))?;
            self.cfg.add_edge(block, target, EdgeType::Regular)?;
        }

        let mut ensurers = FxHashMap::default();
        for (block, rescue, ensure) in std::mem::take(&mut self.protected) {
            let rescuer = self
                .cfg
                .block_for(&rescue)
                .ok_or_else(|| malformed_error!("rescue label {} has no basic block", rescue))?;
            self.cfg.set_rescuer(block, rescuer)?;
            if let Some(ensure) = ensure {
                let ensurer = self
                    .cfg
                    .block_for(&ensure)
                    .ok_or_else(|| malformed_error!("ensure label {} has no basic block", ensure))?;
                ensurers.insert(block, ensurer);
            }
        }
        self.cfg.ensurers = ensurers;

        Ok(self.cfg)
    }
}

impl Cfg {
    /// Builds a CFG from a flat instruction list.
    ///
    /// Blocks start at every label and after every control transfer. Labels
    /// become block labels and are not kept as instructions, nor are
    /// exception region markers: blocks inside a region instead get an
    /// exception edge to the region's rescue block. Blocks created without a
    /// source label get a fresh one from `alloc`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] when a branch or region names a
    /// label that never appears, when a label is defined twice, when region
    /// markers are unbalanced, or on an assignment to `self`.
    pub fn build(instrs: Vec<Instr>, alloc: &mut ScopeAllocator) -> Result<Cfg> {
        let mut builder = CfgBuilder::new(alloc);
        builder.scan(instrs)?;
        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Operand;

    fn local(name: &str) -> Variable {
        Variable::local(name)
    }

    fn lbl(name: &str) -> Label {
        Label::new(name)
    }

    #[test]
    fn test_empty_scope() {
        let cfg = Cfg::build(Vec::new(), &mut ScopeAllocator::default()).unwrap();
        assert_eq!(cfg.block_count(), 2);
        assert_eq!(cfg.edge_type(cfg.entry(), cfg.exit()), Some(EdgeType::Exit));
    }

    #[test]
    fn test_conditional_branch_edges() {
        // a = 1; b_true(a, L1); b = 2; Ljoin: return a
        let instrs = vec![
            Instr::copy(local("a"), Operand::Fixnum(1)),
            Instr::BTrue {
                value: local("a").into(),
                target: lbl("Ljoin"),
            },
            Instr::copy(local("b"), Operand::Fixnum(2)),
            Instr::Label(lbl("Ljoin")),
            Instr::Return {
                value: local("a").into(),
            },
        ];
        let cfg = Cfg::build(instrs, &mut ScopeAllocator::default()).unwrap();
        assert_eq!(cfg.block_count(), 5);

        let first = cfg.fall_through_successor(cfg.entry()).unwrap();
        let l1 = cfg.block_for(&lbl("Ljoin")).unwrap();
        assert_eq!(cfg.edge_type(first, l1), Some(EdgeType::Regular));
        let middle = cfg.fall_through_successor(first).unwrap();
        assert_eq!(cfg.edge_type(middle, l1), Some(EdgeType::FallThrough));
        assert_eq!(cfg.edge_type(l1, cfg.exit()), Some(EdgeType::Exit));
    }

    #[test]
    fn test_branch_to_next_block_keeps_fall_through() {
        let instrs = vec![
            Instr::BNil {
                value: local("x").into(),
                target: lbl("Ljoin"),
            },
            Instr::Label(lbl("Ljoin")),
            Instr::Return {
                value: Operand::Nil,
            },
        ];
        let cfg = Cfg::build(instrs, &mut ScopeAllocator::default()).unwrap();
        let first = cfg.fall_through_successor(cfg.entry()).unwrap();
        let l1 = cfg.block_for(&lbl("Ljoin")).unwrap();
        assert_eq!(cfg.edge_type(first, l1), Some(EdgeType::FallThrough));
        assert_eq!(cfg.out_degree(first), 1);
    }

    #[test]
    fn test_missing_label_is_malformed() {
        let instrs = vec![Instr::jump(lbl("nowhere"))];
        let err = Cfg::build(instrs, &mut ScopeAllocator::default()).unwrap_err();
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn test_unbalanced_region_end() {
        let instrs = vec![Instr::ExceptionRegionEnd];
        assert!(Cfg::build(instrs, &mut ScopeAllocator::default()).is_err());
    }

    #[test]
    fn test_self_assignment_rejected() {
        let instrs = vec![Instr::copy(Variable::SelfValue, Operand::Nil)];
        assert!(Cfg::build(instrs, &mut ScopeAllocator::default()).is_err());
    }

    #[test]
    fn test_exception_region() {
        // begin; call foo; end; jump done; rescue: t = recv_exc; done: return nil
        let instrs = vec![
            Instr::ExceptionRegionStart {
                begin: lbl("Lbegin"),
                end: lbl("Lend"),
                rescue: lbl("Lrescue"),
                ensure: None,
            },
            Instr::Call(crate::ir::CallInstr::new(
                None,
                Operand::Variable(Variable::SelfValue),
                "foo",
                vec![],
            )),
            Instr::ExceptionRegionEnd,
            Instr::jump(lbl("Ldone")),
            Instr::Label(lbl("Lrescue")),
            Instr::ReceiveException {
                result: Variable::Temp(0),
            },
            Instr::Label(lbl("Ldone")),
            Instr::Return {
                value: Operand::Nil,
            },
        ];
        let cfg = Cfg::build(instrs, &mut ScopeAllocator::default()).unwrap();
        let begin = cfg.block_for(&lbl("Lbegin")).unwrap();
        let rescue = cfg.block_for(&lbl("Lrescue")).unwrap();
        let end = cfg.block_for(&lbl("Lend")).unwrap();

        assert_eq!(cfg.rescuer_for(begin), Some(rescue));
        assert_eq!(cfg.edge_type(begin, rescue), Some(EdgeType::Exception));
        assert!(cfg.block(rescue).unwrap().is_rescue_entry());
        assert_eq!(cfg.rescuer_for(end), None);
        assert_eq!(cfg.edge_type(begin, end), Some(EdgeType::FallThrough));
    }

    #[test]
    fn test_unreachable_code_gets_fresh_block() {
        let instrs = vec![
            Instr::Return {
                value: Operand::Nil,
            },
            Instr::copy(local("dead"), Operand::Fixnum(0)),
        ];
        let mut alloc = ScopeAllocator::default();
        let cfg = Cfg::build(instrs, &mut alloc).unwrap();
        assert_eq!(cfg.block_count(), 4);
        let orphan = cfg
            .block_ids()
            .into_iter()
            .find(|id| !cfg.is_sentinel(*id) && cfg.in_degree(*id) == 0)
            .unwrap();
        assert_eq!(cfg.edge_type(orphan, cfg.exit()), Some(EdgeType::FallThrough));
    }
}
