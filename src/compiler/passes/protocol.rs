//! Call protocol placement.
//!
//! A scope that needs a heap binding or a call frame gets explicit push and
//! pop instructions:
//!
//! ```text
//! ENTRY -> [push_frame; push_binding; ...body...]
//!          ...; pop_binding; pop_frame; return(v)
//! GEB:     %v = receive_exception; pop_binding; pop_frame; throw(%v)
//! ```
//!
//! Pushes go at the start of ENTRY's successor, or into a fresh block in
//! front of it when that block is a loop header. Pops go before every
//! `return`. Exits that raise (`throw`, `break`, non-local return) unwind
//! through the global ensure block (GEB), which pops and rethrows.

use crate::{
    cfg::{Cfg, EdgeType},
    compiler::{events::EventKind, CompilationContext, CompilerPass},
    ir::{Instr, IrScope, Label, ScopeAllocator},
    Result,
};

/// Inserts frame and binding push/pop instructions.
#[derive(Debug, Default, Clone, Copy)]
pub struct AddCallProtocolPass;

fn already_placed(cfg: &Cfg) -> bool {
    cfg.blocks().any(|b| {
        b.instrs()
            .iter()
            .any(|i| matches!(i, Instr::PushFrame | Instr::PushBinding))
    })
}

/// Returns the block receiving the pushes, creating it if needed.
fn prologue_block(cfg: &mut Cfg, alloc: &mut ScopeAllocator) -> Result<Option<Label>> {
    let entry = cfg.entry();
    let Some(first) = cfg.fall_through_successor(entry) else {
        return Ok(None);
    };
    if first == cfg.exit() {
        return Ok(None);
    }
    if cfg.in_degree(first) == 1 {
        return Ok(cfg.block(first).map(|b| b.label().clone()));
    }

    let label = alloc.new_label();
    let prologue = cfg.add_block(label.clone());
    cfg.remove_edge(entry, first);
    cfg.add_edge(entry, prologue, EdgeType::FallThrough)?;
    cfg.add_edge(prologue, first, EdgeType::FallThrough)?;
    Ok(Some(label))
}

impl CompilerPass for AddCallProtocolPass {
    fn name(&self) -> &'static str {
        "AddCallProtocol"
    }

    fn description(&self) -> &'static str {
        "Pushes and pops the call frame and heap binding"
    }

    fn run(&self, scope: &mut IrScope, ctx: &CompilationContext) -> Result<bool> {
        scope.require_cfg(self.name())?;
        let binding = scope.requires_binding();
        let frame = scope.requires_frame();
        if !binding && !frame {
            return Ok(false);
        }
        if already_placed(scope.require_cfg(self.name())?) {
            return Ok(false);
        }
        scope.sweep_dead_instructions();

        let mut pushes = Vec::new();
        let mut pops = Vec::new();
        if frame {
            pushes.push(Instr::PushFrame);
        }
        if binding {
            pushes.push(Instr::PushBinding);
            pops.push(Instr::PopBinding);
        }
        if frame {
            pops.push(Instr::PopFrame);
        }

        let scope_id = scope.id();
        let exc = scope.new_temp();
        let geb_label = scope.new_label();
        let (cfg, alloc) = scope
            .cfg_and_allocator_mut()
            .ok_or_else(|| malformed_error!("call protocol placement without a CFG"))?;

        let Some(prologue) = prologue_block(cfg, alloc)? else {
            return Ok(false);
        };
        if let Some(block) = cfg.block_for(&prologue).and_then(|id| cfg.block_mut(id)) {
            block.instrs_mut().splice(0..0, pushes.iter().cloned());
        }

        let mut returns = 0;
        for id in cfg.block_ids() {
            let Some(block) = cfg.block_mut(id) else {
                continue;
            };
            let old = std::mem::take(block.instrs_mut());
            let mut out = Vec::with_capacity(old.len() + pops.len());
            for instr in old {
                if matches!(instr, Instr::Return { .. }) {
                    out.extend(pops.iter().cloned());
                    returns += 1;
                }
                out.push(instr);
            }
            *block.instrs_mut() = out;
        }

        let needs_geb = cfg.global_ensure_block().is_none()
            && cfg.blocks().any(|b| {
                !cfg.is_sentinel(b.id())
                    && cfg.rescuer_for(b.id()).is_none()
                    && b.can_raise_exception()
            });
        if needs_geb {
            let mut handler = vec![Instr::ReceiveException {
                result: exc.clone(),
            }];
            handler.extend(pops.iter().cloned());
            handler.push(Instr::Throw { value: exc.into() });
            cfg.add_global_ensure_block(geb_label, handler)?;
        }

        scope.invalidate_analyses();
        ctx.events()
            .record(EventKind::FrameInstrInserted)
            .scope(scope_id)
            .pass(self.name())
            .message(format!(
                "{} pushes in {}, pops before {} returns{}",
                pushes.len(),
                prologue,
                returns,
                if needs_geb { ", global ensure block" } else { "" }
            ));
        Ok(true)
    }
}
