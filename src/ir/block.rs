//! Basic blocks.

use std::fmt;

use serde::Serialize;

use crate::{
    ir::{Instr, Label},
    utils::graph::NodeId,
};

/// Identifier of a basic block; the vertex id in the owning CFG.
pub type BlockId = NodeId;

/// A maximal straight-line instruction sequence.
///
/// Only the last instruction may transfer control. Label markers are not
/// stored: the block's own [`label`](BasicBlock::label) is what branches
/// target.
#[derive(Debug, Clone, Serialize)]
pub struct BasicBlock {
    id: BlockId,
    label: Label,
    instrs: Vec<Instr>,
    rescue_entry: bool,
}

impl BasicBlock {
    /// Creates an empty block.
    #[must_use]
    pub fn new(id: BlockId, label: Label) -> Self {
        BasicBlock {
            id,
            label,
            instrs: Vec::new(),
            rescue_entry: false,
        }
    }

    /// Block id.
    #[must_use]
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Block label.
    #[must_use]
    pub fn label(&self) -> &Label {
        &self.label
    }

    pub(crate) fn set_label(&mut self, label: Label) {
        self.label = label;
    }

    /// Instructions in execution order.
    #[must_use]
    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    /// Mutable instruction list.
    pub fn instrs_mut(&mut self) -> &mut Vec<Instr> {
        &mut self.instrs
    }

    /// Appends an instruction.
    pub fn push(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    /// Returns `true` if the block holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// The last instruction, if any.
    #[must_use]
    pub fn last(&self) -> Option<&Instr> {
        self.instrs.last()
    }

    /// Returns `true` if any instruction in the block may raise.
    #[must_use]
    pub fn can_raise_exception(&self) -> bool {
        self.instrs.iter().any(Instr::can_raise_exception)
    }

    /// Returns `true` if this block starts a rescue handler.
    #[must_use]
    pub fn is_rescue_entry(&self) -> bool {
        self.rescue_entry
    }

    pub(crate) fn mark_rescue_entry(&mut self) {
        self.rescue_entry = true;
    }

    /// Detaches and returns the instructions from `at` onward.
    pub fn split_off(&mut self, at: usize) -> Vec<Instr> {
        self.instrs.split_off(at.min(self.instrs.len()))
    }

    /// Appends `other`'s instructions to this block.
    pub fn absorb(&mut self, other: BasicBlock) {
        self.instrs.extend(other.instrs);
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BB [{}:{}]", self.id, self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Operand, Variable};

    #[test]
    fn test_split_and_absorb() {
        let mut block = BasicBlock::new(NodeId::new(1), Label::new("L1"));
        for i in 0..4 {
            block.push(Instr::copy(Variable::Temp(i), Operand::Fixnum(i64::from(i))));
        }
        let tail = block.split_off(1);
        assert_eq!(block.len(), 1);
        assert_eq!(tail.len(), 3);

        let mut other = BasicBlock::new(NodeId::new(2), Label::new("L2"));
        other.instrs_mut().extend(tail);
        block.absorb(other);
        assert_eq!(block.len(), 4);
        assert_eq!(block.to_string(), "BB [1:L1]");
    }

    #[test]
    fn test_can_raise() {
        let mut block = BasicBlock::new(NodeId::new(0), Label::new("L0"));
        block.push(Instr::copy(Variable::Temp(0), Operand::Nil));
        assert!(!block.can_raise_exception());
        block.push(Instr::Throw {
            value: Operand::Variable(Variable::Temp(0)),
        });
        assert!(block.can_raise_exception());
    }
}
