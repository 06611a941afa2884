//! Variable and label renaming for cloned instructions.

use rustc_hash::FxHashMap;

use crate::ir::{Label, Operand, ScopeAllocator, Variable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenameMode {
    /// Every callee variable gets a fresh name in the host scope.
    Inline { prefix: u32 },
    /// Locals keep their identity; temporaries and labels are fresh.
    CloneClosure,
}

/// Renaming context shared by all instructions cloned in one operation.
///
/// The first time a variable or label is seen a fresh name is drawn from the
/// host scope's [`ScopeAllocator`]; every later occurrence maps to the same
/// name. Explicit bindings made with [`Renamer::bind`] take precedence.
pub struct Renamer<'a> {
    alloc: &'a mut ScopeAllocator,
    mode: RenameMode,
    variables: FxHashMap<Variable, Variable>,
    labels: FxHashMap<Label, Label>,
}

impl<'a> Renamer<'a> {
    /// Renamer for splicing a callee body into a host scope.
    pub fn for_inlining(alloc: &'a mut ScopeAllocator) -> Self {
        let prefix = alloc.new_inline_prefix();
        Renamer {
            alloc,
            mode: RenameMode::Inline { prefix },
            variables: FxHashMap::default(),
            labels: FxHashMap::default(),
        }
    }

    /// Renamer for duplicating a closure body within the same lexical context.
    pub fn for_closure_clone(alloc: &'a mut ScopeAllocator) -> Self {
        Renamer {
            alloc,
            mode: RenameMode::CloneClosure,
            variables: FxHashMap::default(),
            labels: FxHashMap::default(),
        }
    }

    /// Forces `from` to be renamed to `to`.
    pub fn bind(&mut self, from: Variable, to: Variable) {
        self.variables.insert(from, to);
    }

    /// Returns the host-side name for `var`, allocating one on first sight.
    pub fn variable(&mut self, var: &Variable) -> Variable {
        if let Some(mapped) = self.variables.get(var) {
            return mapped.clone();
        }
        let fresh = match (self.mode, var) {
            (RenameMode::CloneClosure, Variable::Local { .. } | Variable::SelfValue) => var.clone(),
            (RenameMode::Inline { .. }, Variable::Local { depth, .. }) if *depth > 0 => var.clone(),
            (RenameMode::Inline { prefix }, Variable::Local { name, .. }) => Variable::Inlined {
                prefix,
                name: name.clone(),
            },
            _ => self.alloc.new_temp(),
        };
        self.variables.insert(var.clone(), fresh.clone());
        fresh
    }

    /// Returns the host-side name for `label`, allocating one on first sight.
    pub fn label(&mut self, label: &Label) -> Label {
        if let Some(mapped) = self.labels.get(label) {
            return mapped.clone();
        }
        let fresh = self.alloc.new_label();
        self.labels.insert(label.clone(), fresh.clone());
        fresh
    }

    /// Renames every variable and label inside `op`.
    pub fn operand(&mut self, op: &Operand) -> Operand {
        match op {
            Operand::Variable(v) => Operand::Variable(self.variable(v)),
            Operand::Label(l) => Operand::Label(self.label(l)),
            Operand::Array(elements) => {
                Operand::Array(elements.iter().map(|e| self.operand(e)).collect())
            }
            _ => op.clone(),
        }
    }

    /// Fresh temporary in the host scope, outside of any mapping.
    pub fn new_temp(&mut self) -> Variable {
        self.alloc.new_temp()
    }

    /// Fresh label in the host scope, outside of any mapping.
    pub fn new_label(&mut self) -> Label {
        self.alloc.new_label()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_renaming_is_hygienic() {
        let mut alloc = ScopeAllocator::default();
        // Host already uses %v_0 and L0
        let host_temp = alloc.new_temp();
        let host_label = alloc.new_label();

        let mut renamer = Renamer::for_inlining(&mut alloc);
        let t = renamer.variable(&Variable::Temp(0));
        let x = renamer.variable(&Variable::local("x"));
        let s = renamer.variable(&Variable::SelfValue);
        let l = renamer.label(&Label::new("L0"));

        assert_ne!(t, host_temp);
        assert_ne!(l, host_label);
        assert!(matches!(x, Variable::Inlined { ref name, .. } if name == "x"));
        assert_ne!(s, Variable::SelfValue);
        assert_eq!(renamer.variable(&Variable::Temp(0)), t);
    }

    #[test]
    fn test_closure_clone_keeps_locals() {
        let mut alloc = ScopeAllocator::default();
        let mut renamer = Renamer::for_closure_clone(&mut alloc);
        let local = Variable::captured("a", 1);
        assert_eq!(renamer.variable(&local), local);
        assert_eq!(renamer.variable(&Variable::SelfValue), Variable::SelfValue);
        assert_ne!(renamer.variable(&Variable::Temp(7)), Variable::Temp(7));
    }

    #[test]
    fn test_bind_overrides() {
        let mut alloc = ScopeAllocator::default();
        let mut renamer = Renamer::for_inlining(&mut alloc);
        renamer.bind(Variable::SelfValue, Variable::local("recv"));
        assert_eq!(
            renamer.operand(&Operand::Variable(Variable::SelfValue)),
            Operand::Variable(Variable::local("recv"))
        );
    }
}
