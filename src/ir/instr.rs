//! The closed instruction set.
//!
//! Every instruction is a variant of [`Instr`]. Passes dispatch on the variant
//! with `match`; the capability queries ([`Instr::transfers_control`],
//! [`Instr::can_raise_exception`], [`Instr::has_side_effects`] and friends) are
//! the only classification the analyses rely on.
//!
//! Instructions that define a value expose it through [`Instr::result`]. The
//! variable is part of the variant, so a result-producing instruction without
//! a result cannot be constructed.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::ir::{Label, MethAddr, Operand, Renamer, ScopeId, ValueMap, Variable};

/// Snapshot of a method's version taken when a guard was emitted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VersionToken(pub u64);

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Opcode of an [`Instr`], used for printing and statistics.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[allow(missing_docs)]
pub enum Operation {
    Copy,
    Call,
    ReceiveSelf,
    ReceiveArg,
    ReceiveOptArg,
    ReceiveClosure,
    ReceiveException,
    Label,
    Jump,
    BTrue,
    BFalse,
    BNil,
    BEq,
    Return,
    NonlocalReturn,
    Break,
    Throw,
    ExceptionRegionStart,
    ExceptionRegionEnd,
    BuildClosure,
    DefineMethod,
    RecordEndBlock,
    LoadLocalVar,
    StoreLocalVar,
    PushFrame,
    PopFrame,
    PushBinding,
    PopBinding,
    AssertMethodVersion,
    GuardMethodVersion,
    LineNumber,
    Nop,
}

/// A dynamic method call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallInstr {
    /// Where the return value goes; `None` when it is discarded
    pub result: Option<Variable>,
    /// Receiver
    pub receiver: Operand,
    /// Method being invoked
    pub method: MethAddr,
    /// Positional arguments
    pub args: Vec<Operand>,
    /// Block argument, usually a [`Operand::WrappedClosure`]
    pub closure: Option<Operand>,
}

impl CallInstr {
    /// Creates a call with no block argument.
    #[must_use]
    pub fn new(
        result: Option<Variable>,
        receiver: Operand,
        method: impl Into<String>,
        args: Vec<Operand>,
    ) -> Self {
        CallInstr {
            result,
            receiver,
            method: MethAddr::new(method),
            args,
            closure: None,
        }
    }

    /// Attaches a block argument.
    #[must_use]
    pub fn with_closure(mut self, closure: Operand) -> Self {
        self.closure = Some(closure);
        self
    }

    /// The closure scope passed as block argument, if statically known.
    #[must_use]
    pub fn closure_scope(&self) -> Option<ScopeId> {
        match self.closure {
            Some(Operand::WrappedClosure(id)) => Some(id),
            _ => None,
        }
    }
}

/// A single IR instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instr {
    /// `result = value`
    Copy {
        /// Destination
        result: Variable,
        /// Source
        value: Operand,
    },
    /// Dynamic call
    Call(CallInstr),
    /// Binds the receiver of the current scope
    ReceiveSelf {
        /// Destination
        result: Variable,
    },
    /// Binds a required positional argument
    ReceiveArg {
        /// Destination
        result: Variable,
        /// Argument position
        index: u32,
    },
    /// Binds an optional positional argument
    ///
    /// The argument is present iff `arg_count > min_args + index`; it is then
    /// argument number `min_args + index`.
    ReceiveOptArg {
        /// Destination
        result: Variable,
        /// Position among the optional parameters
        index: u32,
        /// Number of required parameters
        min_args: u32,
    },
    /// Binds the block argument
    ReceiveClosure {
        /// Destination
        result: Variable,
    },
    /// Binds the in-flight exception at the start of a rescue block
    ReceiveException {
        /// Destination
        result: Variable,
    },
    /// Jump target marker; consumed by CFG construction
    Label(Label),
    /// Unconditional jump
    Jump {
        /// Destination
        target: Label,
    },
    /// Branch if truthy
    BTrue {
        /// Tested value
        value: Operand,
        /// Destination
        target: Label,
    },
    /// Branch if falsy (`nil` or `false`)
    BFalse {
        /// Tested value
        value: Operand,
        /// Destination
        target: Label,
    },
    /// Branch if `nil`
    BNil {
        /// Tested value
        value: Operand,
        /// Destination
        target: Label,
    },
    /// Branch if `left == right`
    BEq {
        /// Left comparand
        left: Operand,
        /// Right comparand
        right: Operand,
        /// Destination
        target: Label,
    },
    /// Return from the current scope
    Return {
        /// Returned value
        value: Operand,
    },
    /// Return from the enclosing method out of a closure
    NonlocalReturn {
        /// Returned value
        value: Operand,
    },
    /// Break out of the call that received the current closure
    Break {
        /// Break value
        value: Operand,
    },
    /// Raise an exception
    Throw {
        /// Exception object
        value: Operand,
    },
    /// Opens a protected region; consumed by CFG construction
    ExceptionRegionStart {
        /// Label of the first protected block
        begin: Label,
        /// Label of the block following the region
        end: Label,
        /// First block of the rescue handler
        rescue: Label,
        /// First block of the ensure handler, if distinct from the rescue
        ensure: Option<Label>,
    },
    /// Closes the innermost protected region; consumed by CFG construction
    ExceptionRegionEnd,
    /// Materializes a closure object
    BuildClosure {
        /// Destination
        result: Variable,
        /// Closure scope
        closure: ScopeId,
    },
    /// Defines a method from a nested method scope
    DefineMethod {
        /// Method scope
        scope: ScopeId,
        /// Method name
        name: String,
    },
    /// Registers an `END { }` block
    RecordEndBlock {
        /// Closure scope of the block
        closure: ScopeId,
    },
    /// Reloads a local from the heap binding
    LoadLocalVar {
        /// The local, which is also the destination
        local: Variable,
    },
    /// Writes a local back to the heap binding
    StoreLocalVar {
        /// The local to store
        local: Variable,
    },
    /// Pushes a call frame
    PushFrame,
    /// Pops the call frame
    PopFrame,
    /// Allocates the heap binding
    PushBinding,
    /// Releases the heap binding
    PopBinding,
    /// Deoptimization guard for a folded call
    AssertMethodVersion {
        /// Folded method
        method: MethAddr,
        /// Version observed at fold time
        version: VersionToken,
    },
    /// Branches to `fallback` once `method` is no longer at `version`
    ///
    /// Placed in front of inlined code; the fallback block keeps the
    /// original dynamic call.
    GuardMethodVersion {
        /// Inlined method
        method: MethAddr,
        /// Version observed when the body was inlined
        version: VersionToken,
        /// Receiver the method is looked up on
        receiver: Operand,
        /// Destination when the guard fails
        fallback: Label,
    },
    /// Source line marker
    LineNumber(u32),
    /// No operation
    Nop,
}

impl Instr {
    /// Convenience constructor for a copy.
    #[must_use]
    pub fn copy(result: Variable, value: impl Into<Operand>) -> Self {
        Instr::Copy {
            result,
            value: value.into(),
        }
    }

    /// Convenience constructor for an unconditional jump.
    #[must_use]
    pub fn jump(target: Label) -> Self {
        Instr::Jump { target }
    }

    /// Returns the opcode.
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            Instr::Copy { .. } => Operation::Copy,
            Instr::Call(_) => Operation::Call,
            Instr::ReceiveSelf { .. } => Operation::ReceiveSelf,
            Instr::ReceiveArg { .. } => Operation::ReceiveArg,
            Instr::ReceiveOptArg { .. } => Operation::ReceiveOptArg,
            Instr::ReceiveClosure { .. } => Operation::ReceiveClosure,
            Instr::ReceiveException { .. } => Operation::ReceiveException,
            Instr::Label(_) => Operation::Label,
            Instr::Jump { .. } => Operation::Jump,
            Instr::BTrue { .. } => Operation::BTrue,
            Instr::BFalse { .. } => Operation::BFalse,
            Instr::BNil { .. } => Operation::BNil,
            Instr::BEq { .. } => Operation::BEq,
            Instr::Return { .. } => Operation::Return,
            Instr::NonlocalReturn { .. } => Operation::NonlocalReturn,
            Instr::Break { .. } => Operation::Break,
            Instr::Throw { .. } => Operation::Throw,
            Instr::ExceptionRegionStart { .. } => Operation::ExceptionRegionStart,
            Instr::ExceptionRegionEnd => Operation::ExceptionRegionEnd,
            Instr::BuildClosure { .. } => Operation::BuildClosure,
            Instr::DefineMethod { .. } => Operation::DefineMethod,
            Instr::RecordEndBlock { .. } => Operation::RecordEndBlock,
            Instr::LoadLocalVar { .. } => Operation::LoadLocalVar,
            Instr::StoreLocalVar { .. } => Operation::StoreLocalVar,
            Instr::PushFrame => Operation::PushFrame,
            Instr::PopFrame => Operation::PopFrame,
            Instr::PushBinding => Operation::PushBinding,
            Instr::PopBinding => Operation::PopBinding,
            Instr::AssertMethodVersion { .. } => Operation::AssertMethodVersion,
            Instr::GuardMethodVersion { .. } => Operation::GuardMethodVersion,
            Instr::LineNumber(_) => Operation::LineNumber,
            Instr::Nop => Operation::Nop,
        }
    }

    /// The variable this instruction defines, if any.
    #[must_use]
    pub fn result(&self) -> Option<&Variable> {
        match self {
            Instr::Copy { result, .. }
            | Instr::ReceiveSelf { result }
            | Instr::ReceiveArg { result, .. }
            | Instr::ReceiveOptArg { result, .. }
            | Instr::ReceiveClosure { result }
            | Instr::ReceiveException { result }
            | Instr::BuildClosure { result, .. } => Some(result),
            Instr::Call(call) => call.result.as_ref(),
            Instr::LoadLocalVar { local } => Some(local),
            _ => None,
        }
    }

    /// All input operands, including labels and method addresses.
    #[must_use]
    pub fn operands(&self) -> Vec<Operand> {
        match self {
            Instr::Copy { value, .. }
            | Instr::Return { value }
            | Instr::NonlocalReturn { value }
            | Instr::Break { value }
            | Instr::Throw { value } => vec![value.clone()],
            Instr::Call(call) => {
                let mut ops = Vec::with_capacity(call.args.len() + 3);
                ops.push(call.receiver.clone());
                ops.push(Operand::MethAddr(call.method.clone()));
                ops.extend(call.args.iter().cloned());
                if let Some(closure) = &call.closure {
                    ops.push(closure.clone());
                }
                ops
            }
            Instr::Jump { target } => vec![Operand::Label(target.clone())],
            Instr::BTrue { value, target }
            | Instr::BFalse { value, target }
            | Instr::BNil { value, target } => {
                vec![value.clone(), Operand::Label(target.clone())]
            }
            Instr::BEq {
                left,
                right,
                target,
            } => vec![left.clone(), right.clone(), Operand::Label(target.clone())],
            Instr::ExceptionRegionStart {
                begin,
                end,
                rescue,
                ensure,
            } => {
                let mut ops = vec![
                    Operand::Label(begin.clone()),
                    Operand::Label(end.clone()),
                    Operand::Label(rescue.clone()),
                ];
                if let Some(ensure) = ensure {
                    ops.push(Operand::Label(ensure.clone()));
                }
                ops
            }
            Instr::BuildClosure { closure, .. } | Instr::RecordEndBlock { closure } => {
                vec![Operand::WrappedClosure(*closure)]
            }
            Instr::DefineMethod { scope, .. } => vec![Operand::WrappedClosure(*scope)],
            Instr::StoreLocalVar { local } => vec![Operand::Variable(local.clone())],
            Instr::AssertMethodVersion { method, .. } => vec![Operand::MethAddr(method.clone())],
            Instr::GuardMethodVersion {
                method,
                receiver,
                fallback,
                ..
            } => vec![
                receiver.clone(),
                Operand::MethAddr(method.clone()),
                Operand::Label(fallback.clone()),
            ],
            _ => Vec::new(),
        }
    }

    /// Variables read by this instruction, in operand order.
    #[must_use]
    pub fn used_variables(&self) -> Vec<Variable> {
        let mut vars = Vec::new();
        for op in self.operands() {
            op.collect_variables(&mut vars);
        }
        vars
    }

    /// Applies `f` to every value operand, leaving labels and results alone.
    pub fn for_each_value_operand_mut(&mut self, mut f: impl FnMut(&mut Operand)) {
        match self {
            Instr::Copy { value, .. }
            | Instr::Return { value }
            | Instr::NonlocalReturn { value }
            | Instr::Break { value }
            | Instr::Throw { value }
            | Instr::BTrue { value, .. }
            | Instr::BFalse { value, .. }
            | Instr::BNil { value, .. }
            | Instr::GuardMethodVersion {
                receiver: value, ..
            } => f(value),
            Instr::BEq { left, right, .. } => {
                f(left);
                f(right);
            }
            Instr::Call(call) => {
                f(&mut call.receiver);
                for arg in &mut call.args {
                    f(arg);
                }
                if let Some(closure) = &mut call.closure {
                    f(closure);
                }
            }
            _ => {}
        }
    }

    /// Returns `true` if this instruction can end a block by jumping or leaving the scope.
    #[must_use]
    pub fn transfers_control(&self) -> bool {
        matches!(
            self,
            Instr::Jump { .. }
                | Instr::BTrue { .. }
                | Instr::BFalse { .. }
                | Instr::BNil { .. }
                | Instr::BEq { .. }
                | Instr::GuardMethodVersion { .. }
                | Instr::Return { .. }
                | Instr::NonlocalReturn { .. }
                | Instr::Break { .. }
                | Instr::Throw { .. }
        )
    }

    /// Returns `true` if control never falls through to the next instruction.
    #[must_use]
    pub fn is_unconditional_transfer(&self) -> bool {
        matches!(
            self,
            Instr::Jump { .. }
                | Instr::Return { .. }
                | Instr::NonlocalReturn { .. }
                | Instr::Break { .. }
                | Instr::Throw { .. }
        )
    }

    /// Returns `true` if this instruction leaves the scope.
    #[must_use]
    pub fn is_scope_exit(&self) -> bool {
        matches!(
            self,
            Instr::Return { .. }
                | Instr::NonlocalReturn { .. }
                | Instr::Break { .. }
                | Instr::Throw { .. }
        )
    }

    /// The jump target of a jump or branch.
    #[must_use]
    pub fn branch_target(&self) -> Option<&Label> {
        match self {
            Instr::Jump { target }
            | Instr::BTrue { target, .. }
            | Instr::BFalse { target, .. }
            | Instr::BNil { target, .. }
            | Instr::BEq { target, .. }
            | Instr::GuardMethodVersion {
                fallback: target, ..
            } => Some(target),
            _ => None,
        }
    }

    /// Mutable access to the jump target.
    pub fn branch_target_mut(&mut self) -> Option<&mut Label> {
        match self {
            Instr::Jump { target }
            | Instr::BTrue { target, .. }
            | Instr::BFalse { target, .. }
            | Instr::BNil { target, .. }
            | Instr::BEq { target, .. }
            | Instr::GuardMethodVersion {
                fallback: target, ..
            } => Some(target),
            _ => None,
        }
    }

    /// Returns `true` if executing this instruction may raise.
    #[must_use]
    pub fn can_raise_exception(&self) -> bool {
        matches!(
            self,
            Instr::Call(_)
                | Instr::BEq { .. }
                | Instr::Throw { .. }
                | Instr::NonlocalReturn { .. }
                | Instr::Break { .. }
                | Instr::DefineMethod { .. }
        )
    }

    /// Returns `true` if removing this instruction could change behavior even
    /// when its result is unused.
    #[must_use]
    pub fn has_side_effects(&self) -> bool {
        !matches!(
            self,
            Instr::Copy { .. }
                | Instr::ReceiveSelf { .. }
                | Instr::ReceiveArg { .. }
                | Instr::ReceiveOptArg { .. }
                | Instr::ReceiveClosure { .. }
                | Instr::BuildClosure { .. }
                | Instr::LoadLocalVar { .. }
                | Instr::Nop
        )
    }

    /// Returns `true` if local value knowledge must be discarded at this
    /// instruction: calls, labels and control transfers.
    #[must_use]
    pub fn is_hard_boundary(&self) -> bool {
        matches!(
            self,
            Instr::Call(_)
                | Instr::Label(_)
                | Instr::ExceptionRegionStart { .. }
                | Instr::ExceptionRegionEnd
                | Instr::DefineMethod { .. }
        ) || self.transfers_control()
    }

    /// Rewrites every value operand to its simplified form.
    pub fn simplify_operands(&mut self, map: &ValueMap, force: bool) {
        self.for_each_value_operand_mut(|op| *op = op.simplify(map, force));
    }

    /// Simplifies operands and returns the value this instruction's result is
    /// known to hold, if the instruction is a pure copy.
    pub fn simplify_and_get_result(&mut self, map: &ValueMap) -> Option<Operand> {
        self.simplify_operands(map, false);
        match self {
            Instr::Copy { value, .. } => Some(value.clone()),
            _ => None,
        }
    }

    /// Produces a structurally identical instruction with every variable and
    /// label passed through `renamer`.
    #[must_use]
    pub fn clone_for_inlining(&self, renamer: &mut Renamer<'_>) -> Instr {
        match self {
            Instr::Copy { result, value } => Instr::Copy {
                result: renamer.variable(result),
                value: renamer.operand(value),
            },
            Instr::Call(call) => Instr::Call(CallInstr {
                result: call.result.as_ref().map(|r| renamer.variable(r)),
                receiver: renamer.operand(&call.receiver),
                method: call.method.clone(),
                args: call.args.iter().map(|a| renamer.operand(a)).collect(),
                closure: call.closure.as_ref().map(|c| renamer.operand(c)),
            }),
            Instr::ReceiveSelf { result } => Instr::ReceiveSelf {
                result: renamer.variable(result),
            },
            Instr::ReceiveArg { result, index } => Instr::ReceiveArg {
                result: renamer.variable(result),
                index: *index,
            },
            Instr::ReceiveOptArg {
                result,
                index,
                min_args,
            } => Instr::ReceiveOptArg {
                result: renamer.variable(result),
                index: *index,
                min_args: *min_args,
            },
            Instr::ReceiveClosure { result } => Instr::ReceiveClosure {
                result: renamer.variable(result),
            },
            Instr::ReceiveException { result } => Instr::ReceiveException {
                result: renamer.variable(result),
            },
            Instr::Label(label) => Instr::Label(renamer.label(label)),
            Instr::Jump { target } => Instr::Jump {
                target: renamer.label(target),
            },
            Instr::BTrue { value, target } => Instr::BTrue {
                value: renamer.operand(value),
                target: renamer.label(target),
            },
            Instr::BFalse { value, target } => Instr::BFalse {
                value: renamer.operand(value),
                target: renamer.label(target),
            },
            Instr::BNil { value, target } => Instr::BNil {
                value: renamer.operand(value),
                target: renamer.label(target),
            },
            Instr::BEq {
                left,
                right,
                target,
            } => Instr::BEq {
                left: renamer.operand(left),
                right: renamer.operand(right),
                target: renamer.label(target),
            },
            Instr::Return { value } => Instr::Return {
                value: renamer.operand(value),
            },
            Instr::NonlocalReturn { value } => Instr::NonlocalReturn {
                value: renamer.operand(value),
            },
            Instr::Break { value } => Instr::Break {
                value: renamer.operand(value),
            },
            Instr::Throw { value } => Instr::Throw {
                value: renamer.operand(value),
            },
            Instr::ExceptionRegionStart {
                begin,
                end,
                rescue,
                ensure,
            } => Instr::ExceptionRegionStart {
                begin: renamer.label(begin),
                end: renamer.label(end),
                rescue: renamer.label(rescue),
                ensure: ensure.as_ref().map(|l| renamer.label(l)),
            },
            Instr::GuardMethodVersion {
                method,
                version,
                receiver,
                fallback,
            } => Instr::GuardMethodVersion {
                method: method.clone(),
                version: *version,
                receiver: renamer.operand(receiver),
                fallback: renamer.label(fallback),
            },
            Instr::BuildClosure { result, closure } => Instr::BuildClosure {
                result: renamer.variable(result),
                closure: *closure,
            },
            Instr::LoadLocalVar { local } => Instr::LoadLocalVar {
                local: renamer.variable(local),
            },
            Instr::StoreLocalVar { local } => Instr::StoreLocalVar {
                local: renamer.variable(local),
            },
            Instr::ExceptionRegionEnd
            | Instr::DefineMethod { .. }
            | Instr::RecordEndBlock { .. }
            | Instr::PushFrame
            | Instr::PopFrame
            | Instr::PushBinding
            | Instr::PopBinding
            | Instr::AssertMethodVersion { .. }
            | Instr::LineNumber(_)
            | Instr::Nop => self.clone(),
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Instr::Label(label) = self {
            return write!(f, "{label}:");
        }
        if let Some(result) = self.result() {
            write!(f, "{result} = ")?;
        }
        write!(f, "{}", self.operation())?;
        match self {
            Instr::ReceiveArg { index, .. } => write!(f, "({index})"),
            Instr::ReceiveOptArg {
                index, min_args, ..
            } => write!(f, "({index}, min: {min_args})"),
            Instr::DefineMethod { scope, name } => write!(f, "({name}, scope<{scope}>)"),
            Instr::AssertMethodVersion { method, version } => write!(f, "({method}, {version})"),
            Instr::GuardMethodVersion {
                method,
                version,
                receiver,
                fallback,
            } => write!(f, "({receiver}, '{method}', {version}, {fallback})"),
            Instr::LineNumber(line) => write!(f, "({line})"),
            Instr::LoadLocalVar { .. } => Ok(()),
            _ => {
                let operands = self.operands();
                if operands.is_empty() {
                    return Ok(());
                }
                f.write_str("(")?;
                for (i, op) in operands.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{op}")?;
                }
                f.write_str(")")
            }
        }
    }
}
