//! The intermediate representation.
//!
//! This module defines the data model every other part of the crate operates
//! on: operands, the closed instruction set, basic blocks, and scopes. It also
//! contains the [`IrBuilder`] that lowers the typed AST from [`crate::ast`]
//! into flat per-scope instruction lists.
//!
//! # Key Components
//!
//! - [`Operand`] / [`Variable`] / [`Label`] - Immutable values instructions consume
//! - [`Instr`] - The instruction set, with capability queries used by passes
//! - [`BasicBlock`] - Straight-line instruction sequences inside a CFG
//! - [`IrScope`] - A method, closure, module or script with its caches
//! - [`Renamer`] - Variable and label renaming for cloned code
//! - [`IrBuilder`] - AST lowering
//! - [`persist`] - JSON dumps for debugging
//!
//! # Examples
//!
//! ```rust
//! use irscope::{ast::Node, IrBuilder};
//!
//! let ast = Node::LocalAsgn {
//!     name: "a".into(),
//!     value: Box::new(Node::Fixnum { value: 1 }),
//! };
//! let scope = IrBuilder::new().build_root(&ast)?;
//! assert!(scope.to_string_instrs().contains("a = copy(1)"));
//! # Ok::<(), irscope::Error>(())
//! ```

mod block;
mod builder;
mod instr;
mod operand;
mod rename;
mod scope;

pub mod persist;

pub use block::{BasicBlock, BlockId};
pub use builder::IrBuilder;
pub use instr::{CallInstr, Instr, Operation, VersionToken};
pub use operand::{Label, MethAddr, Operand, ValueKind, ValueMap, Variable};
pub use rename::Renamer;
pub use scope::{
    DeadInstructions, IrScope, ScopeAllocator, ScopeFlags, ScopeId, ScopeKind,
    BACKREF_METHODS, FRAME_AWARE_METHODS, SCOPE_CAPTURING_METHODS,
};
