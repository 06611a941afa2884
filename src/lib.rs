// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # irscope
//!
//! Control-flow graphs, dataflow analyses and an optimizing pass pipeline for
//! the intermediate representation of a dynamic, Ruby-like language.
//!
//! `irscope` is the middle tier of an execution engine: it takes a typed AST,
//! lowers it into per-scope instruction lists, builds CFGs, runs dataflow
//! analyses and optimizations over them, and hands a flat, linearized
//! instruction list to an interpreter or JIT.
//!
//! ## Features
//!
//! - **🌳 Scope trees** - Scripts, methods and closures with lexical capture tracking
//! - **🔀 CFG construction** - Exception regions, rescuers, and clean-up of trivial blocks
//! - **📈 Dataflow framework** - Generic worklist solver, forward and backward
//! - **⚙️ Pass pipeline** - Pre- and post-order passes over the scope tree, optionally parallel
//! - **🛡️ Guarded folding** - Constant folding protected by method version guards
//! - **🧩 Pluggable object model** - Method lookup through the [`compiler::MethodResolver`] trait
//!
//! ## Quick Start
//!
//! ```rust
//! use irscope::prelude::*;
//!
//! let ast = Node::seq(vec![
//!     Node::assign("a", Node::int(1)),
//!     Node::call(Node::var("a"), "+", vec![Node::int(2)]),
//! ]);
//!
//! let mut scope = IrBuilder::new().build_root(&ast)?;
//! let ctx = CompilationContext::new(CompilerConfig::interpreter());
//! ctx.compile(&mut scope)?;
//!
//! let interpreter = scope.interpreter_context().expect("linearized");
//! println!("{} instructions", interpreter.len());
//! println!("{}", ctx.events().summary());
//! # Ok::<(), irscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`ast`] - The typed syntax tree consumed by the builder
//! - [`ir`] - Operands, instructions, blocks, scopes, and the AST lowering
//! - [`cfg`] - Control-flow graphs, their clean-up and linearization
//! - [`dataflow`] - The solver and the concrete analyses
//! - [`compiler`] - Configuration, passes, scheduling, and change events
//! - [`utils`] - Bit sets and the generic directed graph
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`]. Library code does not panic
//! on malformed input; see [`Error`] for the categories.

#[macro_use]
pub(crate) mod error;

pub mod ast;
pub mod cfg;
pub mod compiler;
pub mod dataflow;
pub mod ir;
pub mod prelude;
pub mod utils;

/// `irscope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
/// This is used consistently throughout the crate for all fallible operations.
///
/// # Examples
///
/// ```rust
/// use irscope::{ast::Node, ir::IrScope, IrBuilder, Result};
///
/// fn lower(ast: &Node) -> Result<IrScope> {
///     let mut scope = IrBuilder::new().build_root(ast)?;
///     scope.build_cfg()?;
///     Ok(scope)
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `irscope` Error type
///
/// Every fallible operation reports one of its variants.
pub use error::Error;

/// AST lowering entry point.
pub use ir::IrBuilder;

/// Pipeline configuration and its presets.
pub use compiler::CompilerConfig;
