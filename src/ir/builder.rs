//! AST lowering.
//!
//! [`IrBuilder`] walks a [`Node`] tree once, depth first, and appends
//! instructions to the scope currently being built. `def`, block literals and
//! `END { }` open nested scopes; everything else lowers in place:
//!
//! ```text
//! if c then a else b end      %v_0 = <c>
//!                             b_false(%v_0, L0)
//!                             %v_1 = copy(<a>); jump(L1)
//!                             label(L0)
//!                             %v_1 = copy(<b>)
//!                             label(L1)
//! ```
//!
//! Locals resolve lexically: a closure that reads a local of an enclosing
//! scope gets a variable with the nesting distance as its depth. Method and
//! script scopes stop the lookup.

use log::debug;
use rustc_hash::FxHashSet;

use crate::{
    ast::{Node, OptionalParam},
    ir::{CallInstr, Instr, IrScope, Label, Operand, ScopeFlags, ScopeId, ScopeKind, Variable},
    Result,
};

/// Name of the root scope.
const SCRIPT_NAME: &str = "__script__";

/// Loop currently open in a scope, target of `break`.
struct OpenLoop {
    end: Label,
    result: Variable,
}

/// A scope under construction.
struct Frame {
    scope: IrScope,
    locals: FxHashSet<String>,
    loops: Vec<OpenLoop>,
    line: u32,
}

impl Frame {
    fn new(id: ScopeId, kind: ScopeKind, name: impl Into<String>) -> Self {
        Frame {
            scope: IrScope::new(id, kind, name),
            locals: FxHashSet::default(),
            loops: Vec::new(),
            line: 0,
        }
    }
}

/// Lowers AST trees into scope trees.
///
/// Scope ids are assigned in creation order, the root being `ScopeId(0)`.
///
/// # Examples
///
/// ```rust
/// use irscope::{ast::Node, IrBuilder};
///
/// let ast = Node::seq(vec![
///     Node::assign("x", Node::int(1)),
///     Node::Call {
///         receiver: None,
///         name: "each".into(),
///         args: vec![],
///         block: Some(Box::new(Node::Iter {
///             params: vec![],
///             body: Box::new(Node::var("x")),
///         })),
///     },
/// ]);
/// let root = IrBuilder::new().build_root(&ast)?;
/// assert_eq!(root.scope_count(), 2);
/// # Ok::<(), irscope::Error>(())
/// ```
pub struct IrBuilder {
    frame: Frame,
    outer: Vec<Frame>,
    next_scope: u32,
}

impl Default for IrBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IrBuilder {
    /// Creates a builder.
    #[must_use]
    pub fn new() -> Self {
        IrBuilder {
            frame: Frame::new(ScopeId(0), ScopeKind::Script, SCRIPT_NAME),
            outer: Vec::new(),
            next_scope: 1,
        }
    }

    /// Lowers `node` as the body of a script and returns the scope tree.
    ///
    /// Scope flags are computed before returning.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for constructs that cannot appear
    /// where they do, such as a `break` outside of any loop or block.
    pub fn build_root(&mut self, node: &Node) -> Result<IrScope> {
        self.frame = Frame::new(ScopeId(0), ScopeKind::Script, SCRIPT_NAME);
        self.outer.clear();
        self.next_scope = 1;

        self.emit(Instr::ReceiveSelf {
            result: Variable::SelfValue,
        });
        let value = self.build(node)?;
        self.emit(Instr::Return { value });

        let mut root = std::mem::replace(
            &mut self.frame,
            Frame::new(ScopeId(0), ScopeKind::Script, SCRIPT_NAME),
        )
        .scope;
        root.compute_scope_flags();
        debug!(
            "built {} scopes, {} root instructions",
            root.scope_count(),
            root.instrs().len()
        );
        Ok(root)
    }

    fn emit(&mut self, instr: Instr) {
        self.frame.scope.add_instr(instr);
    }

    fn temp(&mut self) -> Variable {
        self.frame.scope.new_temp()
    }

    fn label(&mut self) -> Label {
        self.frame.scope.new_label()
    }

    fn push_scope(&mut self, kind: ScopeKind, name: Option<&str>) -> ScopeId {
        let id = ScopeId(self.next_scope);
        self.next_scope += 1;
        let name = name.map_or_else(|| format!("_CLOSURE_{}", id.0), str::to_string);
        let line = self.frame.line;
        let parent = std::mem::replace(&mut self.frame, Frame::new(id, kind, name));
        self.outer.push(parent);
        self.frame.scope.set_line(line);
        self.frame.line = line;
        id
    }

    fn pop_scope(&mut self) -> Result<()> {
        let parent = self
            .outer
            .pop()
            .ok_or_else(|| malformed_error!("scope closed without an enclosing scope"))?;
        let done = std::mem::replace(&mut self.frame, parent);
        self.frame.scope.add_nested(done.scope);
        Ok(())
    }

    /// Declares `name` in the current scope, shadowing outer locals.
    fn define_local(&mut self, name: &str) -> Variable {
        self.frame.locals.insert(name.to_string());
        Variable::local(name)
    }

    /// Resolves `name` lexically, declaring it here if nothing encloses it.
    fn local(&mut self, name: &str) -> Variable {
        if self.frame.locals.contains(name) {
            return Variable::local(name);
        }
        if self.frame.scope.kind().is_closure() {
            for (depth, frame) in (1u32..).zip(self.outer.iter().rev()) {
                if frame.locals.contains(name) {
                    return Variable::captured(name, depth);
                }
                if !frame.scope.kind().is_closure() {
                    break;
                }
            }
        }
        self.define_local(name)
    }

    fn build_all(&mut self, nodes: &[Node]) -> Result<Vec<Operand>> {
        nodes.iter().map(|n| self.build(n)).collect()
    }

    fn build_opt(&mut self, node: Option<&Node>) -> Result<Operand> {
        match node {
            Some(node) => self.build(node),
            None => Ok(Operand::Nil),
        }
    }

    /// Lowers one expression and returns the operand holding its value.
    fn build(&mut self, node: &Node) -> Result<Operand> {
        match node {
            Node::Fixnum { value } => Ok(Operand::Fixnum(*value)),
            Node::Float { value } => Ok(Operand::Float(*value)),
            Node::Str { value } => Ok(Operand::Str(value.clone())),
            Node::Nil => Ok(Operand::Nil),
            Node::True => Ok(Operand::Boolean(true)),
            Node::False => Ok(Operand::Boolean(false)),
            Node::Array { elements } => Ok(Operand::Array(self.build_all(elements)?)),
            Node::SelfRef => Ok(Operand::Variable(Variable::SelfValue)),
            Node::LocalVar { name } => Ok(Operand::Variable(self.local(name))),
            Node::LocalAsgn { name, value } => {
                let value = self.build(value)?;
                let var = self.local(name);
                self.emit(Instr::copy(var.clone(), value));
                Ok(var.into())
            }
            Node::Call {
                receiver,
                name,
                args,
                block,
            } => self.build_call(receiver.as_deref(), name, args, block.as_deref()),
            Node::If {
                condition,
                then_body,
                else_body,
            } => self.build_if(condition, then_body.as_deref(), else_body.as_deref()),
            Node::While { condition, body } => self.build_while(condition, body),
            Node::Begin {
                body,
                rescue,
                exception_var,
                ensure,
            } => self.build_begin(
                body,
                rescue.as_deref(),
                exception_var.as_deref(),
                ensure.as_deref(),
            ),
            Node::Return { value } => {
                let value = self.build_opt(value.as_deref())?;
                if self.frame.scope.kind().is_closure() {
                    self.emit(Instr::NonlocalReturn { value });
                } else {
                    self.emit(Instr::Return { value });
                }
                Ok(Operand::Nil)
            }
            Node::Break { value } => {
                let value = self.build_opt(value.as_deref())?;
                if let Some(open) = self.frame.loops.last() {
                    let (result, end) = (open.result.clone(), open.end.clone());
                    self.emit(Instr::copy(result, value));
                    self.emit(Instr::jump(end));
                } else if self.frame.scope.kind().is_closure() {
                    self.emit(Instr::Break { value });
                } else {
                    return Err(malformed_error!(
                        "break outside of a loop or block in {}",
                        self.frame.scope.name()
                    ));
                }
                Ok(Operand::Nil)
            }
            Node::Block { statements } => {
                let mut last = Operand::Nil;
                for statement in statements {
                    last = self.build(statement)?;
                }
                Ok(last)
            }
            Node::Def {
                name,
                params,
                optional,
                block_param,
                body,
            } => self.build_def(name, params, optional, block_param.as_deref(), body),
            Node::Iter { params, body } => {
                let closure = self.build_closure(params, body)?;
                let result = self.temp();
                self.emit(Instr::BuildClosure {
                    result: result.clone(),
                    closure,
                });
                Ok(result.into())
            }
            Node::EndBlock { body } => {
                let closure = self.build_closure(&[], body)?;
                self.emit(Instr::RecordEndBlock { closure });
                Ok(Operand::Nil)
            }
            Node::Newline { line, node } => {
                if *line != self.frame.line {
                    self.frame.line = *line;
                    self.emit(Instr::LineNumber(*line));
                }
                if self.frame.scope.line() == 0 {
                    self.frame.scope.set_line(*line);
                }
                self.build(node)
            }
        }
    }

    fn build_call(
        &mut self,
        receiver: Option<&Node>,
        name: &str,
        args: &[Node],
        block: Option<&Node>,
    ) -> Result<Operand> {
        let receiver = match receiver {
            Some(node) => self.build(node)?,
            None => Operand::Variable(Variable::SelfValue),
        };
        let args = self.build_all(args)?;
        let closure = match block {
            Some(Node::Iter { params, body }) => {
                Some(Operand::WrappedClosure(self.build_closure(params, body)?))
            }
            Some(other) => Some(self.build(other)?),
            None => None,
        };

        let result = self.temp();
        let mut call = CallInstr::new(Some(result.clone()), receiver, name, args);
        if let Some(closure) = closure {
            call = call.with_closure(closure);
        }
        self.emit(Instr::Call(call));
        Ok(result.into())
    }

    fn build_if(
        &mut self,
        condition: &Node,
        then_body: Option<&Node>,
        else_body: Option<&Node>,
    ) -> Result<Operand> {
        let value = self.build(condition)?;
        let (otherwise, done) = (self.label(), self.label());
        let result = self.temp();

        self.emit(Instr::BFalse {
            value,
            target: otherwise.clone(),
        });
        let taken = self.build_opt(then_body)?;
        self.emit(Instr::copy(result.clone(), taken));
        self.emit(Instr::jump(done.clone()));

        self.emit(Instr::Label(otherwise));
        let other = self.build_opt(else_body)?;
        self.emit(Instr::copy(result.clone(), other));
        self.emit(Instr::Label(done));
        Ok(result.into())
    }

    fn build_while(&mut self, condition: &Node, body: &Node) -> Result<Operand> {
        self.frame.scope.set_flag(ScopeFlags::HAS_LOOPS);
        let (start, end) = (self.label(), self.label());
        let result = self.temp();
        self.emit(Instr::copy(result.clone(), Operand::Nil));

        self.emit(Instr::Label(start.clone()));
        let value = self.build(condition)?;
        self.emit(Instr::BFalse {
            value,
            target: end.clone(),
        });

        self.frame.loops.push(OpenLoop {
            end: end.clone(),
            result: result.clone(),
        });
        let built = self.build(body);
        self.frame.loops.pop();
        built?;

        self.emit(Instr::jump(start));
        self.emit(Instr::Label(end));
        Ok(result.into())
    }

    fn build_rescue(
        &mut self,
        body: &Node,
        rescue: Option<&Node>,
        exception_var: Option<&str>,
        result: &Variable,
    ) -> Result<()> {
        let Some(rescue) = rescue else {
            let value = self.build(body)?;
            self.emit(Instr::copy(result.clone(), value));
            return Ok(());
        };

        let (begin, end, handler, done) = (self.label(), self.label(), self.label(), self.label());
        self.emit(Instr::ExceptionRegionStart {
            begin,
            end,
            rescue: handler.clone(),
            ensure: None,
        });
        let value = self.build(body)?;
        self.emit(Instr::copy(result.clone(), value));
        self.emit(Instr::ExceptionRegionEnd);
        self.emit(Instr::jump(done.clone()));

        self.emit(Instr::Label(handler));
        let exception = self.temp();
        self.emit(Instr::ReceiveException {
            result: exception.clone(),
        });
        if let Some(name) = exception_var {
            let local = self.local(name);
            self.emit(Instr::copy(local, exception));
        }
        let value = self.build(rescue)?;
        self.emit(Instr::copy(result.clone(), value));
        self.emit(Instr::Label(done));
        Ok(())
    }

    /// `begin/rescue/ensure`.
    ///
    /// The ensure body is emitted twice: on the normal path after the
    /// protected code, and in a handler that runs it and rethrows.
    fn build_begin(
        &mut self,
        body: &Node,
        rescue: Option<&Node>,
        exception_var: Option<&str>,
        ensure: Option<&Node>,
    ) -> Result<Operand> {
        let result = self.temp();
        let Some(ensure) = ensure else {
            self.build_rescue(body, rescue, exception_var, &result)?;
            return Ok(result.into());
        };

        let (begin, end, handler, done) = (self.label(), self.label(), self.label(), self.label());
        self.emit(Instr::ExceptionRegionStart {
            begin,
            end,
            rescue: handler.clone(),
            ensure: Some(handler.clone()),
        });
        self.build_rescue(body, rescue, exception_var, &result)?;
        self.emit(Instr::ExceptionRegionEnd);
        self.build(ensure)?;
        self.emit(Instr::jump(done.clone()));

        self.emit(Instr::Label(handler));
        let exception = self.temp();
        self.emit(Instr::ReceiveException {
            result: exception.clone(),
        });
        self.build(ensure)?;
        self.emit(Instr::Throw {
            value: exception.into(),
        });
        self.emit(Instr::Label(done));
        Ok(result.into())
    }

    fn build_closure(&mut self, params: &[String], body: &Node) -> Result<ScopeId> {
        let id = self.push_scope(ScopeKind::Closure, None);
        self.emit(Instr::ReceiveSelf {
            result: Variable::SelfValue,
        });
        for (index, param) in (0u32..).zip(params) {
            let result = self.define_local(param);
            self.emit(Instr::ReceiveArg { result, index });
        }
        self.frame.scope.set_required_args(params.len() as u32);

        let value = self.build(body)?;
        self.emit(Instr::Return { value });
        self.pop_scope()?;
        Ok(id)
    }

    fn build_def(
        &mut self,
        name: &str,
        params: &[String],
        optional: &[OptionalParam],
        block_param: Option<&str>,
        body: &Node,
    ) -> Result<Operand> {
        let id = self.push_scope(ScopeKind::Method, Some(name));
        let required = params.len() as u32;
        self.frame.scope.set_required_args(required);

        self.emit(Instr::ReceiveSelf {
            result: Variable::SelfValue,
        });
        for (index, param) in (0u32..).zip(params) {
            let result = self.define_local(param);
            self.emit(Instr::ReceiveArg { result, index });
        }
        for (index, param) in (0u32..).zip(optional) {
            let var = self.define_local(&param.name);
            self.emit(Instr::ReceiveOptArg {
                result: var.clone(),
                index,
                min_args: required,
            });
            let (missing, next) = (self.label(), self.label());
            self.emit(Instr::BNil {
                value: var.clone().into(),
                target: missing.clone(),
            });
            self.emit(Instr::jump(next.clone()));
            self.emit(Instr::Label(missing));
            let default = self.build(&param.default)?;
            self.emit(Instr::copy(var, default));
            self.emit(Instr::Label(next));
        }
        if let Some(block) = block_param {
            let result = self.define_local(block);
            self.emit(Instr::ReceiveClosure { result });
        }

        let value = self.build(body)?;
        self.emit(Instr::Return { value });
        self.pop_scope()?;

        self.emit(Instr::DefineMethod {
            scope: id,
            name: name.to_string(),
        });
        Ok(Operand::Str(name.to_string()))
    }
}
