//! The typed syntax tree consumed by [`IrBuilder`](crate::IrBuilder).
//!
//! Parsing is not part of this crate. Front ends hand over a [`Node`] tree,
//! either built in code or deserialized from JSON:
//!
//! ```json
//! { "type": "local_asgn", "name": "a", "value": { "type": "fixnum", "value": 1 } }
//! ```
//!
//! Every node is an expression. Statements that produce no useful value
//! (`while`, `def` bodies registered elsewhere) evaluate to `nil` or to the
//! method name, the way the source language does.

use serde::{Deserialize, Serialize};

/// An optional method parameter with its default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionalParam {
    /// Parameter name
    pub name: String,
    /// Evaluated when the caller omits the argument
    pub default: Node,
}

/// A syntax tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    /// Integer literal
    Fixnum {
        /// Value
        value: i64,
    },
    /// Float literal
    Float {
        /// Value
        value: f64,
    },
    /// String literal
    Str {
        /// Value
        value: String,
    },
    /// `nil`
    Nil,
    /// `true`
    True,
    /// `false`
    False,
    /// Array literal
    Array {
        /// Elements, in order
        #[serde(default)]
        elements: Vec<Node>,
    },

    /// `name = value`
    LocalAsgn {
        /// Local name
        name: String,
        /// Assigned value
        value: Box<Node>,
    },
    /// Local variable read
    LocalVar {
        /// Local name
        name: String,
    },
    /// `self`
    #[serde(rename = "self")]
    SelfRef,
    /// Method call, with an optional literal block
    Call {
        /// Receiver; `None` calls on `self`
        #[serde(default)]
        receiver: Option<Box<Node>>,
        /// Method name
        name: String,
        /// Positional arguments
        #[serde(default)]
        args: Vec<Node>,
        /// Literal block, an [`Node::Iter`]
        #[serde(default)]
        block: Option<Box<Node>>,
    },

    /// `if` / `unless` / ternary
    If {
        /// Condition
        condition: Box<Node>,
        /// Taken when the condition is truthy
        #[serde(default)]
        then_body: Option<Box<Node>>,
        /// Taken otherwise
        #[serde(default)]
        else_body: Option<Box<Node>>,
    },
    /// `while` loop
    While {
        /// Loop condition
        condition: Box<Node>,
        /// Loop body
        body: Box<Node>,
    },
    /// `begin ... rescue ... ensure ... end`
    Begin {
        /// Protected body
        body: Box<Node>,
        /// Rescue clause
        #[serde(default)]
        rescue: Option<Box<Node>>,
        /// Local bound to the exception in the rescue clause
        #[serde(default)]
        exception_var: Option<String>,
        /// Ensure clause
        #[serde(default)]
        ensure: Option<Box<Node>>,
    },
    /// `return`
    Return {
        /// Returned value; `nil` when absent
        #[serde(default)]
        value: Option<Box<Node>>,
    },
    /// `break`
    Break {
        /// Loop or block result; `nil` when absent
        #[serde(default)]
        value: Option<Box<Node>>,
    },
    /// Statement sequence
    Block {
        /// Statements; the last one is the value
        #[serde(default)]
        statements: Vec<Node>,
    },

    /// Method definition
    Def {
        /// Method name
        name: String,
        /// Required parameters
        #[serde(default)]
        params: Vec<String>,
        /// Optional parameters, after the required ones
        #[serde(default)]
        optional: Vec<OptionalParam>,
        /// `&block` parameter
        #[serde(default)]
        block_param: Option<String>,
        /// Method body
        body: Box<Node>,
    },
    /// Block literal (`do |x| ... end`, `{ |x| ... }`)
    Iter {
        /// Block parameters
        #[serde(default)]
        params: Vec<String>,
        /// Block body
        body: Box<Node>,
    },
    /// `END { ... }`
    EndBlock {
        /// Block body
        body: Box<Node>,
    },
    /// Marks the source line of the wrapped node
    Newline {
        /// 1-based source line
        line: u32,
        /// The node on that line
        node: Box<Node>,
    },
}

impl Node {
    /// Shorthand for a call with a receiver and no block.
    #[must_use]
    pub fn call(receiver: Node, name: impl Into<String>, args: Vec<Node>) -> Node {
        Node::Call {
            receiver: Some(Box::new(receiver)),
            name: name.into(),
            args,
            block: None,
        }
    }

    /// Shorthand for a local read.
    #[must_use]
    pub fn var(name: impl Into<String>) -> Node {
        Node::LocalVar { name: name.into() }
    }

    /// Shorthand for a local assignment.
    #[must_use]
    pub fn assign(name: impl Into<String>, value: Node) -> Node {
        Node::LocalAsgn {
            name: name.into(),
            value: Box::new(value),
        }
    }

    /// Shorthand for a fixnum literal.
    #[must_use]
    pub fn int(value: i64) -> Node {
        Node::Fixnum { value }
    }

    /// Shorthand for a statement sequence.
    #[must_use]
    pub fn seq(statements: Vec<Node>) -> Node {
        Node::Block { statements }
    }
}
