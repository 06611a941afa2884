//! Operands: the immutable values instructions consume.
//!
//! An [`Operand`] is either a literal constant, a [`Variable`], a jump
//! [`Label`], a symbolic method address ([`MethAddr`]) or a reference to a
//! nested closure scope. Operands are never mutated once built; passes replace
//! them wholesale. Equal operands are interchangeable, which is what lets the
//! local optimizer key its value map on them.
//!
//! # Simplification
//!
//! [`Operand::simplify`] looks an operand up in a [`ValueMap`] and returns the
//! cheapest equivalent it can prove. The function is pure and idempotent:
//! applying it to its own output changes nothing.

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::ir::ScopeId;

/// Map from a variable to the cheapest operand known to hold the same value.
pub type ValueMap = FxHashMap<Variable, Operand>;

/// Statically-known core type of a value.
///
/// Used as the receiver-type hint on method addresses, by the type hint
/// analysis, and by the method resolver to pick a core implementation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
pub enum ValueKind {
    /// Machine-sized integer
    Fixnum,
    /// Double precision float
    Float,
    /// String
    Str,
    /// The nil singleton
    Nil,
    /// `true` or `false`
    Boolean,
    /// Array
    Array,
}

/// A variable slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Variable {
    /// A named local. `depth` counts lexical scopes outward: a depth greater
    /// than zero means the variable is captured from an enclosing scope.
    Local {
        /// Source name
        name: String,
        /// Number of scopes between the use and the defining scope
        depth: u32,
    },
    /// A compiler temporary, numbered per scope.
    Temp(u32),
    /// The receiver of the current scope.
    SelfValue,
    /// A callee local renamed into a host scope by inlining.
    Inlined {
        /// Per-inlining-site prefix, unique within the host scope
        prefix: u32,
        /// Original callee name
        name: String,
    },
}

impl Variable {
    /// Creates a local at depth 0.
    #[must_use]
    pub fn local(name: impl Into<String>) -> Self {
        Variable::Local {
            name: name.into(),
            depth: 0,
        }
    }

    /// Creates a local captured from `depth` scopes out.
    #[must_use]
    pub fn captured(name: impl Into<String>, depth: u32) -> Self {
        Variable::Local {
            name: name.into(),
            depth,
        }
    }

    /// Returns `true` for named locals of any depth.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Variable::Local { .. })
    }

    /// Returns the lexical depth of a local, `None` for other variables.
    #[must_use]
    pub fn depth(&self) -> Option<u32> {
        match self {
            Variable::Local { depth, .. } => Some(*depth),
            _ => None,
        }
    }

    /// Returns `true` for a local that lives in an enclosing scope.
    #[must_use]
    pub fn is_captured_from_parent(&self) -> bool {
        self.depth().is_some_and(|d| d > 0)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::Local { name, depth: 0 } => write!(f, "{name}"),
            Variable::Local { name, depth } => write!(f, "{name}({depth})"),
            Variable::Temp(n) => write!(f, "%v_{n}"),
            Variable::SelfValue => write!(f, "%self"),
            Variable::Inlined { prefix, name } => write!(f, "%i{prefix}_{name}"),
        }
    }
}

/// A jump target, unique within its scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(String);

impl Label {
    /// Creates a label with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Label(name.into())
    }

    /// The label's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Symbolic method name with an optional receiver type hint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethAddr {
    /// Method name
    pub name: String,
    /// Statically-known receiver type, when the optimizer could prove one
    pub receiver_hint: Option<ValueKind>,
}

impl MethAddr {
    /// Creates an address without a receiver hint.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        MethAddr {
            name: name.into(),
            receiver_hint: None,
        }
    }

    /// Returns a copy carrying `hint` as the receiver type.
    #[must_use]
    pub fn with_hint(&self, hint: ValueKind) -> Self {
        MethAddr {
            name: self.name.clone(),
            receiver_hint: Some(hint),
        }
    }
}

impl fmt::Display for MethAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.receiver_hint {
            Some(kind) => write!(f, "{kind}#{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// An immutable value reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operand {
    /// Integer literal
    Fixnum(i64),
    /// Float literal; compared and hashed by bit pattern
    Float(f64),
    /// String literal
    Str(String),
    /// `nil`
    Nil,
    /// `true` / `false`
    Boolean(bool),
    /// Array literal; constant only if every element is
    Array(Vec<Operand>),
    /// Variable reference
    Variable(Variable),
    /// Jump target
    Label(Label),
    /// Method address
    MethAddr(MethAddr),
    /// Reference to a nested closure scope
    WrappedClosure(ScopeId),
}

impl PartialEq for Operand {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Operand::Fixnum(a), Operand::Fixnum(b)) => a == b,
            (Operand::Float(a), Operand::Float(b)) => a.to_bits() == b.to_bits(),
            (Operand::Str(a), Operand::Str(b)) => a == b,
            (Operand::Nil, Operand::Nil) => true,
            (Operand::Boolean(a), Operand::Boolean(b)) => a == b,
            (Operand::Array(a), Operand::Array(b)) => a == b,
            (Operand::Variable(a), Operand::Variable(b)) => a == b,
            (Operand::Label(a), Operand::Label(b)) => a == b,
            (Operand::MethAddr(a), Operand::MethAddr(b)) => a == b,
            (Operand::WrappedClosure(a), Operand::WrappedClosure(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Operand {}

impl Hash for Operand {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Operand::Fixnum(v) => v.hash(state),
            Operand::Float(v) => v.to_bits().hash(state),
            Operand::Str(v) => v.hash(state),
            Operand::Nil => {}
            Operand::Boolean(v) => v.hash(state),
            Operand::Array(v) => v.hash(state),
            Operand::Variable(v) => v.hash(state),
            Operand::Label(v) => v.hash(state),
            Operand::MethAddr(v) => v.hash(state),
            Operand::WrappedClosure(v) => v.hash(state),
        }
    }
}

impl From<Variable> for Operand {
    fn from(var: Variable) -> Self {
        Operand::Variable(var)
    }
}

impl Operand {
    /// Returns `true` for literal values that can never change at run time.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        match self {
            Operand::Fixnum(_)
            | Operand::Float(_)
            | Operand::Str(_)
            | Operand::Nil
            | Operand::Boolean(_) => true,
            Operand::Array(elements) => elements.iter().all(Operand::is_constant),
            _ => false,
        }
    }

    /// Returns the variable if this operand is one.
    #[must_use]
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Operand::Variable(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the core type of a constant operand.
    #[must_use]
    pub fn value_kind(&self) -> Option<ValueKind> {
        match self {
            Operand::Fixnum(_) => Some(ValueKind::Fixnum),
            Operand::Float(_) => Some(ValueKind::Float),
            Operand::Str(_) => Some(ValueKind::Str),
            Operand::Nil => Some(ValueKind::Nil),
            Operand::Boolean(_) => Some(ValueKind::Boolean),
            Operand::Array(_) => Some(ValueKind::Array),
            _ => None,
        }
    }

    /// Appends every variable referenced by this operand, including array elements.
    pub fn collect_variables(&self, out: &mut Vec<Variable>) {
        match self {
            Operand::Variable(v) => out.push(v.clone()),
            Operand::Array(elements) => {
                for e in elements {
                    e.collect_variables(out);
                }
            }
            _ => {}
        }
    }

    /// Returns the cheapest operand known to be equivalent under `map`.
    ///
    /// With `force == false` a variable is only replaced by a constant. With
    /// `force == true` variable-to-variable copies are chased as well. Chains
    /// are followed to their end; a cyclic chain leaves the operand unchanged.
    /// Arrays are simplified element-wise, and an element naming a variable
    /// already on the chain being resolved is kept as it is.
    #[must_use]
    pub fn simplify(&self, map: &ValueMap, force: bool) -> Operand {
        self.simplify_along(map, force, &mut Vec::new())
    }

    fn simplify_along<'a>(
        &'a self,
        map: &'a ValueMap,
        force: bool,
        chain: &mut Vec<&'a Variable>,
    ) -> Operand {
        match self {
            Operand::Variable(start) => {
                if chain.contains(&start) {
                    return self.clone();
                }
                let depth = chain.len();
                chain.push(start);
                let mut current = start;
                let simplified = loop {
                    let Some(next) = map.get(current) else {
                        break Operand::Variable(current.clone());
                    };
                    match next {
                        Operand::Variable(v) if force => {
                            if chain.contains(&v) {
                                break self.clone();
                            }
                            chain.push(v);
                            current = v;
                        }
                        Operand::Array(_) if force || next.is_constant() => {
                            break next.simplify_along(map, force, chain);
                        }
                        _ if next.is_constant() => break next.clone(),
                        _ => break Operand::Variable(current.clone()),
                    }
                };
                chain.truncate(depth);
                simplified
            }
            Operand::Array(elements) => Operand::Array(
                elements
                    .iter()
                    .map(|e| e.simplify_along(map, force, chain))
                    .collect(),
            ),
            _ => self.clone(),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Fixnum(v) => write!(f, "{v}"),
            Operand::Float(v) => write!(f, "{v:?}"),
            Operand::Str(v) => write!(f, "{v:?}"),
            Operand::Nil => f.write_str("nil"),
            Operand::Boolean(v) => write!(f, "{v}"),
            Operand::Array(elements) => {
                f.write_str("[")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{e}")?;
                }
                f.write_str("]")
            }
            Operand::Variable(v) => write!(f, "{v}"),
            Operand::Label(l) => write!(f, "{l}"),
            Operand::MethAddr(m) => write!(f, "'{m}'"),
            Operand::WrappedClosure(id) => write!(f, "closure<{id}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_of(entries: &[(Variable, Operand)]) -> ValueMap {
        entries.iter().cloned().collect()
    }

    #[test]
    fn test_float_equality_is_bitwise() {
        assert_eq!(Operand::Float(1.5), Operand::Float(1.5));
        assert_ne!(Operand::Float(0.0), Operand::Float(-0.0));
        assert_eq!(Operand::Float(f64::NAN), Operand::Float(f64::NAN));
    }

    #[test]
    fn test_simplify_constant_only_without_force() {
        let a = Variable::local("a");
        let b = Variable::local("b");
        let map = map_of(&[
            (a.clone(), Operand::Variable(b.clone())),
            (b.clone(), Operand::Fixnum(3)),
        ]);

        let op = Operand::Variable(a.clone());
        assert_eq!(op.simplify(&map, false), op);
        assert_eq!(op.simplify(&map, true), Operand::Fixnum(3));
        assert_eq!(
            Operand::Variable(b).simplify(&map, false),
            Operand::Fixnum(3)
        );
    }

    #[test]
    fn test_simplify_chases_copy_chain() {
        let vars: Vec<Variable> = (0..4).map(Variable::Temp).collect();
        let map = map_of(&[
            (vars[0].clone(), Operand::Variable(vars[1].clone())),
            (vars[1].clone(), Operand::Variable(vars[2].clone())),
        ]);
        let simplified = Operand::Variable(vars[0].clone()).simplify(&map, true);
        assert_eq!(simplified, Operand::Variable(vars[2].clone()));
    }

    #[test]
    fn test_simplify_cycle_is_left_alone() {
        let a = Variable::Temp(0);
        let b = Variable::Temp(1);
        let map = map_of(&[
            (a.clone(), Operand::Variable(b.clone())),
            (b.clone(), Operand::Variable(a.clone())),
        ]);
        let op = Operand::Variable(a);
        assert_eq!(op.simplify(&map, true), op);
    }

    #[test]
    fn test_simplify_self_referencing_array_terminates() {
        let a = Variable::local("a");
        let b = Variable::local("b");
        let own = map_of(&[(a.clone(), Operand::Array(vec![Operand::Variable(a.clone())]))]);
        let op = Operand::Variable(a.clone());
        let wrapped = Operand::Array(vec![op.clone()]);
        assert_eq!(op.simplify(&own, true), wrapped);
        assert_eq!(op.simplify(&own, false), op);
        assert_eq!(wrapped.simplify(&own, true), Operand::Array(vec![wrapped.clone()]));

        let mutual = map_of(&[
            (a.clone(), Operand::Array(vec![Operand::Variable(b.clone())])),
            (b.clone(), Operand::Variable(a.clone())),
        ]);
        assert_eq!(
            op.simplify(&mutual, true),
            Operand::Array(vec![Operand::Variable(b)])
        );
    }

    #[test]
    fn test_simplify_is_idempotent() {
        let t: Vec<Variable> = (0..5).map(Variable::Temp).collect();
        let map = map_of(&[
            (t[0].clone(), Operand::Variable(t[1].clone())),
            (t[1].clone(), Operand::Fixnum(7)),
            (t[2].clone(), Operand::Variable(t[3].clone())),
            (t[3].clone(), Operand::Variable(t[2].clone())),
            (
                t[4].clone(),
                Operand::Array(vec![Operand::Variable(t[1].clone()), Operand::Nil]),
            ),
        ]);

        let candidates = vec![
            Operand::Variable(t[0].clone()),
            Operand::Variable(t[2].clone()),
            Operand::Variable(t[4].clone()),
            Operand::Array(vec![
                Operand::Variable(t[0].clone()),
                Operand::Variable(t[3].clone()),
            ]),
            Operand::Str("x".into()),
        ];
        for op in candidates {
            for force in [false, true] {
                let once = op.simplify(&map, force);
                assert_eq!(once.simplify(&map, force), once, "{op} force={force}");
            }
        }
    }

    #[test]
    fn test_constant_array_detection() {
        let constant = Operand::Array(vec![Operand::Fixnum(1), Operand::Nil]);
        let variable = Operand::Array(vec![Operand::Variable(Variable::Temp(0))]);
        assert!(constant.is_constant());
        assert!(!variable.is_constant());

        let mut vars = Vec::new();
        variable.collect_variables(&mut vars);
        assert_eq!(vars, vec![Variable::Temp(0)]);
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(Variable::Temp(3).to_string(), "%v_3");
        assert_eq!(Variable::captured("x", 1).to_string(), "x(1)");
        assert_eq!(
            MethAddr::new("+").with_hint(ValueKind::Fixnum).to_string(),
            "Fixnum#+"
        );
        assert_eq!(Operand::Str("a".into()).to_string(), "\"a\"");
    }
}
