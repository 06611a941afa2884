//! Flat lattice values with the TOP, BOTTOM and ANY sentinels.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A value in a flat lattice over `T`.
///
/// `Top` is "nothing known yet", `Bottom` is "conflicting facts" and `Any`
/// is "irrelevant on this path". `Any` is the identity for known values, so a
/// path that does not care never spoils a path that does.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LatticeValue<T> {
    /// No information yet
    #[default]
    Top,
    /// Conflicting information
    Bottom,
    /// Any value is acceptable
    Any,
    /// A single known value
    Value(T),
}

impl<T: Clone + PartialEq> LatticeValue<T> {
    /// Meet of two values.
    ///
    /// | meet        | Top | Any | Value(b)            | Bottom |
    /// |-------------|-----|-----|---------------------|--------|
    /// | Top         | Top | Any | Value(b)            | Bottom |
    /// | Any         | Any | Any | Value(b)            | Bottom |
    /// | Value(a)    | a   | a   | a if a == b, else ⊥ | Bottom |
    /// | Bottom      | ⊥   | ⊥   | ⊥                   | Bottom |
    #[must_use]
    pub fn meet(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Bottom, _) | (_, Self::Bottom) => Self::Bottom,
            (Self::Top, x) | (x, Self::Top) => x.clone(),
            (Self::Any, x) | (x, Self::Any) => x.clone(),
            (Self::Value(a), Self::Value(b)) if a == b => Self::Value(a.clone()),
            _ => Self::Bottom,
        }
    }

    /// The known value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Returns `true` for `Bottom`.
    #[must_use]
    pub fn is_bottom(&self) -> bool {
        matches!(self, Self::Bottom)
    }

    /// Returns `true` for `Top`.
    #[must_use]
    pub fn is_top(&self) -> bool {
        matches!(self, Self::Top)
    }
}

impl<T: fmt::Display> fmt::Display for LatticeValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Top => f.write_str("TOP"),
            Self::Bottom => f.write_str("BOTTOM"),
            Self::Any => f.write_str("ANY"),
            Self::Value(v) => write!(f, "{v}"),
        }
    }
}
