// hancho
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Dynamically-typed value used throughout `Config`, macro expansion and the
//! build-script bridge.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::config::Config;

/// A dynamically-typed value.
///
/// `Config` is its own variant so a config can be nested inside another
/// config's fields (a task referencing a sibling task's config, say).
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    Config(Arc<Config>),
}

impl Value {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(l) => Some(l.as_slice()),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Config(_) => "config",
        }
    }

    /// True if this value contains at least one `{...}` macro span anywhere
    /// within its (possibly nested) string contents.
    #[must_use]
    pub fn has_macro(&self) -> bool {
        match self {
            Self::Str(s) => s.contains('{') && s.contains('}'),
            Self::List(items) => items.iter().any(Self::has_macro),
            Self::Map(map) => map.values().any(Self::has_macro),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, ""),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::List(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "{}", parts.join(" "))
            }
            Self::Map(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "{}", parts.join(" "))
            }
            Self::Config(_) => write!(f, "<config>"),
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v.into())
                }
            }
        )+
    };
}

impl_from! {
    bool => Bool,
    i64 => Int,
    f64 => Float,
    String => Str,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl From<Arc<Config>> for Value {
    fn from(c: Arc<Config>) -> Self {
        Self::Config(c)
    }
}

/// Ports the original engine's coercion applied to CLI overrides and
/// environment-derived strings: try int, then float, else keep as a string.
#[must_use]
pub fn maybe_as_number(s: &str) -> Value {
    if let Ok(i) = s.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return Value::Float(f);
    }
    Value::Str(s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maybe_as_number_tries_int_then_float_then_string() {
        assert!(matches!(maybe_as_number("42"), Value::Int(42)));
        assert!(matches!(maybe_as_number("3.5"), Value::Float(f) if (f - 3.5).abs() < f64::EPSILON));
        assert!(matches!(maybe_as_number("hi"), Value::Str(s) if s == "hi"));
    }

    #[test]
    fn has_macro_detects_nested_braces() {
        assert!(Value::from("{foo}").has_macro());
        assert!(!Value::from("foo").has_macro());
        assert!(Value::List(vec![Value::from("{x}")]).has_macro());
    }
}
