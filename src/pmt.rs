//! Polymorphic values carried by tags and messages.

#![forbid(unsafe_code)]

use std::fmt;

/// A polymorphic message value: tag keys, tag values, source ids and
/// message payloads are all expressed with it.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Pmt {
    /// The empty value.
    Nil,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A double-precision float.
    Double(f64),
    /// An interned-style name, the usual type for tag keys.
    Symbol(String),
    /// Opaque bytes.
    Blob(Vec<u8>),
    /// An ordered pair.
    Pair(Box<Pmt>, Box<Pmt>),
}

impl Pmt {
    /// Build a symbol.
    pub fn symbol(name: impl Into<String>) -> Self {
        Pmt::Symbol(name.into())
    }

    /// Build a pair.
    pub fn pair(car: Pmt, cdr: Pmt) -> Self {
        Pmt::Pair(Box::new(car), Box::new(cdr))
    }

    /// The symbol name, if this is a symbol.
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Pmt::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Pmt::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Pmt::Double(v) => Some(*v),
            Pmt::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Pmt::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Pmt::Nil)
    }
}

impl Default for Pmt {
    fn default() -> Self {
        Pmt::Nil
    }
}

impl From<bool> for Pmt {
    fn from(v: bool) -> Self {
        Pmt::Bool(v)
    }
}

impl From<i64> for Pmt {
    fn from(v: i64) -> Self {
        Pmt::Int(v)
    }
}

impl From<f64> for Pmt {
    fn from(v: f64) -> Self {
        Pmt::Double(v)
    }
}

impl From<&str> for Pmt {
    fn from(v: &str) -> Self {
        Pmt::Symbol(v.to_string())
    }
}

impl From<Vec<u8>> for Pmt {
    fn from(v: Vec<u8>) -> Self {
        Pmt::Blob(v)
    }
}

impl fmt::Display for Pmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pmt::Nil => write!(f, "()"),
            Pmt::Bool(v) => write!(f, "{}", if *v { "#t" } else { "#f" }),
            Pmt::Int(v) => write!(f, "{}", v),
            Pmt::Double(v) => write!(f, "{}", v),
            Pmt::Symbol(s) => write!(f, "{}", s),
            Pmt::Blob(b) => write!(f, "#<blob {} bytes>", b.len()),
            Pmt::Pair(car, cdr) => write!(f, "({} . {})", car, cdr),
        }
    }
}
