//! Type definitions for store paths.

use std::fmt;

use serde_json::Value;

/// One step of a store path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Object member, written `key` (dot-joined).
    Key(String),
    /// Array element by position, written `[n]`.
    Index(usize),
    /// First array element whose `prop` field equals `value`, written
    /// `[prop=value]`.
    Select { prop: String, value: String },
}

impl Segment {
    pub fn key(key: impl Into<String>) -> Self {
        Segment::Key(key.into())
    }

    pub fn select(prop: impl Into<String>, value: impl Into<String>) -> Self {
        Segment::Select {
            prop: prop.into(),
            value: value.into(),
        }
    }

    /// Bracket segments attach to the previous segment without a dot.
    pub fn is_bracket(&self) -> bool {
        !matches!(self, Segment::Key(_))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => f.write_str(key),
            Segment::Index(idx) => write!(f, "[{idx}]"),
            Segment::Select { prop, value } => write!(f, "[{prop}={value}]"),
        }
    }
}

/// A write performed by [`set_by_path`](crate::set_by_path).
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Set(Value),
    Delete,
}

impl From<Value> for Write {
    fn from(value: Value) -> Self {
        Write::Set(value)
    }
}
