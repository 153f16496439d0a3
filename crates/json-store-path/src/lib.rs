//! Store path utilities.
//!
//! A store path addresses a value inside a JSON document using dotted keys,
//! numeric indices and id-selectors:
//!
//! - `key`, `key.key`: object members,
//! - `key[3]`: array element by position,
//! - `key[id=abc]`: the first array element whose `id` field equals `abc`.
//!
//! Segments chain arbitrarily (`groups[id=7].members[0].name`) and a path
//! may begin with a bracket segment when the document itself is an array.
//!
//! Id-selector lookups go through an [`IdIndex`], a per-array cache from id
//! value to position. Cached positions are verified against the live array
//! and the whole index for that array is rebuilt when verification fails,
//! so lookups stay correct after the array is sorted or spliced.
//!
//! # Example
//!
//! ```
//! use json_store_path::{resolve, set_by_path, IdIndex, Write};
//! use serde_json::json;
//!
//! let mut doc = json!({"todos": [{"id": 1, "done": false}, {"id": 2, "done": false}]});
//! let mut ids = IdIndex::new();
//!
//! let changed = set_by_path(&mut doc, "todos[id=2].done", Write::Set(json!(true)), &mut ids).unwrap();
//! assert!(changed);
//! assert_eq!(resolve(&doc, "todos[1].done", &mut ids), Some(&json!(true)));
//!
//! // Writing the same value again is a no-op.
//! let changed = set_by_path(&mut doc, "todos[id=2].done", Write::Set(json!(true)), &mut ids).unwrap();
//! assert!(!changed);
//! ```

use thiserror::Error;

pub mod get;
pub mod id_index;
pub mod parse;
pub mod set;
pub mod types;
pub mod util;

pub use get::{get, resolve, resolve_mut};
pub use id_index::{id_string, IdIndex, AUTO_ID};
pub use parse::{format_path, parse_path, validate_path};
pub use set::set_by_path;
pub use types::{Segment, Write};
pub use util::{is_path_prefix, join_path, parent_path, paths_overlap, split_last};

/// Maximum accepted path length in bytes.
pub const MAX_PATH_LENGTH: usize = 1024;

/// How far past the end of an array an index write may land. The gap is
/// filled with `null`.
pub const MAX_INDEX_GAP: usize = 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("unexpected character {ch:?} at {pos}")]
    UnexpectedChar { pos: usize, ch: char },
    #[error("unexpected end of path")]
    UnexpectedEnd,
    #[error("empty segment at {0}")]
    EmptySegment(usize),
    #[error("invalid array index {0:?}")]
    InvalidIndex(String),
    #[error("invalid id-selector {0:?}")]
    InvalidSelector(String),
    #[error("path too long")]
    PathTooLong,
    #[error("cannot write to the root path")]
    EmptyPath,
    #[error("{0} does not exist")]
    MissingIntermediate(String),
    #[error("{0} is not an object or array")]
    NotContainer(String),
    #[error("index {index} is too far past the end of {path} (length {len})")]
    IndexOutOfRange { path: String, index: usize, len: usize },
    #[error("value written to {0} does not carry the selected id")]
    SelectorMismatch(String),
}
