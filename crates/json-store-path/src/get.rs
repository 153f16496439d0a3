use std::fmt::Write as _;

use serde_json::Value;

use crate::id_index::{id_string, IdIndex};
use crate::parse::parse_path;
use crate::types::Segment;

/// Resolve a path against a document, using `ids` for id-selectors.
///
/// Lenient: malformed paths and missing values both yield `None`.
///
/// # Example
///
/// ```
/// use json_store_path::{resolve, IdIndex};
/// use serde_json::json;
///
/// let doc = json!([{"id": 1}, {"id": 2, "tags": ["x"]}]);
/// let mut ids = IdIndex::new();
/// assert_eq!(resolve(&doc, "[id=2].tags[0]", &mut ids), Some(&json!("x")));
/// assert_eq!(resolve(&doc, "[id=3]", &mut ids), None);
/// assert_eq!(resolve(&doc, "[id=", &mut ids), None);
/// ```
pub fn resolve<'a>(root: &'a Value, path: &str, ids: &mut IdIndex) -> Option<&'a Value> {
    let segments = parse_path(path).ok()?;
    resolve_segments(root, &segments, ids)
}

pub fn resolve_segments<'a>(
    root: &'a Value,
    segments: &[Segment],
    ids: &mut IdIndex,
) -> Option<&'a Value> {
    let mut current = root;
    let mut concrete = String::new();
    for segment in segments {
        current = match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => {
                push_key(&mut concrete, key);
                map.get(key)?
            }
            (Segment::Index(idx), Value::Array(arr)) => {
                push_index(&mut concrete, *idx);
                arr.get(*idx)?
            }
            (Segment::Select { prop, value }, Value::Array(arr)) => {
                let idx = ids.lookup(&concrete, prop, value, arr)?;
                push_index(&mut concrete, idx);
                arr.get(idx)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Resolve a path to a mutable reference.
///
/// Id-selectors on [`AUTO_ID`](crate::AUTO_ID) assign missing generated ids
/// along the way.
pub fn resolve_mut<'a>(root: &'a mut Value, path: &str, ids: &mut IdIndex) -> Option<&'a mut Value> {
    let segments = parse_path(path).ok()?;
    let mut current = root;
    let mut concrete = String::new();
    for segment in &segments {
        current = match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => {
                push_key(&mut concrete, key);
                map.get_mut(key)?
            }
            (Segment::Index(idx), Value::Array(arr)) => {
                push_index(&mut concrete, *idx);
                arr.get_mut(*idx)?
            }
            (Segment::Select { prop, value }, Value::Array(arr)) => {
                let idx = ids.lookup_mut(&concrete, prop, value, arr)?;
                push_index(&mut concrete, idx);
                arr.get_mut(idx)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Resolve a path without an id cache; id-selectors scan linearly.
pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = parse_path(path).ok()?;
    let mut current = root;
    for segment in &segments {
        current = match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => map.get(key)?,
            (Segment::Index(idx), Value::Array(arr)) => arr.get(*idx)?,
            (Segment::Select { prop, value }, Value::Array(arr)) => arr.iter().find(|item| {
                item.get(prop)
                    .and_then(id_string)
                    .is_some_and(|id| id == *value)
            })?,
            _ => return None,
        };
    }
    Some(current)
}

pub(crate) fn push_key(concrete: &mut String, key: &str) {
    if !concrete.is_empty() {
        concrete.push('.');
    }
    concrete.push_str(key);
}

pub(crate) fn push_index(concrete: &mut String, idx: usize) {
    let _ = write!(concrete, "[{idx}]");
}
