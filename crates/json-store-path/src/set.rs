use serde_json::{Map, Value};

use crate::get::{push_index, push_key, resolve_mut};
use crate::id_index::{id_string, IdIndex};
use crate::parse::parse_path;
use crate::types::{Segment, Write};
use crate::{PathError, MAX_INDEX_GAP};

/// Write (or delete) the value at `path`.
///
/// Returns `Ok(true)` when the document changed and `Ok(false)` when the
/// write was a no-op: the new value equals the existing one, or the target
/// of a delete does not exist.
///
/// Missing intermediate containers are created for at most one level per
/// write: an object for a key segment, or an object seeded with
/// `prop: value` appended for an unmatched id-selector. Numeric indices are
/// never created as intermediates. A write that fails leaves the document
/// as it was.
///
/// A value written through a final `[prop=value]` segment must be an
/// object; it gets `prop: value` when it lacks the field, so the same path
/// reads it back.
///
/// # Errors
///
/// - malformed path syntax,
/// - the empty (root) path,
/// - a second missing intermediate level,
/// - stepping into a scalar while setting,
/// - an index more than [`MAX_INDEX_GAP`] past the end of its array,
/// - a selector write whose value is not an object or carries another id.
///
/// # Example
///
/// ```
/// use json_store_path::{set_by_path, IdIndex, PathError, Write};
/// use serde_json::json;
///
/// let mut doc = json!({"app": {}});
/// let mut ids = IdIndex::new();
///
/// // One missing level is created implicitly.
/// assert!(set_by_path(&mut doc, "app.user.name", Write::Set(json!("ada")), &mut ids).unwrap());
/// assert_eq!(doc, json!({"app": {"user": {"name": "ada"}}}));
///
/// // Two are not, and nothing is left behind.
/// let err = set_by_path(&mut doc, "app.a.b.c", Write::Set(json!(1)), &mut ids).unwrap_err();
/// assert_eq!(err, PathError::MissingIntermediate("app.a.b".into()));
/// assert_eq!(doc, json!({"app": {"user": {"name": "ada"}}}));
/// ```
pub fn set_by_path(
    root: &mut Value,
    path: &str,
    write: Write,
    ids: &mut IdIndex,
) -> Result<bool, PathError> {
    let segments = parse_path(path)?;
    let Some((last, parents)) = segments.split_last() else {
        return Err(PathError::EmptyPath);
    };

    let mut budget = CreateBudget {
        allowed: matches!(write, Write::Set(_)),
        created: None,
    };
    let result = write_at(root, parents, last, write, ids, &mut budget);
    if result.is_err() {
        if let Some(created) = budget.created.take() {
            created.undo(root, ids);
        }
    }
    result
}

fn write_at(
    root: &mut Value,
    parents: &[Segment],
    last: &Segment,
    write: Write,
    ids: &mut IdIndex,
    budget: &mut CreateBudget,
) -> Result<bool, PathError> {
    let mut current = root;
    let mut concrete = String::new();
    for segment in parents {
        current = match descend(current, segment, &mut concrete, ids, budget)? {
            Some(next) => next,
            None => return Ok(false),
        };
    }
    apply(current, last, &concrete, write, ids)
}

/// The one container a write created on its way down.
enum Created {
    Key { parent: String, key: String },
    Element { array: String },
}

impl Created {
    fn undo(self, root: &mut Value, ids: &mut IdIndex) {
        match self {
            Created::Key { parent, key } => {
                if let Some(Value::Object(map)) = resolve_mut(root, &parent, ids) {
                    map.remove(&key);
                }
            }
            Created::Element { array } => {
                if let Some(Value::Array(arr)) = resolve_mut(root, &array, ids) {
                    arr.pop();
                }
            }
        }
    }
}

struct CreateBudget {
    allowed: bool,
    created: Option<Created>,
}

impl CreateBudget {
    fn spend(
        &mut self,
        missing: impl FnOnce() -> String,
        created: impl FnOnce() -> Created,
    ) -> Result<bool, PathError> {
        if !self.allowed {
            return Ok(false);
        }
        if self.created.is_some() {
            return Err(PathError::MissingIntermediate(missing()));
        }
        self.created = Some(created());
        Ok(true)
    }
}

fn descend<'a>(
    current: &'a mut Value,
    segment: &Segment,
    concrete: &mut String,
    ids: &mut IdIndex,
    budget: &mut CreateBudget,
) -> Result<Option<&'a mut Value>, PathError> {
    match (segment, current) {
        (Segment::Key(key), Value::Object(map)) => {
            let parent_len = concrete.len();
            push_key(concrete, key);
            if !map.contains_key(key) {
                let created = budget.spend(
                    || concrete.clone(),
                    || Created::Key {
                        parent: concrete[..parent_len].to_string(),
                        key: key.clone(),
                    },
                )?;
                if !created {
                    return Ok(None);
                }
                map.insert(key.clone(), Value::Object(Map::new()));
            }
            Ok(map.get_mut(key))
        }
        (Segment::Index(idx), Value::Array(arr)) => {
            push_index(concrete, *idx);
            match arr.get_mut(*idx) {
                Some(next) => Ok(Some(next)),
                None if budget.allowed => Err(PathError::MissingIntermediate(concrete.clone())),
                None => Ok(None),
            }
        }
        (Segment::Select { prop, value }, Value::Array(arr)) => {
            let idx = match ids.lookup_mut(concrete.as_str(), prop, value, arr) {
                Some(idx) => idx,
                None => {
                    let created = budget.spend(
                        || format!("{concrete}[{prop}={value}]"),
                        || Created::Element {
                            array: concrete.clone(),
                        },
                    )?;
                    if !created {
                        return Ok(None);
                    }
                    let mut seed = Map::new();
                    seed.insert(prop.clone(), Value::String(value.clone()));
                    arr.push(Value::Object(seed));
                    arr.len() - 1
                }
            };
            push_index(concrete, idx);
            Ok(arr.get_mut(idx))
        }
        _ if !budget.allowed => Ok(None),
        _ => Err(PathError::NotContainer(display_path(concrete))),
    }
}

fn apply(
    current: &mut Value,
    last: &Segment,
    concrete: &str,
    write: Write,
    ids: &mut IdIndex,
) -> Result<bool, PathError> {
    match (last, current) {
        (Segment::Key(key), Value::Object(map)) => {
            let changed = match write {
                Write::Set(value) => {
                    if map.get(key) == Some(&value) {
                        return Ok(false);
                    }
                    map.insert(key.clone(), value);
                    true
                }
                Write::Delete => map.remove(key).is_some(),
            };
            if changed {
                let mut target = concrete.to_string();
                push_key(&mut target, key);
                ids.invalidate(&target);
            }
            Ok(changed)
        }
        (Segment::Index(idx), Value::Array(arr)) => {
            let idx = *idx;
            match write {
                Write::Set(value) => {
                    if let Some(existing) = arr.get_mut(idx) {
                        let changed = replace_if_changed(existing, value);
                        if changed {
                            ids.invalidate(&element_path(concrete, idx));
                        }
                        return Ok(changed);
                    }
                    let len = arr.len();
                    if idx - len > MAX_INDEX_GAP {
                        return Err(PathError::IndexOutOfRange {
                            path: display_path(concrete),
                            index: idx,
                            len,
                        });
                    }
                    arr.resize(idx, Value::Null);
                    arr.push(value);
                    Ok(true)
                }
                Write::Delete if idx < arr.len() => {
                    arr.remove(idx);
                    ids.invalidate_below(concrete);
                    Ok(true)
                }
                Write::Delete => Ok(false),
            }
        }
        (Segment::Select { prop, value: id }, Value::Array(arr)) => {
            let found = ids.lookup_mut(concrete, prop, id, arr);
            match (write, found) {
                (Write::Set(value), Some(idx)) => {
                    let value = carry_selected_id(value, prop, id, || format!("{concrete}[{prop}={id}]"))?;
                    let changed = replace_if_changed(&mut arr[idx], value);
                    if changed {
                        ids.invalidate(&element_path(concrete, idx));
                    }
                    Ok(changed)
                }
                (Write::Set(value), None) => {
                    let value = carry_selected_id(value, prop, id, || format!("{concrete}[{prop}={id}]"))?;
                    arr.push(value);
                    Ok(true)
                }
                (Write::Delete, Some(idx)) => {
                    arr.remove(idx);
                    ids.invalidate_below(concrete);
                    Ok(true)
                }
                (Write::Delete, None) => Ok(false),
            }
        }
        (_, _) => match write {
            Write::Delete => Ok(false),
            Write::Set(_) => Err(PathError::NotContainer(display_path(concrete))),
        },
    }
}

/// Make sure an object written through `[prop=id]` answers to that selector.
fn carry_selected_id(
    value: Value,
    prop: &str,
    id: &str,
    target: impl FnOnce() -> String,
) -> Result<Value, PathError> {
    let Value::Object(mut map) = value else {
        return Err(PathError::SelectorMismatch(target()));
    };
    match map.get(prop) {
        None => {
            map.insert(prop.to_string(), Value::String(id.to_string()));
        }
        Some(existing) if id_string(existing).as_deref() == Some(id) => {}
        Some(_) => return Err(PathError::SelectorMismatch(target())),
    }
    Ok(Value::Object(map))
}

fn element_path(array: &str, idx: usize) -> String {
    let mut path = array.to_string();
    push_index(&mut path, idx);
    path
}

fn replace_if_changed(slot: &mut Value, value: Value) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

fn display_path(concrete: &str) -> String {
    if concrete.is_empty() {
        "(root)".to_string()
    } else {
        concrete.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn set(doc: &mut Value, path: &str, value: Value) -> Result<bool, PathError> {
        set_by_path(doc, path, Write::Set(value), &mut IdIndex::new())
    }

    #[test]
    fn test_set_and_noop() {
        let mut doc = json!({"a": {"b": 1}});
        assert_eq!(set(&mut doc, "a.b", json!(2)), Ok(true));
        assert_eq!(set(&mut doc, "a.b", json!(2)), Ok(false));
        assert_eq!(set(&mut doc, "a", json!({"b": 2})), Ok(false));
    }

    #[test]
    fn test_root_and_malformed_paths_error() {
        let mut doc = json!({});
        assert_eq!(set(&mut doc, "", json!(1)), Err(PathError::EmptyPath));
        assert!(matches!(set(&mut doc, "a[", json!(1)), Err(PathError::UnexpectedEnd)));
    }

    #[test]
    fn test_delete() {
        let mut doc = json!({"a": {"b": 1}, "list": [1, 2, 3]});
        let mut ids = IdIndex::new();
        assert_eq!(set_by_path(&mut doc, "a.b", Write::Delete, &mut ids), Ok(true));
        assert_eq!(set_by_path(&mut doc, "a.b", Write::Delete, &mut ids), Ok(false));
        assert_eq!(set_by_path(&mut doc, "x.y.z", Write::Delete, &mut ids), Ok(false));
        assert_eq!(set_by_path(&mut doc, "list[1]", Write::Delete, &mut ids), Ok(true));
        assert_eq!(set_by_path(&mut doc, "list[9]", Write::Delete, &mut ids), Ok(false));
        assert_eq!(doc, json!({"a": {}, "list": [1, 3]}));
    }

    #[test]
    fn test_index_write_pads() {
        let mut doc = json!({"list": [0]});
        assert_eq!(set(&mut doc, "list[1]", json!(1)), Ok(true));
        assert_eq!(set(&mut doc, "list[3]", json!(3)), Ok(true));
        assert_eq!(doc["list"], json!([0, 1, null, 3]));
    }

    #[test]
    fn test_numeric_intermediate_is_never_created() {
        let mut doc = json!({"list": []});
        assert_eq!(
            set(&mut doc, "list[0].name", json!("x")),
            Err(PathError::MissingIntermediate("list[0]".into()))
        );
    }

    #[test]
    fn test_selector_creates_seeded_element() {
        let mut doc = json!({"list": [{"id": "a"}]});
        assert_eq!(set(&mut doc, "list[id=b].done", json!(true)), Ok(true));
        assert_eq!(doc["list"][1], json!({"id": "b", "done": true}));
    }

    #[test]
    fn test_selector_final_segment() {
        let mut doc = json!({"list": [{"id": 1, "v": 0}, {"id": 2, "v": 0}]});
        let mut ids = IdIndex::new();
        let next = json!({"id": 2, "v": 9});
        assert_eq!(set_by_path(&mut doc, "list[id=2]", Write::Set(next.clone()), &mut ids), Ok(true));
        assert_eq!(doc["list"][1], next);
        assert_eq!(set_by_path(&mut doc, "list[id=3]", Write::Set(json!({"id": 3})), &mut ids), Ok(true));
        assert_eq!(doc["list"].as_array().map(Vec::len), Some(3));
        assert_eq!(set_by_path(&mut doc, "list[id=1]", Write::Delete, &mut ids), Ok(true));
        assert_eq!(doc["list"][0]["id"], json!(2));
        assert_eq!(set_by_path(&mut doc, "list[id=1]", Write::Delete, &mut ids), Ok(false));
    }

    #[test]
    fn test_set_into_scalar_errors() {
        let mut doc = json!({"a": 1});
        assert_eq!(
            set(&mut doc, "a.b", json!(1)),
            Err(PathError::NotContainer("a".into()))
        );
        assert_eq!(
            set_by_path(&mut doc, "a.b", Write::Delete, &mut IdIndex::new()),
            Ok(false)
        );
    }

    #[test]
    fn test_selector_write_carries_the_id() {
        let mut doc = json!({"list": [{"id": 1}]});
        let mut ids = IdIndex::new();
        let path = "list[id=3]";
        assert_eq!(set_by_path(&mut doc, path, Write::Set(json!({"title": "x"})), &mut ids), Ok(true));
        assert_eq!(crate::resolve(&doc, path, &mut ids), Some(&json!({"title": "x", "id": "3"})));
        assert_eq!(set_by_path(&mut doc, path, Write::Set(json!({"title": "x"})), &mut ids), Ok(false));
        assert_eq!(doc["list"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_selector_write_rejects_other_ids_and_scalars() {
        let mut doc = json!({"list": [{"id": 1}]});
        let before = doc.clone();
        assert_eq!(
            set(&mut doc, "list[id=3]", json!({"id": 4})),
            Err(PathError::SelectorMismatch("list[id=3]".into()))
        );
        assert_eq!(
            set(&mut doc, "list[id=1]", json!("flat")),
            Err(PathError::SelectorMismatch("list[id=1]".into()))
        );
        assert_eq!(doc, before);
    }

    #[test]
    fn test_index_gap_is_bounded() {
        let mut doc = json!({"list": [0]});
        assert_eq!(
            set(&mut doc, "list[18446744073709551615]", json!(1)),
            Err(PathError::IndexOutOfRange {
                path: "list".into(),
                index: usize::MAX,
                len: 1
            })
        );
        assert!(matches!(
            set(&mut doc, &format!("list[{}]", MAX_INDEX_GAP + 2), json!(1)),
            Err(PathError::IndexOutOfRange { .. })
        ));
        assert_eq!(doc, json!({"list": [0]}));
        assert_eq!(set(&mut doc, &format!("list[{}]", MAX_INDEX_GAP + 1), json!(1)), Ok(true));
    }

    #[test]
    fn test_failed_write_leaves_document_unchanged() {
        let mut doc = json!({"app": {}, "list": [{"id": "a"}]});
        let before = doc.clone();
        let mut ids = IdIndex::new();
        assert_eq!(
            set_by_path(&mut doc, "app.a.b.c", Write::Set(json!(1)), &mut ids),
            Err(PathError::MissingIntermediate("app.a.b".into()))
        );
        assert_eq!(
            set_by_path(&mut doc, "list[id=b].tags[0].x", Write::Set(json!(1)), &mut ids),
            Err(PathError::MissingIntermediate("list[1].tags".into()))
        );
        assert_eq!(
            set_by_path(&mut doc, "app.user[0]", Write::Set(json!(1)), &mut ids),
            Err(PathError::NotContainer("app.user".into()))
        );
        assert_eq!(doc, before);
    }

    #[test]
    fn test_writes_drop_index_entries_below_them() {
        let mut doc = json!({"groups": {"g": {"rows": [{"id": 1}, {"id": 2}]}}});
        let mut ids = IdIndex::new();
        assert!(crate::resolve(&doc, "groups.g.rows[id=2]", &mut ids).is_some());
        assert_eq!(ids.len(), 1);
        assert_eq!(set_by_path(&mut doc, "groups.g", Write::Delete, &mut ids), Ok(true));
        assert!(ids.is_empty());
    }
}
