//! Path-aware handles onto store values.
//!
//! A [`Proxy`] is a store plus a path. It never caches: every read resolves
//! the path against the live document. Child handles are composed lazily
//! with [`Proxy::child`] and friends without touching the document.

use std::cmp::Ordering;

use json_store_path::{join_path, Segment};
use serde_json::Value;

use crate::bind::{self, BindOptions, Binding, BindingRecord};
use crate::dom::Element;
use crate::error::StoreError;
use crate::scheduler::{IntoDisposition, Subscription};
use crate::store::Store;

/// Which wrapping [`Proxy::get`] applies to scalar members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Objects and arrays come back as handles, scalars as plain values.
    Raw,
    /// Every member comes back as a handle.
    Boxed,
}

#[derive(Clone)]
pub struct Proxy {
    store: Store,
    path: String,
    view: View,
}

/// A member read through a proxy.
#[derive(Debug, Clone)]
pub enum Member {
    Node(Proxy),
    Scalar(Value),
}

impl Member {
    /// The member's current value.
    pub fn value(&self) -> Option<Value> {
        match self {
            Member::Node(proxy) => proxy.value(),
            Member::Scalar(value) => Some(value.clone()),
        }
    }

    pub fn as_node(&self) -> Option<&Proxy> {
        match self {
            Member::Node(proxy) => Some(proxy),
            Member::Scalar(_) => None,
        }
    }

    pub fn into_node(self) -> Option<Proxy> {
        match self {
            Member::Node(proxy) => Some(proxy),
            Member::Scalar(_) => None,
        }
    }
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Proxy")
            .field("path", &self.path)
            .field("view", &self.view)
            .finish()
    }
}

impl Proxy {
    pub(crate) fn new(store: Store, path: String, view: View) -> Self {
        Self { store, path, view }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn boxed(&self) -> Proxy {
        Proxy::new(self.store.clone(), self.path.clone(), View::Boxed)
    }

    pub fn raw(&self) -> Proxy {
        Proxy::new(self.store.clone(), self.path.clone(), View::Raw)
    }

    /// The live value at this path.
    pub fn value(&self) -> Option<Value> {
        self.store.get(&self.path)
    }

    pub fn with_value<R>(&self, f: impl FnOnce(Option<&Value>) -> R) -> R {
        self.store.with(&self.path, f)
    }

    pub fn exists(&self) -> bool {
        self.with_value(|value| value.is_some())
    }

    /// Number of members of an object or array.
    pub fn len(&self) -> Option<usize> {
        self.with_value(|value| match value {
            Some(Value::Array(items)) => Some(items.len()),
            Some(Value::Object(map)) => Some(map.len()),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len().map_or(true, |len| len == 0)
    }

    /// Handle for a relative path below this one: a key, `[n]`,
    /// `[prop=value]`, or a longer path such as `a.b[2]`.
    pub fn child(&self, relative: &str) -> Proxy {
        Proxy::new(self.store.clone(), join_path(&self.path, relative), self.view)
    }

    pub fn index(&self, idx: usize) -> Proxy {
        self.child(&Segment::Index(idx).to_string())
    }

    pub fn select(&self, prop: &str, value: &str) -> Proxy {
        self.child(&Segment::select(prop, value).to_string())
    }

    /// Read a member. Missing members yield `None`.
    pub fn get(&self, relative: &str) -> Option<Member> {
        let child = self.child(relative);
        let is_container = child.with_value(|value| value.map(|v| v.is_object() || v.is_array()))?;
        if is_container || self.view == View::Boxed {
            return Some(Member::Node(child));
        }
        child.value().map(Member::Scalar)
    }

    /// Handles for each element of an array, addressed by index.
    pub fn items(&self) -> Vec<Proxy> {
        let len = self.with_value(|value| value.and_then(Value::as_array).map_or(0, Vec::len));
        (0..len).map(|idx| self.index(idx)).collect()
    }

    pub fn set(&self, relative: &str, value: impl Into<Value>) -> Result<bool, StoreError> {
        let value = value.into();
        self.store.set(&join_path(&self.path, relative), value)
    }

    /// Replace the value at this path.
    pub fn replace(&self, value: impl Into<Value>) -> Result<bool, StoreError> {
        let value = value.into();
        self.store.set(&self.path, value)
    }

    /// Delete a member, or this value itself when `relative` is empty.
    pub fn delete(&self, relative: &str) -> Result<bool, StoreError> {
        self.store.delete(&join_path(&self.path, relative))
    }

    pub fn touch(&self) {
        self.store.touch(&self.path);
    }

    /// Observe changes at, above or below this path.
    pub fn observe<F, R>(&self, callback: F) -> Subscription
    where
        F: FnMut(&str) -> R + 'static,
        R: IntoDisposition,
    {
        self.store.observe(self.path.as_str(), callback)
    }

    pub fn bind(&self, el: &Element, binding: Binding, options: BindOptions) -> Result<(), StoreError> {
        bind::bind(&self.store, el, &self.path, binding, options)
    }

    /// Call the handler stored at this path whenever `el` dispatches
    /// `event_type`.
    pub fn on(&self, el: &Element, event_type: &str) -> Result<(), StoreError> {
        bind::on(&self.store, el, &self.path, event_type)
    }

    /// Describe a binding of this path, for attaching to a template.
    pub fn binding(&self, binding: Binding) -> BindingRecord {
        BindingRecord::new(self.path.clone(), binding)
    }

    // Array methods. Each runs on the live array and touches this path once.

    pub fn push(&self, value: impl Into<Value>) -> Result<usize, StoreError> {
        let value = value.into();
        self.store.mutate_array(&self.path, |items| {
            items.push(value);
            items.len()
        })
    }

    pub fn pop(&self) -> Result<Option<Value>, StoreError> {
        self.store.mutate_array(&self.path, Vec::pop)
    }

    pub fn shift(&self) -> Result<Option<Value>, StoreError> {
        self.store
            .mutate_array(&self.path, |items| (!items.is_empty()).then(|| items.remove(0)))
    }

    pub fn unshift(&self, value: impl Into<Value>) -> Result<usize, StoreError> {
        let value = value.into();
        self.store.mutate_array(&self.path, |items| {
            items.insert(0, value);
            items.len()
        })
    }

    /// Insert at `idx`, clamped to the array length.
    pub fn insert(&self, idx: usize, value: impl Into<Value>) -> Result<(), StoreError> {
        let value = value.into();
        self.store.mutate_array(&self.path, |items| {
            let idx = idx.min(items.len());
            items.insert(idx, value);
        })
    }

    pub fn remove(&self, idx: usize) -> Result<Option<Value>, StoreError> {
        self.store
            .mutate_array(&self.path, |items| (idx < items.len()).then(|| items.remove(idx)))
    }

    /// Remove `delete_count` elements from `start` and insert `values` in
    /// their place. Out-of-range bounds are clamped. Returns the removed
    /// elements.
    pub fn splice<I, V>(&self, start: usize, delete_count: usize, values: I) -> Result<Vec<Value>, StoreError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.store.mutate_array(&self.path, |items| {
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            items.splice(start..end, values).collect()
        })
    }

    pub fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> Ordering) -> Result<(), StoreError> {
        self.store.mutate_array(&self.path, |items| items.sort_by(compare))
    }

    pub fn reverse(&self) -> Result<(), StoreError> {
        self.store.mutate_array(&self.path, |items| items.reverse())
    }

    /// Keep the elements matching `keep`. Returns how many were removed.
    pub fn retain(&self, mut keep: impl FnMut(&Value) -> bool) -> Result<usize, StoreError> {
        self.store.mutate_array(&self.path, |items| {
            let before = items.len();
            items.retain(|item| keep(item));
            before - items.len()
        })
    }

    pub fn truncate(&self, len: usize) -> Result<(), StoreError> {
        self.store.mutate_array(&self.path, |items| items.truncate(len))
    }
}

impl From<Proxy> for Value {
    fn from(proxy: Proxy) -> Self {
        proxy.value().unwrap_or(Value::Null)
    }
}

impl From<&Proxy> for Value {
    fn from(proxy: &Proxy) -> Self {
        proxy.value().unwrap_or(Value::Null)
    }
}

impl From<Member> for Value {
    fn from(member: Member) -> Self {
        member.value().unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> Store {
        Store::with_root(json!({
            "user": {"name": "ada", "tags": ["x", "y"]},
            "count": 3
        }))
        .unwrap()
    }

    #[test]
    fn test_raw_view_unwraps_scalars() {
        let root = store().raw();
        assert!(matches!(root.get("user"), Some(Member::Node(p)) if p.path() == "user"));
        assert!(matches!(root.get("count"), Some(Member::Scalar(v)) if v == json!(3)));
        assert!(root.get("missing").is_none());
    }

    #[test]
    fn test_boxed_view_wraps_scalars() {
        let root = store().boxed();
        let count = root.get("count").and_then(Member::into_node).unwrap();
        assert_eq!(count.path(), "count");
        assert_eq!(count.value(), Some(json!(3)));
        let tag = root.child("user").get("tags[1]").and_then(Member::into_node).unwrap();
        assert_eq!(tag.path(), "user.tags[1]");
    }

    #[test]
    fn test_proxy_is_live() {
        let store = store();
        let name = store.at("user.name");
        store.set("user.name", "grace").unwrap();
        assert_eq!(name.value(), Some(json!("grace")));
    }

    #[test]
    fn test_composed_paths() {
        let store = store();
        let todos = store.at("todos");
        assert_eq!(todos.index(2).path(), "todos[2]");
        assert_eq!(todos.select("id", "7").child("title").path(), "todos[id=7].title");
        assert_eq!(store.raw().child("user").path(), "user");
    }

    #[test]
    fn test_set_unwraps_proxies() {
        let store = store();
        let user = store.at("user");
        assert!(store.raw().set("copy", &user).unwrap());
        assert_eq!(store.get("copy"), store.get("user"));
        assert!(!store.raw().set("copy", user).unwrap());
    }

    #[test]
    fn test_array_methods_touch_once() {
        let store = store();
        let tags = store.at("user.tags");
        store.flush();

        assert_eq!(tags.splice(0, 1, [json!("a"), json!("b")]).unwrap(), vec![json!("x")]);
        assert_eq!(store.pending(), vec!["user.tags"]);
        assert_eq!(tags.value(), Some(json!(["a", "b", "y"])));

        assert_eq!(tags.push("z").unwrap(), 4);
        assert_eq!(tags.shift().unwrap(), Some(json!("a")));
        tags.sort_by(|a, b| b.as_str().cmp(&a.as_str())).unwrap();
        assert_eq!(tags.value(), Some(json!(["z", "y", "b"])));
        assert_eq!(tags.retain(|v| v != "y").unwrap(), 1);
        assert_eq!(store.pending(), vec!["user.tags"]);
    }

    #[test]
    fn test_array_method_on_non_array() {
        let store = store();
        assert!(matches!(
            store.at("user").push(1),
            Err(StoreError::NotAnArray(path)) if path == "user"
        ));
    }

    #[test]
    fn test_len_and_items() {
        let store = store();
        assert_eq!(store.at("user.tags").len(), Some(2));
        assert_eq!(store.at("count").len(), None);
        let items: Vec<String> = store.at("user.tags").items().iter().map(|p| p.path().to_string()).collect();
        assert_eq!(items, vec!["user.tags[0]", "user.tags[1]"]);
    }
}
