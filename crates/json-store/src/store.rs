use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use json_store_path::{resolve, resolve_mut, set_by_path, validate_path, IdIndex, Write};
use serde_json::{Map, Value};
use web_time::Instant;

use crate::bind::{Handler, Trigger};
use crate::config::StoreConfig;
use crate::error::{ListenerError, StoreError};
use crate::proxy::{Proxy, View};
use crate::scheduler::{
    IntoDisposition, ListenerId, PathTest, Scheduler, SchedulerState, Subscription, Updates,
};
use crate::timers::Timers;

pub(crate) struct StoreInner {
    config: StoreConfig,
    root: RefCell<Value>,
    ids: RefCell<IdIndex>,
    handlers: RefCell<BTreeMap<String, Handler>>,
    scheduler: Scheduler,
    timers: Timers,
    disposed: Cell<bool>,
}

/// A reactive JSON store.
///
/// The root is always an object. Values are read and written by path;
/// writes that change something touch the written path, and listeners
/// registered with [`observe`](Self::observe) hear about touched paths on
/// the next flush.
///
/// `Store` is a cheap handle; clones share the same state.
///
/// # Example
///
/// ```
/// use json_store::Store;
/// use serde_json::json;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let store = Store::new();
/// store.set("todos", json!([{"id": 1, "done": false}])).unwrap();
///
/// let heard = Rc::new(RefCell::new(Vec::new()));
/// let sink = Rc::clone(&heard);
/// let _sub = store.observe("todos", move |path: &str| sink.borrow_mut().push(path.to_string()));
///
/// store.set("todos[id=1].done", true).unwrap();
/// assert_eq!(store.get("todos[0].done"), Some(json!(true)));
/// assert!(heard.borrow().is_empty());
///
/// store.flush();
/// assert_eq!(*heard.borrow(), vec!["todos[id=1].done"]);
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

/// Non-owning store handle.
#[derive(Clone, Default)]
pub struct WeakStore {
    inner: Weak<StoreInner>,
}

impl WeakStore {
    pub fn upgrade(&self) -> Option<Store> {
        self.inner.upgrade().map(|inner| Store { inner })
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("label", &self.inner.config.label)
            .field("state", &self.state())
            .field("listeners", &self.inner.scheduler.listener_count())
            .finish()
    }
}

impl Store {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                config,
                root: RefCell::new(Value::Object(Map::new())),
                ids: RefCell::new(IdIndex::new()),
                handlers: RefCell::new(BTreeMap::new()),
                scheduler: Scheduler::new(),
                timers: Timers::new(),
                disposed: Cell::new(false),
            }),
        }
    }

    /// Create a store holding `root`, which must be a JSON object.
    pub fn with_root(root: Value) -> Result<Self, StoreError> {
        if !root.is_object() {
            return Err(StoreError::RootNotObject);
        }
        let store = Self::new();
        *store.inner.root.borrow_mut() = root;
        Ok(store)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn label(&self) -> &str {
        &self.inner.config.label
    }

    pub fn downgrade(&self) -> WeakStore {
        WeakStore {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &Store) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    // Reads

    /// Clone the value at `path`. Malformed or missing paths yield `None`.
    pub fn get(&self, path: &str) -> Option<Value> {
        self.with(path, |value| value.cloned())
    }

    /// Borrow the value at `path` for the duration of `f`.
    ///
    /// The store is borrowed while `f` runs; writing to it from `f` panics.
    pub fn with<R>(&self, path: &str, f: impl FnOnce(Option<&Value>) -> R) -> R {
        let root = self.inner.root.borrow();
        let mut ids = self.inner.ids.borrow_mut();
        f(resolve(&root, path, &mut ids))
    }

    /// Clone the whole root object.
    pub fn snapshot(&self) -> Value {
        self.inner.root.borrow().clone()
    }

    // Writes

    /// Write `value` at `path`. Returns whether anything changed; only a
    /// change touches `path`.
    pub fn set(&self, path: &str, value: impl Into<Value>) -> Result<bool, StoreError> {
        let value = value.into();
        self.write(path, Write::Set(value))
    }

    /// Delete the value at `path`. Deleting a missing value is a no-op.
    pub fn delete(&self, path: &str) -> Result<bool, StoreError> {
        self.write(path, Write::Delete)
    }

    fn write(&self, path: &str, write: Write) -> Result<bool, StoreError> {
        check_absolute(path)?;
        let changed = {
            let mut root = self.inner.root.borrow_mut();
            let mut ids = self.inner.ids.borrow_mut();
            set_by_path(&mut root, path, write, &mut ids)?
        };
        if changed {
            self.touch(path);
        }
        Ok(changed)
    }

    /// Run `f` on the array at `path`, then touch `path` exactly once.
    ///
    /// The store is borrowed while `f` runs.
    pub fn mutate_array<R>(
        &self,
        path: &str,
        f: impl FnOnce(&mut Vec<Value>) -> R,
    ) -> Result<R, StoreError> {
        check_absolute(path)?;
        validate_path(path)?;
        let result = {
            let mut root = self.inner.root.borrow_mut();
            let mut ids = self.inner.ids.borrow_mut();
            match resolve_mut(&mut root, path, &mut ids) {
                Some(Value::Array(items)) => f(items),
                _ => return Err(StoreError::NotAnArray(path.to_string())),
            }
        };
        self.touch(path);
        Ok(result)
    }

    /// Give every object in the array at `path` a generated
    /// [`AUTO_ID`](json_store_path::AUTO_ID) if it lacks one.
    ///
    /// Generated ids are bookkeeping, so this does not touch `path`.
    pub fn assign_auto_ids(&self, path: &str) -> Result<usize, StoreError> {
        validate_path(path)?;
        let mut root = self.inner.root.borrow_mut();
        let mut ids = self.inner.ids.borrow_mut();
        match resolve_mut(&mut root, path, &mut ids) {
            Some(Value::Array(items)) => Ok(ids.assign_auto_ids(items)),
            _ => Err(StoreError::NotAnArray(path.to_string())),
        }
    }

    // Notification

    /// Mark `path` as changed.
    pub fn touch(&self, path: &str) {
        if self.is_disposed() {
            return;
        }
        self.inner.scheduler.touch(path);
    }

    /// Register a listener. It runs on each flush, once per batched path
    /// that passes `test`, until the returned subscription is dropped.
    pub fn observe<F, R>(&self, test: impl Into<PathTest>, mut callback: F) -> Subscription
    where
        F: FnMut(&str) -> R + 'static,
        R: IntoDisposition,
    {
        let id = self
            .inner
            .scheduler
            .add_listener(test.into(), Box::new(move |path| callback(path).into_disposition()));
        Subscription::new(self.downgrade(), id)
    }

    /// Observe with the handler registered at `handler_path`.
    pub fn observe_handler(
        &self,
        test: impl Into<PathTest>,
        handler_path: &str,
    ) -> Result<Subscription, StoreError> {
        let handler = self
            .handler(handler_path)
            .ok_or_else(|| StoreError::NotAHandler(handler_path.to_string()))?;
        let store = self.downgrade();
        Ok(self.observe(test, move |path: &str| -> Result<(), ListenerError> {
            match store.upgrade() {
                Some(store) => handler(&store, Trigger::Change(path)),
                None => Ok(()),
            }
        }))
    }

    pub fn unobserve(&self, id: ListenerId) -> bool {
        self.inner.scheduler.remove_listener(id)
    }

    pub fn state(&self) -> SchedulerState {
        self.inner.scheduler.state()
    }

    /// Paths waiting for the next flush.
    pub fn pending(&self) -> Vec<String> {
        self.inner.scheduler.pending()
    }

    /// Set the host hook called whenever a flush becomes scheduled. An
    /// event loop uses it to queue a task that calls [`flush`](Self::flush).
    pub fn on_schedule(&self, hook: impl Fn() + 'static) {
        self.inner.scheduler.set_on_schedule(Some(Rc::new(hook)));
    }

    /// Future that resolves when the current or next batch has been
    /// delivered.
    pub fn updates(&self) -> Updates {
        Updates::new(self.clone())
    }

    /// Deliver the scheduled batch, if any. Returns the number of paths
    /// delivered.
    pub fn flush(&self) -> usize {
        self.inner
            .scheduler
            .flush(&self.inner.config.label)
            .unwrap_or(0)
    }

    /// Flush until idle. Returns the number of flushes run.
    pub fn settle(&self) -> usize {
        let max = self.inner.config.max_settle_passes;
        let mut passes = 0;
        while self.state() == SchedulerState::Scheduled {
            if passes == max {
                tracing::warn!(
                    store = %self.inner.config.label,
                    passes,
                    pending = self.inner.scheduler.pending().len(),
                    "settle gave up with updates still pending"
                );
                break;
            }
            self.flush();
            passes += 1;
        }
        passes
    }

    // Handlers

    /// Store a callable at `path`. JSON cannot hold functions, so handlers
    /// live beside the document in their own path-keyed registry.
    pub fn set_handler<F>(&self, path: &str, handler: F)
    where
        F: Fn(&Store, Trigger<'_>) -> Result<(), ListenerError> + 'static,
    {
        let previous = self
            .inner
            .handlers
            .borrow_mut()
            .insert(path.to_string(), Rc::new(handler));
        drop(previous);
    }

    pub fn handler(&self, path: &str) -> Option<Handler> {
        self.inner.handlers.borrow().get(path).cloned()
    }

    pub fn remove_handler(&self, path: &str) -> bool {
        let removed = self.inner.handlers.borrow_mut().remove(path);
        removed.is_some()
    }

    // Proxies

    pub fn raw(&self) -> Proxy {
        Proxy::new(self.clone(), String::new(), View::Raw)
    }

    pub fn boxed(&self) -> Proxy {
        Proxy::new(self.clone(), String::new(), View::Boxed)
    }

    pub fn at(&self, path: &str) -> Proxy {
        Proxy::new(self.clone(), path.to_string(), View::Raw)
    }

    pub fn boxed_at(&self, path: &str) -> Proxy {
        Proxy::new(self.clone(), path.to_string(), View::Boxed)
    }

    // Timers

    pub fn timers(&self) -> &Timers {
        &self.inner.timers
    }

    /// Fire due timers. Hosts call this from their event loop.
    pub fn run_timers(&self, now: Instant) -> usize {
        self.inner.timers.run_due(now)
    }

    // Lifecycle

    /// Drop listeners, handlers, timers and pending paths. The document
    /// stays readable and writable but nothing is notified any more.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        tracing::debug!(store = %self.inner.config.label, "dispose");
        self.inner.scheduler.reset();
        let handlers = std::mem::take(&mut *self.inner.handlers.borrow_mut());
        drop(handlers);
        self.inner.timers.clear();
        self.inner.ids.borrow_mut().clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}

fn check_absolute(path: &str) -> Result<(), StoreError> {
    if path.starts_with('^') {
        return Err(StoreError::RelativePath(path.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use json_store_path::PathError;
    use serde_json::json;

    #[test]
    fn test_with_root_requires_object() {
        assert!(matches!(Store::with_root(json!([])), Err(StoreError::RootNotObject)));
        let store = Store::with_root(json!({"a": 1})).unwrap();
        assert_eq!(store.get("a"), Some(json!(1)));
    }

    #[test]
    fn test_set_touches_only_on_change() {
        let store = Store::new();
        assert!(store.set("a", 1).unwrap());
        assert_eq!(store.pending(), vec!["a"]);
        store.flush();
        assert!(!store.set("a", 1).unwrap());
        assert!(store.pending().is_empty());
        assert_eq!(store.state(), SchedulerState::Idle);
    }

    #[test]
    fn test_write_errors() {
        let store = Store::new();
        assert!(matches!(store.set("", 1), Err(StoreError::Path(PathError::EmptyPath))));
        assert!(matches!(store.set("a[", 1), Err(StoreError::Path(_))));
        assert!(matches!(store.set("^.x", 1), Err(StoreError::RelativePath(_))));
    }

    #[test]
    fn test_mutate_array_requires_array() {
        let store = Store::with_root(json!({"list": [], "obj": {}})).unwrap();
        assert!(matches!(
            store.mutate_array("obj", |_| ()),
            Err(StoreError::NotAnArray(path)) if path == "obj"
        ));
        store.mutate_array("list", |items| items.push(json!(1))).unwrap();
        assert_eq!(store.get("list"), Some(json!([1])));
        assert_eq!(store.pending(), vec!["list"]);
    }

    #[test]
    fn test_assign_auto_ids_is_silent() {
        let store = Store::with_root(json!({"rows": [{}, {}]})).unwrap();
        assert_eq!(store.assign_auto_ids("rows").unwrap(), 2);
        assert!(store.pending().is_empty());
        assert!(store.get("rows[1]._auto_").is_some());
    }

    #[test]
    fn test_settle_is_bounded() {
        let store = Store::with_config(StoreConfig {
            label: "loop".into(),
            max_settle_passes: 3,
        });
        let inner = store.downgrade();
        let _sub = store.observe("n", move |_: &str| {
            if let Some(store) = inner.upgrade() {
                let n = store.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
                store.set("n", n + 1).map(|_| ())
            } else {
                Ok(())
            }
        });
        store.set("n", 0).unwrap();
        assert_eq!(store.settle(), 3);
        assert_eq!(store.state(), SchedulerState::Scheduled);
        assert_eq!(store.get("n"), Some(json!(3)));
    }

    #[test]
    fn test_dispose_stops_notification() {
        let store = Store::new();
        let sub = store.observe("a", |_: &str| ());
        store.set_handler("h", |_, _| Ok(()));
        store.dispose();
        assert!(store.is_disposed());
        assert!(store.handler("h").is_none());
        store.set("a", 1).unwrap();
        assert_eq!(store.state(), SchedulerState::Idle);
        drop(sub);
    }
}
