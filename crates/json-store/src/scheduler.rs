//! Batched change notification.
//!
//! Touched paths collect in a pending set until the next flush. The set is
//! prefix-deduplicated: a pending ancestor absorbs later descendant touches
//! and a new ancestor evicts pending descendants.
//!
//! A flush snapshots and clears the pending set before any listener runs,
//! so touches made by listeners land in the following batch.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use json_store_path::{is_path_prefix, paths_overlap};
use regex::Regex;

use crate::error::{ListenerError, StoreError};
use crate::store::{Store, WeakStore};

pub type ListenerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Scheduled,
    Flushing,
}

/// Outcome of testing one changed path against a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestVerdict {
    Match,
    Skip,
    /// Unregister the listener without calling it.
    Remove,
}

impl From<bool> for TestVerdict {
    fn from(matched: bool) -> Self {
        if matched {
            TestVerdict::Match
        } else {
            TestVerdict::Skip
        }
    }
}

/// What a listener callback wants done with its registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposition {
    #[default]
    Keep,
    Remove,
}

/// Return types accepted from listener callbacks.
pub trait IntoDisposition {
    fn into_disposition(self) -> Result<Disposition, ListenerError>;
}

impl IntoDisposition for () {
    fn into_disposition(self) -> Result<Disposition, ListenerError> {
        Ok(Disposition::Keep)
    }
}

impl IntoDisposition for Disposition {
    fn into_disposition(self) -> Result<Disposition, ListenerError> {
        Ok(self)
    }
}

impl<T, E> IntoDisposition for Result<T, E>
where
    T: IntoDisposition,
    E: Into<ListenerError>,
{
    fn into_disposition(self) -> Result<Disposition, ListenerError> {
        self.map_err(Into::into)?.into_disposition()
    }
}

type Predicate = Rc<dyn Fn(&str) -> Result<TestVerdict, ListenerError>>;

/// Decides which changed paths a listener hears about.
#[derive(Clone)]
pub enum PathTest {
    /// Matches paths that are ancestors or descendants of this path.
    Prefix(String),
    Regex(Regex),
    Predicate(Predicate),
}

impl PathTest {
    pub fn prefix(path: impl Into<String>) -> Self {
        PathTest::Prefix(path.into())
    }

    pub fn regex(pattern: &str) -> Result<Self, StoreError> {
        Ok(PathTest::Regex(Regex::new(pattern)?))
    }

    pub fn predicate(f: impl Fn(&str) -> bool + 'static) -> Self {
        PathTest::Predicate(Rc::new(move |path| Ok(f(path).into())))
    }

    /// A predicate that may fail or ask to be removed.
    pub fn try_predicate(f: impl Fn(&str) -> Result<TestVerdict, ListenerError> + 'static) -> Self {
        PathTest::Predicate(Rc::new(f))
    }

    pub fn test(&self, path: &str) -> Result<TestVerdict, ListenerError> {
        match self {
            PathTest::Prefix(prefix) => Ok(paths_overlap(prefix, path).into()),
            PathTest::Regex(re) => Ok(re.is_match(path).into()),
            PathTest::Predicate(f) => f(path),
        }
    }
}

impl std::fmt::Debug for PathTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathTest::Prefix(path) => f.debug_tuple("Prefix").field(path).finish(),
            PathTest::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
            PathTest::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<&str> for PathTest {
    fn from(path: &str) -> Self {
        PathTest::prefix(path)
    }
}

impl From<String> for PathTest {
    fn from(path: String) -> Self {
        PathTest::Prefix(path)
    }
}

impl From<&String> for PathTest {
    fn from(path: &String) -> Self {
        PathTest::prefix(path.as_str())
    }
}

impl From<Regex> for PathTest {
    fn from(re: Regex) -> Self {
        PathTest::Regex(re)
    }
}

pub(crate) type Callback = Box<dyn FnMut(&str) -> Result<Disposition, ListenerError>>;

struct ListenerSlot {
    test: Rc<PathTest>,
    /// Taken out while the callback runs.
    callback: Option<Callback>,
}

pub(crate) struct Scheduler {
    state: Cell<SchedulerState>,
    pending: RefCell<Vec<String>>,
    listeners: RefCell<BTreeMap<ListenerId, ListenerSlot>>,
    next_id: Cell<ListenerId>,
    completed: Cell<u64>,
    wakers: RefCell<Vec<Waker>>,
    on_schedule: RefCell<Option<Rc<dyn Fn()>>>,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self {
            state: Cell::new(SchedulerState::Idle),
            pending: RefCell::new(Vec::new()),
            listeners: RefCell::new(BTreeMap::new()),
            next_id: Cell::new(1),
            completed: Cell::new(0),
            wakers: RefCell::new(Vec::new()),
            on_schedule: RefCell::new(None),
        }
    }

    pub(crate) fn state(&self) -> SchedulerState {
        self.state.get()
    }

    pub(crate) fn completed(&self) -> u64 {
        self.completed.get()
    }

    pub(crate) fn pending(&self) -> Vec<String> {
        self.pending.borrow().clone()
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub(crate) fn set_on_schedule(&self, hook: Option<Rc<dyn Fn()>>) {
        let previous = self.on_schedule.replace(hook);
        drop(previous);
    }

    pub(crate) fn touch(&self, path: &str) {
        {
            let mut pending = self.pending.borrow_mut();
            if pending.iter().any(|p| is_path_prefix(p, path)) {
                return;
            }
            pending.retain(|p| !is_path_prefix(path, p));
            pending.push(path.to_string());
        }
        if self.state.get() == SchedulerState::Idle {
            self.state.set(SchedulerState::Scheduled);
            self.notify_scheduled();
        }
    }

    fn notify_scheduled(&self) {
        let hook = self.on_schedule.borrow().clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    pub(crate) fn add_listener(&self, test: PathTest, callback: Callback) -> ListenerId {
        let id = self.next_id.get();
        self.next_id.set(id.saturating_add(1));
        self.listeners.borrow_mut().insert(
            id,
            ListenerSlot {
                test: Rc::new(test),
                callback: Some(callback),
            },
        );
        id
    }

    pub(crate) fn remove_listener(&self, id: ListenerId) -> bool {
        let removed = self.listeners.borrow_mut().remove(&id);
        removed.is_some()
    }

    /// Run one batch. Returns the number of paths delivered, or `None` when
    /// nothing was scheduled (including a flush requested from inside a
    /// running flush).
    pub(crate) fn flush(&self, label: &str) -> Option<usize> {
        if self.state.get() != SchedulerState::Scheduled {
            return None;
        }
        self.state.set(SchedulerState::Flushing);
        let batch = std::mem::take(&mut *self.pending.borrow_mut());
        let ids: Vec<ListenerId> = self.listeners.borrow().keys().copied().collect();
        tracing::debug!(store = label, paths = batch.len(), listeners = ids.len(), "flush");

        for id in ids {
            let taken = {
                let mut listeners = self.listeners.borrow_mut();
                listeners
                    .get_mut(&id)
                    .and_then(|slot| slot.callback.take().map(|cb| (Rc::clone(&slot.test), cb)))
            };
            let Some((test, mut callback)) = taken else {
                continue;
            };
            let keep = run_listener(label, id, &test, &mut callback, &batch);

            let leftover = {
                let mut listeners = self.listeners.borrow_mut();
                if !keep {
                    listeners.remove(&id);
                    Some(callback)
                } else if let Some(slot) = listeners.get_mut(&id) {
                    slot.callback = Some(callback);
                    None
                } else {
                    Some(callback)
                }
            };
            drop(leftover);
        }

        self.completed.set(self.completed.get() + 1);
        if self.pending.borrow().is_empty() {
            self.state.set(SchedulerState::Idle);
        } else {
            self.state.set(SchedulerState::Scheduled);
            self.notify_scheduled();
        }
        self.wake_all();
        Some(batch.len())
    }

    pub(crate) fn register_waker(&self, waker: &Waker) {
        let mut wakers = self.wakers.borrow_mut();
        if !wakers.iter().any(|w| w.will_wake(waker)) {
            wakers.push(waker.clone());
        }
    }

    fn wake_all(&self) {
        let wakers = std::mem::take(&mut *self.wakers.borrow_mut());
        for waker in wakers {
            waker.wake();
        }
    }

    /// Drop every listener and pending path and release waiting futures.
    pub(crate) fn reset(&self) {
        let listeners = std::mem::take(&mut *self.listeners.borrow_mut());
        drop(listeners);
        self.pending.borrow_mut().clear();
        self.state.set(SchedulerState::Idle);
        self.set_on_schedule(None);
        self.wake_all();
    }
}

/// Deliver a batch to one listener. Returns whether to keep it.
fn run_listener(
    label: &str,
    id: ListenerId,
    test: &PathTest,
    callback: &mut Callback,
    batch: &[String],
) -> bool {
    for path in batch {
        match test.test(path) {
            Ok(TestVerdict::Skip) => {}
            Ok(TestVerdict::Remove) => return false,
            Ok(TestVerdict::Match) => match callback(path) {
                Ok(Disposition::Keep) => {}
                Ok(Disposition::Remove) => return false,
                Err(err) => {
                    tracing::warn!(store = label, listener = id, path = %path, error = %err, "listener callback failed");
                }
            },
            Err(err) => {
                tracing::error!(store = label, listener = id, path = %path, error = %err, "listener test failed");
                return true;
            }
        }
    }
    true
}

/// Handle to a registered listener. Dropping it unregisters the listener.
///
/// Holds the store weakly, so a subscription stored inside a node
/// attachment or a closure does not keep the store alive.
#[must_use = "dropping a Subscription unregisters its listener"]
pub struct Subscription {
    store: WeakStore,
    id: Option<ListenerId>,
}

impl Subscription {
    pub(crate) fn new(store: WeakStore, id: ListenerId) -> Self {
        Self {
            store,
            id: Some(id),
        }
    }

    pub fn id(&self) -> Option<ListenerId> {
        self.id
    }

    pub fn dispose(&mut self) {
        if let Some(id) = self.id.take() {
            if let Some(store) = self.store.upgrade() {
                store.unobserve(id);
            }
        }
    }

    /// Keep the listener registered for the lifetime of the store.
    pub fn detach(mut self) -> ListenerId {
        self.id.take().unwrap_or_default()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Future returned by [`Store::updates`].
///
/// Resolves once the flush that was in flight or scheduled at creation has
/// completed; resolves immediately if the store was idle. Polling runs a
/// scheduled flush, so the future also works without a host hook.
#[must_use = "futures do nothing unless polled"]
pub struct Updates {
    store: Store,
    target: Option<u64>,
}

impl Updates {
    pub(crate) fn new(store: Store) -> Self {
        let scheduler = store.scheduler();
        let target = match scheduler.state() {
            SchedulerState::Idle => None,
            SchedulerState::Scheduled | SchedulerState::Flushing => Some(scheduler.completed() + 1),
        };
        Self { store, target }
    }
}

impl Future for Updates {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let Some(target) = self.target else {
            return Poll::Ready(());
        };
        if self.store.scheduler().completed() >= target {
            return Poll::Ready(());
        }
        if self.store.scheduler().state() == SchedulerState::Scheduled {
            self.store.flush();
            if self.store.scheduler().completed() >= target {
                return Poll::Ready(());
            }
        }
        if self.store.is_disposed() {
            return Poll::Ready(());
        }
        self.store.scheduler().register_waker(cx.waker());
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_test_is_segment_aware() {
        let test = PathTest::prefix("todos");
        assert_eq!(test.test("todos[id=3].done"), Ok(TestVerdict::Match));
        assert_eq!(test.test(""), Ok(TestVerdict::Match));
        assert_eq!(test.test("todosArchive"), Ok(TestVerdict::Skip));
    }

    #[test]
    fn test_regex_test() {
        let test = PathTest::regex(r"^app\.(user|session)").unwrap();
        assert_eq!(test.test("app.user.name"), Ok(TestVerdict::Match));
        assert_eq!(test.test("app.theme"), Ok(TestVerdict::Skip));
        assert!(matches!(PathTest::regex("("), Err(StoreError::Pattern(_))));
    }

    #[test]
    fn test_touch_dedup() {
        let scheduler = Scheduler::new();
        scheduler.touch("a.b");
        scheduler.touch("a.b.c");
        scheduler.touch("ab");
        assert_eq!(scheduler.pending(), vec!["a.b", "ab"]);
        scheduler.touch("a");
        assert_eq!(scheduler.pending(), vec!["ab", "a"]);
        assert_eq!(scheduler.state(), SchedulerState::Scheduled);
    }

    #[test]
    fn test_into_disposition() {
        assert_eq!(().into_disposition(), Ok(Disposition::Keep));
        assert_eq!(Disposition::Remove.into_disposition(), Ok(Disposition::Remove));
        let failed: Result<(), &str> = Err("boom");
        assert_eq!(failed.into_disposition(), Err(ListenerError::new("boom")));
    }

    #[test]
    fn test_flush_when_idle_is_noop() {
        let scheduler = Scheduler::new();
        assert_eq!(scheduler.flush("test"), None);
        assert_eq!(scheduler.completed(), 0);
    }
}
