//! Host-driven timer queue with debounce and throttle helpers.
//!
//! Nothing here reads the clock on its own. Callers pass `now` when
//! scheduling and the host calls [`Timers::run_due`] (usually through
//! [`Store::run_timers`](crate::Store::run_timers)) to fire what is due.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::time::Duration;

use web_time::Instant;

pub type TimerId = u64;

type Task = Box<dyn FnOnce()>;

#[derive(Default)]
struct TimerQueue {
    next_id: TimerId,
    entries: BTreeMap<(Instant, TimerId), Task>,
    deadlines: HashMap<TimerId, Instant>,
}

/// Shared timer queue ordered by deadline, then by scheduling order.
#[derive(Clone, Default)]
pub struct Timers {
    inner: Rc<RefCell<TimerQueue>>,
}

impl std::fmt::Debug for Timers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timers")
            .field("pending", &self.len())
            .field("next_deadline", &self.next_deadline())
            .finish()
    }
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_at(&self, deadline: Instant, task: impl FnOnce() + 'static) -> TimerId {
        let mut queue = self.inner.borrow_mut();
        queue.next_id += 1;
        let id = queue.next_id;
        queue.entries.insert((deadline, id), Box::new(task));
        queue.deadlines.insert(id, deadline);
        id
    }

    /// Cancel a pending timer. Returns `false` if it already ran or was
    /// cancelled.
    pub fn cancel(&self, id: TimerId) -> bool {
        let task = {
            let mut queue = self.inner.borrow_mut();
            match queue.deadlines.remove(&id) {
                Some(deadline) => queue.entries.remove(&(deadline, id)),
                None => None,
            }
        };
        task.is_some()
    }

    /// Run every timer whose deadline is at or before `now`, including
    /// ones scheduled by the tasks themselves. Returns how many ran.
    pub fn run_due(&self, now: Instant) -> usize {
        let mut ran = 0;
        loop {
            let task = {
                let mut queue = self.inner.borrow_mut();
                let key = match queue.entries.keys().next() {
                    Some(&key) if key.0 <= now => key,
                    _ => break,
                };
                queue.deadlines.remove(&key.1);
                queue.entries.remove(&key)
            };
            if let Some(task) = task {
                task();
                ran += 1;
            }
        }
        ran
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner.borrow().entries.keys().next().map(|(deadline, _)| *deadline)
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().entries.is_empty()
    }

    /// Drop every pending timer without running it.
    pub fn clear(&self) {
        let entries = {
            let mut queue = self.inner.borrow_mut();
            queue.deadlines.clear();
            std::mem::take(&mut queue.entries)
        };
        drop(entries);
    }
}

/// Trailing-edge debounce: the action runs once, `delay` after the last
/// trigger.
pub struct Debounce {
    timers: Timers,
    delay: Duration,
    pending: Rc<Cell<Option<TimerId>>>,
    action: Rc<dyn Fn()>,
}

impl Debounce {
    pub fn new(timers: &Timers, delay: Duration, action: impl Fn() + 'static) -> Self {
        Self {
            timers: timers.clone(),
            delay,
            pending: Rc::new(Cell::new(None)),
            action: Rc::new(action),
        }
    }

    pub fn trigger(&self, now: Instant) {
        self.cancel();
        let pending = Rc::clone(&self.pending);
        let action = Rc::clone(&self.action);
        let id = self.timers.schedule_at(now + self.delay, move || {
            pending.set(None);
            action();
        });
        self.pending.set(Some(id));
    }

    pub fn cancel(&self) {
        if let Some(id) = self.pending.take() {
            self.timers.cancel(id);
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.get().is_some()
    }
}

impl Drop for Debounce {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[derive(Default)]
struct ThrottleState {
    last_run: Option<Instant>,
    trailing: Option<TimerId>,
}

/// Leading + trailing throttle: the first trigger runs immediately, later
/// triggers inside the interval collapse into one run at its end.
pub struct Throttle {
    timers: Timers,
    interval: Duration,
    state: Rc<RefCell<ThrottleState>>,
    action: Rc<dyn Fn()>,
}

impl Throttle {
    pub fn new(timers: &Timers, interval: Duration, action: impl Fn() + 'static) -> Self {
        Self {
            timers: timers.clone(),
            interval,
            state: Rc::new(RefCell::new(ThrottleState::default())),
            action: Rc::new(action),
        }
    }

    /// Returns `true` when the action ran immediately.
    pub fn trigger(&self, now: Instant) -> bool {
        let mut state = self.state.borrow_mut();
        if let Some(last) = state.last_run {
            let next = last + self.interval;
            if now < next {
                if state.trailing.is_none() {
                    let shared = Rc::clone(&self.state);
                    let action = Rc::clone(&self.action);
                    let id = self.timers.schedule_at(next, move || {
                        {
                            let mut state = shared.borrow_mut();
                            state.trailing = None;
                            state.last_run = Some(next);
                        }
                        action();
                    });
                    state.trailing = Some(id);
                }
                return false;
            }
        }
        state.last_run = Some(now);
        let stale = state.trailing.take();
        drop(state);
        if let Some(id) = stale {
            self.timers.cancel(id);
        }
        (self.action)();
        true
    }

    pub fn cancel(&self) {
        let trailing = self.state.borrow_mut().trailing.take();
        if let Some(id) = trailing {
            self.timers.cancel(id);
        }
    }
}

impl Drop for Throttle {
    fn drop(&mut self) {
        self.cancel();
    }
}
