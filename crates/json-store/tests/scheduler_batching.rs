use std::cell::{Cell, RefCell};
use std::rc::Rc;

use json_store::{Disposition, ListenerError, PathTest, SchedulerState, Store, TestVerdict};
use serde_json::json;

fn recorder() -> (Rc<RefCell<Vec<String>>>, impl FnMut(&str) + 'static) {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    (log, move |path: &str| sink.borrow_mut().push(path.to_string()))
}

#[test]
fn descendant_then_ancestor_notifies_once() {
    let store = Store::new();
    let (log, cb) = recorder();
    let _sub = store.observe("a", cb);

    store.touch("a.b");
    store.touch("a");
    store.flush();

    assert_eq!(*log.borrow(), vec!["a"]);
}

#[test]
fn ancestor_then_descendant_notifies_once() {
    let store = Store::new();
    let (log, cb) = recorder();
    let _sub = store.observe("a.b.c", cb);

    store.touch("a");
    store.touch("a.b");
    store.touch("a.b.c");
    store.flush();

    assert_eq!(*log.borrow(), vec!["a"]);
}

#[test]
fn listeners_match_either_direction() {
    let store = Store::new();
    let (above, cb_above) = recorder();
    let (below, cb_below) = recorder();
    let (other, cb_other) = recorder();
    let _a = store.observe("user", cb_above);
    let _b = store.observe("user.profile.name", cb_below);
    let _c = store.observe("settings", cb_other);

    store.set("user", json!({"profile": {"name": "ada"}})).unwrap();
    store.flush();

    assert_eq!(*above.borrow(), vec!["user"]);
    assert_eq!(*below.borrow(), vec!["user"]);
    assert!(other.borrow().is_empty());
}

#[test]
fn touches_during_flush_land_in_next_batch() {
    let store = Store::new();
    let weak = store.downgrade();
    let (log, mut cb) = recorder();
    let _sub = store.observe(PathTest::predicate(|_| true), move |path: &str| {
        cb(path);
        if path == "first" {
            if let Some(store) = weak.upgrade() {
                store.touch("second");
            }
        }
    });

    store.touch("first");
    assert_eq!(store.flush(), 1);
    assert_eq!(*log.borrow(), vec!["first"]);
    assert_eq!(store.state(), SchedulerState::Scheduled);

    assert_eq!(store.flush(), 1);
    assert_eq!(*log.borrow(), vec!["first", "second"]);
    assert_eq!(store.state(), SchedulerState::Idle);
}

#[test]
fn failing_test_keeps_listener_and_others_run() {
    let store = Store::new();
    let calls = Rc::new(Cell::new(0));
    let tests_run = Rc::new(Cell::new(0));

    let counter = Rc::clone(&tests_run);
    let _bad = store.observe(
        PathTest::try_predicate(move |_| {
            counter.set(counter.get() + 1);
            Err(ListenerError::new("broken test"))
        }),
        |_: &str| (),
    );
    let sink = Rc::clone(&calls);
    let _good = store.observe("x", move |_: &str| sink.set(sink.get() + 1));

    store.touch("x.one");
    store.touch("x.two");
    store.flush();
    // The failing test ends that listener's turn after the first path.
    assert_eq!(tests_run.get(), 1);
    assert_eq!(calls.get(), 2);

    store.touch("x");
    store.flush();
    assert_eq!(tests_run.get(), 2);
}

#[test]
fn failing_callback_does_not_stop_flush() {
    let store = Store::new();
    let attempts = Rc::new(Cell::new(0));
    let seen = Rc::new(Cell::new(0));

    let a = Rc::clone(&attempts);
    let _bad = store.observe("x", move |_: &str| -> Result<(), ListenerError> {
        a.set(a.get() + 1);
        Err("callback failed".into())
    });
    let s = Rc::clone(&seen);
    let _good = store.observe("x", move |_: &str| s.set(s.get() + 1));

    store.touch("x");
    store.flush();
    store.touch("x");
    store.flush();
    assert_eq!(attempts.get(), 2);
    assert_eq!(seen.get(), 2);
}

#[test]
fn remove_verdicts_unregister() {
    let store = Store::new();
    let calls = Rc::new(Cell::new(0));

    let c = Rc::clone(&calls);
    let once = store.observe("x", move |_: &str| {
        c.set(c.get() + 1);
        Disposition::Remove
    });
    let never = Rc::new(Cell::new(false));
    let n = Rc::clone(&never);
    let _removed = store.observe(PathTest::try_predicate(|_| Ok(TestVerdict::Remove)), move |_: &str| {
        n.set(true);
    });

    store.touch("x");
    store.flush();
    store.touch("x");
    store.flush();
    assert_eq!(calls.get(), 1);
    assert!(!never.get());
    // The registration is already gone; disposing is harmless.
    drop(once);
}

#[test]
fn dropping_subscription_unobserves() {
    let store = Store::new();
    let (log, cb) = recorder();
    let sub = store.observe("x", cb);
    drop(sub);
    store.touch("x");
    store.flush();
    assert!(log.borrow().is_empty());

    let (log, cb) = recorder();
    let id = store.observe("x", cb).detach();
    store.touch("x");
    store.flush();
    assert_eq!(log.borrow().len(), 1);
    assert!(store.unobserve(id));
}

#[test]
fn listener_may_dispose_itself_and_others() {
    let store = Store::new();
    let victim_calls = Rc::new(Cell::new(0));
    let victim: Rc<RefCell<Option<json_store::Subscription>>> = Rc::new(RefCell::new(None));

    let slot = Rc::clone(&victim);
    let _killer = store.observe("x", move |_: &str| {
        slot.borrow_mut().take();
    });
    let v = Rc::clone(&victim_calls);
    *victim.borrow_mut() = Some(store.observe("x", move |_: &str| v.set(v.get() + 1)));

    store.touch("x");
    store.flush();
    assert_eq!(victim_calls.get(), 0);
}

#[test]
fn regex_listener() {
    let store = Store::new();
    let (log, cb) = recorder();
    let _sub = store.observe(PathTest::regex(r"\.done$").unwrap(), cb);
    store.set("todos", json!([{"id": 1, "done": false}])).unwrap();
    store.flush();
    store.set("todos[id=1].done", true).unwrap();
    store.flush();
    assert_eq!(*log.borrow(), vec!["todos[id=1].done"]);
}

#[test]
fn updates_future_drives_flush() {
    let store = Store::new();
    let (log, cb) = recorder();
    let _sub = store.observe("a", cb);

    pollster::block_on(store.updates());
    assert!(log.borrow().is_empty());

    store.set("a", 1).unwrap();
    let updates = store.updates();
    assert_eq!(store.state(), SchedulerState::Scheduled);
    pollster::block_on(updates);
    assert_eq!(*log.borrow(), vec!["a"]);
    assert_eq!(store.state(), SchedulerState::Idle);
}

#[test]
fn on_schedule_hook_fires_once_per_batch() {
    let store = Store::new();
    let scheduled = Rc::new(Cell::new(0));
    let s = Rc::clone(&scheduled);
    store.on_schedule(move || s.set(s.get() + 1));

    store.set("a", 1).unwrap();
    store.set("b", 2).unwrap();
    store.touch("c");
    assert_eq!(scheduled.get(), 1);
    store.flush();
    store.touch("a");
    assert_eq!(scheduled.get(), 2);
}

#[test]
fn noop_write_records_nothing() {
    let store = Store::with_root(json!({"a": {"b": [1, 2]}})).unwrap();
    assert!(!store.set("a", json!({"b": [1, 2]})).unwrap());
    assert!(!store.delete("missing").unwrap());
    assert!(store.pending().is_empty());
    assert_eq!(store.state(), SchedulerState::Idle);
}
