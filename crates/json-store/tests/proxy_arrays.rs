use std::cell::Cell;
use std::rc::Rc;

use json_store::{Member, Store};
use serde_json::{json, Value};

fn counting(store: &Store, path: &str) -> (Rc<Cell<u32>>, json_store::Subscription) {
    let count = Rc::new(Cell::new(0));
    let sink = Rc::clone(&count);
    let sub = store.observe(path, move |_: &str| sink.set(sink.get() + 1));
    (count, sub)
}

#[test]
fn each_array_method_notifies_once() {
    let store = Store::with_root(json!({"list": [3, 1, 2]})).unwrap();
    let list = store.at("list");
    let (count, _sub) = counting(&store, "list");

    list.push(4).unwrap();
    store.flush();
    list.sort_by(|a, b| a.as_i64().cmp(&b.as_i64())).unwrap();
    store.flush();
    list.reverse().unwrap();
    store.flush();
    list.splice(1, 2, Vec::<Value>::new()).unwrap();
    store.flush();

    assert_eq!(count.get(), 4);
    assert_eq!(list.value(), Some(json!([4, 1])));
}

#[test]
fn arguments_are_unwrapped() {
    let store = Store::with_root(json!({"template": {"title": "new"}, "list": []})).unwrap();
    let template = store.at("template");
    store.at("list").push(&template).unwrap();
    store.at("list").unshift(template).unwrap();
    assert_eq!(store.get("list"), Some(json!([{"title": "new"}, {"title": "new"}])));
}

#[test]
fn edge_operations() {
    let store = Store::with_root(json!({"list": []})).unwrap();
    let list = store.at("list");
    assert_eq!(list.pop().unwrap(), None);
    assert_eq!(list.shift().unwrap(), None);
    list.insert(10, "end").unwrap();
    list.insert(0, "start").unwrap();
    assert_eq!(list.remove(5).unwrap(), None);
    assert_eq!(list.value(), Some(json!(["start", "end"])));
    list.truncate(1).unwrap();
    assert_eq!(list.value(), Some(json!(["start"])));
}

#[test]
fn selector_proxies_follow_items_after_sort() {
    let store = Store::with_root(json!({"todos": [
        {"id": "a", "title": "first"},
        {"id": "b", "title": "second"}
    ]}))
    .unwrap();
    let todos = store.at("todos");
    let b_title = todos.select("id", "b").child("title");
    assert_eq!(b_title.value(), Some(json!("second")));

    todos.reverse().unwrap();
    assert_eq!(b_title.value(), Some(json!("second")));
    b_title.replace("renamed").unwrap();
    assert_eq!(store.get("todos[0].title"), Some(json!("renamed")));
}

#[test]
fn boxed_members_carry_paths() {
    let store = Store::with_root(json!({"todos": [{"id": 1, "done": false}]})).unwrap();
    let done = store
        .boxed_at("todos")
        .get("[id=1].done")
        .and_then(Member::into_node);
    let done = done.unwrap();
    assert_eq!(done.path(), "todos[id=1].done");
    done.replace(true).unwrap();
    assert_eq!(store.pending(), vec!["todos[id=1].done"]);
}

#[test]
fn proxy_observe_and_delete() {
    let store = Store::with_root(json!({"user": {"name": "ada", "age": 36}})).unwrap();
    let user = store.at("user");
    let (count, _sub) = counting(&store, "user");
    let heard = Rc::new(Cell::new(0));
    let h = Rc::clone(&heard);
    let _own = user.child("age").observe(move |_: &str| h.set(h.get() + 1));

    assert!(user.delete("age").unwrap());
    assert!(!user.delete("age").unwrap());
    store.flush();
    assert_eq!(count.get(), 1);
    assert_eq!(heard.get(), 1);
    assert_eq!(user.value(), Some(json!({"name": "ada"})));
}
