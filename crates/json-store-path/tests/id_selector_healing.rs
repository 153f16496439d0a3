use json_store_path::{resolve, set_by_path, IdIndex, Write};
use serde_json::{json, Value};

fn sort_by_id_desc(doc: &mut Value) {
    if let Some(arr) = doc.as_array_mut() {
        arr.sort_by(|a, b| b["id"].as_i64().cmp(&a["id"].as_i64()));
    }
}

#[test]
fn selector_survives_reorder() {
    let mut doc = json!([{"id": 1, "v": "one"}, {"id": 2, "v": "two"}]);
    let mut ids = IdIndex::new();

    assert_eq!(resolve(&doc, "[id=2]", &mut ids), Some(&json!({"id": 2, "v": "two"})));
    sort_by_id_desc(&mut doc);
    assert_eq!(resolve(&doc, "[id=2]", &mut ids), Some(&json!({"id": 2, "v": "two"})));
    assert_eq!(resolve(&doc, "[id=1].v", &mut ids), Some(&json!("one")));
}

#[test]
fn selector_survives_splice() {
    let mut doc = json!({"list": [{"id": "a"}, {"id": "b"}, {"id": "c"}]});
    let mut ids = IdIndex::new();

    assert_eq!(resolve(&doc, "list[id=c]", &mut ids), Some(&json!({"id": "c"})));
    doc["list"].as_array_mut().map(|arr| arr.remove(0));
    assert_eq!(resolve(&doc, "list[id=c]", &mut ids), Some(&json!({"id": "c"})));
    assert_eq!(resolve(&doc, "list[id=a]", &mut ids), None);
}

#[test]
fn selector_rebuilds_only_when_stale() {
    let mut doc = json!({"list": [{"id": 1}, {"id": 2}, {"id": 3}]});
    let mut ids = IdIndex::new();

    for _ in 0..5 {
        resolve(&doc, "list[id=3]", &mut ids);
    }
    assert_eq!(ids.rebuild_count(), 1);

    // Appending keeps existing positions valid.
    set_by_path(&mut doc, "list[id=4]", Write::Set(json!({"id": 4})), &mut ids).unwrap();
    let before = ids.rebuild_count();
    resolve(&doc, "list[id=3]", &mut ids);
    assert_eq!(ids.rebuild_count(), before);

    // Deleting the head shifts everything.
    set_by_path(&mut doc, "list[id=1]", Write::Delete, &mut ids).unwrap();
    assert_eq!(resolve(&doc, "list[id=3]", &mut ids), Some(&json!({"id": 3})));
    assert_eq!(ids.rebuild_count(), before + 1);
}

#[test]
fn selector_writes_after_replacement_of_whole_array() {
    let mut doc = json!({"list": [{"id": 1, "n": 0}, {"id": 2, "n": 0}]});
    let mut ids = IdIndex::new();

    set_by_path(&mut doc, "list[id=2].n", Write::Set(json!(1)), &mut ids).unwrap();
    doc["list"] = json!([{"id": 2, "n": 5}]);
    set_by_path(&mut doc, "list[id=2].n", Write::Set(json!(6)), &mut ids).unwrap();
    assert_eq!(doc["list"], json!([{"id": 2, "n": 6}]));
}

#[test]
fn auto_ids_are_assigned_on_write_paths() {
    let mut doc = json!({"rows": [{"x": 1}, {"x": 2}]});
    let mut ids = IdIndex::new();

    // Nothing matches the made-up id, so a seeded element is appended.
    set_by_path(&mut doc, "rows[_auto_=zz].x", Write::Set(json!(3)), &mut ids).unwrap();
    let rows = doc["rows"].as_array().cloned().unwrap_or_default();
    assert_eq!(rows.len(), 3);
    assert!(rows[0]["_auto_"].is_string());
    assert!(rows[1]["_auto_"].is_string());
    assert_eq!(rows[2], json!({"_auto_": "zz", "x": 3}));

    let generated = rows[1]["_auto_"].as_str().unwrap_or_default().to_string();
    let path = format!("rows[_auto_={generated}].x");
    assert_eq!(resolve(&doc, &path, &mut ids), Some(&json!(2)));
}
