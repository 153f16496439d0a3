//! Per-array id → position cache backing `[prop=value]` segments.

use std::collections::HashMap;

use serde_json::Value;
use web_time::{SystemTime, UNIX_EPOCH};

/// Id field whose values are generated for items that lack one.
pub const AUTO_ID: &str = "_auto_";

/// Stringify a scalar id value the way selector text is compared.
///
/// Strings compare verbatim, numbers and booleans by their JSON text.
/// Other values never match a selector.
///
/// ```
/// use json_store_path::id_string;
/// use serde_json::json;
///
/// assert_eq!(id_string(&json!("a7")), Some("a7".to_string()));
/// assert_eq!(id_string(&json!(17)), Some("17".to_string()));
/// assert_eq!(id_string(&json!({"x": 1})), None);
/// ```
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn item_matches(item: Option<&Value>, prop: &str, value: &str) -> bool {
    item.and_then(|item| item.get(prop))
        .and_then(id_string)
        .is_some_and(|id| id == value)
}

type IndexKey = (String, String);

/// Cache of id value → last-known index, keyed by (array path, id field).
///
/// Arrays are identified by their concrete path (index segments only), so
/// a cache entry may describe an array that has since been replaced,
/// sorted or spliced. Every hit is verified against the live array; a
/// failed verification rebuilds that array's whole index before a single
/// retry.
#[derive(Debug, Default)]
pub struct IdIndex {
    entries: HashMap<IndexKey, HashMap<String, usize>>,
    rebuilds: u64,
    auto: AutoIds,
}

impl IdIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the position of the first item in `items` whose `prop` equals
    /// `value`.
    pub fn lookup(&mut self, array_path: &str, prop: &str, value: &str, items: &[Value]) -> Option<usize> {
        let key = (array_path.to_string(), prop.to_string());
        if let Some(&idx) = self.entries.get(&key).and_then(|index| index.get(value)) {
            if item_matches(items.get(idx), prop, value) {
                return Some(idx);
            }
        }
        self.rebuild(key, items).get(value).copied()
    }

    /// Like [`lookup`](Self::lookup), but first assigns generated ids when
    /// `prop` is [`AUTO_ID`].
    pub fn lookup_mut(
        &mut self,
        array_path: &str,
        prop: &str,
        value: &str,
        items: &mut [Value],
    ) -> Option<usize> {
        if prop == AUTO_ID {
            self.assign_auto_ids(items);
        }
        self.lookup(array_path, prop, value, items)
    }

    /// Give every object item lacking an [`AUTO_ID`] field a generated id.
    ///
    /// Returns the number of ids assigned. Generated ids are unique within
    /// this index's lifetime only.
    pub fn assign_auto_ids(&mut self, items: &mut [Value]) -> usize {
        let mut assigned = 0;
        for item in items.iter_mut() {
            if let Value::Object(map) = item {
                if !map.contains_key(AUTO_ID) {
                    map.insert(AUTO_ID.to_string(), Value::String(self.auto.next_id()));
                    assigned += 1;
                }
            }
        }
        assigned
    }

    /// Drop cached entries for `array_path` and every array nested inside it.
    pub fn invalidate(&mut self, array_path: &str) {
        self.entries
            .retain(|(path, _), _| !crate::util::is_path_prefix(array_path, path));
    }

    /// Drop cached entries for arrays nested inside the elements of
    /// `array_path`, keeping the entry for `array_path` itself.
    pub fn invalidate_below(&mut self, array_path: &str) {
        self.entries
            .retain(|(path, _), _| path == array_path || !crate::util::is_path_prefix(array_path, path));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of full index rebuilds performed so far.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn rebuild(&mut self, key: IndexKey, items: &[Value]) -> &HashMap<String, usize> {
        let mut index = HashMap::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            if let Some(id) = item.get(&key.1).and_then(id_string) {
                index.entry(id).or_insert(i);
            }
        }
        self.rebuilds += 1;
        tracing::trace!(array = %key.0, prop = %key.1, entries = index.len(), "rebuilt id index");
        self.entries.insert(key.clone(), index);
        &self.entries[&key]
    }
}

/// Generator for [`AUTO_ID`] values: a creation-time prefix plus a counter.
#[derive(Debug)]
struct AutoIds {
    prefix: String,
    counter: u64,
}

impl Default for AutoIds {
    fn default() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            prefix: to_base36(millis),
            counter: 0,
        }
    }
}

impl AutoIds {
    fn next_id(&mut self) -> String {
        self.counter += 1;
        format!("{}-{}", self.prefix, to_base36(self.counter))
    }
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_hits_cache_after_first_build() {
        let items = vec![json!({"id": 1}), json!({"id": 2})];
        let mut index = IdIndex::new();
        assert_eq!(index.lookup("list", "id", "2", &items), Some(1));
        assert_eq!(index.rebuild_count(), 1);
        assert_eq!(index.lookup("list", "id", "2", &items), Some(1));
        assert_eq!(index.rebuild_count(), 1);
    }

    #[test]
    fn test_lookup_heals_after_reorder() {
        let mut items = vec![json!({"id": 1}), json!({"id": 2})];
        let mut index = IdIndex::new();
        assert_eq!(index.lookup("list", "id", "2", &items), Some(1));
        items.reverse();
        assert_eq!(index.lookup("list", "id", "2", &items), Some(0));
        assert_eq!(index.rebuild_count(), 2);
    }

    #[test]
    fn test_lookup_missing_id() {
        let items = vec![json!({"id": 1}), json!("scalar"), json!({"name": "x"})];
        let mut index = IdIndex::new();
        assert_eq!(index.lookup("list", "id", "9", &items), None);
    }

    #[test]
    fn test_duplicate_ids_resolve_to_first() {
        let items = vec![json!({"id": "a", "n": 0}), json!({"id": "a", "n": 1})];
        let mut index = IdIndex::new();
        assert_eq!(index.lookup("", "id", "a", &items), Some(0));
    }

    #[test]
    fn test_assign_auto_ids_skips_existing() {
        let mut items = vec![json!({"_auto_": "keep"}), json!({}), json!(3), json!({})];
        let mut index = IdIndex::new();
        assert_eq!(index.assign_auto_ids(&mut items), 2);
        assert_eq!(items[0]["_auto_"], json!("keep"));
        assert_ne!(items[1]["_auto_"], items[3]["_auto_"]);
        assert_eq!(index.assign_auto_ids(&mut items), 0);
    }

    #[test]
    fn test_invalidate_nested() {
        let items = vec![json!({"id": 1})];
        let mut index = IdIndex::new();
        index.lookup("a", "id", "1", &items);
        index.lookup("a[0].b", "id", "1", &items);
        index.lookup("ab", "id", "1", &items);
        index.invalidate("a");
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_invalidate_below_keeps_the_array_itself() {
        let items = vec![json!({"id": 1})];
        let mut index = IdIndex::new();
        index.lookup("a", "id", "1", &items);
        index.lookup("a[0].b", "id", "1", &items);
        index.invalidate_below("a");
        assert_eq!(index.len(), 1);
        assert_eq!(index.lookup("a", "id", "1", &items), Some(0));
        assert_eq!(index.rebuild_count(), 2);
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }
}
