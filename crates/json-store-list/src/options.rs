use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use json_store::truthy;
use serde::Deserialize;
use serde_json::Value;

use crate::ListError;

/// Timing and chunking defaults shared by list bindings.
///
/// ```
/// use json_store_list::ListConfig;
///
/// let config = ListConfig::from_toml_str("row_chunk_size = 4").unwrap();
/// assert_eq!(config.row_chunk_size, 4);
/// assert_eq!(config.scroll_debounce_ms, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ListConfig {
    /// Delay between the last scroll/resize event and the window refresh.
    pub scroll_debounce_ms: u64,
    /// Minimum spacing of needle-driven filter runs.
    pub needle_throttle_ms: u64,
    /// Rows of lookahead, and the alignment of the first rendered row, when
    /// [`VirtualOptions::row_chunk_size`] is unset.
    pub row_chunk_size: usize,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            scroll_debounce_ms: 16,
            needle_throttle_ms: 250,
            row_chunk_size: 1,
        }
    }
}

impl ListConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ListError> {
        Ok(toml::from_str(input)?)
    }

    pub fn scroll_debounce(&self) -> Duration {
        Duration::from_millis(self.scroll_debounce_ms)
    }

    pub fn needle_throttle(&self) -> Duration {
        Duration::from_millis(self.needle_throttle_ms)
    }
}

/// Fixed item geometry for virtual rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VirtualOptions {
    /// Item height in pixels.
    pub height: f64,
    /// Item width in pixels. Items tile into columns when set.
    pub width: Option<f64>,
    pub row_chunk_size: Option<usize>,
}

impl VirtualOptions {
    pub fn new(height: f64) -> Self {
        Self {
            height,
            width: None,
            row_chunk_size: None,
        }
    }

    pub fn with_width(mut self, width: f64) -> Self {
        self.width = Some(width);
        self
    }

    pub fn with_row_chunk_size(mut self, rows: usize) -> Self {
        self.row_chunk_size = Some(rows);
        self
    }
}

/// An array element offered to the filter, with its position in the array.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub index: usize,
    pub item: Value,
}

pub type FilterFn = Rc<dyn Fn(Vec<Candidate>, &Value) -> Vec<Candidate>>;

#[derive(Clone, Default)]
pub struct ListBindingOptions {
    /// Item field used as identity. Items are keyed by position without it.
    pub id_path: Option<String>,
    pub virtualized: Option<VirtualOptions>,
    /// Items whose field is truthy are hidden.
    pub hidden_prop: Option<String>,
    /// Only items whose field is truthy are shown.
    pub visible_prop: Option<String>,
    pub filter: Option<FilterFn>,
    /// Store path of the value passed to `filter`. Changes re-run the
    /// filter, throttled.
    pub needle: Option<String>,
    pub config: ListConfig,
}

impl fmt::Debug for ListBindingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListBindingOptions")
            .field("id_path", &self.id_path)
            .field("virtualized", &self.virtualized)
            .field("hidden_prop", &self.hidden_prop)
            .field("visible_prop", &self.visible_prop)
            .field("filter", &self.filter.is_some())
            .field("needle", &self.needle)
            .field("config", &self.config)
            .finish()
    }
}

impl ListBindingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id_path(mut self, id_path: impl Into<String>) -> Self {
        self.id_path = Some(id_path.into());
        self
    }

    pub fn virtualized(mut self, options: VirtualOptions) -> Self {
        self.virtualized = Some(options);
        self
    }

    pub fn with_hidden_prop(mut self, prop: impl Into<String>) -> Self {
        self.hidden_prop = Some(prop.into());
        self
    }

    pub fn with_visible_prop(mut self, prop: impl Into<String>) -> Self {
        self.visible_prop = Some(prop.into());
        self
    }

    pub fn with_filter(mut self, filter: impl Fn(Vec<Candidate>, &Value) -> Vec<Candidate> + 'static) -> Self {
        self.filter = Some(Rc::new(filter));
        self
    }

    pub fn with_needle(mut self, path: impl Into<String>) -> Self {
        self.needle = Some(path.into());
        self
    }

    pub fn with_config(mut self, config: ListConfig) -> Self {
        self.config = config;
        self
    }

    pub fn has_prop_filters(&self) -> bool {
        self.hidden_prop.is_some() || self.visible_prop.is_some()
    }

    pub fn row_chunk_size(&self) -> usize {
        self.virtualized
            .and_then(|v| v.row_chunk_size)
            .unwrap_or(self.config.row_chunk_size)
            .max(1)
    }

    /// Apply the prop filters and then the custom filter.
    pub fn filter_items(&self, items: &[Value], needle: &Value) -> Vec<Candidate> {
        let candidates: Vec<Candidate> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| self.passes_props(item))
            .map(|(index, item)| Candidate {
                index,
                item: item.clone(),
            })
            .collect();
        match &self.filter {
            Some(filter) => filter(candidates, needle),
            None => candidates,
        }
    }

    fn passes_props(&self, item: &Value) -> bool {
        let field = |prop: &str| item.get(prop).is_some_and(truthy);
        if self.hidden_prop.as_deref().is_some_and(field) {
            return false;
        }
        match self.visible_prop.as_deref() {
            Some(prop) => field(prop),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prop_filters() {
        let items = vec![
            json!({"n": 0, "hidden": true, "shown": true}),
            json!({"n": 1, "shown": true}),
            json!({"n": 2, "shown": false}),
        ];
        let options = ListBindingOptions::new()
            .with_hidden_prop("hidden")
            .with_visible_prop("shown");
        let kept: Vec<usize> = options
            .filter_items(&items, &Value::Null)
            .iter()
            .map(|c| c.index)
            .collect();
        assert_eq!(kept, vec![1]);
    }

    #[test]
    fn test_custom_filter_sees_needle() {
        let items = vec![json!("apple"), json!("banana"), json!("cherry")];
        let options = ListBindingOptions::new().with_filter(|candidates, needle| {
            let needle = needle.as_str().unwrap_or_default().to_string();
            candidates
                .into_iter()
                .filter(|c| c.item.as_str().is_some_and(|s| s.contains(&needle)))
                .collect()
        });
        let kept: Vec<usize> = options
            .filter_items(&items, &json!("an"))
            .iter()
            .map(|c| c.index)
            .collect();
        assert_eq!(kept, vec![1]);
    }

    #[test]
    fn test_row_chunk_size_precedence() {
        let options = ListBindingOptions::new();
        assert_eq!(options.row_chunk_size(), 1);
        let options = options.with_config(ListConfig {
            row_chunk_size: 3,
            ..ListConfig::default()
        });
        assert_eq!(options.row_chunk_size(), 3);
        let options = options.virtualized(VirtualOptions::new(20.0).with_row_chunk_size(0));
        assert_eq!(options.row_chunk_size(), 1);
    }
}
