//! Element bindings and the handler registry types.
//!
//! A [`Binding`] says how a store value reaches an element (`to_dom`) and,
//! optionally, how an element's state is written back (`from_dom`).
//! [`bind`] wires one up: the value is applied immediately, re-applied
//! whenever an overlapping path is flushed, and written back on the
//! element events listed in [`BindOptions::events`].

use std::fmt;
use std::rc::Rc;

use json_store_path::{join_path, validate_path};
use serde_json::Value;

use crate::dom::{Element, Event};
use crate::error::{ListenerError, StoreError};
use crate::scheduler::PathTest;
use crate::store::Store;

pub type ToDom = Rc<dyn Fn(&Element, &Value, &BindOptions)>;
pub type FromDom = Rc<dyn Fn(&Element, &BindOptions) -> Option<Value>>;

/// What made a handler run.
#[derive(Debug, Clone, Copy)]
pub enum Trigger<'a> {
    /// A flushed path matched the handler's observer.
    Change(&'a str),
    /// An element event wired with [`Proxy::on`](crate::Proxy::on).
    Event(&'a Event),
}

/// A callable stored in the store's handler registry.
pub type Handler = Rc<dyn Fn(&Store, Trigger<'_>) -> Result<(), ListenerError>>;

#[derive(Clone)]
pub struct Binding {
    name: String,
    to_dom: Option<ToDom>,
    from_dom: Option<FromDom>,
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("name", &self.name)
            .field("to_dom", &self.to_dom.is_some())
            .field("from_dom", &self.from_dom.is_some())
            .finish()
    }
}

impl Binding {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            to_dom: None,
            from_dom: None,
        }
    }

    pub fn with_to_dom(mut self, f: impl Fn(&Element, &Value, &BindOptions) + 'static) -> Self {
        self.to_dom = Some(Rc::new(f));
        self
    }

    pub fn with_from_dom(
        mut self,
        f: impl Fn(&Element, &BindOptions) -> Option<Value> + 'static,
    ) -> Self {
        self.from_dom = Some(Rc::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn to_dom(&self) -> Option<&ToDom> {
        self.to_dom.as_ref()
    }

    pub fn from_dom(&self) -> Option<&FromDom> {
        self.from_dom.as_ref()
    }

    /// Text content.
    pub fn text() -> Self {
        Self::new("text").with_to_dom(|el, value, _| el.set_text_content(&display_value(value)))
    }

    /// The `value` property, written back on input.
    pub fn value() -> Self {
        Self::new("value")
            .with_to_dom(|el, value, _| el.set_property("value", value.clone()))
            .with_from_dom(|el, _| el.property("value"))
    }

    /// Clears the `disabled` attribute when the value is truthy.
    pub fn enabled() -> Self {
        Self::new("enabled").with_to_dom(|el, value, _| set_disabled(el, !truthy(value)))
    }

    /// Sets the `disabled` attribute when the value is truthy.
    pub fn disabled() -> Self {
        Self::new("disabled").with_to_dom(|el, value, _| set_disabled(el, truthy(value)))
    }

    /// A named attribute; `null` removes it.
    pub fn attribute(name: &str) -> Self {
        let attr = name.to_string();
        Self::new(format!("attr:{name}")).with_to_dom(move |el, value, _| match value {
            Value::Null => el.remove_attribute(&attr),
            other => el.set_attribute(&attr, &display_value(other)),
        })
    }
}

fn set_disabled(el: &Element, disabled: bool) {
    if disabled {
        el.set_attribute("disabled", "");
    } else {
        el.remove_attribute("disabled");
    }
}

/// Text form of a value: strings verbatim, `null` empty, the rest as JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BindOptions {
    /// Element events that trigger `from_dom` write-back.
    pub events: Vec<String>,
}

impl Default for BindOptions {
    fn default() -> Self {
        Self {
            events: vec!["input".to_string(), "change".to_string()],
        }
    }
}

/// A binding declared on a template element. Paths starting with `^` are
/// relative to the list item the element is rendered for.
#[derive(Debug, Clone)]
pub struct BindingRecord {
    pub path: String,
    pub binding: Binding,
    pub options: BindOptions,
}

impl BindingRecord {
    pub fn new(path: impl Into<String>, binding: Binding) -> Self {
        Self {
            path: path.into(),
            binding,
            options: BindOptions::default(),
        }
    }

    pub fn with_options(mut self, options: BindOptions) -> Self {
        self.options = options;
        self
    }

    pub fn is_relative(&self) -> bool {
        self.path.starts_with('^')
    }

    /// Rewrite a relative path against `item_path`: `^` is the item itself,
    /// `^.title` and `^[0]` address inside it.
    ///
    /// ```
    /// use json_store::{Binding, BindingRecord};
    ///
    /// let record = BindingRecord::new("^.title", Binding::text());
    /// assert_eq!(record.resolve_relative("todos[id=4]").path, "todos[id=4].title");
    /// let record = BindingRecord::new("^", Binding::text());
    /// assert_eq!(record.resolve_relative("todos[2]").path, "todos[2]");
    /// ```
    pub fn resolve_relative(&self, item_path: &str) -> BindingRecord {
        let Some(rest) = self.path.strip_prefix('^') else {
            return self.clone();
        };
        let rest = rest.strip_prefix('.').unwrap_or(rest);
        BindingRecord {
            path: join_path(item_path, rest),
            ..self.clone()
        }
    }

    /// Bind this record to `el`.
    pub fn apply(&self, store: &Store, el: &Element) -> Result<(), StoreError> {
        bind(store, el, &self.path, self.binding.clone(), self.options.clone())
    }
}

/// Bind `path` to `el`.
///
/// The subscription lives in an attachment on `el`, so releasing the
/// element ends the binding.
///
/// # Errors
///
/// Relative (`^`) paths and malformed paths.
pub fn bind(
    store: &Store,
    el: &Element,
    path: &str,
    binding: Binding,
    options: BindOptions,
) -> Result<(), StoreError> {
    if path.starts_with('^') {
        return Err(StoreError::RelativePath(path.to_string()));
    }
    validate_path(path)?;
    let options = Rc::new(options);

    if let Some(to_dom) = binding.to_dom.clone() {
        let value = store.get(path).unwrap_or(Value::Null);
        to_dom(el, &value, &*options);

        let weak = store.downgrade();
        let target = el.clone();
        let watched = path.to_string();
        let opts = Rc::clone(&options);
        let subscription = store.observe(PathTest::prefix(path), move |_: &str| {
            if let Some(store) = weak.upgrade() {
                let value = store.get(&watched).unwrap_or(Value::Null);
                to_dom(&target, &value, &*opts);
            }
        });
        el.attach(Rc::new(subscription));
    }

    if let Some(from_dom) = binding.from_dom.clone() {
        for event_type in &options.events {
            let weak = store.downgrade();
            let target_path = path.to_string();
            let from_dom = Rc::clone(&from_dom);
            let opts = Rc::clone(&options);
            el.add_event_listener(event_type, move |event| {
                let (Some(store), Some(value)) = (weak.upgrade(), from_dom(&event.target, &*opts)) else {
                    return;
                };
                if let Err(err) = store.set(&target_path, value) {
                    tracing::warn!(store = %store.label(), path = %target_path, error = %err, "binding write-back failed");
                }
            });
        }
    }
    Ok(())
}

/// Run the handler stored at `handler_path` whenever `el` dispatches
/// `event_type`. The handler is looked up at dispatch time, so replacing it
/// in the registry takes effect immediately.
pub fn on(store: &Store, el: &Element, handler_path: &str, event_type: &str) -> Result<(), StoreError> {
    if store.handler(handler_path).is_none() {
        return Err(StoreError::NotAHandler(handler_path.to_string()));
    }
    let weak = store.downgrade();
    let handler_path = handler_path.to_string();
    el.add_event_listener(event_type, move |event| {
        let Some(store) = weak.upgrade() else {
            return;
        };
        match store.handler(&handler_path) {
            Some(handler) => {
                if let Err(err) = handler(&store, Trigger::Event(event)) {
                    tracing::warn!(store = %store.label(), handler = %handler_path, error = %err, "event handler failed");
                }
            }
            None => {
                tracing::warn!(store = %store.label(), handler = %handler_path, "event handler was removed");
            }
        }
    });
    Ok(())
}
