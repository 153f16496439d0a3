//! Keyed list reconciliation.
//!
//! A [`ListBinding`] owns the children of one container element. The
//! container's single child (or the single element inside a `<template>`
//! child) is taken out and used as the item template. Two sentinel `div`s
//! bracket the rendered items; in virtual mode their heights stand in for
//! the items above and below the window.
//!
//! Each rendered item is keyed by its id (`id_path`) or, without one, by
//! its array index. Binding records on the template whose paths start with
//! `^` are rewritten to address the item, so `^.title` on the item for id
//! `7` of `todos` binds `todos[id=7].title`.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use json_store::{
    Debounce, Disposition, Element, EventListenerId, ListenerError, NodeId, PathTest, Store, StoreError,
    Subscription, Throttle, WeakStore,
};
use json_store_path::{id_string, join_path, parse_path, validate_path, Segment, AUTO_ID};
use serde_json::Value;
use tracing::{debug, trace, warn};
use web_time::Instant;

use crate::options::{Candidate, ListBindingOptions};
use crate::window::{virtual_window, Geometry, Window};
use crate::ListError;

/// Identity of a rendered item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemKey {
    Id(String),
    Index(usize),
}

/// What one update did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// The window was unchanged and no element work was done.
    pub skipped: bool,
    pub created: usize,
    pub released: usize,
    pub moved: usize,
    /// Items rendered after the update.
    pub rendered: usize,
}

#[derive(Debug, Clone, PartialEq)]
struct WindowSnapshot {
    start: usize,
    end: usize,
    keys: Vec<ItemKey>,
}

struct ListState {
    store: WeakStore,
    container: Element,
    array_path: String,
    template: Element,
    top: Element,
    bottom: Element,
    options: ListBindingOptions,
    rendered: IndexMap<ItemKey, Element>,
    owners: HashMap<NodeId, ItemKey>,
    snapshot: Option<WindowSnapshot>,
    window: Window,
    render_count: u64,
    subscriptions: Vec<Subscription>,
    listeners: Vec<EventListenerId>,
    scroll: Option<Rc<Debounce>>,
    needle: Option<Rc<Throttle>>,
}

impl Drop for ListState {
    fn drop(&mut self) {
        self.template.release();
    }
}

/// A live list rendering of a store array into a container element.
///
/// Cloning gives another handle to the same binding. The container keeps
/// the binding alive; releasing the container ends it.
#[derive(Clone)]
pub struct ListBinding {
    state: Rc<RefCell<ListState>>,
}

impl fmt::Debug for ListBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.try_borrow() {
            Ok(state) => f
                .debug_struct("ListBinding")
                .field("array_path", &state.array_path)
                .field("rendered", &state.rendered.len())
                .field("window", &state.window)
                .finish(),
            Err(_) => f.write_str("ListBinding { <updating> }"),
        }
    }
}

impl ListBinding {
    /// Bind the array at `array_path` to `container` and render it.
    ///
    /// # Errors
    ///
    /// - [`ListError::ContainerShape`] unless `container` has exactly one
    ///   child.
    /// - [`ListError::TemplateShape`] when that child is a `<template>`
    ///   without exactly one child of its own.
    /// - Relative or malformed `array_path`.
    /// - Any error from the first render. The container is then left with
    ///   a copy of the template as its only child.
    pub fn new(
        store: &Store,
        container: &Element,
        array_path: &str,
        options: ListBindingOptions,
    ) -> Result<Self, ListError> {
        if array_path.starts_with('^') {
            return Err(StoreError::RelativePath(array_path.to_string()).into());
        }
        validate_path(array_path)?;
        if let Some(needle) = &options.needle {
            validate_path(needle)?;
        }
        let template = take_template(container)?;

        let dom = container.dom();
        let top = sentinel(&dom.create_element("div"), "top");
        let bottom = sentinel(&dom.create_element("div"), "bottom");
        container.append_child(&top);
        container.append_child(&bottom);

        let binding = ListBinding {
            state: Rc::new(RefCell::new(ListState {
                store: store.downgrade(),
                container: container.clone(),
                array_path: array_path.to_string(),
                template,
                top,
                bottom,
                options,
                rendered: IndexMap::new(),
                owners: HashMap::new(),
                snapshot: None,
                window: Window::full(0),
                render_count: 0,
                subscriptions: Vec::new(),
                listeners: Vec::new(),
                scroll: None,
                needle: None,
            })),
        };
        binding.wire(store);
        container.attach(Rc::new(binding.clone()));
        if let Err(err) = binding.update() {
            binding.unwind();
            return Err(err);
        }
        debug!(store = %store.label(), path = array_path, "list bound");
        Ok(binding)
    }

    fn unwind(&self) {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        state.container.detach_all::<ListBinding>();
        for id in state.listeners.drain(..) {
            state.container.remove_event_listener(id);
        }
        state.subscriptions.clear();
        state.scroll = None;
        state.needle = None;
        for (_, el) in state.rendered.drain(..) {
            el.release();
        }
        state.owners.clear();
        state.top.release();
        state.bottom.release();
        if let Some(copy) = state.template.clone_node(true) {
            state.container.append_child(&copy);
        }
    }

    fn wire(&self, store: &Store) {
        let mut state = self.state.borrow_mut();
        let config = state.options.config.clone();

        let weak = Rc::downgrade(&self.state);
        let array = store.observe(PathTest::prefix(state.array_path.as_str()), move |_: &str| {
            refresh_from_listener(&weak)
        });
        state.subscriptions.push(array);

        if state.options.virtualized.is_some() {
            let weak = Rc::downgrade(&self.state);
            let debounce = Rc::new(Debounce::new(store.timers(), config.scroll_debounce(), move || {
                refresh_logged(&weak)
            }));
            for kind in ["scroll", "resize"] {
                let debounce = Rc::downgrade(&debounce);
                let id = state.container.add_event_listener(kind, move |event| {
                    if let Some(debounce) = debounce.upgrade() {
                        debounce.trigger(event.time_stamp);
                    }
                });
                state.listeners.push(id);
            }
            state.scroll = Some(debounce);
        }

        if let Some(needle_path) = state.options.needle.clone() {
            let weak = Rc::downgrade(&self.state);
            let throttle = Rc::new(Throttle::new(store.timers(), config.needle_throttle(), move || {
                refresh_logged(&weak)
            }));
            let handle = Rc::downgrade(&throttle);
            let needle = store.observe(PathTest::prefix(needle_path), move |_: &str| match handle.upgrade() {
                Some(throttle) => {
                    throttle.trigger(Instant::now());
                    Disposition::Keep
                }
                None => Disposition::Remove,
            });
            state.subscriptions.push(needle);
            state.needle = Some(throttle);
        }
    }

    /// Re-read the array, filter it and reconcile the rendered items.
    pub fn update(&self) -> Result<UpdateReport, ListError> {
        self.refresh(None)
    }

    /// Render exactly the array elements at `indices`, in that order,
    /// without applying any filter.
    pub fn update_slice(&self, indices: &[usize]) -> Result<UpdateReport, ListError> {
        self.refresh(Some(indices))
    }

    fn refresh(&self, slice: Option<&[usize]>) -> Result<UpdateReport, ListError> {
        let mut state = self.state.try_borrow_mut().map_err(|_| ListError::Reentrant)?;
        let Some(store) = state.store.upgrade() else {
            return Ok(UpdateReport {
                skipped: true,
                rendered: state.rendered.len(),
                ..UpdateReport::default()
            });
        };
        if state.options.id_path.as_deref() == Some(AUTO_ID) {
            match store.assign_auto_ids(&state.array_path) {
                Ok(_) | Err(StoreError::NotAnArray(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        let items = match store.get(&state.array_path) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };
        let candidates = match slice {
            Some(indices) => indices
                .iter()
                .filter_map(|&index| {
                    items.get(index).map(|item| Candidate {
                        index,
                        item: item.clone(),
                    })
                })
                .collect(),
            None => {
                let needle = match &state.options.needle {
                    Some(path) => store.get(path).unwrap_or(Value::Null),
                    None => Value::Null,
                };
                state.options.filter_items(&items, &needle)
            }
        };
        state.reconcile(&store, &candidates)
    }

    pub fn store(&self) -> Option<Store> {
        self.state.borrow().store.upgrade()
    }

    pub fn container(&self) -> Element {
        self.state.borrow().container.clone()
    }

    pub fn array_path(&self) -> String {
        self.state.borrow().array_path.clone()
    }

    pub fn id_path(&self) -> Option<String> {
        self.state.borrow().options.id_path.clone()
    }

    /// Number of rendered item elements.
    pub fn rendered_count(&self) -> usize {
        self.state.borrow().rendered.len()
    }

    /// Rendered item elements in document order.
    pub fn rendered_elements(&self) -> Vec<Element> {
        self.state.borrow().rendered.values().cloned().collect()
    }

    /// Updates that did element work.
    pub fn render_count(&self) -> u64 {
        self.state.borrow().render_count
    }

    pub fn window(&self) -> Window {
        self.state.borrow().window
    }

    /// Key of `el` when it is one of this list's item elements.
    pub fn key_of(&self, el: &Element) -> Option<ItemKey> {
        let state = self.state.borrow();
        if !state.container.dom().ptr_eq(el.dom()) {
            return None;
        }
        state.owners.get(&el.id()).cloned()
    }

    /// Store path of the item rendered under `key`.
    pub fn item_path(&self, key: &ItemKey) -> String {
        self.state.borrow().item_path(key)
    }
}

fn refresh_from_listener(weak: &Weak<RefCell<ListState>>) -> Result<Disposition, ListenerError> {
    let Some(state) = weak.upgrade() else {
        return Ok(Disposition::Remove);
    };
    ListBinding { state }
        .update()
        .map(|_| Disposition::Keep)
        .map_err(|err| ListenerError::new(err.to_string()))
}

fn refresh_logged(weak: &Weak<RefCell<ListState>>) {
    if let Some(state) = weak.upgrade() {
        if let Err(err) = (ListBinding { state }).update() {
            warn!(error = %err, "list refresh failed");
        }
    }
}

fn take_template(container: &Element) -> Result<Element, ListError> {
    let children = container.children();
    let [child] = children.as_slice() else {
        return Err(ListError::ContainerShape(children.len()));
    };
    if child.tag() != "template" {
        child.remove();
        return Ok(child.clone());
    }
    let inner = child.children();
    let [template] = inner.as_slice() else {
        return Err(ListError::TemplateShape(inner.len()));
    };
    template.remove();
    child.release();
    Ok(template.clone())
}

fn sentinel(el: &Element, edge: &str) -> Element {
    el.set_attribute("data-list-sentinel", edge);
    el.set_style("height", "0px");
    el.clone()
}

fn px(value: f64) -> String {
    format!("{value}px")
}

impl ListState {
    fn item_path(&self, key: &ItemKey) -> String {
        let segment = match (key, &self.options.id_path) {
            (ItemKey::Id(id), Some(prop)) => Segment::select(prop.as_str(), id.as_str()),
            (ItemKey::Id(_), None) => return self.array_path.clone(),
            (ItemKey::Index(index), _) => Segment::Index(*index),
        };
        join_path(&self.array_path, &segment.to_string())
    }

    /// Ids that are missing, repeated or not expressible in a selector
    /// fall back to the item's index.
    fn keys_for(&self, candidates: &[Candidate]) -> Vec<ItemKey> {
        let Some(prop) = &self.options.id_path else {
            return candidates.iter().map(|c| ItemKey::Index(c.index)).collect();
        };
        let mut seen = HashSet::new();
        candidates
            .iter()
            .map(|c| {
                c.item
                    .get(prop)
                    .and_then(id_string)
                    .filter(|id| self.addressable(prop, id) && seen.insert(id.clone()))
                    .map_or(ItemKey::Index(c.index), ItemKey::Id)
            })
            .collect()
    }

    fn addressable(&self, prop: &str, id: &str) -> bool {
        let segment = Segment::select(prop, id);
        let text = segment.to_string();
        parse_path(&text).is_ok_and(|parsed| parsed == [segment])
            && validate_path(&join_path(&self.array_path, &text)).is_ok()
    }

    fn set_buffers(&self, window: &Window) {
        self.top.set_style("height", &px(window.top_buffer));
        self.bottom.set_style("height", &px(window.bottom_buffer));
    }

    fn reconcile(&mut self, store: &Store, candidates: &[Candidate]) -> Result<UpdateReport, ListError> {
        let window = match &self.options.virtualized {
            Some(virt) => virtual_window(
                candidates.len(),
                virt,
                self.options.row_chunk_size(),
                Geometry::read(&self.container),
            ),
            None => Window::full(candidates.len()),
        };
        let visible = &candidates[window.start..window.end];
        let snapshot = WindowSnapshot {
            start: window.start,
            end: window.end,
            keys: self.keys_for(visible),
        };
        self.window = window;
        self.set_buffers(&window);

        if !self.options.has_prop_filters() && self.snapshot.as_ref() == Some(&snapshot) {
            trace!(path = %self.array_path, "list window unchanged");
            return Ok(UpdateReport {
                skipped: true,
                rendered: self.rendered.len(),
                ..UpdateReport::default()
            });
        }

        let mut report = UpdateReport::default();
        let wanted: HashSet<&ItemKey> = snapshot.keys.iter().collect();
        let leaving: Vec<ItemKey> = self.rendered.keys().filter(|k| !wanted.contains(k)).cloned().collect();
        for key in leaving {
            if let Some(el) = self.rendered.shift_remove(&key) {
                self.owners.remove(&el.id());
                el.release();
                report.released += 1;
            }
        }
        for child in self.container.children() {
            if child == self.top || child == self.bottom || self.owners.contains_key(&child.id()) {
                continue;
            }
            child.release();
            report.released += 1;
        }

        let mut next = IndexMap::with_capacity(snapshot.keys.len());
        for key in &snapshot.keys {
            let el = match self.rendered.shift_remove(key) {
                Some(el) if el.is_alive() => el,
                stale => {
                    if let Some(el) = stale {
                        self.owners.remove(&el.id());
                    }
                    match self.instantiate(store, key) {
                        Ok(el) => {
                            report.created += 1;
                            el
                        }
                        Err(err) => {
                            self.restore(next);
                            return Err(err);
                        }
                    }
                }
            };
            self.owners.insert(el.id(), key.clone());
            next.insert(key.clone(), el);
        }

        // One forward pass over the current order. An element either sits
        // at the cursor already or is moved in front of it.
        let current: Vec<NodeId> = self
            .container
            .children()
            .iter()
            .map(Element::id)
            .filter(|&id| id != self.top.id() && id != self.bottom.id())
            .collect();
        let dom = self.container.dom().clone();
        let mut moved = HashSet::new();
        let mut cursor = 0;
        let mut inserted: usize = 0;
        for el in next.values() {
            while current.get(cursor).is_some_and(|id| moved.contains(id)) {
                cursor += 1;
            }
            if current.get(cursor) == Some(&el.id()) {
                cursor += 1;
                continue;
            }
            let reference = match current.get(cursor) {
                Some(&id) => dom.element(id),
                None => Some(self.bottom.clone()),
            };
            self.container.insert_before(el, reference.as_ref());
            moved.insert(el.id());
            inserted += 1;
        }
        report.moved = inserted.saturating_sub(report.created);
        report.rendered = next.len();

        self.rendered = next;
        self.snapshot = Some(snapshot);
        self.render_count += 1;
        debug!(
            path = %self.array_path,
            start = window.start,
            end = window.end,
            created = report.created,
            released = report.released,
            moved = report.moved,
            "list reconciled"
        );
        Ok(report)
    }

    /// Put back what a failed reconcile took out of `rendered`. Fresh
    /// elements that never reached the container are released.
    fn restore(&mut self, next: IndexMap<ItemKey, Element>) {
        for (key, el) in next {
            if el.parent().as_ref() == Some(&self.container) {
                self.rendered.insert(key, el);
            } else {
                self.owners.remove(&el.id());
                el.release();
            }
        }
        self.snapshot = None;
    }

    fn instantiate(&self, store: &Store, key: &ItemKey) -> Result<Element, ListError> {
        let el = self.template.clone_node(true).ok_or(ListError::TemplateShape(0))?;
        let item_path = self.item_path(key);
        let mut nodes = vec![el.clone()];
        nodes.extend(el.descendants());
        let bound = nodes.iter().try_for_each(|node| {
            node.binding_records()
                .iter()
                .try_for_each(|record| record.resolve_relative(&item_path).apply(store, node))
        });
        if let Err(err) = bound {
            el.release();
            return Err(err.into());
        }
        Ok(el)
    }
}
