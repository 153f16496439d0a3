//! Headless element tree.
//!
//! Nodes live in an arena owned by [`Dom`] and are addressed by
//! [`NodeId`]; [`Element`] is a cheap handle pairing the two. A host that
//! renders for real mirrors this tree; tests inspect it directly.
//!
//! The tree keeps a mutation counter. Structural changes and changes to
//! attributes, properties, styles and text bump it; writes that store an
//! equal value and host geometry updates do not.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Map, Value};
use web_time::Instant;

use crate::bind::BindingRecord;

/// Arena slot plus the generation it was issued in. Released slots are
/// reused; an id from an earlier generation no longer resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

pub type EventListenerId = u64;

/// An event delivered to listeners on its target.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: String,
    pub target: Element,
    pub time_stamp: Instant,
}

type EventListener = Rc<dyn Fn(&Event)>;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Geometry {
    client_width: f64,
    client_height: f64,
    scroll_top: f64,
}

#[derive(Clone)]
enum NodeKind {
    Element(String),
    Text(String),
}

struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: Vec<(String, String)>,
    properties: Map<String, Value>,
    style: Vec<(String, String)>,
    geometry: Geometry,
    listeners: Vec<(EventListenerId, String, EventListener)>,
    bindings: Vec<BindingRecord>,
    attachments: Vec<Rc<dyn Any>>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            attributes: Vec::new(),
            properties: Map::new(),
            style: Vec::new(),
            geometry: Geometry::default(),
            listeners: Vec::new(),
            bindings: Vec::new(),
            attachments: Vec::new(),
        }
    }

    /// Copy of the node's own content. Listeners, attachments and geometry
    /// belong to the live node and are not copied.
    fn shallow_clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            attributes: self.attributes.clone(),
            properties: self.properties.clone(),
            style: self.style.clone(),
            bindings: self.bindings.clone(),
            ..Self::new(self.kind.clone())
        }
    }
}

struct Slot {
    generation: u32,
    data: Option<NodeData>,
}

#[derive(Default)]
struct DomInner {
    nodes: Vec<Slot>,
    free: Vec<u32>,
    next_listener_id: EventListenerId,
    mutations: u64,
}

impl DomInner {
    fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes
            .get(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.data.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.nodes
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.data.as_mut())
    }

    fn insert(&mut self, data: NodeData) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.nodes[index as usize];
            slot.data = Some(data);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.nodes.len() as u32;
        self.nodes.push(Slot {
            generation: 0,
            data: Some(data),
        });
        NodeId { index, generation: 0 }
    }

    /// Free the slot behind `id`; later ids for the slot get a new generation.
    fn take(&mut self, id: NodeId) -> Option<NodeData> {
        let slot = self
            .nodes
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)?;
        let data = slot.data.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(data)
    }

    fn live(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    fn is_ancestor(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.node(node).and_then(|n| n.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn detach(&mut self, id: NodeId) -> bool {
        let Some(parent) = self.node_mut(id).and_then(|n| n.parent.take()) else {
            return false;
        };
        if let Some(parent) = self.node_mut(parent) {
            parent.children.retain(|&child| child != id);
        }
        true
    }

    fn set_pair(list: &mut Vec<(String, String)>, name: &str, value: &str) -> bool {
        match list.iter_mut().find(|(k, _)| k == name) {
            Some((_, existing)) if existing == value => false,
            Some((_, existing)) => {
                *existing = value.to_string();
                true
            }
            None => {
                list.push((name.to_string(), value.to_string()));
                true
            }
        }
    }

    fn collect_subtree(&self, id: NodeId, out: &mut Vec<NodeId>) {
        out.push(id);
        if let Some(node) = self.node(id) {
            for &child in &node.children {
                self.collect_subtree(child, out);
            }
        }
    }

    fn text_content(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        match &node.kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Element(_) => {
                for &child in &node.children {
                    self.text_content(child, out);
                }
            }
        }
    }

    fn clone_subtree(&mut self, id: NodeId, deep: bool) -> Option<NodeId> {
        let data = self.node(id)?.shallow_clone();
        let children = if deep {
            self.node(id).map(|n| n.children.clone()).unwrap_or_default()
        } else {
            Vec::new()
        };
        let copy = self.insert(data);
        for child in children {
            if let Some(child_copy) = self.clone_subtree(child, true) {
                if let Some(node) = self.node_mut(child_copy) {
                    node.parent = Some(copy);
                }
                if let Some(node) = self.node_mut(copy) {
                    node.children.push(child_copy);
                }
            }
        }
        Some(copy)
    }
}

/// Shared handle to a node arena.
#[derive(Clone, Default)]
pub struct Dom {
    inner: Rc<RefCell<DomInner>>,
}

impl std::fmt::Debug for Dom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Dom")
            .field("nodes", &inner.live())
            .field("mutations", &inner.mutations)
            .finish()
    }
}

impl Dom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_element(&self, tag: &str) -> Element {
        let id = self
            .inner
            .borrow_mut()
            .insert(NodeData::new(NodeKind::Element(tag.to_string())));
        self.handle(id)
    }

    pub fn create_text(&self, text: &str) -> Element {
        let id = self
            .inner
            .borrow_mut()
            .insert(NodeData::new(NodeKind::Text(text.to_string())));
        self.handle(id)
    }

    /// Handle for a live node.
    pub fn element(&self, id: NodeId) -> Option<Element> {
        self.inner.borrow().node(id).map(|_| self.handle(id))
    }

    /// Number of content mutations so far.
    pub fn mutation_count(&self) -> u64 {
        self.inner.borrow().mutations
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.inner.borrow().live()
    }

    /// Arena slots allocated so far, live or free.
    pub fn capacity(&self) -> usize {
        self.inner.borrow().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ptr_eq(&self, other: &Dom) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn handle(&self, id: NodeId) -> Element {
        Element {
            dom: self.clone(),
            id,
        }
    }
}

/// Handle to one node. Operations on a released node do nothing and
/// reads return empty values.
#[derive(Clone)]
pub struct Element {
    dom: Dom,
    id: NodeId,
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.dom.ptr_eq(&other.dom)
    }
}

impl Eq for Element {}

impl std::fmt::Debug for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Element")
            .field("id", &self.id)
            .field("tag", &self.tag())
            .finish()
    }
}

impl Element {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    fn read<R>(&self, f: impl FnOnce(&NodeData) -> R) -> Option<R> {
        self.dom.inner.borrow().node(self.id).map(f)
    }

    /// Apply `f` and count a mutation when it reports a change.
    fn write(&self, f: impl FnOnce(&mut NodeData) -> bool) -> bool {
        let mut inner = self.dom.inner.borrow_mut();
        let changed = inner.node_mut(self.id).map(f).unwrap_or(false);
        if changed {
            inner.mutations += 1;
        }
        changed
    }

    fn handles(&self, ids: Vec<NodeId>) -> Vec<Element> {
        ids.into_iter().map(|id| self.dom.handle(id)).collect()
    }

    pub fn is_alive(&self) -> bool {
        self.read(|_| ()).is_some()
    }

    /// Tag name, or `#text` for text nodes.
    pub fn tag(&self) -> String {
        self.read(|node| match &node.kind {
            NodeKind::Element(tag) => tag.clone(),
            NodeKind::Text(_) => "#text".to_string(),
        })
        .unwrap_or_default()
    }

    pub fn is_text(&self) -> bool {
        self.read(|node| matches!(node.kind, NodeKind::Text(_)))
            .unwrap_or(false)
    }

    // Tree

    pub fn parent(&self) -> Option<Element> {
        self.read(|node| node.parent)
            .flatten()
            .map(|id| self.dom.handle(id))
    }

    pub fn children(&self) -> Vec<Element> {
        let ids = self.read(|node| node.children.clone()).unwrap_or_default();
        self.handles(ids)
    }

    pub fn child_count(&self) -> usize {
        self.read(|node| node.children.len()).unwrap_or(0)
    }

    pub fn first_child(&self) -> Option<Element> {
        self.read(|node| node.children.first().copied())
            .flatten()
            .map(|id| self.dom.handle(id))
    }

    pub fn last_child(&self) -> Option<Element> {
        self.read(|node| node.children.last().copied())
            .flatten()
            .map(|id| self.dom.handle(id))
    }

    fn sibling(&self, offset: isize) -> Option<Element> {
        let parent = self.parent()?;
        let siblings = parent.read(|node| node.children.clone())?;
        let pos = siblings.iter().position(|&id| id == self.id)?;
        let target = pos.checked_add_signed(offset)?;
        siblings.get(target).map(|&id| self.dom.handle(id))
    }

    pub fn next_sibling(&self) -> Option<Element> {
        self.sibling(1)
    }

    pub fn previous_sibling(&self) -> Option<Element> {
        self.sibling(-1)
    }

    /// Append `child`, moving it if it is attached elsewhere. Appending an
    /// ancestor of `self` is ignored.
    pub fn append_child(&self, child: &Element) {
        self.insert_before(child, None);
    }

    /// Insert `child` before `reference`, or append when `reference` is
    /// `None` or not a child of `self`.
    pub fn insert_before(&self, child: &Element, reference: Option<&Element>) {
        let mut inner = self.dom.inner.borrow_mut();
        if inner.node(self.id).is_none()
            || inner.node(child.id).is_none()
            || inner.is_ancestor(child.id, self.id)
        {
            return;
        }
        inner.detach(child.id);
        let Some(parent) = inner.node_mut(self.id) else {
            return;
        };
        let pos = reference
            .and_then(|r| parent.children.iter().position(|&id| id == r.id))
            .unwrap_or(parent.children.len());
        parent.children.insert(pos, child.id);
        if let Some(node) = inner.node_mut(child.id) {
            node.parent = Some(self.id);
        }
        inner.mutations += 1;
    }

    /// Detach from the parent. The node stays alive and can be reinserted.
    pub fn remove(&self) {
        let mut inner = self.dom.inner.borrow_mut();
        if inner.detach(self.id) {
            inner.mutations += 1;
        }
    }

    /// Detach and free this node and its subtree. Listeners, binding
    /// records and attachments are dropped.
    pub fn release(&self) {
        let freed: Vec<NodeData> = {
            let mut inner = self.dom.inner.borrow_mut();
            if inner.node(self.id).is_none() {
                return;
            }
            if inner.detach(self.id) {
                inner.mutations += 1;
            }
            let mut ids = Vec::new();
            inner.collect_subtree(self.id, &mut ids);
            ids.into_iter()
                .filter_map(|id| inner.take(id))
                .collect()
        };
        // Attachments may run arbitrary drop code; the arena is not
        // borrowed any more.
        drop(freed);
    }

    /// Copy this node (and with `deep`, its subtree) into a new detached
    /// node. Binding records are copied; listeners and attachments are not.
    pub fn clone_node(&self, deep: bool) -> Option<Element> {
        let id = self.dom.inner.borrow_mut().clone_subtree(self.id, deep)?;
        Some(self.dom.handle(id))
    }

    /// Every node below this one, in document order.
    pub fn descendants(&self) -> Vec<Element> {
        let mut ids = Vec::new();
        self.dom.inner.borrow().collect_subtree(self.id, &mut ids);
        ids.retain(|&id| id != self.id);
        self.handles(ids)
    }

    // Content

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.read(|node| {
            node.attributes
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        })
        .flatten()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    pub fn attributes(&self) -> Vec<(String, String)> {
        self.read(|node| node.attributes.clone()).unwrap_or_default()
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        self.write(|node| DomInner::set_pair(&mut node.attributes, name, value));
    }

    pub fn remove_attribute(&self, name: &str) {
        self.write(|node| {
            let before = node.attributes.len();
            node.attributes.retain(|(k, _)| k != name);
            node.attributes.len() != before
        });
    }

    pub fn property(&self, name: &str) -> Option<Value> {
        self.read(|node| node.properties.get(name).cloned()).flatten()
    }

    pub fn set_property(&self, name: &str, value: Value) {
        self.write(|node| {
            if node.properties.get(name) == Some(&value) {
                return false;
            }
            node.properties.insert(name.to_string(), value);
            true
        });
    }

    pub fn style(&self, name: &str) -> Option<String> {
        self.read(|node| {
            node.style
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        })
        .flatten()
    }

    pub fn set_style(&self, name: &str, value: &str) {
        self.write(|node| DomInner::set_pair(&mut node.style, name, value));
    }

    /// Concatenated text of this node and its descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.dom.inner.borrow().text_content(self.id, &mut out);
        out
    }

    /// Replace the content with `text`. On an element this releases the
    /// children and inserts a single text node.
    pub fn set_text_content(&self, text: &str) {
        if self.text_content() == text {
            return;
        }
        if self.is_text() {
            self.write(|node| {
                node.kind = NodeKind::Text(text.to_string());
                true
            });
            return;
        }
        for child in self.children() {
            child.release();
        }
        if !text.is_empty() {
            let node = self.dom.create_text(text);
            self.append_child(&node);
        }
    }

    // Geometry, written by the host.

    pub fn client_width(&self) -> f64 {
        self.read(|node| node.geometry.client_width).unwrap_or(0.0)
    }

    pub fn client_height(&self) -> f64 {
        self.read(|node| node.geometry.client_height).unwrap_or(0.0)
    }

    pub fn scroll_top(&self) -> f64 {
        self.read(|node| node.geometry.scroll_top).unwrap_or(0.0)
    }

    pub fn set_client_size(&self, width: f64, height: f64) {
        if let Some(node) = self.dom.inner.borrow_mut().node_mut(self.id) {
            node.geometry.client_width = width;
            node.geometry.client_height = height;
        }
    }

    pub fn set_scroll_top(&self, scroll_top: f64) {
        if let Some(node) = self.dom.inner.borrow_mut().node_mut(self.id) {
            node.geometry.scroll_top = scroll_top;
        }
    }

    // Events

    pub fn add_event_listener(&self, kind: &str, listener: impl Fn(&Event) + 'static) -> EventListenerId {
        let mut inner = self.dom.inner.borrow_mut();
        inner.next_listener_id += 1;
        let id = inner.next_listener_id;
        if let Some(node) = inner.node_mut(self.id) {
            node.listeners.push((id, kind.to_string(), Rc::new(listener)));
        }
        id
    }

    pub fn remove_event_listener(&self, id: EventListenerId) -> bool {
        let removed = {
            let mut inner = self.dom.inner.borrow_mut();
            inner.node_mut(self.id).and_then(|node| {
                let pos = node.listeners.iter().position(|(lid, _, _)| *lid == id)?;
                Some(node.listeners.remove(pos))
            })
        };
        removed.is_some()
    }

    /// Deliver an event to this node's listeners. Returns how many ran.
    pub fn dispatch_event(&self, kind: &str) -> usize {
        self.dispatch_event_at(kind, Instant::now())
    }

    pub fn dispatch_event_at(&self, kind: &str, time_stamp: Instant) -> usize {
        let listeners: Vec<EventListener> = self
            .read(|node| {
                node.listeners
                    .iter()
                    .filter(|(_, k, _)| k == kind)
                    .map(|(_, _, listener)| Rc::clone(listener))
                    .collect()
            })
            .unwrap_or_default();
        let event = Event {
            kind: kind.to_string(),
            target: self.clone(),
            time_stamp,
        };
        for listener in &listeners {
            listener(&event);
        }
        listeners.len()
    }

    // Bindings and attachments

    pub fn binding_records(&self) -> Vec<BindingRecord> {
        self.read(|node| node.bindings.clone()).unwrap_or_default()
    }

    pub fn add_binding_record(&self, record: BindingRecord) {
        if let Some(node) = self.dom.inner.borrow_mut().node_mut(self.id) {
            node.bindings.push(record);
        }
    }

    pub fn set_binding_records(&self, records: Vec<BindingRecord>) {
        let previous = {
            let mut inner = self.dom.inner.borrow_mut();
            inner
                .node_mut(self.id)
                .map(|node| std::mem::replace(&mut node.bindings, records))
        };
        drop(previous);
    }

    /// Tie `value`'s lifetime to this node; it is dropped on release.
    pub fn attach(&self, value: Rc<dyn Any>) {
        if let Some(node) = self.dom.inner.borrow_mut().node_mut(self.id) {
            node.attachments.push(value);
        }
    }

    /// First attachment of type `T`.
    pub fn attachment<T: 'static>(&self) -> Option<Rc<T>> {
        self.read(|node| {
            node.attachments
                .iter()
                .find_map(|value| Rc::clone(value).downcast::<T>().ok())
        })
        .flatten()
    }

    /// Drop every attachment of type `T`. Returns how many were dropped.
    pub fn detach_all<T: 'static>(&self) -> usize {
        let removed: Vec<Rc<dyn Any>> = {
            let mut inner = self.dom.inner.borrow_mut();
            match inner.node_mut(self.id) {
                Some(node) => {
                    let (matching, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut node.attachments)
                        .into_iter()
                        .partition(|value| value.is::<T>());
                    node.attachments = rest;
                    matching
                }
                None => Vec::new(),
            }
        };
        removed.len()
    }
}
