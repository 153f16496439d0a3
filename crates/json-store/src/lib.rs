//! Reactive JSON store.
//!
//! A [`Store`] owns one JSON object. Code reads and writes it by path
//! (see [`json_store_path`] for the grammar), either directly or through
//! [`Proxy`] handles. Writes that change the document *touch* their path;
//! touched paths are batched and delivered to listeners on the next flush.
//!
//! - [`scheduler`]: touch batching, listeners, [`Subscription`], the
//!   [`Updates`] future.
//! - [`proxy`]: path-aware handles with array helpers that touch once.
//! - [`dom`]: headless element tree that bindings and lists render into.
//! - [`bind`]: value ↔ element bindings and handler triggers.
//! - [`timers`]: host-driven timers with debounce and throttle.
//!
//! The store is single-threaded. No internal borrow is held while
//! listeners run, so they may read, write and (un)subscribe freely.
//!
//! # Example
//!
//! ```
//! use json_store::Store;
//! use serde_json::json;
//!
//! let store = Store::with_root(json!({"todos": []})).unwrap();
//! let todos = store.at("todos");
//! todos.push(json!({"id": 1, "title": "write docs"})).unwrap();
//! todos.push(json!({"id": 2, "title": "ship"})).unwrap();
//!
//! // Both pushes collapse into one pending path.
//! assert_eq!(store.pending(), vec!["todos"]);
//!
//! let title = todos.select("id", "2").child("title");
//! assert_eq!(title.value(), Some(json!("ship")));
//!
//! pollster::block_on(store.updates());
//! assert!(store.pending().is_empty());
//! ```

pub mod bind;
pub mod config;
pub mod dom;
pub mod error;
pub mod proxy;
pub mod scheduler;
pub mod store;
pub mod timers;

pub use bind::{bind, display_value, on, truthy, BindOptions, Binding, BindingRecord, Handler, Trigger};
pub use config::StoreConfig;
pub use dom::{Dom, Element, Event, EventListenerId, NodeId};
pub use error::{ListenerError, StoreError};
pub use proxy::{Member, Proxy, View};
pub use scheduler::{
    Disposition, IntoDisposition, ListenerId, PathTest, SchedulerState, Subscription, TestVerdict,
    Updates,
};
pub use store::{Store, WeakStore};
pub use timers::{Debounce, Throttle, TimerId, Timers};

pub use json_store_path as path;
