//! Keyed list rendering for [`json_store`].
//!
//! [`ListBinding`] renders every element of a store array by cloning an
//! item template into a container, keeps one element per item across
//! updates, and can render only the rows in view of a scrolled container.
//!
//! ```
//! use json_store::{Binding, BindingRecord, Dom, Store};
//! use json_store_list::{ListBindingExt, ListBindingOptions};
//! use serde_json::json;
//!
//! let store = Store::with_root(json!({
//!     "todos": [{"id": 1, "title": "a"}, {"id": 2, "title": "b"}]
//! }))
//! .unwrap();
//! let dom = Dom::new();
//! let (container, list) = store
//!     .at("todos")
//!     .list_binding(
//!         &dom,
//!         |dom| {
//!             let li = dom.create_element("li");
//!             li.add_binding_record(BindingRecord::new("^.title", Binding::text()));
//!             li
//!         },
//!         ListBindingOptions::new().with_id_path("id"),
//!     )
//!     .unwrap();
//!
//! assert_eq!(list.rendered_count(), 2);
//! store.at("todos").push(json!({"id": 3, "title": "c"})).unwrap();
//! store.flush();
//! let titles: Vec<String> = list.rendered_elements().iter().map(|el| el.text_content()).collect();
//! assert_eq!(titles, ["a", "b", "c"]);
//! assert_eq!(container.child_count(), 5);
//! ```

pub mod binding;
pub mod error;
pub mod lookup;
pub mod options;
pub mod window;

pub use binding::{ItemKey, ListBinding, UpdateReport};
pub use error::ListError;
pub use lookup::{delete_list_item, get_list_instance, get_list_item, ListInstance};
pub use options::{Candidate, FilterFn, ListBindingOptions, ListConfig, VirtualOptions};
pub use window::{virtual_window, Geometry, Window};

use json_store::{Dom, Element, Proxy};

/// List rendering from a proxy's array.
pub trait ListBindingExt {
    /// Create a `div` container holding the element `template` builds and
    /// render this array into it.
    fn list_binding(
        &self,
        dom: &Dom,
        template: impl FnOnce(&Dom) -> Element,
        options: ListBindingOptions,
    ) -> Result<(Element, ListBinding), ListError>;

    /// Render this array into an existing container. See [`ListBinding::new`].
    fn bind_list(&self, container: &Element, options: ListBindingOptions) -> Result<ListBinding, ListError>;
}

impl ListBindingExt for Proxy {
    fn list_binding(
        &self,
        dom: &Dom,
        template: impl FnOnce(&Dom) -> Element,
        options: ListBindingOptions,
    ) -> Result<(Element, ListBinding), ListError> {
        let container = dom.create_element("div");
        container.append_child(&template(dom));
        match self.bind_list(&container, options) {
            Ok(binding) => Ok((container, binding)),
            Err(err) => {
                container.release();
                Err(err)
            }
        }
    }

    fn bind_list(&self, container: &Element, options: ListBindingOptions) -> Result<ListBinding, ListError> {
        ListBinding::new(self.store(), container, self.path(), options)
    }
}
