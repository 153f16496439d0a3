//! Finding the list item behind an element.

use json_store::Element;
use json_store_path::id_string;
use serde_json::Value;
use tracing::{trace, warn};

use crate::binding::{ItemKey, ListBinding};

/// An item element together with the list that rendered it.
#[derive(Debug, Clone)]
pub struct ListInstance {
    pub binding: ListBinding,
    /// The item element, a direct child of the list container.
    pub element: Element,
    pub key: ItemKey,
    /// Store path of the item.
    pub path: String,
    /// The item's current value.
    pub item: Value,
}

/// Walk up from `el` to the nearest rendered list item.
pub fn get_list_instance(el: &Element) -> Option<ListInstance> {
    let mut node = el.clone();
    while let Some(parent) = node.parent() {
        if let Some(binding) = parent.attachment::<ListBinding>() {
            if let Some(key) = binding.key_of(&node) {
                let path = binding.item_path(&key);
                let item = binding.store()?.get(&path)?;
                return Some(ListInstance {
                    binding: (*binding).clone(),
                    element: node,
                    key,
                    path,
                    item,
                });
            }
        }
        node = parent;
    }
    None
}

/// The item value rendered by `el` or one of its ancestors.
pub fn get_list_item(el: &Element) -> Option<Value> {
    get_list_instance(el).map(|instance| instance.item)
}

/// Remove the item rendered by `el` from its array.
///
/// Only lists with an `id_path` support this; the item is found by id and
/// spliced out, which touches the array path once. Returns whether an item
/// was removed.
pub fn delete_list_item(el: &Element) -> bool {
    let Some(instance) = get_list_instance(el) else {
        return false;
    };
    let (Some(prop), ItemKey::Id(id)) = (instance.binding.id_path(), &instance.key) else {
        trace!(path = %instance.path, "list item has no id");
        return false;
    };
    let Some(store) = instance.binding.store() else {
        return false;
    };
    let array = instance.binding.array_path();
    let position = store.with(&array, |value| {
        value.and_then(Value::as_array).and_then(|items| {
            items
                .iter()
                .position(|item| item.get(&prop).and_then(id_string).as_deref() == Some(id.as_str()))
        })
    });
    let Some(index) = position else {
        return false;
    };
    match store.at(&array).remove(index) {
        Ok(removed) => removed.is_some(),
        Err(err) => {
            warn!(path = %array, error = %err, "list item delete failed");
            false
        }
    }
}
