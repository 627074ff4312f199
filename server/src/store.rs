//! In-memory collection and item store.
//!
//! One `RwLock` guards both maps so a collection and its rows are inserted
//! and removed together. Nothing is persisted across restarts.

use std::collections::HashMap;

use courier_core::{Collection, CollectionItem, HeaderEntry, HttpMethod, ItemKind};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Collection not found")]
    CollectionNotFound,

    #[error("Parent item not found")]
    ParentNotFound,

    #[error("Parent item must belong to the same collection")]
    ParentInOtherCollection,

    #[error("Item not found")]
    ItemNotFound,

    #[error("Only request items can be updated")]
    NotARequest,
}

/// Fields of an item about to be created; ids and ordering are assigned by
/// the store.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub item_type: ItemKind,
    pub method: Option<HttpMethod>,
    pub url: Option<String>,
    pub headers: Vec<HeaderEntry>,
    pub body: Option<String>,
}

/// Replacement values for a request item; `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub method: Option<HttpMethod>,
    pub url: Option<String>,
    pub headers: Option<Vec<HeaderEntry>>,
    pub body: Option<String>,
}

impl ItemPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.method.is_none()
            && self.url.is_none()
            && self.headers.is_none()
            && self.body.is_none()
    }
}

#[derive(Debug, Default)]
struct Inner {
    collections: HashMap<Uuid, Collection>,
    /// Collection ids in creation order, for stable listing.
    order: Vec<Uuid>,
    items: HashMap<Uuid, CollectionItem>,
}

#[derive(Debug, Default)]
pub struct Store {
    inner: RwLock<Inner>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a collection together with its already-flattened rows.
    pub async fn insert_collection(&self, collection: Collection, items: Vec<CollectionItem>) {
        let mut inner = self.inner.write().await;
        debug!(collection_id = %collection.id, items = items.len(), "storing collection");
        inner.order.push(collection.id);
        inner.collections.insert(collection.id, collection);
        for item in items {
            inner.items.insert(item.id, item);
        }
    }

    pub async fn collections(&self) -> Vec<Collection> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.collections.get(id).cloned())
            .collect()
    }

    pub async fn collection(&self, id: Uuid) -> Option<Collection> {
        self.inner.read().await.collections.get(&id).cloned()
    }

    /// Every row of a collection, unordered.
    pub async fn items_of(&self, collection_id: Uuid) -> Vec<CollectionItem> {
        self.inner
            .read()
            .await
            .items
            .values()
            .filter(|item| item.collection_id == collection_id)
            .cloned()
            .collect()
    }

    pub async fn item(&self, id: Uuid) -> Option<CollectionItem> {
        self.inner.read().await.items.get(&id).cloned()
    }

    /// Create an item at the end of its sibling list.
    pub async fn create_item(&self, collection_id: Uuid, new: NewItem) -> Result<CollectionItem, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.collections.contains_key(&collection_id) {
            return Err(StoreError::CollectionNotFound);
        }
        if let Some(parent_id) = new.parent_id {
            let parent = inner.items.get(&parent_id).ok_or(StoreError::ParentNotFound)?;
            if parent.collection_id != collection_id {
                return Err(StoreError::ParentInOtherCollection);
            }
        }

        let sort_order = inner
            .items
            .values()
            .filter(|item| item.collection_id == collection_id && item.parent_id == new.parent_id)
            .map(|item| item.sort_order.saturating_add(1))
            .max()
            .unwrap_or(0);

        let item = CollectionItem {
            id: Uuid::new_v4(),
            collection_id,
            parent_id: new.parent_id,
            name: new.name,
            item_type: new.item_type,
            sort_order,
            method: new.method,
            url: new.url,
            headers: new.headers,
            body: new.body,
        };
        inner.items.insert(item.id, item.clone());
        Ok(item)
    }

    /// Apply `patch` to a request item. Folders are left untouched.
    pub async fn update_item(&self, id: Uuid, patch: ItemPatch) -> Result<CollectionItem, StoreError> {
        let mut inner = self.inner.write().await;
        let item = inner.items.get_mut(&id).ok_or(StoreError::ItemNotFound)?;
        if item.item_type != ItemKind::Request {
            return Err(StoreError::NotARequest);
        }

        if let Some(name) = patch.name {
            item.name = name;
        }
        if let Some(method) = patch.method {
            item.method = Some(method);
        }
        if let Some(url) = patch.url {
            item.url = Some(url);
        }
        if let Some(headers) = patch.headers {
            item.headers = headers;
        }
        if let Some(body) = patch.body {
            item.body = Some(body);
        }
        debug!(item_id = %id, "updated item");
        Ok(item.clone())
    }

    /// Delete an item and all of its descendants. Returns how many rows were
    /// removed, or `None` if the item does not exist.
    pub async fn delete_item(&self, id: Uuid) -> Option<usize> {
        let mut inner = self.inner.write().await;
        if !inner.items.contains_key(&id) {
            return None;
        }

        let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for item in inner.items.values() {
            if let Some(parent) = item.parent_id {
                children.entry(parent).or_default().push(item.id);
            }
        }

        let mut removed = 0;
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if inner.items.remove(&next).is_some() {
                removed += 1;
                if let Some(kids) = children.remove(&next) {
                    stack.extend(kids);
                }
            }
        }
        debug!(item_id = %id, removed, "deleted item subtree");
        Some(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(name: &str) -> Collection {
        Collection {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: String::new(),
        }
    }

    fn folder(name: &str, parent_id: Option<Uuid>) -> NewItem {
        NewItem {
            parent_id,
            name: name.to_string(),
            item_type: ItemKind::Folder,
            method: None,
            url: None,
            headers: Vec::new(),
            body: None,
        }
    }

    #[tokio::test]
    async fn lists_collections_in_creation_order() {
        let store = Store::new();
        for name in ["b", "a", "c"] {
            store.insert_collection(collection(name), Vec::new()).await;
        }
        let names: Vec<_> = store.collections().await.into_iter().map(|c| c.name).collect();
        assert_eq!(names, ["b", "a", "c"]);
    }

    #[tokio::test]
    async fn created_items_go_last_among_siblings() {
        let store = Store::new();
        let c = collection("c");
        store.insert_collection(c.clone(), Vec::new()).await;

        let first = store.create_item(c.id, folder("first", None)).await.unwrap();
        let second = store.create_item(c.id, folder("second", None)).await.unwrap();
        let nested = store.create_item(c.id, folder("nested", Some(first.id))).await.unwrap();

        assert_eq!(first.sort_order, 0);
        assert_eq!(second.sort_order, 1);
        assert_eq!(nested.sort_order, 0);
    }

    #[tokio::test]
    async fn create_item_checks_collection_and_parent() {
        let store = Store::new();
        let a = collection("a");
        let b = collection("b");
        store.insert_collection(a.clone(), Vec::new()).await;
        store.insert_collection(b.clone(), Vec::new()).await;
        let in_a = store.create_item(a.id, folder("x", None)).await.unwrap();

        assert_eq!(
            store.create_item(Uuid::new_v4(), folder("y", None)).await.unwrap_err(),
            StoreError::CollectionNotFound
        );
        assert_eq!(
            store.create_item(a.id, folder("y", Some(Uuid::new_v4()))).await.unwrap_err(),
            StoreError::ParentNotFound
        );
        assert_eq!(
            store.create_item(b.id, folder("y", Some(in_a.id))).await.unwrap_err(),
            StoreError::ParentInOtherCollection
        );
    }

    fn request(name: &str) -> NewItem {
        NewItem {
            item_type: ItemKind::Request,
            method: Some(HttpMethod::Get),
            url: Some("https://api.example.com/a".to_string()),
            body: Some("keep".to_string()),
            ..folder(name, None)
        }
    }

    #[tokio::test]
    async fn update_replaces_only_given_fields() {
        let store = Store::new();
        let c = collection("c");
        store.insert_collection(c.clone(), Vec::new()).await;
        let item = store.create_item(c.id, request("old")).await.unwrap();

        let patch = ItemPatch {
            name: Some("new".to_string()),
            method: Some(HttpMethod::Post),
            ..Default::default()
        };
        let updated = store.update_item(item.id, patch).await.unwrap();
        assert_eq!(updated.name, "new");
        assert_eq!(updated.method, Some(HttpMethod::Post));
        assert_eq!(updated.url, item.url);
        assert_eq!(updated.body.as_deref(), Some("keep"));
        assert_eq!(updated.sort_order, item.sort_order);
        assert_eq!(store.item(item.id).await, Some(updated));
    }

    #[tokio::test]
    async fn update_refuses_folders_and_missing_items() {
        let store = Store::new();
        let c = collection("c");
        store.insert_collection(c.clone(), Vec::new()).await;
        let dir = store.create_item(c.id, folder("dir", None)).await.unwrap();
        let patch = ItemPatch {
            name: Some("renamed".to_string()),
            ..Default::default()
        };

        assert_eq!(
            store.update_item(dir.id, patch.clone()).await.unwrap_err(),
            StoreError::NotARequest
        );
        assert_eq!(store.item(dir.id).await.map(|i| i.name), Some("dir".to_string()));
        assert_eq!(
            store.update_item(Uuid::new_v4(), patch).await.unwrap_err(),
            StoreError::ItemNotFound
        );
    }

    #[tokio::test]
    async fn delete_removes_descendants() {
        let store = Store::new();
        let c = collection("c");
        store.insert_collection(c.clone(), Vec::new()).await;
        let root = store.create_item(c.id, folder("root", None)).await.unwrap();
        let mid = store.create_item(c.id, folder("mid", Some(root.id))).await.unwrap();
        store.create_item(c.id, folder("leaf", Some(mid.id))).await.unwrap();
        let other = store.create_item(c.id, folder("other", None)).await.unwrap();

        assert_eq!(store.delete_item(root.id).await, Some(3));
        assert_eq!(store.delete_item(root.id).await, None);
        let left = store.items_of(c.id).await;
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, other.id);
    }
}
