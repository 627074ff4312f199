use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use courier_core::{CollectionItem, HeaderEntry, HttpMethod, ItemKind};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::collections::parse_id;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::{ItemPatch, NewItem, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateItem {
    pub name: String,
    pub item_type: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: Vec<HeaderEntry>,
    #[serde(default)]
    pub body: Option<String>,
}

/// Body of `PUT /items/{id}`; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateItem {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: Option<Vec<HeaderEntry>>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Deleted {
    pub message: String,
    pub removed: usize,
}

impl CreateItem {
    fn validate(self, max_header_count: usize) -> Result<NewItem, AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::InvalidRequest("name is required".to_string()));
        }
        let item_type = match self.item_type.as_str() {
            "folder" => ItemKind::Folder,
            "request" => ItemKind::Request,
            _ => return Err(AppError::InvalidItemType("item_type must be 'folder' or 'request'")),
        };

        if item_type == ItemKind::Folder {
            return Ok(NewItem {
                parent_id: self.parent_id,
                name: self.name,
                item_type,
                method: None,
                url: None,
                headers: Vec::new(),
                body: None,
            });
        }

        let method = self
            .method
            .filter(|m| !m.is_empty())
            .ok_or(AppError::MissingMethod)?
            .parse::<HttpMethod>()
            .map_err(|e| AppError::InvalidMethod(e.to_string()))?;
        if self.headers.len() > max_header_count {
            return Err(AppError::Validation(format!(
                "request has {} headers, exceeding limit of {max_header_count}",
                self.headers.len()
            )));
        }
        Ok(NewItem {
            parent_id: self.parent_id,
            name: self.name,
            item_type,
            method: Some(method),
            url: self.url,
            headers: self.headers,
            body: self.body,
        })
    }
}

impl UpdateItem {
    fn validate(self, max_header_count: usize) -> Result<ItemPatch, AppError> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(AppError::InvalidRequest("name must not be empty".to_string()));
        }
        let method = self
            .method
            .map(|m| m.parse::<HttpMethod>())
            .transpose()
            .map_err(|e| AppError::InvalidMethod(e.to_string()))?;
        if let Some(headers) = &self.headers {
            if headers.len() > max_header_count {
                return Err(AppError::Validation(format!(
                    "request has {} headers, exceeding limit of {max_header_count}",
                    headers.len()
                )));
            }
        }

        let patch = ItemPatch {
            name: self.name,
            method,
            url: self.url,
            headers: self.headers,
            body: self.body,
        };
        if patch.is_empty() {
            return Err(AppError::NoUpdates);
        }
        Ok(patch)
    }
}

fn store_error(err: StoreError) -> AppError {
    match err {
        StoreError::CollectionNotFound => AppError::NotFound("Collection not found"),
        StoreError::ItemNotFound => AppError::NotFound("Item not found"),
        StoreError::ParentNotFound => AppError::InvalidParent("Parent item not found"),
        StoreError::ParentInOtherCollection => {
            AppError::InvalidParent("Parent item must belong to the same collection")
        }
        StoreError::NotARequest => {
            AppError::InvalidItemType("Only items of type 'request' can be updated")
        }
    }
}

pub async fn create(
    State(state): State<AppState>,
    Path(collection_id): Path<String>,
    body: axum::body::Bytes,
) -> Result<(StatusCode, Json<CollectionItem>), AppError> {
    let collection_id = parse_id(&collection_id, "Collection")?;
    let input: CreateItem = serde_json::from_slice(&body)
        .map_err(|e| AppError::InvalidRequest(format!("Name and item_type are required: {e}")))?;
    let new = input.validate(state.config.max_header_count)?;

    let item = state
        .store
        .create_item(collection_id, new)
        .await
        .map_err(store_error)?;
    info!(item_id = %item.id, %collection_id, kind = ?item.item_type, "created item");
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CollectionItem>, AppError> {
    let id = parse_id(&id, "Item")?;
    state
        .store
        .item(id)
        .await
        .map(Json)
        .ok_or(AppError::NotFound("Item not found"))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: axum::body::Bytes,
) -> Result<Json<CollectionItem>, AppError> {
    let id = parse_id(&id, "Item")?;
    let input: UpdateItem = serde_json::from_slice(&body)
        .map_err(|e| AppError::InvalidRequest(format!("invalid item update: {e}")))?;
    let patch = input.validate(state.config.max_header_count)?;

    let item = state.store.update_item(id, patch).await.map_err(store_error)?;
    info!(item_id = %id, "updated item");
    Ok(Json(item))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Deleted>, AppError> {
    let id = parse_id(&id, "Item")?;
    let removed = state
        .store
        .delete_item(id)
        .await
        .ok_or(AppError::NotFound("Item not found"))?;
    info!(item_id = %id, removed, "deleted item");
    Ok(Json(Deleted {
        message: "Item deleted successfully".to_string(),
        removed,
    }))
}
