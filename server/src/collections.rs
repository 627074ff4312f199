use axum::body::{to_bytes, Body};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use courier_core::collection::{flatten, parse_collection};
use courier_core::{build_tree, Collection, ImportError, TreeNode};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub collection_id: Uuid,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CollectionList {
    pub collections: Vec<Collection>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CollectionTree {
    pub collection: Collection,
    pub items: Vec<TreeNode>,
}

pub(crate) fn parse_id(raw: &str, what: &str) -> Result<Uuid, AppError> {
    raw.parse()
        .map_err(|_| AppError::InvalidId(format!("{what} ID must be a valid UUID")))
}

pub async fn upload(
    State(state): State<AppState>,
    body: Body,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let limits = state.config.import_limits();
    let data = to_bytes(body, limits.max_size.saturating_add(1))
        .await
        .map_err(|_| ImportError::TooLarge {
            limit: limits.max_size,
        })?;
    let document = parse_collection(&data, limits)?;

    let collection = Collection {
        id: Uuid::new_v4(),
        name: document.info.name.clone(),
        description: document.info.description.clone(),
    };
    let rows = flatten(&document, collection.id);
    info!(collection_id = %collection.id, name = %collection.name, items = rows.len(), "imported collection");

    let collection_id = collection.id;
    state.store.insert_collection(collection, rows).await;
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            collection_id,
            message: "Collection imported successfully".to_string(),
        }),
    ))
}

pub async fn list(State(state): State<AppState>) -> Json<CollectionList> {
    Json(CollectionList {
        collections: state.store.collections().await,
    })
}

pub async fn tree(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CollectionTree>, AppError> {
    let id = parse_id(&id, "Collection")?;
    let collection = state
        .store
        .collection(id)
        .await
        .ok_or(AppError::NotFound("Collection not found"))?;
    let items = build_tree(state.store.items_of(id).await);
    Ok(Json(CollectionTree { collection, items }))
}
