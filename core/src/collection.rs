//! Postman collection import: validation and flattening into stored rows.
//!
//! # Design
//! Validation runs over the whole document before anything is stored, so an
//! import either lands completely or not at all. Both the validator and the
//! flattener walk the item tree with an explicit stack.

use serde::de::IgnoredAny;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::http::HttpMethod;
use crate::types::{CollectionItem, HeaderEntry, ItemKind};

pub const SUPPORTED_SCHEMAS: [&str; 4] = [
    "https://schema.getpostman.com/json/collection/v2.0.0/collection.json",
    "https://schema.getpostman.com/json/collection/v2.1.0/collection.json",
    "https://schema.getpostman.com/json/collection/v2.0",
    "https://schema.getpostman.com/json/collection/v2.1",
];

pub const DEFAULT_MAX_SIZE: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_HEADER_COUNT: usize = 50;

#[derive(Debug, Clone, Deserialize)]
pub struct PostmanCollection {
    pub info: PostmanInfo,
    #[serde(default)]
    pub item: Vec<PostmanItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostmanInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub schema: String,
}

/// A folder when `item` is non-empty, a request when `request` is set.
/// Anything else is skipped on import.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostmanItem {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub item: Vec<PostmanItem>,
    #[serde(default)]
    pub request: Option<PostmanRequest>,
}

impl PostmanItem {
    fn is_folder(&self) -> bool {
        !self.item.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostmanRequest {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub header: Vec<HeaderEntry>,
    #[serde(default)]
    pub body: Option<PostmanBody>,
    #[serde(default)]
    pub url: Option<PostmanUrl>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PostmanUrl {
    Raw(String),
    Structured {
        #[serde(default)]
        raw: Option<String>,
    },
    /// Any other JSON value; imported as an empty URL.
    Other(IgnoredAny),
}

impl PostmanUrl {
    pub fn raw(&self) -> &str {
        match self {
            PostmanUrl::Raw(raw) => raw,
            PostmanUrl::Structured { raw } => raw.as_deref().unwrap_or_default(),
            PostmanUrl::Other(_) => "",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostmanBody {
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub raw: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportLimits {
    pub max_size: usize,
    pub max_header_count: usize,
}

impl Default for ImportLimits {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            max_header_count: DEFAULT_MAX_HEADER_COUNT,
        }
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("collection JSON exceeds maximum size of {limit} bytes")]
    TooLarge { limit: usize },

    #[error("invalid JSON format: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("unsupported Postman schema version: {0} (only v2.0 and v2.1 are supported)")]
    UnsupportedSchema(String),

    #[error("collection must contain at least one item")]
    Empty,

    #[error("invalid request '{name}': {reason}")]
    InvalidRequest { name: String, reason: String },
}

/// Parse and validate an uploaded collection.
pub fn parse_collection(data: &[u8], limits: ImportLimits) -> Result<PostmanCollection, ImportError> {
    if data.len() > limits.max_size {
        return Err(ImportError::TooLarge {
            limit: limits.max_size,
        });
    }
    let collection: PostmanCollection = serde_json::from_slice(data)?;
    validate_collection(&collection, limits)?;
    Ok(collection)
}

pub fn validate_collection(
    collection: &PostmanCollection,
    limits: ImportLimits,
) -> Result<(), ImportError> {
    if !SUPPORTED_SCHEMAS.contains(&collection.info.schema.as_str()) {
        return Err(ImportError::UnsupportedSchema(collection.info.schema.clone()));
    }
    if collection.item.is_empty() {
        return Err(ImportError::Empty);
    }

    let mut stack: Vec<&PostmanItem> = collection.item.iter().rev().collect();
    while let Some(item) = stack.pop() {
        if item.is_folder() {
            stack.extend(item.item.iter().rev());
        } else if let Some(request) = &item.request {
            validate_request(request, limits).map_err(|reason| ImportError::InvalidRequest {
                name: item.name.clone(),
                reason,
            })?;
        }
    }
    Ok(())
}

fn validate_request(request: &PostmanRequest, limits: ImportLimits) -> Result<(), String> {
    request
        .method
        .parse::<HttpMethod>()
        .map_err(|e| e.to_string())?;

    let raw = request.url.as_ref().map(PostmanUrl::raw).unwrap_or_default();
    // Templated URLs get their scheme from an environment at execution time.
    if !raw.is_empty() && !(raw.contains("{{") && raw.contains("}}")) {
        let url = Url::parse(raw).map_err(|e| format!("invalid URL format: {e}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!(
                "unsupported URL scheme: {} (only http and https are allowed)",
                url.scheme()
            ));
        }
    }

    if request.header.len() > limits.max_header_count {
        return Err(format!(
            "request has {} headers, exceeding limit of {}",
            request.header.len(),
            limits.max_header_count
        ));
    }
    Ok(())
}

/// Flatten a validated collection into stored rows for `collection_id`.
///
/// Parents precede their children. `sort_order` is the item's index among
/// its siblings in the document.
pub fn flatten(collection: &PostmanCollection, collection_id: Uuid) -> Vec<CollectionItem> {
    let mut rows = Vec::new();
    let mut stack: Vec<(Option<Uuid>, &[PostmanItem])> = vec![(None, collection.item.as_slice())];

    while let Some((parent_id, items)) = stack.pop() {
        for (index, item) in items.iter().enumerate() {
            let sort_order = u32::try_from(index).unwrap_or(u32::MAX);
            let id = Uuid::new_v4();
            if item.is_folder() {
                rows.push(CollectionItem {
                    id,
                    collection_id,
                    parent_id,
                    name: item.name.clone(),
                    item_type: ItemKind::Folder,
                    sort_order,
                    method: None,
                    url: None,
                    headers: Vec::new(),
                    body: None,
                });
                stack.push((Some(id), item.item.as_slice()));
            } else if let Some(request) = &item.request {
                let url = request.url.as_ref().map(PostmanUrl::raw).unwrap_or_default();
                rows.push(CollectionItem {
                    id,
                    collection_id,
                    parent_id,
                    name: item.name.clone(),
                    item_type: ItemKind::Request,
                    sort_order,
                    method: request.method.parse().ok(),
                    url: Some(url.to_string()),
                    headers: request.header.clone(),
                    body: request
                        .body
                        .as_ref()
                        .map(|b| b.raw.clone())
                        .filter(|raw| !raw.is_empty()),
                });
            }
        }
    }

    debug!(%collection_id, rows = rows.len(), "flattened collection");
    rows
}
