//! Domain DTOs shared by the server, the agent, and the agent client.
//!
//! # Design
//! `RequestDescriptor` is the only shape the engine executes. The server
//! materializes it from a stored `CollectionItem` plus optional
//! `ExecuteOverrides`; the agent receives it directly over the wire. Override
//! fields replace whole stored fields and never merge partially.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::http::{HeaderSet, HttpMethod};

/// A fully-materialized request ready for the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub method: HttpMethod,
    pub url: String,
    #[serde(default)]
    pub headers: HeaderSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl RequestDescriptor {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderSet::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Replace each field that the caller supplied.
    pub fn apply(mut self, overrides: ExecuteOverrides) -> Self {
        if let Some(url) = overrides.url {
            self.url = url;
        }
        if let Some(headers) = overrides.headers {
            self.headers = headers;
        }
        if let Some(body) = overrides.body {
            self.body = Some(body);
        }
        self
    }
}

/// Caller-supplied replacements for a stored request. Unknown fields are
/// rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecuteOverrides {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: Option<HeaderSet>,
    #[serde(default)]
    pub body: Option<String>,
}

/// Normalized outcome of one execution.
///
/// `status` is 0 and `error` is set when the request could not be executed at
/// all. A 4xx/5xx from the target is a normal result with `error` unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: u16,
    #[serde(rename = "statusText")]
    pub status_text: String,
    pub headers: BTreeMap<String, Vec<String>>,
    pub body: String,
    pub duration_ms: u64,
    /// The target sent more bytes than the configured response cap.
    #[serde(default)]
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn failed(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            duration_ms,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// First value of the named response header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .and_then(|(_, values)| values.first())
            .map(String::as_str)
    }
}

/// Liveness payload served by the local agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentHealth {
    pub status: String,
    pub version: String,
    #[serde(default)]
    pub message: String,
}

/// A stored collection of request definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Folder,
    Request,
}

/// A stored header entry, in the key/value shape Postman uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// One row of a collection: a folder or a request, with its place among its
/// siblings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionItem {
    pub id: Uuid,
    pub collection_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub item_type: ItemKind,
    pub sort_order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<HttpMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HeaderEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl CollectionItem {
    /// Materialize the stored request. `None` for folders and for requests
    /// without a method.
    pub fn descriptor(&self) -> Option<RequestDescriptor> {
        if self.item_type != ItemKind::Request {
            return None;
        }
        let method = self.method?;
        Some(RequestDescriptor {
            method,
            url: self.url.clone().unwrap_or_default(),
            headers: self
                .headers
                .iter()
                .map(|h| (h.key.as_str(), h.value.as_str()))
                .collect(),
            body: self.body.clone().filter(|b| !b.is_empty()),
        })
    }
}
