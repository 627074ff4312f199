//! Client SDK for a running `courier-agent`: a stateless request builder
//! and response parser for its local API.
//!
//! Neither server binary calls this; it is the library surface for tools
//! (browser bridges, scripts, other Rust callers) that want to reach a
//! user's agent. The agent's own integration tests drive it end to end.
//!
//! # Design
//! `AgentClient` holds only the agent's endpoints and carries no mutable state
//! between calls. Each operation is split into a `build_*` method that
//! produces an `HttpRequest` and a `parse_*` method that consumes an
//! `HttpResponse`. The caller performs the round-trip, typically with
//! `UreqTransport`.

use url::Url;

use crate::error::ApiError;
use crate::http::{HeaderSet, HttpMethod, HttpRequest, HttpResponse};
use crate::types::{AgentHealth, ExecutionResult, RequestDescriptor};

pub const DEFAULT_AGENT_PORT: u16 = 5555;

/// Client for a `courier-agent` listening on loopback.
#[derive(Debug, Clone)]
pub struct AgentClient {
    health: Url,
    execute: Url,
}

impl AgentClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;
        let endpoint = |path: &str| {
            base.join(path)
                .map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))
        };
        Ok(Self {
            health: endpoint("health")?,
            execute: endpoint("execute")?,
        })
    }

    /// Client for the agent on `127.0.0.1:port`.
    pub fn local(port: u16) -> Result<Self, ApiError> {
        Self::new(&format!("http://127.0.0.1:{port}"))
    }

    pub fn build_health(&self) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: self.health.clone(),
            headers: HeaderSet::new(),
            body: None,
        }
    }

    pub fn build_execute(&self, descriptor: &RequestDescriptor) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_vec(descriptor).map_err(|e| ApiError::SerializationError(e.to_string()))?;
        let mut headers = HeaderSet::new();
        headers.insert("content-type", "application/json");
        Ok(HttpRequest {
            method: HttpMethod::Post,
            url: self.execute.clone(),
            headers,
            body: Some(body),
        })
    }

    pub fn parse_health(&self, response: HttpResponse) -> Result<AgentHealth, ApiError> {
        check_status(&response, 200)?;
        serde_json::from_slice(&response.body).map_err(|e| ApiError::DeserializationError(e.to_string()))
    }

    /// The agent reports execution failures as 200 with `error` set, so a
    /// successful parse can still carry a failed execution.
    pub fn parse_execute(&self, response: HttpResponse) -> Result<ExecutionResult, ApiError> {
        check_status(&response, 200)?;
        serde_json::from_slice(&response.body).map_err(|e| ApiError::DeserializationError(e.to_string()))
    }
}

fn check_status(response: &HttpResponse, expected: u16) -> Result<(), ApiError> {
    if response.status == expected {
        return Ok(());
    }
    Err(ApiError::HttpError {
        status: response.status,
        body: String::from_utf8_lossy(&response.body).into_owned(),
    })
}
