//! Rate-limited execution of stored requests.
//!
//! The rate limit middleware runs before the handler, so a rejected caller
//! never reaches the store or the engine. The engine call is blocking and
//! runs on the blocking pool; a caller disconnect does not cancel it.

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use courier_core::{ExecuteOverrides, ExecutionResult, ItemKind, RateDecision};
use tracing::{info, warn};

use crate::collections::parse_id;
use crate::error::AppError;
use crate::state::AppState;

pub async fn rate_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    match state.limiter.check(addr.ip()) {
        RateDecision::Admitted => next.run(request).await,
        RateDecision::Limited { retry_after } => {
            warn!(client = %addr.ip(), ?retry_after, "execution rate limited");
            AppError::RateLimited { retry_after }.into_response()
        }
    }
}

pub async fn execute_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ExecutionResult>, AppError> {
    let id = parse_id(&id, "Item")?;
    let item = state
        .store
        .item(id)
        .await
        .ok_or(AppError::NotFound("Item not found"))?;
    if item.item_type != ItemKind::Request {
        return Err(AppError::InvalidItemType(
            "Only items of type 'request' can be executed",
        ));
    }

    let overrides: ExecuteOverrides = if body.is_empty() {
        ExecuteOverrides::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::InvalidRequest(format!("Invalid request body: {e}")))?
    };

    let descriptor = item
        .descriptor()
        .ok_or_else(|| AppError::InvalidRequest("Request is missing method".to_string()))?
        .apply(overrides);
    if descriptor.url.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "Request URL is missing. Provide URL in request body or ensure item has a URL."
                .to_string(),
        ));
    }
    let max_headers = state.config.max_header_count;
    if descriptor.headers.len() > max_headers {
        return Err(AppError::Validation(format!(
            "request has {} headers, exceeding limit of {max_headers}",
            descriptor.headers.len()
        )));
    }

    let executor = state.executor.clone();
    let method = descriptor.method;
    let url = descriptor.url.clone();
    let outcome = tokio::task::spawn_blocking(move || executor.execute(&descriptor))
        .await
        .map_err(|e| AppError::Internal(format!("execution task failed: {e}")))?;

    match outcome {
        Ok(result) => {
            info!(
                item_id = %id,
                %method,
                %url,
                status = result.status,
                duration_ms = result.duration_ms,
                "executed request"
            );
            Ok(Json(result))
        }
        Err(e) => {
            warn!(item_id = %id, %method, %url, kind = %e.kind(), error = %e, "execution failed");
            Err(e.into())
        }
    }
}
