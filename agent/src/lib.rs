//! Local execution agent.
//!
//! Runs on the user's machine, bound to loopback, and executes requests on
//! behalf of a web front-end that cannot reach local or private targets
//! itself. There is no address validation here: the agent only ever acts for
//! the machine it runs on. Timeout, redirect and body limits still apply.

pub mod autostart;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use courier_core::{AgentHealth, ExecutionResult, Executor, ExecutorConfig, RequestDescriptor};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use courier_core::DEFAULT_AGENT_PORT;

const CORS_MAX_AGE: Duration = Duration::from_secs(12 * 3600);

#[derive(Clone)]
struct AgentState {
    executor: Arc<Executor>,
}

/// Router with the default limits: 30 s timeout, 5 redirects, 50 MiB bodies.
pub fn app() -> Router {
    app_with(Executor::unguarded(ExecutorConfig::default()))
}

pub fn app_with(executor: Executor) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_LENGTH])
        .max_age(CORS_MAX_AGE);

    Router::new()
        .route("/health", get(health))
        .route("/execute", post(execute))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AgentState {
            executor: Arc::new(executor),
        })
}

async fn health() -> Json<AgentHealth> {
    Json(AgentHealth {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        message: "Agent is running".to_string(),
    })
}

/// Execution failures come back as 200 with `error` set; only input the
/// agent cannot parse is rejected.
async fn execute(State(state): State<AgentState>, body: Bytes) -> Response {
    let descriptor: RequestDescriptor = match serde_json::from_slice(&body) {
        Ok(d) => d,
        Err(e) => {
            warn!(error = %e, "rejected execute request");
            let body = json!({
                "error": "invalid_request",
                "message": format!("Invalid request: {e}"),
            });
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };

    let method = descriptor.method;
    let url = descriptor.url.clone();
    let executor = state.executor.clone();
    let result = tokio::task::spawn_blocking(move || executor.run(&descriptor))
        .await
        .unwrap_or_else(|e| ExecutionResult::failed(format!("execution task failed: {e}"), 0));

    match &result.error {
        None => info!(%method, %url, status = result.status, duration_ms = result.duration_ms, "executed request"),
        Some(error) => warn!(%method, %url, %error, "execution failed"),
    }
    Json(result).into_response()
}

/// Serve the agent on `listener` until `shutdown` resolves.
pub async fn run(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    info!(addr = %listener.local_addr()?, "courier agent listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
