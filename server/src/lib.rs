//! Courier public service: stores Postman collections and executes their
//! requests behind SSRF protection and per-client rate limiting.

pub mod collections;
pub mod config;
pub mod error;
pub mod execute;
pub mod items;
pub mod state;
pub mod store;

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

pub use config::Config;
pub use error::{AppError, ErrorBody};
pub use state::AppState;

const CORS_MAX_AGE: Duration = Duration::from_secs(12 * 3600);

pub fn app(state: AppState) -> Router {
    let execute = Router::new()
        .route("/items/{id}/execute", post(execute::execute_item))
        .route_layer(middleware::from_fn_with_state(state.clone(), execute::rate_limit));

    let api = Router::new()
        .route("/collections/upload", post(collections::upload))
        .route("/collections", get(collections::list))
        .route("/collections/{id}/tree", get(collections::tree))
        .route("/collections/{id}/items", post(items::create))
        .route("/items/{id}", get(items::get).put(items::update).delete(items::delete))
        .merge(execute);

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origin))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
        ])
        .expose_headers([header::CONTENT_LENGTH, header::CONTENT_TYPE])
        .max_age(CORS_MAX_AGE);

    if origin == "*" {
        return layer.allow_origin(AllowOrigin::any());
    }
    match HeaderValue::from_str(origin) {
        Ok(value) => layer.allow_origin(value).allow_credentials(true),
        Err(_) => {
            warn!(origin, "invalid CORS origin, allowing any origin without credentials");
            layer.allow_origin(AllowOrigin::any())
        }
    }
}

/// Periodically drop idle rate limit buckets until the process exits.
pub fn spawn_bucket_sweeper(state: &AppState) -> tokio::task::JoinHandle<()> {
    let limiter = state.limiter.clone();
    let ttl = state.config.rate_limit_idle_ttl;
    let period = (ttl / 2).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = limiter.sweep_idle(ttl);
            debug!(removed, tracked = limiter.tracked_clients(), "rate limit sweep");
        }
    })
}

/// Serve `state` on `listener` until `shutdown` resolves.
pub async fn run(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let sweeper = spawn_bucket_sweeper(&state);
    info!(addr = %listener.local_addr()?, "courier server listening");
    let served = axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await;
    sweeper.abort();
    served
}
