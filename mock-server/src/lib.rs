//! Scriptable HTTP target used by the integration tests of every crate.
//!
//! Each route produces one behavior the executor has to cope with: a created
//! resource, echoes, arbitrary statuses, redirect chains, large bodies, and
//! slow responses. Every request path is recorded so tests can assert that a
//! blocked request never arrived.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::{OriginalUri, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};

pub type RequestLog = Arc<RwLock<Vec<String>>>;

/// What `/echo` reports back about the request it received.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub headers: std::collections::BTreeMap<String, String>,
    pub body: String,
}

#[derive(Deserialize)]
struct RedirectTo {
    url: String,
    #[serde(default = "found")]
    status: u16,
}

fn found() -> u16 {
    302
}

pub fn app() -> Router {
    app_with_log(RequestLog::default())
}

pub fn app_with_log(log: RequestLog) -> Router {
    Router::new()
        .route("/resources", post(create_resource))
        .route("/echo", any(echo))
        .route("/status/{code}", any(status_code))
        .route("/redirect/{n}", any(redirect_chain))
        .route("/redirect-to", any(redirect_to))
        .route("/bytes/{n}", get(bytes))
        .route("/slow/{ms}", get(slow))
        .route("/log", get(read_log))
        .layer(axum::middleware::from_fn_with_state(log.clone(), record))
        .with_state(log)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// A mock server running on its own thread and runtime.
pub struct MockServer {
    pub addr: SocketAddr,
    pub log: RequestLog,
}

impl MockServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Paths received so far, in arrival order.
    pub async fn requests(&self) -> Vec<String> {
        self.log.read().await.clone()
    }

    /// `requests` for callers outside a runtime.
    pub fn requests_blocking(&self) -> Vec<String> {
        self.log.blocking_read().clone()
    }
}

/// Bind `127.0.0.1:0` and serve on a background thread, so blocking callers
/// (the executor, `ureq`) can talk to it from the test thread.
pub fn spawn_background() -> std::io::Result<MockServer> {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = std_listener.local_addr()?;
    std_listener.set_nonblocking(true)?;
    let log = RequestLog::default();
    let router = app_with_log(log.clone());

    std::thread::spawn(move || -> std::io::Result<()> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        rt.block_on(async {
            let listener = TcpListener::from_std(std_listener)?;
            axum::serve(listener, router).await
        })
    });

    Ok(MockServer { addr, log })
}

async fn record(
    State(log): State<RequestLog>,
    OriginalUri(uri): OriginalUri,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    if uri.path() != "/log" {
        log.write().await.push(uri.path().to_string());
    }
    next.run(request).await
}

async fn read_log(State(log): State<RequestLog>) -> Json<Vec<String>> {
    Json(log.read().await.clone())
}

async fn create_resource() -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("x-test", HeaderValue::from_static("ok"));
    headers.append("x-multi", HeaderValue::from_static("first"));
    headers.append("x-multi", HeaderValue::from_static("second"));
    (StatusCode::CREATED, headers, Json(serde_json::json!({ "id": 1 }))).into_response()
}

async fn echo(method: Method, headers: HeaderMap, body: Bytes) -> Json<Echo> {
    let headers = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    Json(Echo {
        method: method.to_string(),
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

async fn status_code(Path(code): Path<u16>) -> Result<(StatusCode, String), StatusCode> {
    let status = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok((status, format!("status {code}")))
}

/// `/redirect/{n}` redirects to `/redirect/{n-1}` until `n` reaches zero.
async fn redirect_chain(Path(n): Path<u32>) -> Response {
    if n == 0 {
        return (StatusCode::OK, "done").into_response();
    }
    (
        StatusCode::FOUND,
        [(header::LOCATION, format!("/redirect/{}", n - 1))],
    )
        .into_response()
}

async fn redirect_to(Query(target): Query<RedirectTo>) -> Response {
    let status = StatusCode::from_u16(target.status)
        .ok()
        .filter(StatusCode::is_redirection)
        .unwrap_or(StatusCode::FOUND);
    (status, [(header::LOCATION, target.url)]).into_response()
}

async fn bytes(Path(n): Path<usize>) -> Vec<u8> {
    vec![b'a'; n]
}

async fn slow(Path(ms): Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    "finally"
}
