use axum::http::{self, header, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, app_with_log, Echo, RequestLog};
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn empty(method: &str, uri: &str) -> Request<String> {
    Request::builder().method(method).uri(uri).body(String::new()).unwrap()
}

// --- resources ---

#[tokio::test]
async fn create_resource_returns_201_with_test_header() {
    let resp = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/resources")
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(r#"{"name":"x"}"#.to_string())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::CREATED);
    assert_eq!(resp.headers()["x-test"], "ok");
    let multi: Vec<&str> = resp
        .headers()
        .get_all("x-multi")
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert_eq!(multi, ["first", "second"]);
    let body: serde_json::Value = body_json(resp).await;
    assert_eq!(body, serde_json::json!({ "id": 1 }));
}

#[tokio::test]
async fn get_resources_is_not_allowed() {
    let resp = app().oneshot(empty("GET", "/resources")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

// --- echo ---

#[tokio::test]
async fn echo_reports_method_headers_and_body() {
    let resp = app()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri("/echo")
                .header("x-custom", "42")
                .body("payload".to_string())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let echo: Echo = body_json(resp).await;
    assert_eq!(echo.method, "PATCH");
    assert_eq!(echo.headers["x-custom"], "42");
    assert_eq!(echo.body, "payload");
}

// --- status ---

#[tokio::test]
async fn status_route_returns_requested_code() {
    let resp = app().oneshot(empty("GET", "/status/418")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::IM_A_TEAPOT);
    assert_eq!(body_bytes(resp).await, "status 418");
}

#[tokio::test]
async fn status_route_rejects_out_of_range_codes() {
    let resp = app().oneshot(empty("GET", "/status/1000")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- redirects ---

#[tokio::test]
async fn redirect_chain_counts_down() {
    let resp = app().oneshot(empty("GET", "/redirect/3")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers()[header::LOCATION], "/redirect/2");

    let resp = app().oneshot(empty("GET", "/redirect/0")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, "done");
}

#[tokio::test]
async fn redirect_to_uses_requested_status() {
    let resp = app()
        .oneshot(empty("POST", "/redirect-to?url=http://127.0.0.1/&status=307"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(resp.headers()[header::LOCATION], "http://127.0.0.1/");
}

#[tokio::test]
async fn redirect_to_falls_back_to_found_for_non_redirect_status() {
    let resp = app()
        .oneshot(empty("GET", "/redirect-to?url=/echo&status=200"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
}

// --- bodies ---

#[tokio::test]
async fn bytes_returns_exact_length() {
    let resp = app().oneshot(empty("GET", "/bytes/1024")).await.unwrap();
    assert_eq!(body_bytes(resp).await.len(), 1024);
}

#[tokio::test]
async fn slow_eventually_answers() {
    let resp = app().oneshot(empty("GET", "/slow/10")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, "finally");
}

// --- log ---

#[tokio::test]
async fn requests_are_recorded_in_order() {
    let log = RequestLog::default();
    let app = app_with_log(log.clone());
    app.clone().oneshot(empty("GET", "/status/200")).await.unwrap();
    app.clone().oneshot(empty("GET", "/echo")).await.unwrap();

    let resp = app.oneshot(empty("GET", "/log")).await.unwrap();
    let paths: Vec<String> = body_json(resp).await;
    assert_eq!(paths, ["/status/200", "/echo"]);
    assert_eq!(*log.read().await, ["/status/200", "/echo"]);
}
