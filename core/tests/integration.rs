//! End-to-end execution against the live mock server.
//!
//! # Design
//! Starts the mock server on a random loopback port, then drives the real
//! `UreqTransport` through the executor. The mock lives on 127.0.0.1, so
//! guarded executors here run with both allow flags set; the default policy
//! is exercised only to show the mock is never contacted.

use std::time::Duration;

use courier_core::{
    ExecuteError, Executor, ExecutorConfig, HttpMethod, RequestDescriptor, SafetyVerdict, UrlGuard, UrlPolicy,
};
use mock_server::{spawn_background, Echo};

fn permissive() -> Executor {
    let policy = UrlPolicy {
        allow_localhost: true,
        allow_private_ips: true,
    };
    Executor::guarded(ExecutorConfig::default(), UrlGuard::system(policy))
}

fn echo_of(body: &str) -> Echo {
    serde_json::from_str(body).unwrap()
}

#[test]
fn post_returns_created_resource() {
    let mock = spawn_background().unwrap();
    let descriptor = RequestDescriptor::new(HttpMethod::Post, mock.url("/resources"))
        .with_header("Content-Type", "application/json")
        .with_body(r#"{"name":"widget"}"#);

    let result = permissive().execute(&descriptor).unwrap();

    assert_eq!(result.status, 201);
    assert_eq!(result.status_text, "Created");
    assert_eq!(result.header("X-Test"), Some("ok"));
    assert_eq!(result.headers["x-multi"], ["first", "second"]);
    let body: serde_json::Value = serde_json::from_str(&result.body).unwrap();
    assert_eq!(body, serde_json::json!({ "id": 1 }));
    assert!(!result.truncated);
    assert!(result.error.is_none());
}

#[test]
fn default_policy_never_contacts_loopback() {
    let mock = spawn_background().unwrap();
    let executor = Executor::guarded(ExecutorConfig::default(), UrlGuard::system(UrlPolicy::default()));

    let err = executor
        .execute(&RequestDescriptor::new(HttpMethod::Get, mock.url("/echo")))
        .unwrap_err();

    assert!(matches!(err, ExecuteError::Blocked(SafetyVerdict::BlockedHost(_))), "{err:?}");
    assert!(mock.requests_blocking().is_empty());
}

#[test]
fn follows_a_short_redirect_chain() {
    let mock = spawn_background().unwrap();
    let result = permissive()
        .execute(&RequestDescriptor::new(HttpMethod::Get, mock.url("/redirect/3")))
        .unwrap();
    assert_eq!(result.status, 200);
    assert_eq!(result.body, "done");
    assert_eq!(mock.requests_blocking().len(), 4);
}

#[test]
fn stops_a_long_redirect_chain_after_five_hops() {
    let mock = spawn_background().unwrap();
    let err = permissive()
        .execute(&RequestDescriptor::new(HttpMethod::Get, mock.url("/redirect/6")))
        .unwrap_err();

    assert!(matches!(err, ExecuteError::RedirectLimit(5)), "{err:?}");
    let seen = mock.requests_blocking();
    assert_eq!(seen.len(), 6, "initial request plus five followed redirects: {seen:?}");
    assert_eq!(seen.last().map(String::as_str), Some("/redirect/1"));
}

#[test]
fn see_other_switches_to_get_and_drops_body() {
    let mock = spawn_background().unwrap();
    let descriptor = RequestDescriptor::new(HttpMethod::Post, mock.url("/redirect-to?url=/echo&status=303"))
        .with_header("Content-Type", "text/plain")
        .with_body("first");

    let result = permissive().execute(&descriptor).unwrap();

    let echo = echo_of(&result.body);
    assert_eq!(echo.method, "GET");
    assert_eq!(echo.body, "");
    assert!(!echo.headers.contains_key("content-type"));
}

#[test]
fn temporary_redirect_replays_method_and_body() {
    let mock = spawn_background().unwrap();
    let descriptor = RequestDescriptor::new(HttpMethod::Put, mock.url("/redirect-to?url=/echo&status=307"))
        .with_body("again");

    let echo = echo_of(&permissive().execute(&descriptor).unwrap().body);

    assert_eq!(echo.method, "PUT");
    assert_eq!(echo.body, "again");
}

#[test]
fn delete_may_carry_a_body_and_custom_headers() {
    let mock = spawn_background().unwrap();
    let descriptor = RequestDescriptor::new(HttpMethod::Delete, mock.url("/echo"))
        .with_header("X-Reason", "cleanup")
        .with_body("ids=1,2");

    let echo = echo_of(&permissive().execute(&descriptor).unwrap().body);

    assert_eq!(echo.method, "DELETE");
    assert_eq!(echo.body, "ids=1,2");
    assert_eq!(echo.headers["x-reason"], "cleanup");
}

#[test]
fn get_drops_the_descriptor_body() {
    let mock = spawn_background().unwrap();
    let descriptor = RequestDescriptor::new(HttpMethod::Get, mock.url("/echo")).with_body("ignored");
    let echo = echo_of(&permissive().execute(&descriptor).unwrap().body);
    assert_eq!(echo.method, "GET");
    assert_eq!(echo.body, "");
}

#[test]
fn error_statuses_are_results() {
    let mock = spawn_background().unwrap();
    let result = permissive()
        .execute(&RequestDescriptor::new(HttpMethod::Get, mock.url("/status/503")))
        .unwrap();
    assert_eq!(result.status, 503);
    assert_eq!(result.status_text, "Service Unavailable");
    assert_eq!(result.body, "status 503");
}

#[test]
fn oversized_bodies_are_truncated() {
    let mock = spawn_background().unwrap();
    let config = ExecutorConfig {
        max_response_size: 1024,
        ..Default::default()
    };
    let result = Executor::unguarded(config)
        .execute(&RequestDescriptor::new(HttpMethod::Get, mock.url("/bytes/4096")))
        .unwrap();
    assert_eq!(result.body.len(), 1024);
    assert!(result.truncated);

    let exact = Executor::unguarded(ExecutorConfig {
        max_response_size: 1024,
        ..Default::default()
    })
    .execute(&RequestDescriptor::new(HttpMethod::Get, mock.url("/bytes/1024")))
    .unwrap();
    assert!(!exact.truncated);
}

#[test]
fn slow_targets_time_out() {
    let mock = spawn_background().unwrap();
    let config = ExecutorConfig {
        timeout: Duration::from_millis(200),
        ..Default::default()
    };
    let result = Executor::unguarded(config).run(&RequestDescriptor::new(HttpMethod::Get, mock.url("/slow/3000")));
    assert_eq!(result.status, 0);
    assert_eq!(result.error.as_deref(), Some("request timed out after 200ms"));
}

#[test]
fn connection_failures_are_reported() {
    let unused = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = unused.local_addr().unwrap();
    drop(unused);

    let err = Executor::unguarded(ExecutorConfig::default())
        .execute(&RequestDescriptor::new(HttpMethod::Get, format!("http://{addr}/")))
        .unwrap_err();
    assert!(matches!(err, ExecuteError::Transport(_)), "{err:?}");
}
