//! Single-hop HTTP transport.
//!
//! # Design
//! A `Transport` sends exactly one request and returns exactly one response.
//! It never follows redirects and never turns an HTTP status into an error;
//! both decisions belong to the engine. `UreqTransport` is the production
//! implementation.

use std::io::{self, Read};
use std::time::Duration;

use ureq::typestate::WithBody;
use ureq::{Agent, Body, RequestBuilder};

use crate::error::TransportError;
use crate::http::{HeaderSet, HttpMethod, HttpRequest, HttpResponse};

pub trait Transport: Send + Sync {
    /// Send `request`, giving up after `timeout`, keeping at most `max_body`
    /// response bytes.
    fn send(
        &self,
        request: &HttpRequest,
        timeout: Duration,
        max_body: u64,
    ) -> Result<HttpResponse, TransportError>;
}

/// Blocking transport backed by `ureq`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UreqTransport;

impl UreqTransport {
    fn agent(timeout: Duration) -> Agent {
        Agent::config_builder()
            .http_status_as_error(false)
            .max_redirects(0)
            .max_redirects_will_error(false)
            .timeout_global(Some(timeout))
            .build()
            .new_agent()
    }
}

impl Transport for UreqTransport {
    fn send(
        &self,
        request: &HttpRequest,
        timeout: Duration,
        max_body: u64,
    ) -> Result<HttpResponse, TransportError> {
        let agent = Self::agent(timeout);
        let url = request.url.as_str();
        let body = request.body.as_deref();

        let result = match request.method {
            HttpMethod::Get => with_headers(agent.get(url), &request.headers).call(),
            HttpMethod::Delete => {
                let builder = with_headers(agent.delete(url), &request.headers);
                match body {
                    Some(bytes) => builder.force_send_body().send(bytes),
                    None => builder.call(),
                }
            }
            HttpMethod::Post => send_body(with_headers(agent.post(url), &request.headers), body),
            HttpMethod::Put => send_body(with_headers(agent.put(url), &request.headers), body),
            HttpMethod::Patch => send_body(with_headers(agent.patch(url), &request.headers), body),
        };
        let mut response = result.map_err(map_ureq_error)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        let mut bytes = Vec::new();
        response
            .body_mut()
            .as_reader()
            .take(max_body.saturating_add(1))
            .read_to_end(&mut bytes)
            .map_err(map_read_error)?;
        let truncated = bytes.len() as u64 > max_body;
        if truncated {
            bytes.truncate(max_body as usize);
        }

        Ok(HttpResponse {
            status,
            headers,
            body: bytes,
            truncated,
        })
    }
}

fn with_headers<B>(mut builder: RequestBuilder<B>, headers: &HeaderSet) -> RequestBuilder<B> {
    for (name, value) in headers.iter() {
        builder = builder.header(name, value);
    }
    builder
}

fn send_body(
    builder: RequestBuilder<WithBody>,
    body: Option<&[u8]>,
) -> Result<ureq::http::Response<Body>, ureq::Error> {
    match body {
        Some(bytes) => builder.send(bytes),
        None => builder.send_empty(),
    }
}

fn map_ureq_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Timeout(_) => TransportError::Timeout,
        ureq::Error::Io(e) if e.kind() == io::ErrorKind::TimedOut => TransportError::Timeout,
        other => TransportError::Request(other.to_string()),
    }
}

fn map_read_error(err: io::Error) -> TransportError {
    if err.kind() == io::ErrorKind::TimedOut {
        return TransportError::Timeout;
    }
    TransportError::Body(err.to_string())
}
