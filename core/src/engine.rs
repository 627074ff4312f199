//! Request execution: build, gate, send, follow redirects, normalize.
//!
//! # Design
//! `Executor` owns one `Transport` and drives the hop loop itself so every
//! redirect target passes through the `RedirectGuard` before a socket is
//! opened for it. One deadline covers the whole call; each hop gets whatever
//! budget is left. There are no retries: the first failure ends the call.
//!
//! The public service builds its executor with `Executor::guarded`, which
//! validates hop 0 and every redirect target. The local agent uses
//! `Executor::unguarded`, which keeps the limits but skips address checks.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use ureq::http::{HeaderName, HeaderValue, StatusCode};
use url::Url;

use crate::error::{ExecuteError, TransportError};
use crate::http::{HttpRequest, HttpResponse};
use crate::redirect::{self, RedirectGuard};
use crate::transport::{Transport, UreqTransport};
use crate::types::{ExecutionResult, RequestDescriptor};
use crate::url_guard::UrlGuard;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RESPONSE_SIZE: u64 = 50 * 1024 * 1024;
pub const DEFAULT_MAX_REDIRECTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Deadline for the whole call, redirects included.
    pub timeout: Duration,
    /// Response bytes kept; the rest is dropped and flagged as truncated.
    pub max_response_size: u64,
    pub max_redirects: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

#[derive(Debug)]
pub struct Executor<T = UreqTransport> {
    transport: T,
    config: ExecutorConfig,
    gate: Option<UrlGuard>,
    redirects: RedirectGuard,
}

impl Executor<UreqTransport> {
    /// Executor for untrusted callers: every hop is validated by `guard`.
    pub fn guarded(config: ExecutorConfig, guard: UrlGuard) -> Self {
        Self::with_transport(UreqTransport, config, Some(guard))
    }

    /// Executor for the local agent: limits only, no address checks.
    pub fn unguarded(config: ExecutorConfig) -> Self {
        Self::with_transport(UreqTransport, config, None)
    }
}

impl<T: Transport> Executor<T> {
    pub fn with_transport(transport: T, config: ExecutorConfig, gate: Option<UrlGuard>) -> Self {
        let redirects = match &gate {
            Some(guard) => RedirectGuard::validating(config.max_redirects, guard.clone()),
            None => RedirectGuard::counting(config.max_redirects),
        };
        Self {
            transport,
            config,
            gate,
            redirects,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn is_guarded(&self) -> bool {
        self.gate.is_some()
    }

    /// Turn a descriptor into the first hop.
    ///
    /// The body is attached only for methods that carry one and only when it
    /// is non-empty.
    pub fn build(&self, descriptor: &RequestDescriptor) -> Result<HttpRequest, ExecuteError> {
        let url = Url::parse(&descriptor.url).map_err(|e| {
            ExecuteError::InvalidRequest(format!("invalid URL {:?}: {e}", descriptor.url))
        })?;

        for (name, value) in descriptor.headers.iter() {
            HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ExecuteError::InvalidRequest(format!("invalid header name {name:?}")))?;
            HeaderValue::from_str(value).map_err(|_| {
                ExecuteError::InvalidRequest(format!("invalid value for header {name:?}"))
            })?;
        }

        let body = descriptor
            .body
            .as_deref()
            .filter(|b| !b.is_empty() && descriptor.method.supports_body())
            .map(|b| b.as_bytes().to_vec());

        Ok(HttpRequest {
            method: descriptor.method,
            url,
            headers: descriptor.headers.clone(),
            body,
        })
    }

    pub fn execute(&self, descriptor: &RequestDescriptor) -> Result<ExecutionResult, ExecuteError> {
        let started = Instant::now();
        let deadline = started + self.config.timeout;
        let mut request = self.build(descriptor)?;

        if let Some(gate) = &self.gate {
            let verdict = gate
                .validate_url_until(&request.url, deadline)
                .map_err(|_| ExecuteError::Timeout(self.config.timeout))?;
            if !verdict.is_allowed() {
                warn!(url = %request.url, reason = %verdict, "request blocked");
                return Err(ExecuteError::Blocked(verdict));
            }
        }

        let mut followed = 0;
        let response = loop {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .filter(|d| !d.is_zero())
                .ok_or(ExecuteError::Timeout(self.config.timeout))?;

            debug!(method = %request.method, url = %request.url, hop = followed, "sending request");
            let response = self
                .transport
                .send(&request, remaining, self.config.max_response_size)
                .map_err(|e| match e {
                    TransportError::Timeout => ExecuteError::Timeout(self.config.timeout),
                    other => ExecuteError::Transport(other),
                })?;

            let location = redirect::location(&response).map(str::to_owned);
            let Some(location) = location else {
                break response;
            };
            let target = request
                .url
                .join(&location)
                .map_err(|e| ExecuteError::InvalidRedirect(format!("{location:?}: {e}")))?;
            self.redirects.check(followed, &target, deadline, self.config.timeout)?;
            request = redirect::follow(request, response.status, target);
            followed += 1;
        };

        let result = complete(response, started.elapsed());
        debug!(
            status = result.status,
            redirects = followed,
            duration_ms = result.duration_ms,
            truncated = result.truncated,
            "request complete"
        );
        Ok(result)
    }

    /// Like `execute`, but reports failures inside the result.
    pub fn run(&self, descriptor: &RequestDescriptor) -> ExecutionResult {
        let started = Instant::now();
        match self.execute(descriptor) {
            Ok(result) => result,
            Err(e) => ExecutionResult::failed(e.to_string(), millis(started.elapsed())),
        }
    }
}

fn complete(response: HttpResponse, elapsed: Duration) -> ExecutionResult {
    let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in response.headers {
        headers.entry(name.to_ascii_lowercase()).or_default().push(value);
    }
    ExecutionResult {
        status: response.status,
        status_text: StatusCode::from_u16(response.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or_default()
            .to_string(),
        headers,
        body: String::from_utf8_lossy(&response.body).into_owned(),
        duration_ms: millis(elapsed),
        truncated: response.truncated,
        error: None,
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
