//! Redirect following with per-hop validation.
//!
//! The transport never follows redirects on its own. The engine hands each
//! 3xx response to `RedirectGuard::check`, which enforces the hop ceiling and
//! (for the public service) re-runs the URL validator on the target, then
//! builds the next hop with `follow`.

use std::time::{Duration, Instant};

use tracing::warn;
use url::Url;

use crate::error::ExecuteError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::url_guard::UrlGuard;

/// Headers that must not leak to a different host.
const CREDENTIAL_HEADERS: [&str; 2] = ["authorization", "cookie"];

#[derive(Debug, Clone)]
pub struct RedirectGuard {
    max: usize,
    guard: Option<UrlGuard>,
}

impl RedirectGuard {
    /// Enforce only the hop ceiling.
    pub fn counting(max: usize) -> Self {
        Self { max, guard: None }
    }

    /// Enforce the hop ceiling and validate every target.
    pub fn validating(max: usize, guard: UrlGuard) -> Self {
        Self {
            max,
            guard: Some(guard),
        }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Decide whether to follow a redirect to `target` after `followed` hops.
    ///
    /// Validation shares the call's `deadline`; running out of it is reported
    /// as a timeout of the whole `timeout` budget.
    pub fn check(
        &self,
        followed: usize,
        target: &Url,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<(), ExecuteError> {
        if followed >= self.max {
            warn!(max = self.max, target = %target, "redirect limit exceeded");
            return Err(ExecuteError::RedirectLimit(self.max));
        }
        if let Some(guard) = &self.guard {
            let verdict = guard
                .validate_url_until(target, deadline)
                .map_err(|_| ExecuteError::Timeout(timeout))?;
            if !verdict.is_allowed() {
                warn!(hop = followed + 1, target = %target, reason = %verdict, "redirect blocked");
                return Err(ExecuteError::RedirectBlocked(verdict));
            }
        }
        Ok(())
    }
}

/// `Location` of a redirect response, or `None` if `response` is final.
pub fn location(response: &HttpResponse) -> Option<&str> {
    match response.status {
        301 | 302 | 303 | 307 | 308 => response.header("location"),
        _ => None,
    }
}

/// Build the next hop after a redirect with `status` to `target`.
///
/// 301/302/303 switch non-GET requests to GET and drop the body; 307/308
/// replay the request unchanged. Credentials are dropped on a host change.
pub fn follow(mut request: HttpRequest, status: u16, target: Url) -> HttpRequest {
    if matches!(status, 301..=303) && request.method != HttpMethod::Get {
        request.method = HttpMethod::Get;
        request.body = None;
        request.headers.remove("content-type");
        request.headers.remove("content-length");
    }
    if request.url.host_str() != target.host_str() {
        for name in CREDENTIAL_HEADERS {
            request.headers.remove(name);
        }
    }
    request.url = target;
    request
}
