//! Service configuration from flags and environment variables.

use std::net::IpAddr;
use std::time::Duration;

use clap::Parser;
use courier_core::collection::{DEFAULT_MAX_HEADER_COUNT, DEFAULT_MAX_SIZE};
use courier_core::engine::{DEFAULT_MAX_REDIRECTS, DEFAULT_MAX_RESPONSE_SIZE, DEFAULT_TIMEOUT};
use courier_core::rate_limit::{DEFAULT_BURST, DEFAULT_REQUESTS_PER_SECOND};
use courier_core::{ExecutorConfig, ImportLimits, UrlPolicy};

/// Courier public request execution service.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Address to bind
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// End-to-end deadline for one execution, redirects included (e.g. "30s", "500ms")
    #[arg(long, env = "REQUEST_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
    pub request_timeout: Duration,

    /// Largest accepted collection upload, in bytes
    #[arg(long, env = "MAX_REQUEST_SIZE", default_value_t = DEFAULT_MAX_SIZE)]
    pub max_request_size: usize,

    /// Response bytes kept per execution
    #[arg(long, env = "MAX_RESPONSE_SIZE", default_value_t = DEFAULT_MAX_RESPONSE_SIZE)]
    pub max_response_size: u64,

    /// Most headers a single request may carry
    #[arg(long, env = "MAX_HEADER_COUNT", default_value_t = DEFAULT_MAX_HEADER_COUNT)]
    pub max_header_count: usize,

    /// Most redirects followed per execution
    #[arg(long, env = "MAX_REDIRECTS", default_value_t = DEFAULT_MAX_REDIRECTS)]
    pub max_redirects: usize,

    /// Permit targets that are localhost aliases
    #[arg(long, env = "ALLOW_LOCALHOST")]
    pub allow_localhost: bool,

    /// Permit targets resolving to loopback, private, or link-local addresses
    #[arg(long, env = "ALLOW_PRIVATE_IPS")]
    pub allow_private_ips: bool,

    /// Sustained executions per second per client IP
    #[arg(long, env = "RATE_LIMIT_RPS", default_value_t = DEFAULT_REQUESTS_PER_SECOND)]
    pub rate_limit_rps: f64,

    /// Executions a client IP may make in a burst
    #[arg(long, env = "RATE_LIMIT_BURST", default_value_t = DEFAULT_BURST)]
    pub rate_limit_burst: u32,

    /// How long an idle client's bucket is kept
    #[arg(long, env = "RATE_LIMIT_IDLE_TTL", default_value = "10m", value_parser = parse_duration)]
    pub rate_limit_idle_ttl: Duration,

    /// Origin allowed by CORS; "*" allows any
    #[arg(long, env = "CORS_ORIGIN", default_value = "http://localhost:5173")]
    pub cors_origin: String,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind: IpAddr::from([0, 0, 0, 0]),
            request_timeout: DEFAULT_TIMEOUT,
            max_request_size: DEFAULT_MAX_SIZE,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            max_header_count: DEFAULT_MAX_HEADER_COUNT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            allow_localhost: false,
            allow_private_ips: false,
            rate_limit_rps: DEFAULT_REQUESTS_PER_SECOND,
            rate_limit_burst: DEFAULT_BURST,
            rate_limit_idle_ttl: Duration::from_secs(600),
            cors_origin: "http://localhost:5173".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            timeout: self.request_timeout,
            max_response_size: self.max_response_size,
            max_redirects: self.max_redirects,
        }
    }

    pub fn url_policy(&self) -> UrlPolicy {
        UrlPolicy {
            allow_localhost: self.allow_localhost,
            allow_private_ips: self.allow_private_ips,
        }
    }

    pub fn import_limits(&self) -> ImportLimits {
        ImportLimits {
            max_size: self.max_request_size,
            max_header_count: self.max_header_count,
        }
    }
}

/// Parse a duration like "250ms", "30s", "10m", "2h", or a bare number of seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let number = |n: &str, unit: &str| -> Result<u64, String> {
        n.trim().parse().map_err(|_| format!("invalid {unit}: {n}"))
    };

    if let Some(n) = s.strip_suffix("ms") {
        return Ok(Duration::from_millis(number(n, "milliseconds")?));
    }
    if let Some(n) = s.strip_suffix('s') {
        return Ok(Duration::from_secs(number(n, "seconds")?));
    }
    if let Some(n) = s.strip_suffix('m') {
        return Ok(Duration::from_secs(number(n, "minutes")? * 60));
    }
    if let Some(n) = s.strip_suffix('h') {
        return Ok(Duration::from_secs(number(n, "hours")? * 3600));
    }
    if let Ok(secs) = s.parse() {
        return Ok(Duration::from_secs(secs));
    }

    Err(format!(
        "unrecognized duration format: '{s}'. Expected NNms, NNs, NNm, or NNh."
    ))
}
