//! SSRF-safe HTTP request execution core for Courier.
//!
//! # Overview
//! Executes user-described HTTP requests on behalf of remote callers while
//! refusing to reach loopback, private, link-local, and cloud metadata
//! addresses, including through redirects. The same engine runs unguarded
//! inside the local agent, where reaching the developer's own machine is the
//! point.
//!
//! # Design
//! - `url_guard` classifies URLs; `redirect` re-applies it on every hop.
//! - `engine` drives one execution through a `Transport`, which is the only
//!   place bytes touch the network (`UreqTransport` in production).
//! - `rate_limit` holds per-client token buckets for the public service.
//! - `collection` and `tree` import Postman documents and rebuild item trees.
//! - `client` builds and parses agent API calls without doing I/O.

pub mod client;
pub mod collection;
pub mod engine;
pub mod error;
pub mod http;
pub mod rate_limit;
pub mod redirect;
pub mod transport;
pub mod tree;
pub mod types;
pub mod url_guard;

pub use client::{AgentClient, DEFAULT_AGENT_PORT};
pub use collection::{ImportError, ImportLimits, PostmanCollection};
pub use engine::{Executor, ExecutorConfig};
pub use error::{ApiError, ErrorKind, ExecuteError, TransportError};
pub use http::{HeaderSet, HttpMethod, HttpRequest, HttpResponse};
pub use rate_limit::{RateDecision, RateLimiter};
pub use redirect::RedirectGuard;
pub use transport::{Transport, UreqTransport};
pub use tree::{build_tree, TreeNode};
pub use types::{
    AgentHealth, Collection, CollectionItem, ExecuteOverrides, ExecutionResult, HeaderEntry, ItemKind,
    RequestDescriptor,
};
pub use url_guard::{BlockedRange, Resolver, SafetyVerdict, StaticResolver, SystemResolver, UrlGuard, UrlPolicy};
