use std::sync::Arc;

use courier_core::{Executor, RateLimiter, UrlGuard};

use crate::config::Config;
use crate::store::Store;

/// Shared handler state. Cloning is cheap; every field is behind an `Arc`.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub executor: Arc<Executor>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    /// State whose validator uses the system resolver.
    pub fn new(config: Config) -> Self {
        let guard = UrlGuard::system(config.url_policy());
        Self::with_guard(config, guard)
    }

    pub fn with_guard(config: Config, guard: UrlGuard) -> Self {
        let executor = Executor::guarded(config.executor_config(), guard);
        let limiter = RateLimiter::new(config.rate_limit_rps, config.rate_limit_burst);
        Self {
            config: Arc::new(config),
            store: Arc::new(Store::new()),
            executor: Arc::new(executor),
            limiter: Arc::new(limiter),
        }
    }
}
