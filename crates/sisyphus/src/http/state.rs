//! Shared application state handed to every handler.

use std::sync::Arc;

use crate::config::Config;
use crate::environments::EnvironmentRegistry;
use crate::pool::WorkerPool;
use crate::rate_limit::RateLimiter;
use crate::store::JobStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub pool: Arc<WorkerPool>,
    pub registry: Arc<EnvironmentRegistry>,
    pub rate_limiter: Arc<RateLimiter>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn JobStore>,
        pool: Arc<WorkerPool>,
        registry: Arc<EnvironmentRegistry>,
        rate_limiter: Arc<RateLimiter>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            pool,
            registry,
            rate_limiter,
            config,
        }
    }
}
