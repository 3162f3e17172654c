//! Environment-variable driven configuration.

use std::env;
use std::time::Duration;

/// Process-wide configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Number of worker loops draining the compile queue.
    pub worker_count: usize,
    /// Bounded queue capacity ahead of the worker pool.
    pub queue_capacity: usize,
    /// Default per-job sandbox timeout.
    pub compile_timeout: Duration,
    /// Rate limiter token bucket capacity.
    pub rate_limit_capacity: u32,
    /// Rate limiter refill window.
    pub rate_limit_window: Duration,
    /// Redis URL for the shared job store; `None` selects the in-process store.
    pub redis_url: Option<String>,
    /// Namespace the cluster backend creates Jobs/ConfigMaps in.
    pub cluster_namespace: String,
}

impl Config {
    /// Loads configuration from the environment, falling back to the
    /// defaults named throughout this service's design.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
            worker_count: env::var("WORKER_COUNT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            queue_capacity: env::var("QUEUE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
            compile_timeout: Duration::from_secs(
                env::var("COMPILE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            rate_limit_capacity: env::var("RATE_LIMIT_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            rate_limit_window: Duration::from_secs(
                env::var("RATE_LIMIT_WINDOW_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60),
            ),
            redis_url: env::var("REDIS_URL").ok(),
            cluster_namespace: env::var("CLUSTER_NAMESPACE")
                .unwrap_or_else(|_| "default".to_string()),
        }
    }

    /// The standard in-cluster env var Kubernetes injects into every pod;
    /// its presence selects the cluster-scheduled sandbox backend.
    pub fn running_in_cluster() -> bool {
        env::var("KUBERNETES_SERVICE_HOST").is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        // SAFETY: single-threaded test, no concurrent env access.
        unsafe {
            env::remove_var("PORT");
            env::remove_var("WORKER_COUNT");
            env::remove_var("QUEUE_CAPACITY");
        }
        let cfg = Config::from_env();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.worker_count, 5);
        assert_eq!(cfg.queue_capacity, 100);
        assert_eq!(cfg.compile_timeout, Duration::from_secs(30));
    }
}
