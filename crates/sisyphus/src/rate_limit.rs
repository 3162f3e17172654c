//! The rate limiter (C6): a per-client-IP token bucket guarding only the
//! compile-submit route. Pure in-memory — restarting resets every bucket,
//! which is acceptable since persistence is out of scope for this service.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Bucket {
    remaining: u32,
    window_started: Instant,
    last_seen: Instant,
}

pub struct RateLimiter {
    capacity: u32,
    window: Duration,
    buckets: Mutex<HashMap<IpAddr, Bucket>>,
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity,
            window,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Consumes one token for `ip`. Returns `true` if the request is
    /// admitted, `false` if the bucket is empty.
    pub fn check(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
        let bucket = buckets.entry(ip).or_insert_with(|| Bucket {
            remaining: self.capacity,
            window_started: now,
            last_seen: now,
        });

        if now.duration_since(bucket.window_started) >= self.window {
            bucket.remaining = self.capacity;
            bucket.window_started = now;
        }
        bucket.last_seen = now;

        if bucket.remaining == 0 {
            false
        } else {
            bucket.remaining -= 1;
            true
        }
    }

    /// Removes entries idle beyond 10x the refill window. Intended to run
    /// on a background interval for the lifetime of the process.
    pub fn sweep(&self) {
        let idle_after = self.window * 10;
        let now = Instant::now();
        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
        buckets.retain(|_, bucket| now.duration_since(bucket.last_seen) < idle_after);
    }

    /// Spawns the background sweep task; returns its handle so callers can
    /// abort it on shutdown if desired.
    pub fn spawn_sweeper(self: std::sync::Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = self.window;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.sweep();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_enforced_then_refilled() {
        let limiter = RateLimiter::new(2, Duration::from_millis(50));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        assert!(limiter.check(ip));
        assert!(limiter.check(ip));
        assert!(!limiter.check(ip));

        std::thread::sleep(Duration::from_millis(60));
        assert!(limiter.check(ip));
    }

    #[test]
    fn distinct_ips_have_independent_buckets() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.check(a));
        assert!(!limiter.check(a));
        assert!(limiter.check(b));
    }

    #[test]
    fn sweep_evicts_idle_entries() {
        let limiter = RateLimiter::new(1, Duration::from_millis(10));
        let ip: IpAddr = "10.0.0.3".parse().unwrap();
        limiter.check(ip);
        std::thread::sleep(Duration::from_millis(120));
        limiter.sweep();
        assert_eq!(limiter.buckets.lock().unwrap().len(), 0);
    }
}
