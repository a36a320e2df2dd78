//! Fixed-window counters with TTL reset.
//!
//! Replaces the teacher's token-bucket algorithm (continuous refill) with
//! the windowed counter the gateway's quota middleware actually needs: a
//! counter created at zero with a TTL, incremented on each fulfilled call,
//! and implicitly reset whenever the TTL lapses.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait RateLimitBackend: Send + Sync + 'static {
    /// Returns the counter's current value, creating it at `0` with `ttl`
    /// if absent or expired.
    fn get_or_create<'a>(&'a self, key: &'a str, ttl: Duration) -> BoxFuture<'a, u64>;

    /// Increments the counter. A no-op if the key does not exist (it
    /// should always have been created by a prior `get_or_create`).
    fn increment<'a>(&'a self, key: &'a str) -> BoxFuture<'a, ()>;
}

struct Counter {
    value: u64,
    created_at: Instant,
    ttl: Duration,
}

#[derive(Clone, Default)]
pub struct InMemoryRateLimitBackend {
    counters: Arc<DashMap<String, Counter>>,
}

impl InMemoryRateLimitBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimitBackend for InMemoryRateLimitBackend {
    fn get_or_create<'a>(&'a self, key: &'a str, ttl: Duration) -> BoxFuture<'a, u64> {
        Box::pin(async move {
            let expired = self.counters.get(key).map(|c| c.created_at.elapsed() >= c.ttl).unwrap_or(true);
            if expired {
                self.counters.insert(key.to_string(), Counter { value: 0, created_at: Instant::now(), ttl });
                0
            } else {
                self.counters.get(key).map(|c| c.value).unwrap_or(0)
            }
        })
    }

    fn increment<'a>(&'a self, key: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if let Some(mut entry) = self.counters.get_mut(key) {
                entry.value += 1;
            }
        })
    }
}
