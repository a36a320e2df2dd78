//! In-memory `IdempotencyStore`, used by tests and by `IS_LOCAL` dev runs.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::DataError;
use crate::idempotency::{IdempotencyStore, LockOutcome};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

struct Row {
    expires_at: Instant,
}

#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    rows: Mutex<HashMap<(String, String), Row>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdempotencyStore for InMemoryIdempotencyStore {
    fn try_acquire<'a>(&'a self, key: &'a str, scope: &'a str, ttl: Duration) -> BoxFuture<'a, Result<LockOutcome, DataError>> {
        Box::pin(async move {
            if ttl.is_zero() {
                return Ok(LockOutcome::Acquired);
            }
            let mut rows = self.rows.lock().expect("idempotency store mutex poisoned");
            let row_key = (key.to_string(), scope.to_string());
            let now = Instant::now();
            if let Some(row) = rows.get(&row_key) {
                if row.expires_at > now {
                    let remaining_seconds = (row.expires_at - now).as_secs() as i64;
                    return Ok(LockOutcome::AlreadyHeld { remaining_seconds });
                }
            }
            rows.insert(row_key, Row { expires_at: now + ttl });
            Ok(LockOutcome::Acquired)
        })
    }

    fn release<'a>(&'a self, key: &'a str, scope: &'a str) -> BoxFuture<'a, Result<(), DataError>> {
        Box::pin(async move {
            self.rows.lock().expect("idempotency store mutex poisoned").remove(&(key.to_string(), scope.to_string()));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_within_ttl_is_already_held() {
        let store = InMemoryIdempotencyStore::new();
        assert_eq!(store.try_acquire("k1", "s1", Duration::from_secs(60)).await.unwrap(), LockOutcome::Acquired);
        let second = store.try_acquire("k1", "s1", Duration::from_secs(60)).await.unwrap();
        assert!(matches!(second, LockOutcome::AlreadyHeld { .. }));
    }

    #[tokio::test]
    async fn release_admits_the_next_acquire_immediately() {
        let store = InMemoryIdempotencyStore::new();
        store.try_acquire("k1", "s1", Duration::from_secs(60)).await.unwrap();
        store.release("k1", "s1").await.unwrap();
        assert_eq!(store.try_acquire("k1", "s1", Duration::from_secs(60)).await.unwrap(), LockOutcome::Acquired);
    }

    #[tokio::test]
    async fn zero_or_negative_ttl_never_blocks() {
        let store = InMemoryIdempotencyStore::new();
        assert_eq!(store.try_acquire("k1", "s1", Duration::from_secs(0)).await.unwrap(), LockOutcome::Acquired);
        assert_eq!(store.try_acquire("k1", "s1", Duration::from_secs(0)).await.unwrap(), LockOutcome::Acquired);
    }

    #[tokio::test]
    async fn distinct_scopes_do_not_interfere() {
        let store = InMemoryIdempotencyStore::new();
        store.try_acquire("k1", "email.v1.send", Duration::from_secs(60)).await.unwrap();
        let other_scope = store.try_acquire("k1", "sms.v1.send", Duration::from_secs(60)).await.unwrap();
        assert_eq!(other_scope, LockOutcome::Acquired);
    }
}
