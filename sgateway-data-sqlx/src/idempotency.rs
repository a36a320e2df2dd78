//! Postgres-backed [`IdempotencyStore`].
//!
//! Serializes concurrent duplicates with `SELECT ... FOR UPDATE` inside a
//! transaction: the row lock means a second caller racing the same
//! `(key, scope)` blocks on the `SELECT` until the first caller's
//! transaction commits, rather than both reading a pre-insert state.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

use sgateway_data::{DataError, IdempotencyStore, LockOutcome};

use crate::error::SqlxErrorExt;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub struct PgIdempotencyStore {
    pool: Pool<Postgres>,
}

impl PgIdempotencyStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

impl IdempotencyStore for PgIdempotencyStore {
    fn try_acquire<'a>(&'a self, key: &'a str, scope: &'a str, ttl: Duration) -> BoxFuture<'a, Result<LockOutcome, DataError>> {
        Box::pin(async move {
            if ttl.is_zero() {
                return Ok(LockOutcome::Acquired);
            }
            let ttl_seconds = ttl.as_secs() as f64;

            let mut tx = self.pool.begin().await.map_err(DataError::database)?;

            let existing: Option<PgRow> = sqlx::query(
                "SELECT created_at FROM idempotency_locks \
                 WHERE key = $1 AND scope = $2 \
                 AND created_at > now() - make_interval(secs => $3) \
                 FOR UPDATE",
            )
            .bind(key)
            .bind(scope)
            .bind(ttl_seconds)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| e.into_data_error())?;

            if let Some(row) = existing {
                let created_at: chrono::DateTime<chrono::Utc> = row.try_get("created_at").map_err(|e| e.into_data_error())?;
                let elapsed = (chrono::Utc::now() - created_at).num_seconds().max(0);
                let remaining_seconds = (ttl.as_secs() as i64 - elapsed).max(0);
                tx.rollback().await.map_err(DataError::database)?;
                return Ok(LockOutcome::AlreadyHeld { remaining_seconds });
            }

            sqlx::query("INSERT INTO idempotency_locks (key, scope, created_at) VALUES ($1, $2, now())")
                .bind(key)
                .bind(scope)
                .execute(&mut *tx)
                .await
                .map_err(|e| e.into_data_error())?;

            tx.commit().await.map_err(DataError::database)?;
            Ok(LockOutcome::Acquired)
        })
    }

    fn release<'a>(&'a self, key: &'a str, scope: &'a str) -> BoxFuture<'a, Result<(), DataError>> {
        Box::pin(async move {
            sqlx::query("DELETE FROM idempotency_locks WHERE key = $1 AND scope = $2")
                .bind(key)
                .bind(scope)
                .execute(&self.pool)
                .await
                .map_err(|e| e.into_data_error())?;
            Ok(())
        })
    }
}
