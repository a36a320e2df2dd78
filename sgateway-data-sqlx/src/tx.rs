//! Transaction wrapper.
//!
//! Provides [`Tx`] and [`HasPool`], the pool-holding/transaction-scoping
//! idiom the rest of this crate builds on. The teacher's version paired
//! this with a `#[managed]`-attribute lifecycle (`ManagedResource`); that
//! attribute macro is gone from this workspace, so call sites begin/commit
//! transactions explicitly instead.

use sqlx::{Database, Pool, Transaction};
use std::ops::{Deref, DerefMut};

/// Trait for application states that contain a database pool.
pub trait HasPool<DB: Database> {
    fn pool(&self) -> &Pool<DB>;
}

/// A wrapper around SQLx [`Transaction`].
///
/// Callers `begin()` via [`HasPool::pool`], do their work, then `commit()`
/// or let the `Tx` drop to roll back.
pub struct Tx<'a, DB: Database>(pub Transaction<'a, DB>);

impl<'a, DB: Database> Deref for Tx<'a, DB> {
    type Target = Transaction<'a, DB>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'a, DB: Database> DerefMut for Tx<'a, DB> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<'a, DB: Database> Tx<'a, DB> {
    pub async fn begin(pool: &Pool<DB>) -> Result<Tx<'a, DB>, sqlx::Error>
    where
        DB: 'a,
    {
        Ok(Tx(pool.begin().await?))
    }

    pub fn into_inner(self) -> Transaction<'a, DB> {
        self.0
    }

    pub fn as_mut(&mut self) -> &mut <DB as Database>::Connection {
        &mut *self.0
    }

    pub async fn commit(self) -> Result<(), sqlx::Error> {
        self.into_inner().commit().await
    }
}
