//! The vendor SQL driver is an out-of-scope external collaborator (§1).
//! This trait boundary is what the manager probes and pings through; a
//! real embedder implements it against its own MySQL-protocol driver.
//! Tests throughout this crate implement it against an in-memory mock.

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// A single row of a query result, as loosely typed strings — good enough
/// for the fixed diagnostic queries this crate issues, which never need
/// more than string/int/bool coercion at the call site.
pub type SqlRow = Vec<String>;

#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Runs a query and returns its rows.
    async fn query(&self, sql: &str) -> Result<Vec<SqlRow>>;

    /// Runs a statement with no result set (`SET ...`, `CALL ...`).
    async fn execute(&self, sql: &str) -> Result<()>;

    /// Closes the underlying connection. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// Opens connections to cluster members. Acquisition is expected to be
/// serialized by the caller against a process-wide driver-instance lock
/// (§5) since the underlying vendor driver is not assumed to be
/// thread-safe for connection creation.
#[async_trait]
pub trait SqlExecutorFactory: Send + Sync {
    async fn connect(
        &self,
        addr: &str,
        connect_timeout: Duration,
        props: &HashMap<String, String>,
    ) -> Result<std::sync::Arc<dyn SqlExecutor>>;
}
