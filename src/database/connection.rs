//! The seam between the query builder and a database driver.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::Grammar;
use crate::error::Result;

/// One result row, keyed by column name.
pub type Row = Map<String, Value>;

/// A live connection that can run prepared statements.
///
/// Bindings are positional and match the placeholders the connection's
/// [`Grammar`] produced.
pub trait Connection: Send + Sync {
    fn grammar(&self) -> Grammar;

    /// Runs a query that returns rows.
    fn select(&self, sql: &str, bindings: &[Value]) -> Result<Vec<Row>>;

    /// Runs a statement and returns the number of affected rows.
    fn statement(&self, sql: &str, bindings: &[Value]) -> Result<u64>;
}

/// Pool settings under `database.connections.<name>.options`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    pub max_connections: u32,
    /// Seconds to wait for a connection before giving up.
    pub connect_timeout: u64,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self { max_connections: 10, connect_timeout: 30 }
    }
}

impl PoolOptions {
    pub(crate) fn pool_builder<M: r2d2::ManageConnection>(&self) -> r2d2::Builder<M> {
        r2d2::Pool::builder()
            .max_size(self.max_connections.max(1))
            .connection_timeout(Duration::from_secs(self.connect_timeout))
    }
}
