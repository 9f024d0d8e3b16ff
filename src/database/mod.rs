//! Database connections and the query builder.
//!
//! Connections are configured under `database.connections.<name>` and
//! opened lazily, once per name:
//!
//! ```toml
//! # config/database.toml
//! default = "main"
//!
//! [connections.main]
//! driver   = "pgsql"
//! host     = "127.0.0.1"
//! port     = 5432
//! database = "app"
//! username = "app"
//! password = "secret"
//!
//! [connections.legacy]
//! driver   = "mysql"
//! database = "legacy"
//! ```
//!
//! `pgsql` (or `postgres`) and `mysql` are built in. Other drivers are
//! added with [`DatabaseManager::extend`].

mod connection;
mod grammar;
mod mysql;
mod postgres;
mod provider;
mod query;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::config::Repository;
use crate::container::{Arguments, Injectable, Signature};
use crate::error::{Error, Result};
use crate::foundation::ids;

pub use connection::{Connection, PoolOptions, Row};
pub use grammar::Grammar;
pub use mysql::{MySqlConfig, MySqlConnection};
pub use postgres::{PostgresConfig, PostgresConnection};
pub use provider::DatabaseServiceProvider;
pub use query::{Builder, Direction};

type Connector = Arc<dyn Fn(&str, &Value) -> Result<Arc<dyn Connection>> + Send + Sync>;

/// Opens and caches named connections.
pub struct DatabaseManager {
    config: Arc<Repository>,
    connections: RwLock<HashMap<String, Arc<dyn Connection>>>,
    extensions: RwLock<HashMap<String, Connector>>,
}

impl Injectable for DatabaseManager {
    const NAME: &'static str = "DatabaseManager";

    fn signature() -> Signature {
        Signature::new().service_named("config", ids::CONFIG)
    }

    fn construct(args: Arguments) -> Result<Self> {
        Ok(Self::new(args.service("config")?))
    }
}

impl DatabaseManager {
    pub fn new(config: Arc<Repository>) -> Self {
        Self {
            config,
            connections: RwLock::new(HashMap::new()),
            extensions: RwLock::new(HashMap::new()),
        }
    }

    /// Handles `driver` with `connector` instead of the built-in drivers.
    ///
    /// The connector receives the connection name and its configuration.
    pub fn extend<F>(&self, driver: &str, connector: F)
    where
        F: Fn(&str, &Value) -> Result<Arc<dyn Connection>> + Send + Sync + 'static,
    {
        self.extensions.write().insert(driver.to_owned(), Arc::new(connector));
    }

    pub fn default_connection(&self) -> Result<String> {
        match self.config.get("database.default") {
            Some(Value::String(name)) if !name.is_empty() => Ok(name),
            _ => Err(Error::InvalidArgument("No default database connection is configured".into())),
        }
    }

    /// The connection called `name`, or the default one. Opened on first use.
    pub fn connection(&self, name: Option<&str>) -> Result<Arc<dyn Connection>> {
        let name = match name {
            Some(name) => name.to_owned(),
            None => self.default_connection()?,
        };

        if let Some(connection) = self.connections.read().get(&name) {
            return Ok(Arc::clone(connection));
        }

        let connection = self.open(&name)?;
        let mut connections = self.connections.write();
        Ok(Arc::clone(connections.entry(name).or_insert(connection)))
    }

    /// A query builder for `table` on the default connection.
    pub fn table(&self, table: &str) -> Result<Builder> {
        Ok(Builder::new(self.connection(None)?).table(table))
    }

    /// Drops the cached connection so the next use reconnects.
    pub fn purge(&self, name: &str) {
        self.connections.write().remove(name);
    }

    /// Names of the currently open connections, sorted.
    pub fn open_connections(&self) -> Vec<String> {
        let mut names: Vec<_> = self.connections.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn open(&self, name: &str) -> Result<Arc<dyn Connection>> {
        let config = match self.config.get(&format!("database.connections.{name}")) {
            Some(config @ Value::Object(_)) => config,
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "The database connection [{name}] is not configured"
                )));
            }
        };

        let driver = match config.get("driver") {
            Some(Value::String(driver)) if !driver.is_empty() => driver.clone(),
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "The database connection [{name}] has no driver specified"
                )));
            }
        };

        debug!(connection = name, driver = %driver, "opening database connection");

        let extension = self.extensions.read().get(&driver).cloned();
        if let Some(connector) = extension {
            return connector(name, &config);
        }

        match driver.as_str() {
            "pgsql" | "postgres" => {
                let settings: PostgresConfig = settings(name, config)?;
                Ok(Arc::new(PostgresConnection::connect(&settings)?))
            }
            "mysql" => {
                let settings: MySqlConfig = settings(name, config)?;
                Ok(Arc::new(MySqlConnection::connect(&settings)?))
            }
            _ => Err(Error::UnsupportedDriver { connection: name.to_owned(), driver }),
        }
    }
}

fn settings<T: serde::de::DeserializeOwned>(name: &str, config: Value) -> Result<T> {
    serde_json::from_value(config).map_err(|e| Error::Config(format!("database.connections.{name}: {e}")))
}
