//! Unified error type.

use std::path::PathBuf;

/// The error type returned by trellis's fallible operations.
///
/// Routing misses are not errors: they become a `404` [`Response`](crate::Response).
/// A handler that returns `Err` is answered with `500` by the router.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An abstract could not be turned into a value: the target is not
    /// instantiable, a parameter could not be satisfied, or the resolved value
    /// has a different type than the caller asked for.
    #[error("binding resolution: {0}")]
    BindingResolution(String),

    /// Malformed input: a bad method reference, a missing table, empty insert data.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A template or other required file does not exist.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("the database connection [{connection}] uses unsupported driver [{driver}]")]
    UnsupportedDriver { connection: String, driver: String },

    #[error("database: {0}")]
    Database(String),

    #[error("config: {0}")]
    Config(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn unresolvable(param: &str, owner: &str) -> Self {
        Self::BindingResolution(format!("Unable to resolve dependency [{param}] in {owner}"))
    }
}

impl From<r2d2_postgres::postgres::Error> for Error {
    fn from(e: r2d2_postgres::postgres::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<r2d2_mysql::mysql::Error> for Error {
    fn from(e: r2d2_mysql::mysql::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<r2d2::Error> for Error {
    fn from(e: r2d2::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

/// Shorthand used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
