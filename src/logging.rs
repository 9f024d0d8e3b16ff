//! Tracing subscriber setup.
//!
//! The filter is taken from the `TRELLIS_LOG` environment variable when it
//! is set, otherwise from `app.log_level` in the configuration, otherwise
//! `info`. Directives use the usual `EnvFilter` syntax
//! (`info,trellis::database=debug`).

use tracing_subscriber::EnvFilter;

use crate::config::Repository;
use crate::error::{Error, Result};

/// Environment variable that overrides the configured filter.
pub const LOG_ENV: &str = "TRELLIS_LOG";

/// Filter used when nothing is configured.
pub const DEFAULT_LEVEL: &str = "info";

/// Installs a global `fmt` subscriber.
///
/// Fails when a subscriber is already installed, or when the configured
/// directives do not parse.
pub fn init(config: &Repository) -> Result<()> {
    let filter = match EnvFilter::try_from_env(LOG_ENV) {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(configured_level(config))
            .map_err(|e| Error::Config(format!("invalid log filter: {e}")))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to initialize logging: {e}")))
}

fn configured_level(config: &Repository) -> String {
    config
        .get("app.log_level")
        .and_then(|v| v.as_str().map(str::to_owned))
        .unwrap_or_else(|| DEFAULT_LEVEL.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn level_comes_from_config() {
        let config = Repository::from_value(json!({ "app": { "log_level": "debug" } }));
        assert_eq!(configured_level(&config), "debug");
    }

    #[test]
    fn level_defaults_to_info() {
        assert_eq!(configured_level(&Repository::new()), DEFAULT_LEVEL);
        let config = Repository::from_value(json!({ "app": { "log_level": 3 } }));
        assert_eq!(configured_level(&config), DEFAULT_LEVEL);
    }
}
