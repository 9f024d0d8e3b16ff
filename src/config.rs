//! Configuration repository.
//!
//! Every `*.toml` file in the config directory becomes one top-level key
//! named after its file stem, so `config/database.toml` is reachable as
//! `database.*`. Values are addressed with dotted paths:
//!
//! ```rust
//! use serde_json::json;
//! use trellis::config::Repository;
//!
//! let config = Repository::from_value(json!({ "app": { "name": "demo" } }));
//! assert_eq!(config.get("app.name"), Some(json!("demo")));
//! ```

use std::path::Path;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct Repository {
    items: RwLock<Value>,
}

impl Repository {
    pub fn new() -> Self {
        Self::from_value(Value::Object(Map::new()))
    }

    pub fn from_value(items: Value) -> Self {
        Self { items: RwLock::new(items) }
    }

    /// Loads every `*.toml` file directly inside `dir`.
    ///
    /// A missing directory yields an empty repository.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut items = Map::new();

        if dir.is_dir() {
            let mut files: Vec<_> = std::fs::read_dir(dir)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
                .collect();
            files.sort();

            for path in files {
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let text = std::fs::read_to_string(&path)?;
                let value: Value = toml::from_str(&text)
                    .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
                debug!(file = %path.display(), "config file loaded");
                items.insert(stem.to_owned(), value);
            }
        }

        Ok(Self::from_value(Value::Object(items)))
    }

    pub fn has(&self, key: &str) -> bool {
        lookup(&self.items.read(), key).is_some()
    }

    /// The value at `key`, cloned out of the repository.
    pub fn get(&self, key: &str) -> Option<Value> {
        lookup(&self.items.read(), key).cloned()
    }

    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// The value at `key`, deserialized into `T`. `Ok(None)` when absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| Error::Config(format!("[{key}]: {e}"))),
            None => Ok(None),
        }
    }

    /// Looks up several keys at once. Each pair is `(key, default)`.
    pub fn get_many(&self, keys: &[(&str, Value)]) -> Map<String, Value> {
        let items = self.items.read();
        keys.iter()
            .map(|(key, default)| {
                let value = lookup(&items, key).cloned().unwrap_or_else(|| default.clone());
                ((*key).to_owned(), value)
            })
            .collect()
    }

    /// Sets `key`, creating intermediate objects as needed.
    pub fn set(&self, key: &str, value: Value) {
        let mut items = self.items.write();
        let mut node = &mut *items;

        for segment in key.split('.') {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            node = match node {
                Value::Object(map) => map.entry(segment.to_owned()).or_insert(Value::Null),
                _ => unreachable!("node was just made an object"),
            };
        }

        *node = value;
    }

    /// Appends `value` to the array at `key`.
    pub fn push(&self, key: &str, value: Value) {
        let mut array = self.array(key);
        array.push(value);
        self.set(key, Value::Array(array));
    }

    /// Inserts `value` at the front of the array at `key`.
    pub fn prepend(&self, key: &str, value: Value) {
        let mut array = self.array(key);
        array.insert(0, value);
        self.set(key, Value::Array(array));
    }

    pub fn all(&self) -> Value {
        self.items.read().clone()
    }

    fn array(&self, key: &str) -> Vec<Value> {
        match self.get(key) {
            Some(Value::Array(values)) => values,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![other],
        }
    }
}

impl Default for Repository {
    fn default() -> Self { Self::new() }
}

/// Walks a dotted path through nested objects.
pub(crate) fn lookup<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    if key.is_empty() {
        return Some(root);
    }
    key.split('.').try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn loads_each_file_under_its_stem() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.toml"), "name = \"demo\"\nproviders = [\"A\"]\n").unwrap();
        std::fs::write(
            dir.path().join("database.toml"),
            "default = \"main\"\n[connections.main]\ndriver = \"pgsql\"\nport = 5432\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let config = Repository::load(dir.path()).unwrap();
        assert_eq!(config.get("app.name"), Some(json!("demo")));
        assert_eq!(config.get("database.connections.main.port"), Some(json!(5432)));
        assert!(!config.has("notes"));
        assert_eq!(config.get_as::<Vec<String>>("app.providers").unwrap(), Some(vec!["A".to_owned()]));
    }

    #[test]
    fn missing_directory_is_empty() {
        let config = Repository::load(Path::new("/definitely/not/here")).unwrap();
        assert_eq!(config.all(), json!({}));
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.toml"), "name = ").unwrap();
        assert!(matches!(Repository::load(dir.path()), Err(Error::Config(_))));
    }

    #[test]
    fn set_creates_intermediate_objects() {
        let config = Repository::new();
        config.set("cache.stores.redis.port", json!(6379));
        assert_eq!(config.get("cache.stores.redis"), Some(json!({ "port": 6379 })));

        config.set("cache", json!("file"));
        assert_eq!(config.get("cache"), Some(json!("file")));
        assert!(!config.has("cache.stores"));
    }

    #[test]
    fn defaults_apply_only_when_missing() {
        let config = Repository::from_value(json!({ "app": { "env": "production" } }));
        assert_eq!(config.get_or("app.env", json!("local")), json!("production"));
        assert_eq!(config.get_or("app.debug", json!(false)), json!(false));

        let many = config.get_many(&[("app.env", Value::Null), ("app.name", json!("trellis"))]);
        assert_eq!(many["app.env"], json!("production"));
        assert_eq!(many["app.name"], json!("trellis"));
    }

    #[test]
    fn push_and_prepend() {
        let config = Repository::new();
        config.push("app.providers", json!("B"));
        config.push("app.providers", json!("C"));
        config.prepend("app.providers", json!("A"));
        assert_eq!(config.get("app.providers"), Some(json!(["A", "B", "C"])));
    }

    #[test]
    fn array_segments_are_indexes() {
        let config = Repository::from_value(json!({ "list": [10, 20] }));
        assert_eq!(config.get("list.1"), Some(json!(20)));
        assert_eq!(config.get("list.9"), None);
    }
}
