//! `.env` file loader.
//!
//! ```text
//! APP_NAME="Trellis demo"     → Some("Trellis demo")
//! APP_KEY=                    → Some("")
//! CACHE_DRIVER=null           → None
//! DB_HOST="${DATABASE_HOST}"  → whatever DATABASE_HOST resolves to
//! # anything not starting with a key is ignored
//! ```
//!
//! Lookups check the process environment first, then the file.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::Result;

static KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)=").expect("valid key pattern"));
static REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^"?\$\{([A-Za-z0-9_]+)\}"?$"#).expect("valid reference pattern"));

// Reference chains longer than this are treated as unresolvable.
const MAX_DEPTH: usize = 16;

#[derive(Clone, Debug, PartialEq)]
enum Entry {
    Value(Option<String>),
    Reference(String),
}

#[derive(Debug, Default)]
pub struct DotEnv {
    entries: HashMap<String, Entry>,
}

impl DotEnv {
    /// Reads `<dir>/.env`. A missing file is an empty environment.
    pub fn load(dir: &Path) -> Result<Self> {
        Self::load_file(&dir.join(".env"))
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            debug!(file = %path.display(), "no env file");
            return Ok(Self::default());
        }
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    pub fn parse(text: &str) -> Self {
        let entries = text.lines().filter_map(parse_line).collect();
        Self { entries }
    }

    /// Process environment first, then the file.
    pub fn get(&self, key: &str) -> Option<String> {
        self.resolve(key, 0)
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_owned())
    }

    /// Looks only at the file, following references.
    pub fn get_env(&self, key: &str) -> Option<String> {
        self.file_value(key, 0)
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    fn resolve(&self, key: &str, depth: usize) -> Option<String> {
        match std::env::var(key) {
            Ok(value) if !value.is_empty() => Some(value),
            _ => self.file_value(key, depth),
        }
    }

    fn file_value(&self, key: &str, depth: usize) -> Option<String> {
        match self.entries.get(key)? {
            Entry::Value(value) => value.clone(),
            Entry::Reference(_) if depth >= MAX_DEPTH => None,
            Entry::Reference(target) => self.resolve(target, depth + 1),
        }
    }
}

fn parse_line(line: &str) -> Option<(String, Entry)> {
    let line = line.trim();
    let key = KEY.captures(line)?.get(1)?.as_str();
    let value = line[key.len() + 1..].trim();

    if let Some(target) = REFERENCE.captures(value).and_then(|c| c.get(1)) {
        return Some((key.to_owned(), Entry::Reference(target.as_str().to_owned())));
    }

    let value = match value {
        "null" => None,
        v if v.len() >= 2 && v.starts_with('"') && v.ends_with('"') => Some(v[1..v.len() - 1].to_owned()),
        v => Some(v.to_owned()),
    };
    Some((key.to_owned(), Entry::Value(value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# comment
APP_NAME="Trellis demo"
APP_KEY=
CACHE_DRIVER=null
TRELLIS_TEST_HOST=db.internal
DB_HOST="${TRELLIS_TEST_HOST}"
LOOP_A="${LOOP_B}"
LOOP_B="${LOOP_A}"
9INVALID=1
"#;

    #[test]
    fn parses_quoted_empty_and_null() {
        let env = DotEnv::parse(SAMPLE);
        assert_eq!(env.get_env("APP_NAME").as_deref(), Some("Trellis demo"));
        assert_eq!(env.get_env("APP_KEY").as_deref(), Some(""));
        assert_eq!(env.get_env("CACHE_DRIVER"), None);
        assert_eq!(env.get_env("9INVALID"), None);
    }

    #[test]
    fn follows_references() {
        let env = DotEnv::parse(SAMPLE);
        assert_eq!(env.get_env("DB_HOST").as_deref(), Some("db.internal"));
    }

    #[test]
    fn reference_cycles_resolve_to_none() {
        let env = DotEnv::parse(SAMPLE);
        assert_eq!(env.get("LOOP_A"), None);
    }

    #[test]
    fn process_environment_wins() {
        let env = DotEnv::parse("PATH=/nowhere\n");
        assert_ne!(env.get("PATH").as_deref(), Some("/nowhere"));
        assert_eq!(env.get_env("PATH").as_deref(), Some("/nowhere"));
    }

    #[test]
    fn defaults_for_missing_keys() {
        let env = DotEnv::parse(SAMPLE);
        assert_eq!(env.get_or("TRELLIS_TEST_MISSING", "fallback"), "fallback");
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DotEnv::load(dir.path()).unwrap().is_empty());

        std::fs::write(dir.path().join(".env"), "A=1\nB=2\n").unwrap();
        assert_eq!(DotEnv::load(dir.path()).unwrap().len(), 2);
    }
}
