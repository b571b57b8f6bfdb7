//! Read-only configuration snapshot
//!
//! A `Config` wraps a JSON tree (loaded from YAML) and exposes dotted-path
//! lookups such as `aliyun.vpc.vswitch.web.zone-id`. Object keys keep their
//! declaration order, so `keys()` enumerates entries the way the file lists
//! them.

use crate::error::{ConfigError, Result};
use serde_json::{Map, Value};
use std::path::Path;

/// Immutable view over a configuration tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    root: Value,
}

impl Config {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    pub fn empty() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    /// Parse a YAML document
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let root: Value = serde_yaml::from_str(content)?;
        Ok(Self::new(root))
    }

    /// Load a YAML (or JSON, which is valid YAML) file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), keys = config.keys().len(), "Loaded configuration");
        Ok(config)
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    fn lookup(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return Some(&self.root);
        }

        path.split('.')
            .try_fold(&self.root, |node, segment| node.as_object()?.get(segment))
    }

    /// Whether a non-null value exists at `path`
    pub fn contains(&self, path: &str) -> bool {
        self.lookup(path).is_some_and(|v| !v.is_null())
    }

    /// String value at `path`. Numbers and booleans are rendered as text;
    /// missing, null and empty values yield `None`.
    pub fn get_string(&self, path: &str) -> Option<String> {
        let value = match self.lookup(path)? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };

        if value.is_empty() { None } else { Some(value) }
    }

    pub fn get_string_or(&self, path: &str, default: &str) -> String {
        self.get_string(path).unwrap_or_else(|| default.to_string())
    }

    /// Integer at `path`, accepting numeric strings
    pub fn get_i64(&self, path: &str) -> Option<i64> {
        match self.lookup(path)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_i64_or(&self, path: &str, default: i64) -> i64 {
        self.get_i64(path).unwrap_or(default)
    }

    pub fn get_bool_or(&self, path: &str, default: bool) -> bool {
        match self.lookup(path) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    /// List of scalars at `path`; a single scalar becomes a one-element list
    pub fn get_string_list(&self, path: &str) -> Vec<String> {
        match self.lookup(path) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) if !s.is_empty() => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// Sub-section at `path`; empty when absent or not a section
    pub fn get_config(&self, path: &str) -> Config {
        match self.lookup(path) {
            Some(value @ Value::Object(_)) => Config::new(value.clone()),
            _ => Config::empty(),
        }
    }

    /// Keys of this section in declaration order
    pub fn keys(&self) -> Vec<String> {
        self.root
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.root.as_object().is_none_or(|map| map.is_empty())
    }
}

impl From<Value> for Config {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}
