//! `ConfigProvider` / `ConfigValidator` contracts (spec §6).
//!
//! The core never parses a config file itself - only these read-only
//! contracts are consumed. A single in-memory composite implementation is
//! provided so the rest of the workspace has something concrete to build
//! and test against.

use std::collections::BTreeMap;

use thiserror::Error;

/// Errors surfaced by config lookups and boot-time validation.
///
/// Fatal at boot per spec §7.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required config key: {0}")]
    MissingKey(String),

    #[error("failed to parse config key {key} as {expected}: {value}")]
    ParseFailure {
        key: String,
        expected: &'static str,
        value: String,
    },

    #[error("config validation failed: {0}")]
    ValidationFailed(String),
}

/// Read-only keyed lookup by dot path.
///
/// Implementations are not required to be hierarchical internally; only the
/// dot-path key convention is part of the contract.
pub trait ConfigProvider: Send + Sync {
    /// Raw string lookup. All typed getters are defined in terms of this.
    fn get_string(&self, key: &str) -> Option<String>;

    fn has_key(&self, key: &str) -> bool {
        self.get_string(key).is_some()
    }

    fn get_all_keys(&self) -> Vec<String>;

    fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get_string(key)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(default)
    }

    fn get_long(&self, key: &str, default: i64) -> i64 {
        self.get_int(key, default)
    }

    fn get_boolean(&self, key: &str, default: bool) -> bool {
        match self.get_string(key).map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "true" || v == "yes" || v == "on" || v == "1" => true,
            Some(v) if v == "false" || v == "no" || v == "off" || v == "0" => false,
            _ => default,
        }
    }

    fn get_list(&self, key: &str) -> Vec<String> {
        self.get_string(key)
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default()
    }

    fn require_string(&self, key: &str) -> Result<String, ConfigError> {
        self.get_string(key)
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
    }
}

/// Runs once at startup, before the event bus and scheduler come online.
///
/// A returned `Err` aborts boot (spec §6).
pub trait ConfigValidator: Send + Sync {
    fn validate(&self, provider: &dyn ConfigProvider) -> Result<(), ConfigError>;
}

/// A single flat map of keys to values, usable standalone or as one layer of
/// a [`CompositeConfigProvider`].
#[derive(Debug, Clone, Default)]
pub struct MapConfigProvider {
    values: BTreeMap<String, String>,
}

impl MapConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Build a provider backed by the process environment.
    pub fn from_env() -> Self {
        let values = std::env::vars().collect();
        Self { values }
    }
}

impl ConfigProvider for MapConfigProvider {
    fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn get_all_keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}

/// First provider that `has_key` wins (spec §6).
#[derive(Default)]
pub struct CompositeConfigProvider {
    layers: Vec<Box<dyn ConfigProvider>>,
}

impl CompositeConfigProvider {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Layers are consulted in the order they're pushed; push the highest
    /// priority layer (e.g. environment overrides) first.
    pub fn push(mut self, layer: impl ConfigProvider + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }
}

impl ConfigProvider for CompositeConfigProvider {
    fn get_string(&self, key: &str) -> Option<String> {
        self.layers.iter().find_map(|l| l.get_string(key))
    }

    fn has_key(&self, key: &str) -> bool {
        self.layers.iter().any(|l| l.has_key(key))
    }

    fn get_all_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .layers
            .iter()
            .flat_map(|l| l.get_all_keys())
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

/// Recursively substitutes `${NAME:default}` placeholders in a value,
/// resolving each `NAME` against `provider`. Missing names with no default
/// resolve to an empty string; substitution repeats until no placeholder
/// remains or a fixed-point iteration cap is hit (guards against a
/// placeholder that expands to itself).
pub fn substitute_variables(value: &str, provider: &dyn ConfigProvider) -> String {
    let mut current = value.to_string();
    for _ in 0..16 {
        let Some((start, end, name, default)) = find_placeholder(&current) else {
            break;
        };
        let replacement = provider
            .get_string(name)
            .or_else(|| default.map(|d| d.to_string()))
            .unwrap_or_default();
        current.replace_range(start..end, &replacement);
    }
    current
}

fn find_placeholder(s: &str) -> Option<(usize, usize, &str, Option<&str>)> {
    let start = s.find("${")?;
    let rel_end = s[start..].find('}')?;
    let end = start + rel_end + 1;
    let inner = &s[start + 2..end - 1];
    match inner.split_once(':') {
        Some((name, default)) => Some((start, end, name, Some(default))),
        None => Some((start, end, inner, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_provider_basic_lookup() {
        let provider = MapConfigProvider::new().with("app.name", "katalyst");
        assert_eq!(provider.get_string("app.name").as_deref(), Some("katalyst"));
        assert!(provider.has_key("app.name"));
        assert!(!provider.has_key("app.missing"));
    }

    #[test]
    fn boolean_parsing_accepts_aliases() {
        let provider = MapConfigProvider::new()
            .with("a", "YES")
            .with("b", "0")
            .with("c", "garbage");

        assert!(provider.get_boolean("a", false));
        assert!(!provider.get_boolean("b", true));
        // Unparseable falls back to the default silently, per spec §6.
        assert!(provider.get_boolean("c", true));
    }

    #[test]
    fn int_parse_failure_falls_back_silently() {
        let provider = MapConfigProvider::new().with("n", "not-a-number");
        assert_eq!(provider.get_int("n", 42), 42);
    }

    #[test]
    fn composite_first_provider_with_key_wins() {
        let composite = CompositeConfigProvider::new()
            .push(MapConfigProvider::new().with("k", "override"))
            .push(MapConfigProvider::new().with("k", "base").with("other", "x"));

        assert_eq!(composite.get_string("k").as_deref(), Some("override"));
        assert_eq!(composite.get_string("other").as_deref(), Some("x"));
    }

    #[test]
    fn variable_substitution_recurses_and_uses_default() {
        let provider = MapConfigProvider::new().with("HOST", "db.internal");
        let resolved = substitute_variables("postgres://${HOST}:${PORT:5432}/app", &provider);
        assert_eq!(resolved, "postgres://db.internal:5432/app");
    }

    #[test]
    fn variable_substitution_missing_without_default_is_empty() {
        let provider = MapConfigProvider::new();
        let resolved = substitute_variables("${MISSING}", &provider);
        assert_eq!(resolved, "");
    }
}
