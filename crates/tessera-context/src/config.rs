//! Context store configuration

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tessera_vector::DEFAULT_EMBEDDING_DIMENSION;

use crate::error::{ContextError, ContextResult};

pub const DEFAULT_MAX_ENTRIES: usize = 200;
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Context store and view configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Maximum distinct entries in one implementation view
    pub max_entries: usize,
    /// Result count for searches that do not name one
    pub search_limit: usize,
    /// Score threshold for searches that do not name one
    pub min_score: f32,
    /// Vector size of the default embedder
    pub embedding_dimension: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            search_limit: DEFAULT_SEARCH_LIMIT,
            min_score: 0.0,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

impl ContextConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit;
        self
    }

    pub fn with_min_score(mut self, score: f32) -> Self {
        self.min_score = score;
        self
    }

    pub fn with_embedding_dimension(mut self, dimension: usize) -> Self {
        self.embedding_dimension = dimension;
        self
    }

    /// Defaults overlaid with `TESSERA_*` environment variables
    pub fn from_env() -> ContextResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each key
    pub fn from_lookup<F>(lookup: F) -> ContextResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = parse_var(&lookup, "TESSERA_MAX_ENTRIES")? {
            config.max_entries = value;
        }
        if let Some(value) = parse_var(&lookup, "TESSERA_SEARCH_LIMIT")? {
            config.search_limit = value;
        }
        if let Some(value) = parse_var(&lookup, "TESSERA_MIN_SCORE")? {
            config.min_score = value;
        }
        if let Some(value) = parse_var(&lookup, "TESSERA_EMBEDDING_DIM")? {
            config.embedding_dimension = value;
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ContextResult<()> {
        if self.max_entries == 0 {
            return Err(ContextError::InvalidConfig("max_entries must be at least 1".to_string()));
        }
        if self.search_limit == 0 {
            return Err(ContextError::InvalidConfig("search_limit must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(ContextError::InvalidConfig(
                "min_score must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.embedding_dimension == 0 {
            return Err(ContextError::InvalidConfig(
                "embedding_dimension must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> ContextResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ContextError::InvalidConfig(format!("{key} has invalid value {raw:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = ContextConfig::default();
        assert_eq!(config.max_entries, 200);
        assert_eq!(config.search_limit, 10);
        assert_eq!(config.min_score, 0.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = ContextConfig::from_lookup(lookup(&[
            ("TESSERA_MAX_ENTRIES", "50"),
            ("TESSERA_MIN_SCORE", " 0.25 "),
        ]))
        .unwrap();
        assert_eq!(config.max_entries, 50);
        assert_eq!(config.min_score, 0.25);
        assert_eq!(config.search_limit, DEFAULT_SEARCH_LIMIT);
    }

    #[test]
    fn unparsable_value_is_rejected() {
        let err = ContextConfig::from_lookup(lookup(&[("TESSERA_SEARCH_LIMIT", "many")])).unwrap_err();
        assert!(matches!(err, ContextError::InvalidConfig(msg) if msg.contains("TESSERA_SEARCH_LIMIT")));
    }

    #[test]
    fn out_of_range_values_fail_validation() {
        assert!(ContextConfig::new().with_max_entries(0).validate().is_err());
        assert!(ContextConfig::new().with_min_score(1.5).validate().is_err());
        assert!(ContextConfig::from_lookup(lookup(&[("TESSERA_EMBEDDING_DIM", "0")])).is_err());
    }

    #[test]
    fn deserializes_partial_config() {
        let config: ContextConfig = serde_json::from_str(r#"{"max_entries": 12}"#).unwrap();
        assert_eq!(config.max_entries, 12);
        assert_eq!(config.search_limit, DEFAULT_SEARCH_LIMIT);
    }
}
