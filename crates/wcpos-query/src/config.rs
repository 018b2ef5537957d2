//! Query layer configuration
//!
//! Loaded from YAML (every field has a default, so an empty file is valid)
//! or built in code by the composition root.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Per-collection settings the selector compiler and sync merge rely on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Field holding the primary key; also the sort tiebreaker
    pub primary_key: String,
    /// Fields matched by free-text search
    pub searchable_fields: Vec<String>,
    /// Locally-owned fields a remote document must never overwrite
    pub local_fields: Vec<String>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            primary_key: "id".to_string(),
            searchable_fields: Vec::new(),
            local_fields: Vec::new(),
        }
    }
}

impl CollectionConfig {
    pub fn new(primary_key: impl Into<String>) -> Self {
        Self {
            primary_key: primary_key.into(),
            ..Self::default()
        }
    }

    pub fn searchable<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.searchable_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn local<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.local_fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Debounce window for `search_debounced`
    pub search_debounce_ms: u64,
    /// Grace period before an unreferenced query is evicted
    pub idle_eviction_ms: u64,
    /// Page size for queries using `Pagination::Full`
    pub default_page_size: usize,
    /// Upper bound on pages fetched by one full `sync`; unbounded when absent
    pub max_pages_per_sync: Option<usize>,
    /// Start a remote sync when a query's resource is first subscribed
    pub sync_on_subscribe: bool,
    pub collections: HashMap<String, CollectionConfig>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            search_debounce_ms: 300,
            idle_eviction_ms: 10_000,
            default_page_size: 10,
            max_pages_per_sync: None,
            sync_on_subscribe: true,
            collections: HashMap::new(),
        }
    }
}

impl QueryConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read query config {}: {}", path.display(), e)
        })?;

        Self::from_yaml_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid query config {}: {}", path.display(), e))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: QueryConfig = if content.trim().is_empty() {
            QueryConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_page_size == 0 {
            bail!("default_page_size must be greater than zero");
        }
        if self.max_pages_per_sync == Some(0) {
            bail!("max_pages_per_sync must be greater than zero when set");
        }
        for (name, collection) in &self.collections {
            if collection.primary_key.is_empty() {
                bail!("collection '{}' has an empty primary_key", name);
            }
        }
        Ok(())
    }

    pub fn with_collection(mut self, name: impl Into<String>, config: CollectionConfig) -> Self {
        self.collections.insert(name.into(), config);
        self
    }

    /// Settings for `name`, falling back to defaults for unknown collections.
    pub fn collection(&self, name: &str) -> CollectionConfig {
        self.collections.get(name).cloned().unwrap_or_default()
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn idle_eviction(&self) -> Duration {
        Duration::from_millis(self.idle_eviction_ms)
    }
}
