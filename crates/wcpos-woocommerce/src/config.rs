use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Connection settings for one WooCommerce store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WooConfig {
    /// Site root, e.g. `https://shop.example.com`
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl WooConfig {
    pub fn new(
        base_url: impl Into<String>,
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read WooCommerce config {}: {}", path.display(), e)
        })?;
        let config: WooConfig = serde_yaml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid WooCommerce config {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            bail!("base_url must start with http:// or https://, got '{}'", self.base_url);
        }
        if self.consumer_key.is_empty() || self.consumer_secret.is_empty() {
            bail!("consumer_key and consumer_secret are required");
        }
        if self.timeout_secs == 0 {
            bail!("timeout_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// REST endpoint for a collection (`products`, `orders`, ...).
    pub fn endpoint(&self, collection: &str) -> String {
        format!(
            "{}/wp-json/wc/v3/{}",
            self.base_url.trim_end_matches('/'),
            collection
        )
    }
}
