//! Tracing subscriber setup for applications embedding the query layer.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global subscriber.
///
/// Defaults to INFO, overridable with `RUST_LOG`. Fails if a global
/// subscriber is already installed.
pub fn try_init() -> Result<()> {
    try_init_with_default("info")
}

/// Like [`try_init`] but with a custom default directive string.
pub fn try_init_with_default(default_directives: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}

/// Install a subscriber, ignoring the error when one already exists.
pub fn init() {
    if let Err(e) = try_init() {
        tracing::debug!("[logging] {}", e);
    }
}
