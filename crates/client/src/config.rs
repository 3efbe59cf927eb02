use std::path::Path;

use anyhow::{Context, Result};
use tint_protocol::TintConfig;

/// Load configuration from a TOML file at the given path.
/// If the file doesn't exist, returns default configuration.
pub(crate) fn load_config(path: &Path) -> Result<TintConfig> {
    if !path.exists() {
        tracing::warn!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        return Ok(TintConfig::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: TintConfig =
        toml::from_str(&contents).with_context(|| "Failed to parse config TOML")?;

    tracing::info!("Loaded config from {}", path.display());
    Ok(config)
}
