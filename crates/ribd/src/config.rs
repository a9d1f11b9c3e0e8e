//! Loading the RIB configuration file.

use anyhow::{Context, Result};
use rib_tables::RibConfig;
use std::path::Path;

/// Reads and validates a YAML configuration file.
pub async fn load_config(path: &Path) -> Result<RibConfig> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    parse_config(&text).with_context(|| format!("loading {}", path.display()))
}

/// Parses and validates configuration text.
pub fn parse_config(text: &str) -> Result<RibConfig> {
    let config: RibConfig = serde_yaml::from_str(text)?;
    config.validate()?;
    Ok(config)
}
