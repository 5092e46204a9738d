//! Configuration loader

use config::{Config, Environment, File};
use std::path::Path;

use super::types::EngineConfig;
use crate::error::Result;

/// Load and validate configuration from an optional TOML file and the environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (`TRADEGUARD__SECTION__KEY`)
/// 2. Configuration file
/// 3. Default values
pub fn load_config(config_path: Option<&str>) -> Result<EngineConfig> {
    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        } else {
            tracing::warn!(path = %path, "Config file not found, using defaults");
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("TRADEGUARD")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config: EngineConfig = builder.build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

/// Parse and validate configuration from a TOML string
pub fn load_from_str(toml: &str) -> Result<EngineConfig> {
    let config: EngineConfig = Config::builder()
        .add_source(File::from_str(toml, config::FileFormat::Toml))
        .build()?
        .try_deserialize()?;
    config.validate()?;
    Ok(config)
}
