use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use statesync_engine::ClientConfig;
use statesync_logging::sync_info;

pub const DEFAULT_CONFIG_FILE: &str = "statesync.ron";

/// Reads the client configuration from a RON file. A missing file means defaults.
pub fn load_config(path: &Path) -> Result<ClientConfig> {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            sync_info!("No config at {:?}; using defaults", path);
            return Ok(ClientConfig::default());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read config {}", path.display()))
        }
    };

    let config: ClientConfig = ron::from_str(&content)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    sync_info!("Loaded config from {:?}", path);
    Ok(config)
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub storage_dir: Option<PathBuf>,
    /// Added after any cookies from the file.
    pub cookies: Vec<String>,
}

pub fn apply_overrides(mut config: ClientConfig, overrides: Overrides) -> ClientConfig {
    if let Some(base_url) = overrides.base_url {
        config.base_url = base_url;
    }
    if let Some(dir) = overrides.storage_dir {
        config.storage_dir = Some(dir);
    }
    config.cookies.extend(overrides.cookies);
    config
}
