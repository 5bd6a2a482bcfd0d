//! Configuration loading and root folder resolution

use crate::db::Region;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "REGSTAT_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "regstat.db";

/// Default cache time-to-live
pub const DEFAULT_CACHE_TTL_HOURS: u32 = 6;

/// Default bound on how long the upstream tier may take
pub const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 5000;

/// Default number of concurrent resolutions per aggregation call
pub const DEFAULT_FAN_OUT: usize = 4;

/// Contents of `config.toml`
///
/// Every section is optional; missing values fall back to compiled defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub cache: CacheConfig,
    pub resolver: ResolverConfig,
    pub regions: Vec<RegionSeed>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing filter directive, e.g. `info` or `regstat_resolver=debug`
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_hours: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_hours: DEFAULT_CACHE_TTL_HOURS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub upstream_timeout_ms: u64,
    pub fan_out: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            upstream_timeout_ms: DEFAULT_UPSTREAM_TIMEOUT_MS,
            fan_out: DEFAULT_FAN_OUT,
        }
    }
}

/// Region reference row declared in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSeed {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
}

impl From<&RegionSeed> for Region {
    fn from(seed: &RegionSeed) -> Self {
        Region {
            region_key: seed.key.trim().to_string(),
            display_name: seed.name.clone(),
            parent_region_key: seed.parent.clone(),
        }
    }
}

impl TomlConfig {
    /// Parse TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.ttl_hours == 0 {
            return Err(Error::Config("cache.ttl_hours must be at least 1".to_string()));
        }
        if self.resolver.fan_out == 0 {
            return Err(Error::Config("resolver.fan_out must be at least 1".to_string()));
        }
        if let Some(seed) = self.regions.iter().find(|r| r.key.trim().is_empty()) {
            return Err(Error::Config(format!(
                "Region seed '{}' has an empty key",
                seed.name
            )));
        }
        Ok(())
    }
}

/// Load the config file
///
/// An explicit path must exist. Without one, the platform config location is
/// tried and a missing file yields defaults with a warning.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            path.to_path_buf()
        }
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => {
                warn!("No config file found, using compiled defaults");
                return Ok(TomlConfig::default());
            }
        },
    };

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = TomlConfig::from_toml_str(&content)?;
    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Platform config file location (`<config_dir>/regstat/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("regstat").join("config.toml"))
}

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent default
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("regstat"))
        .unwrap_or_else(|| PathBuf::from("./regstat_data"))
}

/// Database file inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE)
}
