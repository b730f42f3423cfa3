use std::path::{Path, PathBuf};
use std::time::Duration;

use config::ConfigError;
use serde::{Deserialize, Serialize};

use crate::utils;

const CONFIG: &str = include_str!("../../.config/config.json5");

/// Environment variables overriding the config files, e.g. `CHAT_PAGER__PAGER__PAGE_SIZE=25`
const ENV_PREFIX: &str = "CHAT_PAGER";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub _data_dir: PathBuf,
    #[serde(default)]
    pub _config_dir: PathBuf,
}

/// Tuning of the message window, its cache and prefetching
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagerConfig {
    /// Messages requested per older/newer page
    pub page_size: usize,
    /// Messages requested when a conversation is opened
    pub initial_load_count: usize,
    /// Upper bound on messages held in memory
    pub cache_size: usize,
    /// Distance to a window edge that triggers a prefetch
    pub prefetch_threshold: usize,
    pub cache_ttl_secs: u64,
    /// Maximum number of cached pages across all conversations
    pub cache_capacity: usize,
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            initial_load_count: 100,
            cache_size: 1000,
            prefetch_threshold: 10,
            cache_ttl_secs: 300,
            cache_capacity: 20,
        }
    }
}

impl PagerConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("page_size", self.page_size as u64),
            ("initial_load_count", self.initial_load_count as u64),
            ("cache_size", self.cache_size as u64),
            ("cache_capacity", self.cache_capacity as u64),
            ("cache_ttl_secs", self.cache_ttl_secs),
        ];
        for (name, value) in required {
            if value == 0 {
                return Err(ConfigError::Message(format!(
                    "pager.{name} must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default, flatten)]
    pub config: AppConfig,
    #[serde(default)]
    pub pager: PagerConfig,
}

impl Config {
    /// Load the embedded defaults, user config files and environment overrides
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_from(&utils::get_config_dir(), &utils::get_data_dir())
    }

    pub fn load_from(config_dir: &Path, data_dir: &Path) -> Result<Self, ConfigError> {
        json5::from_str::<serde_json::Value>(CONFIG)
            .map_err(|e| ConfigError::Message(format!("Failed to load default config: {e}")))?;

        let mut builder = config::Config::builder()
            .set_default("_data_dir", data_dir.to_string_lossy().into_owned())?
            .set_default("_config_dir", config_dir.to_string_lossy().into_owned())?
            .add_source(config::File::from_str(CONFIG, config::FileFormat::Json5));

        let config_files = [
            ("config.json5", config::FileFormat::Json5),
            ("config.json", config::FileFormat::Json),
            ("config.yaml", config::FileFormat::Yaml),
            ("config.toml", config::FileFormat::Toml),
            ("config.ini", config::FileFormat::Ini),
        ];
        for (file, format) in &config_files {
            let path = config_dir.join(file);
            if path.exists() {
                log::info!("Loading configuration from {}", path.display());
            }
            builder = builder.add_source(config::File::from(path).format(*format).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.pager.validate()?;

        Ok(cfg)
    }
}
