// Configuration management for tapedeck
// Handles loading/saving settings, with sensible defaults when config is missing

use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::audio::{HttpConfig, StagingConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub player: PlayerConfig,
    pub http: HttpSettings,
    pub staging: StagingSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub default_volume: u8,
    pub poll_interval_ms: u64,
    pub fetch_timeout_secs: u64,
    pub teardown_wait_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub user_agent: String,
    pub referer: Option<String>,
    pub origin: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingSettings {
    pub directory: Option<PathBuf>, // system temp dir when unset
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: PathBuf,
    pub filter: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_volume: 70,
            poll_interval_ms: 100,
            fetch_timeout_secs: 30,
            teardown_wait_ms: 1000,
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        let http = HttpConfig::default();
        Self {
            user_agent: http.user_agent,
            referer: http.referer,
            origin: http.origin,
        }
    }
}

impl Default for StagingSettings {
    fn default() -> Self {
        let staging = StagingConfig::default();
        Self {
            directory: staging.dir,
            prefix: staging.prefix,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            filter: "info,tapedeck=debug".to_string(),
        }
    }
}

impl From<&HttpSettings> for HttpConfig {
    fn from(settings: &HttpSettings) -> Self {
        Self {
            user_agent: settings.user_agent.clone(),
            referer: settings.referer.clone(),
            origin: settings.origin.clone(),
        }
    }
}

impl From<&StagingSettings> for StagingConfig {
    fn from(settings: &StagingSettings) -> Self {
        Self {
            dir: settings.directory.clone(),
            prefix: settings.prefix.clone(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Read `path`, writing the defaults there first if it doesn't exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?
            .join("tapedeck");

        Ok(config_dir.join("config.toml"))
    }
}
