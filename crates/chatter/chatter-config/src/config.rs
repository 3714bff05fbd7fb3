use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings for the demo phoneme producer.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ChatterConfig {
    #[serde(default = "defaults::shm_dir")]
    pub shm_dir: String,
    #[serde(default = "defaults::shm_name")]
    pub shm_name: String,
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    /// Phonemes to publish before shutting down; 0 runs until interrupted.
    #[serde(default)]
    pub phoneme_count: u64,
    #[serde(default = "defaults::publish_interval_ms")]
    pub publish_interval_ms: u64,
    /// How long a publish may wait for the consumer to free a slot.
    #[serde(default = "defaults::publish_timeout_ms")]
    pub publish_timeout_ms: u64,
    #[serde(default)]
    pub unlink_on_exit: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

mod defaults {
    pub fn shm_dir() -> String {
        phonos_mmap::DEFAULT_SHM_DIR.into()
    }

    pub fn shm_name() -> String {
        phonos_icc::SEGMENT_NAME.into()
    }

    pub fn log_level() -> String {
        "info".into()
    }

    pub fn publish_interval_ms() -> u64 {
        80
    }

    pub fn publish_timeout_ms() -> u64 {
        2_000
    }
}

impl Default for ChatterConfig {
    fn default() -> Self {
        Self {
            shm_dir: defaults::shm_dir(),
            shm_name: defaults::shm_name(),
            log_level: defaults::log_level(),
            phoneme_count: 0,
            publish_interval_ms: defaults::publish_interval_ms(),
            publish_timeout_ms: defaults::publish_timeout_ms(),
            unlink_on_exit: false,
        }
    }
}

impl ChatterConfig {
    pub fn load(path: impl AsRef<Path> + ToString) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let cfg: ChatterConfig = toml::from_str(s)?;
        if cfg.shm_name.trim_start_matches('/').is_empty() {
            return Err(ConfigError::Invalid("shm_name must not be empty"));
        }
        Ok(cfg)
    }

    pub fn segment_path(&self) -> PathBuf {
        phonos_mmap::segment_path(&self.shm_dir, &self.shm_name)
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}
