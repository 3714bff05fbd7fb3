use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct VisemeConfig {
    /// Directory backing shared memory objects.
    #[serde(default = "defaults::shm_dir")]
    pub shm_dir: String,
    /// Well-known name of the phoneme segment inside `shm_dir`.
    #[serde(default = "defaults::shm_name")]
    pub shm_name: String,
    /// Where this process listens for control lines.
    #[serde(default = "defaults::control_socket_path")]
    pub control_socket_path: String,
    /// Where the TTS producer listens for face commands.
    #[serde(default = "defaults::tts_control_socket_path")]
    pub tts_control_socket_path: String,
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    #[serde(default = "defaults::attach_retries")]
    pub attach_retries: u32,
    #[serde(default = "defaults::attach_interval_ms")]
    pub attach_interval_ms: u64,
    #[serde(default = "defaults::poll_interval_us")]
    pub poll_interval_us: u64,
    /// Send `face_show` on start and `face_hide` on exit.
    #[serde(default = "defaults::send_face_commands")]
    pub send_face_commands: bool,
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

    pub fn control_socket_path() -> String {
        phonos_control::CONTROL_SOCKET_PATH.into()
    }

    pub fn tts_control_socket_path() -> String {
        phonos_control::TTS_CONTROL_SOCKET_PATH.into()
    }

    pub fn log_level() -> String {
        "info".into()
    }

    pub fn attach_retries() -> u32 {
        10
    }

    pub fn attach_interval_ms() -> u64 {
        1_000
    }

    pub fn poll_interval_us() -> u64 {
        1_000
    }

    pub fn send_face_commands() -> bool {
        true
    }
}

impl Default for VisemeConfig {
    fn default() -> Self {
        Self {
            shm_dir: defaults::shm_dir(),
            shm_name: defaults::shm_name(),
            control_socket_path: defaults::control_socket_path(),
            tts_control_socket_path: defaults::tts_control_socket_path(),
            log_level: defaults::log_level(),
            attach_retries: defaults::attach_retries(),
            attach_interval_ms: defaults::attach_interval_ms(),
            poll_interval_us: defaults::poll_interval_us(),
            send_face_commands: defaults::send_face_commands(),
        }
    }
}

impl VisemeConfig {
    pub fn load(path: impl AsRef<Path> + ToString) -> Result<Self, ConfigError> {
        let toml_to_str = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml(&toml_to_str)
    }

    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let viseme_config: VisemeConfig = toml::from_str(s)?;
        viseme_config.validate()?;
        Ok(viseme_config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.attach_retries == 0 {
            return Err(ConfigError::Invalid("attach_retries must be at least 1"));
        }
        if self.poll_interval_us == 0 {
            return Err(ConfigError::Invalid("poll_interval_us must be positive"));
        }
        Ok(())
    }

    /// File backing the phoneme segment.
    pub fn segment_path(&self) -> PathBuf {
        phonos_mmap::segment_path(&self.shm_dir, &self.shm_name)
    }

    pub fn attach_interval(&self) -> Duration {
        Duration::from_millis(self.attach_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }
}
