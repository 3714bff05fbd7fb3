mod config;

pub use config::{ChatterConfig, ConfigError};
