mod config;

pub use config::{ConfigError, VisemeConfig};
