//! Local storage: the TOML config file and the presentation directory.

pub mod catalog;
pub mod config;

pub use catalog::FsCatalog;
pub use config::{config_file_path, load_config_from, save_config_to, ConfigError};
