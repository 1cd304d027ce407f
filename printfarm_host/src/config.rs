//! # Host Configuration
//!
//! Loaded from a single TOML file. Every field has a default, so an
//! empty file yields a usable in-memory setup without printers.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:4000"
//!
//! [store]
//! backend = "file"
//! path = "data/jobs.json"
//!
//! [files]
//! root = "data/files"
//!
//! [queue]
//! max_page_size = 100
//!
//! [logging]
//! level = "debug"
//!
//! [[printers]]
//! id = "mk4-01"
//! name = "Prusa MK4 #1"
//! spool_dir = "data/spool/mk4-01"
//! ```

// src/config.rs - Single configuration file
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

/// Hard cap on the page size of paginated views.
pub const MAX_PAGE_SIZE: usize = 250;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub printers: Vec<PrinterConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    File,
}

/// Job record store selection.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilesConfig {
    #[serde(default = "default_files_root")]
    pub root: PathBuf,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self { root: default_files_root() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { max_page_size: default_max_page_size() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

/// A printer managed by this host.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PrinterConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Directory the spool adapter writes submitted files into.
    #[serde(default)]
    pub spool_dir: Option<PathBuf>,
}

impl PrinterConfig {
    pub fn spool_dir(&self) -> PathBuf {
        self.spool_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("spool").join(&self.id))
    }
}

fn default_bind() -> String { "0.0.0.0:4000".to_string() }
fn default_files_root() -> PathBuf { PathBuf::from("files") }
fn default_max_page_size() -> usize { MAX_PAGE_SIZE }
fn default_log_level() -> String { "info".to_string() }

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.max_page_size == 0 || self.queue.max_page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "queue.max_page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        if self.store.backend == StoreBackend::File && self.store.path.is_none() {
            return Err(ConfigError::Invalid("store.path is required for the file backend".to_string()));
        }
        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "logging.level '{}' is not one of trace, debug, info, warn, error",
                self.logging.level
            )));
        }
        let mut seen = HashSet::new();
        for printer in &self.printers {
            if printer.id.trim().is_empty() {
                return Err(ConfigError::Invalid("printer id must not be empty".to_string()));
            }
            if !seen.insert(printer.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate printer id '{}'", printer.id)));
            }
        }
        Ok(())
    }
}

pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}
