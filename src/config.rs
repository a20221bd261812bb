//! Runtime configuration.
//!
//! Values come from a YAML file named by `MISSIVE_CONFIG` when set, with
//! `MISSIVE_LOG` overriding the log level.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::http::content::{CONTENT_CHUNK_SIZE, ITER_CHUNK_SIZE};

pub const CONFIG_ENV: &str = "MISSIVE_CONFIG";
pub const LOG_ENV: &str = "MISSIVE_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// A `tracing` level or filter directive.
    pub log_level: String,
    /// Chunk size for line and text streaming.
    pub iter_chunk_size: usize,
    /// Chunk size for raw body streaming.
    pub content_chunk_size: usize,
    /// Headers added to prepared requests unless the caller sets them.
    pub default_headers: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        let mut default_headers = BTreeMap::new();
        default_headers.insert(
            "User-Agent".to_string(),
            format!("missive/{}", env!("CARGO_PKG_VERSION")),
        );
        default_headers.insert("Accept".to_string(), "*/*".to_string());

        Self {
            log_level: "info".to_string(),
            iter_chunk_size: ITER_CHUNK_SIZE,
            content_chunk_size: CONTENT_CHUNK_SIZE,
            default_headers,
        }
    }
}

impl Config {
    /// Loads the configuration from the environment.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_ENV).ok();
        let log = std::env::var(LOG_ENV).ok();
        Self::load_from(path.as_deref().map(Path::new), log)
    }

    /// Reads `path` (or starts from defaults) and applies a log override.
    pub fn load_from(path: Option<&Path>, log_level: Option<String>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                Self::from_yaml(&text)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => Self::default(),
        };
        if let Some(level) = log_level.filter(|l| !l.trim().is_empty()) {
            config.log_level = level;
        }
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }
}
