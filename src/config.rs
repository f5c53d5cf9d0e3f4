// Configuration reader for dynswapd
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::defaults;
use crate::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("key not found: {0}")]
    MissingKey(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Reads scalars out of a nested YAML document by dotted key path,
/// reparsing the file on every call. There is no in-memory cache: an
/// operator editing the file takes effect on the controller's next tick.
#[derive(Debug, Clone)]
pub struct ConfigProvider {
    path: PathBuf,
}

impl ConfigProvider {
    pub fn new() -> Self {
        Self::at(defaults::CONFIG_FILE)
    }

    pub fn at<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Look up `key_path` (e.g. "dynamic_swappiness.step", a leading `.` is
    /// tolerated and stripped) and deserialize it as `T`. Returns `default`
    /// and logs a warning on any failure: missing file, malformed YAML,
    /// missing key, or a type mismatch at the leaf.
    pub fn get<T: DeserializeOwned + Display>(&self, key_path: &str, default: T) -> T {
        match self.try_get::<T>(key_path) {
            Ok(value) => {
                info!("Config [{}] = {}", key_path, value);
                value
            }
            Err(e) => {
                warn!("Config [{}]: {} (using default {})", key_path, e, default);
                default
            }
        }
    }

    fn try_get<T: DeserializeOwned>(&self, key_path: &str) -> Result<T> {
        let content = fs::read_to_string(&self.path)?;
        let root: serde_yaml::Value = serde_yaml::from_str(&content)?;
        let trimmed = key_path.strip_prefix('.').unwrap_or(key_path);

        let mut node = &root;
        for segment in trimmed.split('.') {
            node = node
                .get(segment)
                .ok_or_else(|| ConfigError::MissingKey(key_path.to_string()))?;
        }
        Ok(serde_yaml::from_value(node.clone())?)
    }
}

impl Default for ConfigProvider {
    fn default() -> Self {
        Self::new()
    }
}

pub fn exists() -> bool {
    Path::new(defaults::CONFIG_FILE).exists()
}
