use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid scan config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid scan config: {0}")]
    Invalid(&'static str),
}

/// Tunables for a single archive scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Members whose name ends with this suffix are parsed as classes.
    pub class_suffix: String,

    /// Member holding the manifest, matched case-insensitively.
    pub manifest_name: String,

    /// Uncompressed size above which a member is skipped (default: 64 MiB).
    pub max_member_bytes: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            class_suffix: ".class".to_string(),
            manifest_name: "META-INF/MANIFEST.MF".to_string(),
            max_member_bytes: 64 * 1024 * 1024,
        }
    }
}

impl ScanConfig {
    /// Parses a JSON document; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: ScanConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.class_suffix.is_empty() {
            return Err(ConfigError::Invalid("class_suffix must not be empty"));
        }
        if self.manifest_name.is_empty() {
            return Err(ConfigError::Invalid("manifest_name must not be empty"));
        }
        if self.max_member_bytes == 0 {
            return Err(ConfigError::Invalid("max_member_bytes must be positive"));
        }
        Ok(())
    }
}
