use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{HbError, HbResult};

/// Top-level configuration (loaded from heartbeat.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HbConfig {
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

impl HbConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file is not an error: defaults are returned and a warning is logged.
    pub fn load(path: &Path) -> HbResult<Self> {
        if !path.exists() {
            tracing::warn!(
                "config file not found: {}  (using defaults)",
                path.display()
            );
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
            .map_err(|e| HbError::Config(format!("parsing config {}: {e}", path.display())))
    }

    pub fn parse(content: &str) -> HbResult<Self> {
        toml::from_str(content).map_err(|e| HbError::Config(e.to_string()))
    }
}

/// Proof-of-storage engine parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sectors per chunk. More sectors shrink the tag but grow each proof.
    pub sectors: usize,
    /// Bit length of a freshly generated field prime (default: 1024)
    pub prime_bits: usize,
    /// Fixed field prime as a big-endian hex string. Generated when unset.
    pub prime: Option<String>,
}

impl EngineConfig {
    /// Decode the configured prime into big-endian bytes, if one is set.
    pub fn prime_bytes(&self) -> HbResult<Option<Vec<u8>>> {
        let Some(hex_str) = self.prime.as_deref() else {
            return Ok(None);
        };
        let trimmed = hex_str.trim().trim_start_matches("0x");
        hex::decode(trimmed)
            .map(Some)
            .map_err(|e| HbError::Config(format!("invalid engine.prime hex: {e}")))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sectors: 10,
            prime_bits: 1024,
            prime: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info). `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Log format: "text" or "json"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
        }
    }
}
