//! TOML-based node configuration.

use std::path::Path;

use serde::Deserialize;

use crate::error::NodeError;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("failed to read config file: {e}")))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(format!("failed to parse config: {e}")))
    }
}

/// The `[node]` section.
#[derive(Debug, Deserialize)]
pub struct NodeSection {
    /// Custom storage directory. Defaults to `~/.loramesh/storage`.
    pub storage_path: Option<String>,
    /// Seconds between periodic state saves. 0 disables. Default: 300.
    #[serde(default = "default_persist_interval")]
    pub persist_interval: u64,
    /// Development flag: never write the device state to flash.
    #[serde(default)]
    pub no_save: bool,
    /// Radio MAC override, `"aa:bb:cc:dd:ee:ff"` or plain hex. A random
    /// locally administered MAC is generated when unset.
    pub mac: Option<String>,
    #[serde(default = "default_hw_model")]
    pub hw_model: String,
    /// Build-time region tag, e.g. `"1.0-EU433"`.
    pub region_tag: Option<String>,
}

fn default_persist_interval() -> u64 {
    300
}

fn default_hw_model() -> String {
    "generic".to_string()
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            storage_path: None,
            persist_interval: default_persist_interval(),
            no_save: false,
            mac: None,
            hw_model: default_hw_model(),
            region_tag: None,
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Parse a MAC address in `aa:bb:cc:dd:ee:ff` or plain-hex form.
pub fn parse_mac(s: &str) -> Result<[u8; 6], NodeError> {
    let hex: String = s.chars().filter(|c| *c != ':' && *c != '-').collect();
    if hex.len() != 12 {
        return Err(NodeError::Config(format!("invalid MAC address: {s}")));
    }

    let mut mac = [0u8; 6];
    for (i, byte) in mac.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| NodeError::Config(format!("invalid MAC address: {s}")))?;
    }
    Ok(mac)
}
