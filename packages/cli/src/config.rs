use hitedit_editor::SyncConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_NAME: &str = "hitedit.config.json";

/// hitedit configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Schema catalog JSON, relative to the config directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Indentation per nesting level
    #[serde(default = "default_indent")]
    pub indent: String,

    #[serde(default = "default_serialize_debounce")]
    pub serialize_debounce_ms: u64,

    #[serde(default = "default_parse_debounce")]
    pub parse_debounce_ms: u64,
}

fn default_indent() -> String {
    "  ".to_string()
}

fn default_serialize_debounce() -> u64 {
    300
}

fn default_parse_debounce() -> u64 {
    500
}

impl Config {
    /// Load config from a directory
    pub fn load(cwd: &str) -> anyhow::Result<Self> {
        let config_path = PathBuf::from(cwd).join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Schema path to use: the command line wins over the config file
    pub fn schema_path(&self, cwd: &str, cli_override: Option<&Path>) -> Option<PathBuf> {
        match cli_override {
            Some(path) => Some(path.to_path_buf()),
            None => self.schema.as_ref().map(|s| PathBuf::from(cwd).join(s)),
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            serialize_delay: Duration::from_millis(self.serialize_debounce_ms),
            parse_delay: Duration::from_millis(self.parse_debounce_ms),
            indent: self.indent.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema: None,
            indent: default_indent(),
            serialize_debounce_ms: default_serialize_debounce(),
            parse_debounce_ms: default_parse_debounce(),
        }
    }
}
