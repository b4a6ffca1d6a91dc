use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tools::ToolPrograms;

pub const CONFIG_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    /// Holds `uploads/`, `converted/` and `work/`.
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default)]
    pub tools: ToolPrograms,
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_processing_lease")]
    pub processing_lease_secs: u64,
}

fn default_version() -> String {
    CONFIG_VERSION.to_string()
}

/// `~/.docshift`, or `./.docshift` when no home directory is known.
pub fn default_storage_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".docshift")
}

fn default_database_path() -> PathBuf {
    crate::db::default_database_path()
        .unwrap_or_else(|| default_storage_root().join("docshift.db"))
}

fn default_tool_timeout() -> u64 {
    120
}

fn default_processing_lease() -> u64 {
    600
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            storage_root: default_storage_root(),
            database_path: default_database_path(),
            tools: ToolPrograms::default(),
            tool_timeout_secs: default_tool_timeout(),
            processing_lease_secs: default_processing_lease(),
        }
    }
}

impl Config {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn processing_lease(&self) -> Duration {
        Duration::from_secs(self.processing_lease_secs)
    }
}
