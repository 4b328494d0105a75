use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::api::models::ExportFormat;
use crate::utils::app_paths::AppPaths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub grid: GridConfig,
    pub analysis: AnalysisConfig,
    pub search: SearchConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of the data/analysis service (without the /api/v1 prefix)
    pub base_url: String,

    /// Timeout for a single request, in seconds
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Rows per page
    pub page_size: usize,

    /// Column width bounds in pixels
    pub min_column_width: u32,
    pub max_column_width: u32,

    /// Width given to every column when a dataset is first shown
    pub default_column_width: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Delay between task status requests
    pub poll_interval_ms: u64,

    /// Task names start with this, followed by the quoted column name
    pub task_name_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Maximum row indices requested from a global search
    pub result_limit: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub default_format: ExportFormat,

    pub include_stats: bool,

    /// Where exported files go; the data directory when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            min_column_width: 80,
            max_column_width: 250,
            default_column_width: 200,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            task_name_prefix: "Analyze column ".to_string(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { result_limit: 1000 }
    }
}

impl Config {
    /// Load config from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            // Create default config if it doesn't exist
            let default_config = Self::default();
            default_config.save_to(&config_path)?;
            return Ok(default_config);
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;

        Ok(())
    }

    /// Get the default config file path
    pub fn get_config_path() -> Result<PathBuf> {
        AppPaths::config_file()
    }

    /// Create a default config file with comments
    pub fn create_default_with_comments() -> String {
        r#"# JSONL Viewer Configuration File
# Location: ~/.config/jsonl-viewer/config.toml (Linux)
#           ~/Library/Application Support/jsonl-viewer/config.toml (macOS)
#           %APPDATA%\jsonl-viewer\config.toml (Windows)

[service]
# Data service address (the /api/v1 prefix is added automatically)
base_url = "http://localhost:8000"

# Seconds before a request is abandoned
request_timeout_secs = 30

[grid]
# Rows fetched per page
page_size = 50

# Column widths are always kept within these bounds (pixels)
min_column_width = 80
max_column_width = 250

# Initial width of every column
default_column_width = 200

[analysis]
# How often running analysis tasks are polled (milliseconds)
poll_interval_ms = 1000

# Prefix of the server's task names; the rest is the column name
task_name_prefix = "Analyze column "

[search]
# Maximum number of matching rows returned by a global search
result_limit = 1000

[export]
# One of: json, jsonl, csv, excel
default_format = "json"

# Ask the service to include summary statistics
include_stats = false

# Directory for exported files (defaults to the data directory)
# output_dir = "/path/to/exports"
"#
        .to_string()
    }
}
