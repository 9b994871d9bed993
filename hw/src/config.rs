//! Configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Per-directory config file name
const LOCAL_CONFIG: &str = ".hexwindow.yml";

/// Main hexwindow configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine settings
    pub editor: EditorConfig,

    /// Pattern matcher settings
    pub patterns: PatternsConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        self.editor.validate()
    }

    /// Config files consulted when no explicit path is given, most specific first
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("hexwindow").join("hexwindow.yml"));
        }
        paths
    }

    /// Load configuration
    ///
    /// An explicit path must load. Otherwise the first readable file from
    /// [`Config::search_paths`] wins; broken files are skipped with a warning
    /// and no file at all means defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).with_context(|| format!("Failed to load config from {}", path.display()));
        }

        for path in Self::search_paths().iter().filter(|p| p.exists()) {
            match Self::load_from_file(path) {
                Ok(config) => return Ok(config),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unusable config file"),
            }
        }

        debug!("Config::load: no config file, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are swallowed: the full `load` reports them once logging works.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => Self::search_paths(),
        };
        candidates
            .iter()
            .filter(|p| p.exists())
            .find_map(|p| Self::load_from_file(p).ok())
            .and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        info!(path = %path.as_ref().display(), chunk_size = config.editor.chunk_size, "Loaded config");
        Ok(config)
    }
}

/// Engine configuration passed to `HexEditor::new`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Bytes per read/copy chunk
    #[serde(rename = "chunk-size")]
    pub chunk_size: usize,

    /// Suffix appended to the destination name for the temporary save file
    #[serde(rename = "temp-suffix")]
    pub temp_suffix: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            temp_suffix: crate::DEFAULT_TEMP_SUFFIX.to_string(),
        }
    }
}

impl EditorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(eyre::eyre!("chunk-size must be greater than zero"));
        }
        if self.temp_suffix.is_empty() {
            return Err(eyre::eyre!("temp-suffix must not be empty"));
        }
        Ok(())
    }
}

/// Pattern matcher configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternsConfig {
    /// YAML file of named byte regexes
    #[serde(rename = "patterns-file")]
    pub patterns_file: Option<PathBuf>,
}
