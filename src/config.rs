//! Configuration system
//!
//! Provides centralized configuration management with:
//! - Config file loading (optional)
//! - Environment variable overrides
//! - Runtime defaults
//! - Validation
//!
//! Files are looked up in order: `meter-report.toml`, `.meter-report.toml`,
//! then `<config_dir>/meter-report/config.toml`. An explicit `--config` path
//! replaces the lookup.

use anyhow::{Context, Result};
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub paths: PathsConfig,
    pub units: UnitsConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
    /// `console`, `file` or `both`
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding one sub-folder per export
    pub source_base_dir: PathBuf,
    /// Where `report --output` places relative output files
    pub target_base_dir: PathBuf,
    /// Export folders read when no input path is given
    pub folders: Vec<String>,
    pub log_directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitsConfig {
    /// Divide cubic-metre counters by `cubic_divisor`
    pub scale_cubic: bool,
    pub cubic_divisor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub json_pretty: bool,
    pub date_format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "WARN".to_string(),
            format: "pretty".to_string(),
            output: "console".to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source_base_dir: PathBuf::from("."),
            target_base_dir: PathBuf::from("."),
            folders: Vec::new(),
            log_directory: PathBuf::from("logs"),
        }
    }
}

impl Default for UnitsConfig {
    fn default() -> Self {
        Self {
            scale_cubic: true,
            cubic_divisor: 1000.0,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            json_pretty: true,
            date_format: "%Y-%m-%d %H:%M".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file, environment, and defaults
    pub fn load() -> Result<Self> {
        let config_paths = [
            PathBuf::from("meter-report.toml"),
            PathBuf::from(".meter-report.toml"),
            dirs::config_dir()
                .map(|d| d.join("meter-report").join("config.toml"))
                .unwrap_or_default(),
        ];

        let mut config = Config::default();
        for path in &config_paths {
            if path.is_file() {
                info!(config_file = %path.display(), "Loading configuration from file");
                config = Self::load_from_file(path)?;
                break;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load an explicit file, then apply environment overrides
    pub fn load_with(path: &Path) -> Result<Self> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("LOG_FORMAT") {
            self.logging.format = val;
        }
        if let Ok(val) = env::var("LOG_OUTPUT") {
            self.logging.output = val;
        }

        if let Ok(val) = env::var("METER_REPORT_SOURCE_DIR") {
            self.paths.source_base_dir = PathBuf::from(val);
        }
        if let Ok(val) = env::var("METER_REPORT_TARGET_DIR") {
            self.paths.target_base_dir = PathBuf::from(val);
        }
        if let Ok(val) = env::var("METER_REPORT_FOLDERS") {
            self.paths.folders = val
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(val) = env::var("METER_REPORT_LOG_DIR") {
            self.paths.log_directory = PathBuf::from(val);
        }

        if let Ok(val) = env::var("METER_REPORT_SCALE_CUBIC") {
            self.units.scale_cubic = val
                .parse()
                .context("Invalid METER_REPORT_SCALE_CUBIC")?;
        }
        if let Ok(val) = env::var("METER_REPORT_CUBIC_DIVISOR") {
            self.units.cubic_divisor = val
                .parse()
                .context("Invalid METER_REPORT_CUBIC_DIVISOR")?;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !(self.units.cubic_divisor.is_finite() && self.units.cubic_divisor > 0.0) {
            return Err(anyhow::anyhow!(
                "Cubic divisor must be a positive number, got {}",
                self.units.cubic_divisor
            ));
        }

        if StrftimeItems::new(&self.output.date_format).any(|item| matches!(item, Item::Error)) {
            return Err(anyhow::anyhow!(
                "Date format '{}' is not a valid strftime pattern",
                self.output.date_format
            ));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(anyhow::anyhow!(
                "Log format must be 'pretty' or 'json', got '{}'",
                self.logging.format
            ));
        }

        match self.logging.output.as_str() {
            "console" => {}
            "file" | "both" => {
                if !self.paths.log_directory.exists() {
                    fs::create_dir_all(&self.paths.log_directory)
                        .context("Failed to create log directory")?;
                }
            }
            other => {
                return Err(anyhow::anyhow!(
                    "Log output must be 'console', 'file' or 'both', got '{}'",
                    other
                ))
            }
        }

        if !self.units.scale_cubic && self.units.cubic_divisor != 1000.0 {
            warn!(
                cubic_divisor = self.units.cubic_divisor,
                "Cubic divisor is set but scaling is disabled"
            );
        }

        Ok(())
    }

    /// Save current configuration to file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        info!(path = %path.display(), "Configuration saved to file");

        Ok(())
    }
}

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Install the global configuration, from `path` if given.
/// Later calls return the already installed instance.
pub fn init_config(path: Option<&Path>) -> Result<&'static Config> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }
    let config = match path {
        Some(path) => Config::load_with(path)?,
        None => Config::load()?,
    };
    Ok(CONFIG.get_or_init(|| config))
}

/// Get the global configuration instance, falling back to defaults when
/// loading fails.
pub fn get_config() -> &'static Config {
    CONFIG.get_or_init(|| {
        Config::load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load configuration, using defaults");
            Config::default()
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "WARN");
        assert_eq!(config.logging.output, "console");
        assert!(config.units.scale_cubic);
        assert_eq!(config.units.cubic_divisor, 1000.0);
        assert!(config.paths.folders.is_empty());
    }

    #[test]
    fn test_env_override() {
        // Single test touching the environment; tests run in parallel
        env::set_var("METER_REPORT_FOLDERS", "H1, H2,,H3");
        env::set_var("METER_REPORT_CUBIC_DIVISOR", "100");
        let mut config = Config::default();
        config.apply_env_overrides().unwrap();
        assert_eq!(config.paths.folders, vec!["H1", "H2", "H3"]);
        assert_eq!(config.units.cubic_divisor, 100.0);

        env::set_var("METER_REPORT_SCALE_CUBIC", "sometimes");
        let result = Config::default().apply_env_overrides();

        env::remove_var("METER_REPORT_FOLDERS");
        env::remove_var("METER_REPORT_CUBIC_DIVISOR");
        env::remove_var("METER_REPORT_SCALE_CUBIC");
        assert!(result.is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.units.cubic_divisor = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.output = "syslog".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.output.date_format = "%d.%m.%Y %Q".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meter-report.toml");
        fs::write(
            &path,
            "[paths]\nsource_base_dir = \"/data/exports\"\nfolders = [\"H1\"]\n\n[units]\nscale_cubic = false\n",
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.paths.source_base_dir, PathBuf::from("/data/exports"));
        assert_eq!(config.paths.folders, vec!["H1"]);
        assert!(!config.units.scale_cubic);
        assert_eq!(config.units.cubic_divisor, 1000.0);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.paths.folders = vec!["Haus".to_string()];
        config.save_to_file(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.paths.folders, vec!["Haus"]);
    }
}
