//! Builder configuration.
//!
//! Handles loading and validating `config.toml`. Stock defaults are
//! overridden by the values in the user's file; command-line flags override
//! both (see `main.rs`).
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! content_dir = "content"   # One subdirectory per site
//! output_dir = "public"     # Generated sites land in <output_dir>/<site>
//! themes_dir = "themes"     # Theme assets and stylesheets
//!
//! [scheduler]
//! workers = 10              # Build worker pool size
//! intake_capacity = 100     # Pending requests before callers block
//! # job_timeout_secs = 300  # Abandon a pass at its next checkpoint
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Top-level configuration loaded from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding one content directory per site.
    pub content_dir: PathBuf,
    /// Root under which each site's output directory is created.
    pub output_dir: PathBuf,
    /// Directory holding themes, one subdirectory per theme name.
    pub themes_dir: PathBuf,
    /// Worker pool and intake settings.
    pub scheduler: SchedulerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            content_dir: PathBuf::from("content"),
            output_dir: PathBuf::from("public"),
            themes_dir: PathBuf::from("themes"),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Config {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()
    }

    /// Output directory of one site.
    pub fn site_output_dir(&self, site: &str) -> PathBuf {
        self.output_dir.join(site)
    }
}

/// Build scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Number of long-lived build workers. Fixed for the life of the process.
    pub workers: usize,
    /// Capacity of the request intake. A full intake makes `enqueue` block.
    pub intake_capacity: usize,
    /// Per-pass deadline in seconds. When absent, passes run unbounded.
    pub job_timeout_secs: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            intake_capacity: 100,
            job_timeout_secs: None,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Validation(
                "scheduler.workers must be at least 1".into(),
            ));
        }
        if self.intake_capacity == 0 {
            return Err(ConfigError::Validation(
                "scheduler.intake_capacity must be at least 1".into(),
            ));
        }
        if self.job_timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "scheduler.job_timeout_secs must be non-zero when set".into(),
            ));
        }
        Ok(())
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_secs.map(Duration::from_secs)
    }
}

/// Load config from the given file.
///
/// A missing file yields the stock defaults; a present file is parsed,
/// unknown keys are rejected and the result is validated.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate config from a TOML string.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Sitesmith Configuration
# =======================
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.

# Directory holding one content directory per site (<content_dir>/<site>/site.toml).
content_dir = "content"

# Generated sites are written to <output_dir>/<site>.
output_dir = "public"

# Themes live in <themes_dir>/<theme>/{assets,sass}.
themes_dir = "themes"

# ---------------------------------------------------------------------------
# Build scheduler
# ---------------------------------------------------------------------------
[scheduler]
# Number of parallel build workers. Builds of different sites run in
# parallel; builds of the same site never overlap.
workers = 10

# Pending build requests accepted before callers have to wait.
intake_capacity = 100

# Abandon a build pass that runs longer than this many seconds.
# Omit to let passes run unbounded.
# job_timeout_secs = 300
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn stock_config_parses_to_defaults() {
        let parsed = parse_config(stock_config_toml()).unwrap();
        let defaults = Config::default();
        assert_eq!(parsed.content_dir, defaults.content_dir);
        assert_eq!(parsed.output_dir, defaults.output_dir);
        assert_eq!(parsed.scheduler.workers, defaults.scheduler.workers);
        assert_eq!(
            parsed.scheduler.intake_capacity,
            defaults.scheduler.intake_capacity
        );
        assert_eq!(parsed.scheduler.job_timeout_secs, None);
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let config = parse_config("[scheduler]\nworkers = 3\n").unwrap();
        assert_eq!(config.scheduler.workers, 3);
        assert_eq!(config.scheduler.intake_capacity, 100);
        assert_eq!(config.output_dir, PathBuf::from("public"));
    }

    #[test]
    fn unknown_keys_rejected() {
        let err = parse_config("[scheduler]\nworkerz = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn zero_workers_rejected() {
        let err = parse_config("[scheduler]\nworkers = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = parse_config("[scheduler]\njob_timeout_secs = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn timeout_converts_to_duration() {
        let config = parse_config("[scheduler]\njob_timeout_secs = 5\n").unwrap();
        assert_eq!(
            config.scheduler.job_timeout(),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(config.scheduler.workers, 10);
    }

    #[test]
    fn load_from_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "output_dir = \"dist\"\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("dist"));
        assert_eq!(config.site_output_dir("acme"), PathBuf::from("dist/acme"));
    }
}
