//! Configuration management for psjungle.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::{Args, ConfigFormat, LogLevel};
use anyhow::{bail, Context};
use clap::ValueEnum;
use psjungle::process::{DEFAULT_PROC_ROOT, DEFAULT_SCAN_TIMEOUT};
use psjungle::{Error, Signal};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// Default configuration constants
pub const DEFAULT_WATCH_INTERVAL_SECS: f64 = 2.0;
pub const DEFAULT_LOG_LEVEL: &str = "warn";
pub const DEFAULT_SIGNAL: &str = "term";

const DEFAULT_CONFIG_PATHS: [&str; 8] = [
    "/etc/psjungle/config.yaml",
    "/etc/psjungle/config.yml",
    "/etc/psjungle/config.json",
    "/etc/psjungle/config.toml",
    "./psjungle.yaml",
    "./psjungle.yml",
    "./psjungle.json",
    "./psjungle.toml",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Display
    #[serde(alias = "watch-interval-secs")]
    pub watch_interval_secs: Option<f64>,
    pub flat: Option<bool>,
    pub color: Option<bool>,

    // Matching
    pub strict: Option<bool>,
    /// Case-fold regex patterns (strict matching always ignores case)
    #[serde(alias = "case-insensitive")]
    pub case_insensitive: Option<bool>,

    // Process source
    #[serde(alias = "proc-root")]
    pub proc_root: Option<PathBuf>,
    #[serde(alias = "scan-timeout-secs")]
    pub scan_timeout_secs: Option<f64>,
    /// Path to JSON test data file (uses synthetic data instead of /proc)
    #[serde(alias = "test-data-file", skip_serializing_if = "Option::is_none")]
    pub test_data_file: Option<PathBuf>,

    /// Signal used by a bare `-k`
    #[serde(alias = "default-signal")]
    pub default_signal: Option<String>,

    // Logging
    #[serde(alias = "log-level")]
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch_interval_secs: Some(DEFAULT_WATCH_INTERVAL_SECS),
            flat: Some(false),
            color: Some(true),
            strict: Some(false),
            case_insensitive: Some(true),
            proc_root: Some(PathBuf::from(DEFAULT_PROC_ROOT)),
            scan_timeout_secs: Some(DEFAULT_SCAN_TIMEOUT.as_secs_f64()),
            test_data_file: None,
            default_signal: Some(DEFAULT_SIGNAL.into()),
            log_level: Some(DEFAULT_LOG_LEVEL.into()),
        }
    }
}

fn secs(value: Option<f64>, default: Duration) -> Duration {
    value
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .unwrap_or(default)
}

impl Config {
    /// Fills every unset field from [`Config::default`].
    pub fn with_defaults(self) -> Self {
        let d = Config::default();
        Self {
            watch_interval_secs: self.watch_interval_secs.or(d.watch_interval_secs),
            flat: self.flat.or(d.flat),
            color: self.color.or(d.color),
            strict: self.strict.or(d.strict),
            case_insensitive: self.case_insensitive.or(d.case_insensitive),
            proc_root: self.proc_root.or(d.proc_root),
            scan_timeout_secs: self.scan_timeout_secs.or(d.scan_timeout_secs),
            test_data_file: self.test_data_file.or(d.test_data_file),
            default_signal: self.default_signal.or(d.default_signal),
            log_level: self.log_level.or(d.log_level),
        }
    }

    pub fn watch_interval(&self) -> Duration {
        secs(
            self.watch_interval_secs,
            Duration::from_secs_f64(DEFAULT_WATCH_INTERVAL_SECS),
        )
    }

    pub fn scan_timeout(&self) -> Duration {
        secs(self.scan_timeout_secs, DEFAULT_SCAN_TIMEOUT)
    }

    pub fn proc_root(&self) -> PathBuf {
        self.proc_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROC_ROOT))
    }

    pub fn log_level(&self) -> LogLevel {
        self.log_level
            .as_deref()
            .and_then(|l| LogLevel::from_str(l, true).ok())
            .unwrap_or(LogLevel::Warn)
    }

    pub fn default_signal(&self) -> psjungle::Result<Signal> {
        self.default_signal.as_deref().unwrap_or(DEFAULT_SIGNAL).parse()
    }
}

fn check_secs(name: &str, value: Option<f64>) -> psjungle::Result<()> {
    match value {
        Some(v) if !v.is_finite() || v <= 0.0 => Err(Error::Config(format!(
            "{name} must be a positive number of seconds, got {v}"
        ))),
        _ => Ok(()),
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> psjungle::Result<()> {
    check_secs("watch_interval_secs", cfg.watch_interval_secs)?;
    check_secs("scan_timeout_secs", cfg.scan_timeout_secs)?;

    if let Some(level) = cfg.log_level.as_deref() {
        if LogLevel::from_str(level, true).is_err() {
            return Err(Error::Config(format!(
                "Invalid log_level '{}', expected off/error/warn/info/debug/trace",
                level
            )));
        }
    }

    if let Some(signal) = cfg.default_signal.as_deref() {
        signal
            .parse::<Signal>()
            .map_err(|e| Error::Config(format!("default_signal: {e}")))?;
    }

    // The proc root is irrelevant when the data comes from a file.
    if cfg.test_data_file.is_none() {
        let root = cfg.proc_root();
        if !root.is_dir() {
            return Err(Error::Config(format!(
                "proc_root {} is not a directory",
                root.display()
            )));
        }
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?.with_defaults()
    };

    if let Some(Some(interval)) = args.watch {
        config.watch_interval_secs = Some(interval);
    }
    if args.flat {
        config.flat = Some(true);
    }
    if args.no_color {
        config.color = Some(false);
    }
    if args.strict {
        config.strict = Some(true);
    }
    if args.case_sensitive {
        config.case_insensitive = Some(false);
    }
    if let Some(root) = &args.proc_root {
        config.proc_root = Some(root.clone());
    }
    if let Some(timeout) = args.scan_timeout {
        config.scan_timeout_secs = Some(timeout);
    }
    if let Some(test_file) = &args.test_data_file {
        config.test_data_file = Some(test_file.clone());
    }
    if let Some(level) = args.log_level {
        config.log_level = level
            .to_possible_value()
            .map(|v| v.get_name().to_string());
    }

    Ok(config)
}

/// Reads `path`, or the first existing default location. Without either the
/// result is empty (all fields unset).
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match path {
        Some(p) => {
            if !p.exists() {
                bail!("config file {} not found", p.display());
            }
            p.to_path_buf()
        }
        None => match DEFAULT_CONFIG_PATHS
            .iter()
            .map(Path::new)
            .find(|p| p.exists())
        {
            Some(p) => p.to_path_buf(),
            None => return Ok(empty_config()),
        },
    };

    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    parse_config(&path, &content)
}

fn parse_config(path: &Path, content: &str) -> anyhow::Result<Config> {
    let context = || format!("failed to parse config file {}", path.display());
    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(content).with_context(context)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(content).with_context(context)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(content).with_context(context)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

fn empty_config() -> Config {
    Config {
        watch_interval_secs: None,
        flat: None,
        color: None,
        strict: None,
        case_insensitive: None,
        proc_root: None,
        scan_timeout_secs: None,
        test_data_file: None,
        default_signal: None,
        log_level: None,
    }
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: ConfigFormat) -> anyhow::Result<()> {
    let output = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };
    println!("{output}");
    Ok(())
}
