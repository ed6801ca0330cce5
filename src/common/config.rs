//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::{self, PROJECT_CONFIG_FILE};
use super::{Error, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Default settings for test cases
    #[serde(default)]
    pub defaults: Defaults,

    /// Log directory settings
    #[serde(default)]
    pub logs: LogsConfig,

    /// Process runner settings
    #[serde(default)]
    pub runner: RunnerConfig,
}

/// Defaults applied to test cases that leave a field out
#[derive(Debug, Deserialize)]
pub struct Defaults {
    /// Timeout for a test case without its own `timeout`
    #[serde(default = "default_timeout")]
    pub timeout_secs: f64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
        }
    }
}

fn default_timeout() -> f64 {
    30.0
}

/// Log directory configuration
#[derive(Debug, Deserialize)]
pub struct LogsConfig {
    /// Root under which each run creates `test_run_<id>/`
    #[serde(default = "default_logs_dir")]
    pub dir: PathBuf,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            dir: default_logs_dir(),
        }
    }
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

/// Process runner configuration
#[derive(Debug, Deserialize)]
pub struct RunnerConfig {
    /// Program used to run scripts (e.g. "bash"); scripts are executed
    /// directly when unset
    #[serde(default)]
    pub interpreter: Option<String>,

    /// How long to keep draining output after a timeout kill
    #[serde(default = "default_kill_grace")]
    pub kill_grace_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            interpreter: None,
            kill_grace_ms: default_kill_grace(),
        }
    }
}

fn default_kill_grace() -> u64 {
    250
}

impl Config {
    /// Load configuration
    ///
    /// An explicit path must exist. Otherwise `<project_root>/scriptcheck.toml`
    /// is tried, then the per-user config file. Returns default configuration
    /// if none of them exist.
    pub fn load(explicit: Option<&Path>, project_root: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        let project = project_root.join(PROJECT_CONFIG_FILE);
        if project.exists() {
            return Self::load_from(&project);
        }

        if let Some(path) = paths::user_config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        toml::from_str(&content).map_err(|e| Error::ConfigParse(e.to_string()))
    }
}

/// Resolved settings consumed by the test engine
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory relative script, reference and log paths are resolved against
    pub project_root: PathBuf,
    /// Timeout for test cases that don't declare one
    pub default_timeout: Duration,
    /// Root directory for run log directories
    pub logs_dir: PathBuf,
    /// Optional interpreter to run scripts with
    pub interpreter: Option<String>,
    /// Drain grace period after a timeout kill
    pub kill_grace: Duration,
}

impl Settings {
    /// Build settings from a loaded configuration
    pub fn from_config(config: &Config, project_root: &Path) -> Result<Self> {
        let default_timeout = timeout_from_secs(config.defaults.timeout_secs).ok_or_else(|| {
            Error::Config(format!(
                "defaults.timeout_secs must be a positive number of at most {} seconds, got {}",
                MAX_TIMEOUT_SECS, config.defaults.timeout_secs
            ))
        })?;

        Ok(Self {
            project_root: project_root.to_path_buf(),
            default_timeout,
            logs_dir: paths::resolve(project_root, &config.logs.dir),
            interpreter: config.runner.interpreter.clone(),
            kill_grace: Duration::from_millis(config.runner.kill_grace_ms),
        })
    }

    /// Default settings rooted at `project_root`
    pub fn with_root(project_root: &Path) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            default_timeout: Duration::from_secs_f64(default_timeout()),
            logs_dir: project_root.join(default_logs_dir()),
            interpreter: None,
            kill_grace: Duration::from_millis(default_kill_grace()),
        }
    }
}

/// Longest timeout a test case may declare (one year)
pub const MAX_TIMEOUT_SECS: f64 = 365.0 * 24.0 * 60.0 * 60.0;

/// Convert a timeout in seconds into a Duration, rejecting non-positive,
/// non-finite and values above [`MAX_TIMEOUT_SECS`]
pub fn timeout_from_secs(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs > 0.0 && secs <= MAX_TIMEOUT_SECS {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}
