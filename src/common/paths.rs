//! Configuration and project paths
//!
//! The project root is the directory every relative script, reference file
//! and log path is resolved against. It defaults to the directory holding
//! the test-case file.

use std::path::{Path, PathBuf};

/// Name used for the per-user configuration directory
const APP_NAME: &str = "scriptcheck";

/// File name of a project-local configuration file
pub const PROJECT_CONFIG_FILE: &str = "scriptcheck.toml";

/// Default name of the test-case source file
pub const DEFAULT_TESTCASE_FILE: &str = "Testcase.json";

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/scriptcheck/`
/// - macOS: `~/Library/Application Support/scriptcheck/`
/// - Windows: `%APPDATA%\scriptcheck\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the per-user configuration file
pub fn user_config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project root for a test-case file: the directory containing it
pub fn project_root_for(testcase_file: &Path) -> PathBuf {
    match testcase_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Resolve `path` against `root` unless it is already absolute
pub fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Turn a test name into something safe to use as a file name
///
/// Keeps alphanumerics, `-` and `_`; spaces become `_`; everything else is
/// dropped. Falls back to `test` when nothing survives.
pub fn sanitize_file_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let safe = kept.trim_end().replace(' ', "_");
    if safe.is_empty() {
        "test".to_string()
    } else {
        safe
    }
}
