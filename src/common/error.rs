//! Error types for scriptcheck
//!
//! Only configuration problems are errors in the `Result` sense. Everything
//! that can go wrong while running a single script (missing file, timeout,
//! wrong exit status, output mismatch) is carried as data in a
//! `CapturedOutcome` or `Verdict` instead, so one bad test can never abort
//! the rest of the suite.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for scriptcheck
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Test case #{index}{}: invalid field '{field}': {message}", name_suffix(.name))]
    InvalidDescriptor {
        index: usize,
        name: Option<String>,
        field: String,
        message: String,
    },

    #[error("Duplicate test name '{name}' (test cases #{first} and #{second})")]
    DuplicateName {
        name: String,
        first: usize,
        second: usize,
    },

    // === IO Errors ===
    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    #[error("Failed to write file '{path}': {error}")]
    FileWrite { path: String, error: String },

    #[error("Failed to write log '{path}': {error}")]
    LogWrite { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn name_suffix(name: &Option<String>) -> String {
    match name {
        Some(name) => format!(" ('{}')", name),
        None => String::new(),
    }
}

impl Error {
    /// Create an invalid descriptor error
    pub fn invalid_descriptor(
        index: usize,
        name: Option<&str>,
        field: &str,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidDescriptor {
            index,
            name: name.map(str::to_string),
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Create a log write error
    pub fn log_write(path: &std::path::Path, error: io::Error) -> Self {
        Self::LogWrite {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }

    /// Whether this error comes from the suite configuration rather than I/O
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::ConfigParse(_)
                | Error::InvalidDescriptor { .. }
                | Error::DuplicateName { .. }
        )
    }
}
