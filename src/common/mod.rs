//! Common utilities shared between the CLI and the test engine

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use config::{Config, Settings};
pub use error::{Error, Result};
