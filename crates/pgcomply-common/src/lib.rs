//! pgcomply Common - shared utilities: logging and configuration
//!
//! This crate provides common functionality used across the pgcomply crates.

pub mod config;
pub mod logging;

pub use config::{Config, LoggingConfig, RunnerConfig};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogFormat};
