//! Utility module
//!
//! This module provides:
//! - Configuration management
//! - Logging setup
//! - Regression metrics

mod config;
mod logging;
pub mod metrics;

pub use config::{
    ArchitectureConfig, Config, DataConfig, InferenceConfig, LoggingConfig, PathsConfig,
    ServerConfig,
};
pub use logging::{level_for_verbosity, setup_logging};
