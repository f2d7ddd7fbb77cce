//! Configuration resolution
//!
//! Resolves configuration from multiple sources with priority:
//! 1. Command-line flags (passed as parameters)
//! 2. Environment variables
//! 3. Repo-local config (.suite.toml)
//! 4. Global config (~/.config/dynamic-suite/config.toml)
//! 5. Defaults

mod discovery;
mod types;

pub use discovery::{
    ConfigError, ConfigOverrides, REPO_CONFIG_FILE, load_config_file, resolve_config,
};
pub use types::{ControlFilesSection, JobQueueSection, ReportingSection, SuiteConfig, SuiteSection};
