//! Configuration discovery and resolution

use super::types::SuiteConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Name of the repo-local config file
pub const REPO_CONFIG_FILE: &str = ".suite.toml";

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Value out of range or missing
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Command-line overrides for configuration
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub suite: Option<String>,
    pub board: Option<String>,
    pub pool: Option<String>,
    /// CrOS build, stored under `cros-version`
    pub build: Option<String>,
    pub job_retry: Option<bool>,
    pub max_retries: Option<u32>,
    pub wait_for_results: Option<bool>,
    /// Path to config file override; loaded strictly
    pub config_path: Option<PathBuf>,
}

/// Resolve configuration from all sources
///
/// Priority (highest to lowest):
/// 1. Command-line overrides
/// 2. Environment variables
/// 3. Explicit `--config` file, or else repo-local `.suite.toml` (current dir up to git root)
/// 4. Global config (~/.config/dynamic-suite/config.toml)
/// 5. Defaults
///
/// Files are merged key by key, so a repo file only needs the keys it changes.
pub fn resolve_config(
    overrides: &ConfigOverrides,
    current_dir: &Path,
    home_dir: &Path,
) -> Result<SuiteConfig, ConfigError> {
    let mut table = toml::Table::new();

    // 4. Global config
    let global_config_path = home_dir.join(".config/dynamic-suite/config.toml");
    if global_config_path.exists() {
        match load_table(&global_config_path) {
            Ok(file) => merge_tables(&mut table, file),
            Err(e) => warn!("Failed to parse global config at {global_config_path:?}: {e}"),
        }
    }

    // 3. Explicit file, else repo-local
    if let Some(path) = overrides.config_path.as_deref() {
        merge_tables(&mut table, load_table(path)?);
    } else if let Some(repo_config) = find_repo_local_config(current_dir) {
        match load_table(&repo_config) {
            Ok(file) => merge_tables(&mut table, file),
            Err(e) => warn!("Failed to parse repo config at {repo_config:?}: {e}"),
        }
    }

    let mut config: SuiteConfig = toml::Value::Table(table).try_into()?;

    // 2. Environment variables
    apply_env_overrides(&mut config);

    // 1. Command-line overrides
    apply_cli_overrides(&mut config, overrides);

    config.validate()?;
    debug!("Resolved configuration: {config:?}");
    Ok(config)
}

/// Find repo-local config file
///
/// Searches current directory and parent directories up to git root
fn find_repo_local_config(current_dir: &Path) -> Option<PathBuf> {
    let mut dir = current_dir;

    loop {
        let config_path = dir.join(REPO_CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        // Stop at git root
        if dir.join(".git").exists() {
            break;
        }

        dir = dir.parent()?;
    }

    None
}

fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents.parse::<toml::Table>()?)
}

/// Load and validate a single config file
pub fn load_config_file(path: &Path) -> Result<SuiteConfig, ConfigError> {
    let config: SuiteConfig = toml::Value::Table(load_table(path)?).try_into()?;
    config.validate()?;
    Ok(config)
}

/// Recursive merge; `overlay` wins on scalar conflicts
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn apply_env_overrides(config: &mut SuiteConfig) {
    if let Ok(board) = std::env::var("SUITE_BOARD") {
        config.suite.board = Some(board);
    }

    if let Ok(pool) = std::env::var("SUITE_POOL") {
        config.suite.pool = Some(pool);
    }

    if let Ok(server) = std::env::var("SUITE_JOB_QUEUE_SERVER") {
        config.job_queue.server = Some(server);
    }

    if let Ok(dir) = std::env::var("SUITE_RESULTS_DIR") {
        config.suite.results_dir = Some(PathBuf::from(dir));
    }
}

fn apply_cli_overrides(config: &mut SuiteConfig, overrides: &ConfigOverrides) {
    if let Some(ref suite) = overrides.suite {
        config.suite.name = Some(suite.clone());
    }

    if let Some(ref board) = overrides.board {
        config.suite.board = Some(board.clone());
    }

    if let Some(ref pool) = overrides.pool {
        config.suite.pool = Some(pool.clone());
    }

    if let Some(ref build) = overrides.build {
        config
            .suite
            .builds
            .insert(crate::keyval::CROS_VERSION_PREFIX.to_string(), build.clone());
    }

    if let Some(job_retry) = overrides.job_retry {
        config.suite.job_retry = job_retry;
    }

    if let Some(max_retries) = overrides.max_retries {
        config.suite.max_retries = Some(max_retries);
    }

    if let Some(wait) = overrides.wait_for_results {
        config.suite.wait_for_results = wait;
    }
}
