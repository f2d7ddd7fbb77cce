//! Shared logging initialization for suite binaries.

use std::sync::OnceLock;

static INIT: OnceLock<()> = OnceLock::new();

fn parse_level(raw: Option<&str>) -> tracing::Level {
    match raw.unwrap_or("info").to_ascii_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

/// Initialize process-level tracing output from `SUITE_LOG`.
///
/// Logs go to stderr; stdout carries the status log and summary.
///
/// Safe to call multiple times; only the first call installs the subscriber.
/// Best-effort: never returns an error.
pub fn init() {
    let level = parse_level(std::env::var("SUITE_LOG").ok().as_deref());
    init_with_level(level);
}

/// Initialize tracing output at an explicit level (e.g. `--verbose`).
pub fn init_with_level(level: tracing::Level) {
    if INIT.get().is_some() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
    let _ = INIT.set(());
}
