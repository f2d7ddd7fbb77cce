//! Keyval names shared with downstream result parsing, and the `keyval`
//! file written into a suite's results directory

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const BUILD: &str = "build";
pub const SUITE: &str = "suite";
pub const EXPERIMENTAL: &str = "experimental";
pub const BUILDS: &str = "builds";
pub const TEST_SOURCE_BUILD: &str = "test_source_build";
pub const FWRW_BUILD: &str = "fwrw_build";
pub const FWRO_BUILD: &str = "fwro_build";
pub const PARENT_JOB_ID: &str = "parent_job_id";
pub const RETRY_ORIGINAL_JOB_ID: &str = "retry_original_job_id";
pub const OFFLOAD_FAILURES_ONLY: &str = "offload_failures_only";
pub const SCHEDULED_TEST_COUNT: &str = "scheduled_test_count";
pub const SCHEDULED_TEST_NAMES: &str = "scheduled_test_names";

/// Suite job keyvals copied onto every child job
pub const INHERITED: &[&str] = &["cidb_build_id", "cidb_build_stage_id"];

/// Build label prefixes
pub const CROS_VERSION_PREFIX: &str = "cros-version";
pub const FW_RW_VERSION_PREFIX: &str = "fwrw-version";
pub const FW_RO_VERSION_PREFIX: &str = "fwro-version";

/// Append-only `key=value` file
#[derive(Debug, Clone)]
pub struct KeyvalFile {
    path: PathBuf,
}

impl KeyvalFile {
    /// The `keyval` file inside `results_dir`
    pub fn in_dir(results_dir: &Path) -> Self {
        Self {
            path: results_dir.join("keyval"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `pairs`, one `key=value` line each
    pub fn append<K, V, I>(&self, pairs: I) -> std::io::Result<()>
    where
        K: AsRef<str>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut out = String::new();
        for (key, value) in pairs {
            out.push_str(key.as_ref());
            out.push('=');
            // One entry per line
            out.push_str(&value.as_ref().replace('\n', " "));
            out.push('\n');
        }
        if out.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(out.as_bytes())
    }

    /// Every pair in file order
    pub fn read(&self) -> std::io::Result<Vec<(String, String)>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        Ok(raw
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_and_read() {
        let tmp = TempDir::new().unwrap();
        let file = KeyvalFile::in_dir(&tmp.path().join("results"));
        assert!(file.read().unwrap().is_empty());

        file.append([(SCHEDULED_TEST_COUNT, "2")]).unwrap();
        file.append([("a".to_string(), "multi\nline".to_string())]).unwrap();

        let pairs = file.read().unwrap();
        assert_eq!(
            pairs,
            vec![
                ("scheduled_test_count".to_string(), "2".to_string()),
                ("a".to_string(), "multi line".to_string()),
            ]
        );
    }

    #[test]
    fn test_empty_append_creates_nothing() {
        let tmp = TempDir::new().unwrap();
        let file = KeyvalFile::in_dir(tmp.path());
        file.append(Vec::<(String, String)>::new()).unwrap();
        assert!(!file.path().exists());
    }
}
