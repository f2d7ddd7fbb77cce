//! Control file sources

use super::ControlError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A repository of control files, addressed by path.
///
/// Paths are opaque to the catalog except for the deps/profilers filter,
/// which expects them relative to the repository root.
pub trait ControlFileGetter: Send + Sync + Debug {
    /// Paths of every control file; `suite_name` may narrow the search
    fn get_control_file_list(&self, suite_name: Option<&str>) -> Result<Vec<String>, ControlError>;

    fn get_control_file_contents(&self, path: &str) -> Result<String, ControlError>;

    /// Path of the control file defining `test_name`
    fn get_control_file_path(&self, test_name: &str) -> Result<String, ControlError>;

    /// Whether [`get_suite_info`](Self::get_suite_info) is served in one round trip
    fn supports_batch(&self) -> bool {
        false
    }

    /// Path to text map of a suite's control files
    fn get_suite_info(
        &self,
        suite_name: Option<&str>,
    ) -> Result<BTreeMap<String, String>, ControlError> {
        self.get_control_file_list(suite_name)?
            .into_iter()
            .map(|path| {
                let text = self.get_control_file_contents(&path)?;
                Ok((path, text))
            })
            .collect()
    }
}

/// Resolve `test_name` among `paths`: `<dir>/<name>/control`, or
/// `<dir>/<base>/control.<suffix>` where `<base>.<suffix>` equals the name
fn match_test_path(test_name: &str, paths: &[String]) -> Result<String, ControlError> {
    let candidates: Vec<String> = paths
        .iter()
        .filter(|path| {
            let mut parts = path.rsplit('/');
            let (Some(file), Some(dir)) = (parts.next(), parts.next()) else {
                return false;
            };
            match file.strip_prefix("control") {
                Some("") => dir == test_name,
                Some(rest) => rest
                    .strip_prefix('.')
                    .is_some_and(|suffix| test_name == format!("{dir}.{suffix}")),
                None => false,
            }
        })
        .cloned()
        .collect();

    match candidates.len() {
        0 => Err(ControlError::NotFound {
            name: test_name.to_string(),
        }),
        1 => Ok(candidates.into_iter().next().unwrap_or_default()),
        _ => Err(ControlError::Ambiguous {
            name: test_name.to_string(),
            candidates,
        }),
    }
}

/// Control files on the local file system.
///
/// Scans `base/<subdir>` recursively for files named `control` or
/// `control.<suffix>`; reported paths are relative to `base`.
#[derive(Debug)]
pub struct FileSystemGetter {
    base: PathBuf,
    subdirs: Vec<String>,
    matcher: GlobSet,
}

/// Directories of an autotest checkout that hold tests
pub const DEFAULT_TEST_DIRS: &[&str] = &[
    "server/site_tests",
    "client/site_tests",
    "server/tests",
    "client/tests",
];

impl FileSystemGetter {
    /// Getter over `subdirs` of `base`; an empty list scans `base` itself
    pub fn new(base: impl Into<PathBuf>, subdirs: &[String]) -> Result<Self, ControlError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in ["control", "control.*"] {
            let glob = Glob::new(pattern).map_err(|e| ControlError::InvalidPredicate {
                message: format!("bad control file pattern '{pattern}': {e}"),
            })?;
            builder.add(glob);
        }
        let matcher = builder.build().map_err(|e| ControlError::InvalidPredicate {
            message: format!("failed to build control file matcher: {e}"),
        })?;
        Ok(Self {
            base: base.into(),
            subdirs: subdirs.to_vec(),
            matcher,
        })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn scan(&self, dir: &Path, found: &mut Vec<String>) -> Result<(), ControlError> {
        let entries = std::fs::read_dir(dir).map_err(|e| ControlError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;
        let mut children: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        children.sort();

        for child in children {
            if child.is_dir() {
                self.scan(&child, found)?;
                continue;
            }
            let Some(file_name) = child.file_name() else {
                continue;
            };
            // Editor backups such as control~ and control.swp never count
            let name = file_name.to_string_lossy();
            if name.ends_with('~') || name.ends_with(".swp") {
                continue;
            }
            if self.matcher.is_match(Path::new(file_name)) {
                if let Ok(relative) = child.strip_prefix(&self.base) {
                    found.push(relative.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        Ok(())
    }
}

impl ControlFileGetter for FileSystemGetter {
    fn get_control_file_list(
        &self,
        _suite_name: Option<&str>,
    ) -> Result<Vec<String>, ControlError> {
        let mut found = Vec::new();
        if self.subdirs.is_empty() {
            self.scan(&self.base, &mut found)?;
        }
        for subdir in &self.subdirs {
            let dir = self.base.join(subdir);
            if !dir.is_dir() {
                debug!("Skipping missing test directory {}", dir.display());
                continue;
            }
            self.scan(&dir, &mut found)?;
        }
        Ok(found)
    }

    fn get_control_file_contents(&self, path: &str) -> Result<String, ControlError> {
        let full = self.base.join(path);
        std::fs::read_to_string(&full).map_err(|e| ControlError::Io {
            path: full.display().to_string(),
            source: e,
        })
    }

    fn get_control_file_path(&self, test_name: &str) -> Result<String, ControlError> {
        let paths = self.get_control_file_list(None)?;
        match_test_path(test_name, &paths)
    }
}

/// In-memory control files, e.g. a suite manifest fetched ahead of time.
///
/// Serves batch requests.
#[derive(Debug, Clone, Default)]
pub struct StaticGetter {
    files: BTreeMap<String, String>,
}

impl StaticGetter {
    pub fn new(files: BTreeMap<String, String>) -> Self {
        Self { files }
    }

    /// Load a JSON object of `path -> control file text`
    pub fn from_manifest(path: &Path) -> Result<Self, ControlError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ControlError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let files = serde_json::from_str(&raw).map_err(|e| ControlError::Parse {
            path: path.display().to_string(),
            message: format!("invalid control file manifest: {e}"),
        })?;
        Ok(Self { files })
    }

    pub fn insert(&mut self, path: impl Into<String>, text: impl Into<String>) {
        self.files.insert(path.into(), text.into());
    }
}

impl ControlFileGetter for StaticGetter {
    fn get_control_file_list(
        &self,
        _suite_name: Option<&str>,
    ) -> Result<Vec<String>, ControlError> {
        Ok(self.files.keys().cloned().collect())
    }

    fn get_control_file_contents(&self, path: &str) -> Result<String, ControlError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| ControlError::NotFound {
                name: path.to_string(),
            })
    }

    fn get_control_file_path(&self, test_name: &str) -> Result<String, ControlError> {
        let paths: Vec<String> = self.files.keys().cloned().collect();
        match_test_path(test_name, &paths)
    }

    fn supports_batch(&self) -> bool {
        true
    }

    fn get_suite_info(
        &self,
        _suite_name: Option<&str>,
    ) -> Result<BTreeMap<String, String>, ControlError> {
        Ok(self.files.clone())
    }
}
