//! Control file catalog: discovery, parsing and filtering of tests

use super::data::inject_vars;
use super::{
    ComposedPredicate, ControlError, ControlFileGetter, Predicate, Similarity, TestDefinition,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// How control files are retrieved and parsed
#[derive(Debug, Clone)]
pub struct CatalogOptions {
    /// Skip unparseable control files with a warning instead of failing
    pub forgiving_parser: bool,
    /// Keep tests marked EXPERIMENTAL
    pub add_experimental: bool,
    /// Disable server-side packaging so tests run the deployed test code
    pub run_prod_code: bool,
    /// Seeded into every control file as `args_dict`
    pub test_args: Option<Map<String, Value>>,
    /// Fetch a suite's control files in one request when the source can
    pub enable_controls_in_batch: bool,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self {
            forgiving_parser: true,
            add_experimental: false,
            run_prod_code: false,
            test_args: None,
            enable_controls_in_batch: false,
        }
    }
}

/// `<top>/deps/...` and `<top>/profilers/...` hold helpers, not tests
fn is_excluded_path(path: &str) -> bool {
    let mut parts = path.splitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(top), Some("deps" | "profilers"), Some(rest)) => !top.is_empty() && !rest.is_empty(),
        _ => false,
    }
}

/// Resolves runnable test definitions from a control file repository
#[derive(Debug, Clone)]
pub struct ControlFileCatalog {
    getter: Arc<dyn ControlFileGetter>,
    options: CatalogOptions,
}

impl ControlFileCatalog {
    pub fn new(getter: Arc<dyn ControlFileGetter>, options: CatalogOptions) -> Self {
        Self { getter, options }
    }

    pub fn options(&self) -> &CatalogOptions {
        &self.options
    }

    /// Parse the control file of a single test. Always strict.
    pub fn retrieve(&self, test_name: &str) -> Result<TestDefinition, ControlError> {
        let path = self.getter.get_control_file_path(test_name)?;
        let text = self.getter.get_control_file_contents(&path)?;
        self.parse(&path, text)
    }

    /// Parse every control file of a suite (or of the whole repository when
    /// `suite_name` is `None`), keyed by path.
    ///
    /// In forgiving mode a file that fails to parse is logged and skipped;
    /// otherwise the first failure aborts the retrieval.
    pub fn retrieve_for_suite(
        &self,
        suite_name: Option<&str>,
    ) -> Result<BTreeMap<String, TestDefinition>, ControlError> {
        let texts = self.control_file_texts(suite_name)?;
        let mut tests = BTreeMap::new();
        for (path, text) in texts {
            match self.parse(&path, text) {
                Ok(test) => {
                    tests.insert(path, test);
                }
                Err(e) if self.options.forgiving_parser && e.is_per_file() => {
                    warn!("Skipping {path}: {e}");
                }
                Err(e) => return Err(e),
            }
        }
        debug!("Parsed {} control files", tests.len());
        Ok(tests)
    }

    /// Tests matching `predicate`, slowest declared TIME first.
    ///
    /// Unless `add_experimental` is set, experimental tests are dropped.
    pub fn find_and_parse_tests(
        &self,
        predicate: &ComposedPredicate,
        suite_name: Option<&str>,
    ) -> Result<Vec<TestDefinition>, ControlError> {
        debug!("Getting control file list for suite: {}", suite_name.unwrap_or(""));
        let predicate = if self.options.add_experimental {
            predicate.clone()
        } else {
            predicate.clone().and(Predicate::NonExperimental)
        };
        let mut tests: Vec<TestDefinition> = self
            .retrieve_for_suite(suite_name)?
            .into_values()
            .filter(|t| predicate.matches(t))
            .collect();
        // Stable: equal buckets keep path order
        tests.sort_by(|a, b| b.time.index().cmp(&a.time.index()));
        Ok(tests)
    }

    /// Up to `count` names most similar to the requested one, best first
    pub fn find_possible_tests(
        &self,
        similarity: &Similarity,
        suite_name: Option<&str>,
        count: usize,
    ) -> Result<Vec<String>, ControlError> {
        let mut best: HashMap<String, f64> = HashMap::new();
        for test in self.retrieve_for_suite(suite_name)?.values() {
            for (name, ratio) in similarity.scores(test) {
                best.insert(name, ratio);
            }
        }
        let mut ranked: Vec<(String, f64)> = best.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(ranked.into_iter().take(count).map(|(name, _)| name).collect())
    }

    /// Every suite tag declared by a parseable control file, sorted
    pub fn list_all_suites(&self) -> Result<Vec<String>, ControlError> {
        let all = ComposedPredicate::from(Predicate::All);
        let suites: BTreeSet<String> = self
            .find_and_parse_tests(&all, None)?
            .into_iter()
            .flat_map(|t| t.suite_tags)
            .collect();
        Ok(suites.into_iter().collect())
    }

    fn use_batch(&self) -> bool {
        self.options.enable_controls_in_batch && self.getter.supports_batch()
    }

    fn control_file_texts(
        &self,
        suite_name: Option<&str>,
    ) -> Result<Vec<(String, String)>, ControlError> {
        let keep = |path: &String| !is_excluded_path(path);
        if self.use_batch() {
            let info = self.getter.get_suite_info(suite_name)?;
            return Ok(info.into_iter().filter(|(path, _)| keep(path)).collect());
        }
        self.getter
            .get_control_file_list(suite_name)?
            .into_iter()
            .filter(keep)
            .map(|path| {
                let text = self.getter.get_control_file_contents(&path)?;
                Ok((path, text))
            })
            .collect()
    }

    fn parse(&self, path: &str, text: String) -> Result<TestDefinition, ControlError> {
        let text = match &self.options.test_args {
            Some(args) if !args.is_empty() => {
                let vars = BTreeMap::from([("args_dict".to_string(), Value::Object(args.clone()))]);
                inject_vars(&vars, &text)
            }
            _ => text,
        };
        let mut test = TestDefinition::parse(path, &text)?;
        if self.options.run_prod_code {
            test.require_ssp = Some(false);
        }
        Ok(test)
    }
}
