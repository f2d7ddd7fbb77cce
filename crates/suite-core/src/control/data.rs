//! Parsed control file metadata

use super::ControlError;
use super::literal::{self, Assignment};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Most machines a single synchronous test may ask for
pub const MAX_SYNC_COUNT: u32 = 64;

/// Declared execution time bucket of a test
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestTime {
    Fast,
    Short,
    #[default]
    Medium,
    Long,
    Lengthy,
}

impl TestTime {
    /// Position in `FAST, SHORT, MEDIUM, LONG, LENGTHY`; higher runs longer
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TestTime::Fast => "FAST",
            TestTime::Short => "SHORT",
            TestTime::Medium => "MEDIUM",
            TestTime::Long => "LONG",
            TestTime::Lengthy => "LENGTHY",
        }
    }
}

impl FromStr for TestTime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FAST" => Ok(TestTime::Fast),
            "SHORT" => Ok(TestTime::Short),
            "MEDIUM" => Ok(TestTime::Medium),
            "LONG" => Ok(TestTime::Long),
            "LENGTHY" => Ok(TestTime::Lengthy),
            other => Err(format!("unknown TIME value '{other}'")),
        }
    }
}

impl fmt::Display for TestTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the control file executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    #[default]
    Client,
    Server,
}

impl FromStr for TestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client" => Ok(TestType::Client),
            "server" => Ok(TestType::Server),
            other => Err(format!("unknown TEST_TYPE value '{other}'")),
        }
    }
}

/// A test as declared by one control file.
///
/// Immutable once parsed. The scheduler works on shared `Arc` handles and
/// clones only when a retry needs a modified copy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestDefinition {
    /// Path of the control file within its source
    pub path: String,
    pub name: String,
    pub suite_tags: BTreeSet<String>,
    pub attributes: BTreeSet<String>,
    /// Host labels the test needs, in declaration order
    pub dependencies: Vec<String>,
    pub priority: i32,
    /// Number of machines the test runs on at once
    pub sync_count: u32,
    /// `None` means the control file expressed no opinion
    pub job_retries: Option<u32>,
    /// In-job test retries
    pub retries: u32,
    pub experimental: bool,
    /// Skip host verification before the job runs
    pub fast: bool,
    pub require_ssp: Option<bool>,
    pub test_type: TestType,
    pub time: TestTime,
    pub author: Option<String>,
    pub bug_template: Map<String, Value>,
    /// Control file text as submitted to the job queue
    #[serde(skip)]
    pub text: String,
}

impl TestDefinition {
    /// Parse control file `text` found at `path`.
    ///
    /// Unrecognised assignments are ignored even when their values are not
    /// literals; recognised ones must decode to a value of the right shape.
    pub fn parse(path: &str, text: &str) -> Result<Self, ControlError> {
        let vars = Vars::collect(path, text)?;

        let name = vars
            .string("NAME")?
            .ok_or_else(|| ControlError::MissingField {
                path: path.to_string(),
                field: "NAME",
            })?;
        let suite = vars
            .string("SUITE")?
            .ok_or_else(|| ControlError::MissingField {
                path: path.to_string(),
                field: "SUITE",
            })?;

        let sync_count = vars.unsigned("SYNC_COUNT")?.unwrap_or(1);
        if sync_count == 0 {
            return Err(ControlError::parse(path, "SYNC_COUNT must be at least 1"));
        }
        if sync_count > MAX_SYNC_COUNT {
            return Err(ControlError::parse(
                path,
                format!("SYNC_COUNT {sync_count} exceeds the limit of {MAX_SYNC_COUNT}"),
            ));
        }
        let time = match vars.string("TIME")? {
            Some(raw) => raw.parse().map_err(|e: String| ControlError::parse(path, e))?,
            None => TestTime::default(),
        };
        let test_type = match vars.string("TEST_TYPE")? {
            Some(raw) => raw.parse().map_err(|e: String| ControlError::parse(path, e))?,
            None => TestType::default(),
        };
        let priority = match vars.integer("PRIORITY")? {
            Some(p) => i32::try_from(p)
                .map_err(|_| ControlError::parse(path, format!("PRIORITY {p} out of range")))?,
            None => 0,
        };
        let bug_template = match vars.get("BUG_TEMPLATE") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                return Err(ControlError::parse(
                    path,
                    format!("BUG_TEMPLATE must be a dict, found {other}"),
                ));
            }
        };

        Ok(Self {
            path: path.to_string(),
            name,
            suite_tags: split_csv(&suite).collect(),
            attributes: vars.csv("ATTRIBUTES")?.into_iter().collect(),
            dependencies: vars.csv("DEPENDENCIES")?,
            priority,
            sync_count,
            job_retries: vars.unsigned("JOB_RETRIES")?,
            retries: vars.unsigned("RETRIES")?.unwrap_or(0),
            experimental: vars.boolean("EXPERIMENTAL")?.unwrap_or(false),
            fast: vars.boolean("FAST")?.unwrap_or(false),
            require_ssp: vars.boolean("REQUIRE_SSP")?,
            test_type,
            time,
            author: vars.string("AUTHOR")?,
            bug_template,
            text: text.to_string(),
        })
    }

    /// True if the test carries `tag` in its SUITE variable
    pub fn in_suite(&self, tag: &str) -> bool {
        self.suite_tags.contains(tag)
    }
}

fn split_csv(raw: &str) -> impl Iterator<Item = String> + '_ {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Decoded values of the recognised control variables
struct Vars<'a> {
    path: &'a str,
    values: BTreeMap<String, Value>,
}

const RECOGNISED: &[&str] = &[
    "NAME",
    "SUITE",
    "ATTRIBUTES",
    "DEPENDENCIES",
    "PRIORITY",
    "SYNC_COUNT",
    "JOB_RETRIES",
    "RETRIES",
    "EXPERIMENTAL",
    "FAST",
    "REQUIRE_SSP",
    "TEST_TYPE",
    "TIME",
    "AUTHOR",
    "BUG_TEMPLATE",
];

impl<'a> Vars<'a> {
    fn collect(path: &'a str, text: &str) -> Result<Self, ControlError> {
        let mut values = BTreeMap::new();
        for Assignment { name, source, line } in literal::assignments(text) {
            if !RECOGNISED.contains(&name.as_str()) {
                continue;
            }
            let value = literal::parse(&source)
                .map_err(|e| ControlError::parse(path, format!("line {line}: {name}: {e}")))?;
            // Later assignments win, as they would when the file executes
            values.insert(name, value);
        }
        Ok(Self { path, values })
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    fn invalid(&self, key: &str, expected: &str, found: &Value) -> ControlError {
        ControlError::parse(self.path, format!("{key} must be {expected}, found {found}"))
    }

    fn string(&self, key: &str) -> Result<Option<String>, ControlError> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(self.invalid(key, "a string", other)),
        }
    }

    fn integer(&self, key: &str) -> Result<Option<i64>, ControlError> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) if n.is_i64() => Ok(n.as_i64()),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| self.invalid(key, "an integer", &Value::String(s.clone()))),
            Some(other) => Err(self.invalid(key, "an integer", other)),
        }
    }

    fn unsigned(&self, key: &str) -> Result<Option<u32>, ControlError> {
        match self.integer(key)? {
            None => Ok(None),
            Some(n) => u32::try_from(n).map(Some).map_err(|_| {
                ControlError::parse(self.path, format!("{key} must be non-negative, found {n}"))
            }),
        }
    }

    fn boolean(&self, key: &str) -> Result<Option<bool>, ControlError> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(self.invalid(key, "a boolean", &Value::String(s.clone()))),
            },
            Some(other) => Err(self.invalid(key, "a boolean", other)),
        }
    }

    /// Comma separated string or list of strings
    fn csv(&self, key: &str) -> Result<Vec<String>, ControlError> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::String(s)) => Ok(split_csv(s).collect()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s.trim().to_string()),
                    other => Err(self.invalid(key, "a list of strings", other)),
                })
                .collect(),
            Some(other) => Err(self.invalid(key, "a comma separated string", other)),
        }
    }
}

/// Prepend `<name> = <literal>` assignments to control file text.
///
/// Used to seed `args_dict` into every control file of a suite.
pub fn inject_vars(vars: &BTreeMap<String, Value>, text: &str) -> String {
    let mut out = String::new();
    for (name, value) in vars {
        out.push_str(name);
        out.push_str(" = ");
        out.push_str(&literal::to_python(value));
        out.push('\n');
    }
    out.push_str(text);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CONTROL: &str = r#"
# Copyright header that should be ignored
AUTHOR = "chromeos-test"
NAME = "dummy_Pass"
PURPOSE = some_call("not a literal")
TIME = "short"
TEST_TYPE = "Client"
SUITE = "bvt-inline, smoke"
ATTRIBUTES = "suite:bvt-inline, subsystem:default"
DEPENDENCIES = "chameleon, servo"
JOB_RETRIES = 2
PRIORITY = 10
FAST = True
BUG_TEMPLATE = {
    'owner': 'someone@chromium.org',
    'labels': ['OS-Chrome'],
}

job.run_test('dummy_Pass')
"#;

    #[test]
    fn test_parse_full_control_file() {
        let test = TestDefinition::parse("client/site_tests/dummy_Pass/control", CONTROL).unwrap();
        assert_eq!(test.name, "dummy_Pass");
        assert_eq!(
            test.suite_tags.iter().cloned().collect::<Vec<_>>(),
            vec!["bvt-inline", "smoke"]
        );
        assert!(test.attributes.contains("subsystem:default"));
        assert_eq!(test.dependencies, vec!["chameleon", "servo"]);
        assert_eq!(test.job_retries, Some(2));
        assert_eq!(test.priority, 10);
        assert!(test.fast);
        assert!(!test.experimental);
        assert_eq!(test.require_ssp, None);
        assert_eq!(test.time, TestTime::Short);
        assert_eq!(test.test_type, TestType::Client);
        assert_eq!(test.sync_count, 1);
        assert_eq!(test.author.as_deref(), Some("chromeos-test"));
        assert_eq!(test.bug_template["labels"], json!(["OS-Chrome"]));
        assert_eq!(test.text, CONTROL);
    }

    #[test]
    fn test_defaults() {
        let test = TestDefinition::parse("p", "NAME = 'a'\nSUITE = 'b'\n").unwrap();
        assert_eq!(test.job_retries, None);
        assert_eq!(test.time, TestTime::Medium);
        assert_eq!(test.retries, 0);
        assert!(test.bug_template.is_empty());
    }

    #[test]
    fn test_missing_required_fields() {
        let err = TestDefinition::parse("p", "SUITE = 'bvt'").unwrap_err();
        assert!(matches!(err, ControlError::MissingField { field: "NAME", .. }));
        let err = TestDefinition::parse("p", "NAME = 'x'").unwrap_err();
        assert!(matches!(err, ControlError::MissingField { field: "SUITE", .. }));
        assert!(err.is_per_file());
    }

    #[test]
    fn test_invalid_values() {
        for text in [
            "NAME = 'x'\nSUITE = 'b'\nTIME = 'FOREVER'",
            "NAME = 'x'\nSUITE = 'b'\nPRIORITY = 'high'",
            "NAME = 'x'\nSUITE = 'b'\nTEST_TYPE = 'remote'",
            "NAME = 'x'\nSUITE = 'b'\nJOB_RETRIES = -1",
            "NAME = 'x'\nSUITE = 'b'\nSYNC_COUNT = 0",
            "NAME = 'x'\nSUITE = 'b'\nSYNC_COUNT = 4000000000",
            "NAME = ('x'\n",
        ] {
            let err = TestDefinition::parse("p", text).unwrap_err();
            assert!(matches!(err, ControlError::Parse { .. }), "{text}: {err}");
        }
    }

    #[test]
    fn test_sync_count_limit() {
        let at_limit = format!("NAME = 'x'\nSUITE = 'b'\nSYNC_COUNT = {MAX_SYNC_COUNT}");
        assert_eq!(TestDefinition::parse("p", &at_limit).unwrap().sync_count, MAX_SYNC_COUNT);

        let over = format!("NAME = 'x'\nSUITE = 'b'\nSYNC_COUNT = {}", MAX_SYNC_COUNT + 1);
        let err = TestDefinition::parse("p", &over).unwrap_err();
        assert!(err.to_string().contains("exceeds the limit"), "{err}");
    }

    #[test]
    fn test_time_index_order() {
        assert!(TestTime::Lengthy.index() > TestTime::Long.index());
        assert!(TestTime::Long.index() > TestTime::Medium.index());
        assert_eq!(TestTime::Fast.index(), 0);
    }

    #[test]
    fn test_inject_vars() {
        let vars = BTreeMap::from([("args_dict".to_string(), json!({"iterations": "3"}))]);
        let text = inject_vars(&vars, "NAME = 'a'\nSUITE = 'b'\n");
        assert!(text.starts_with("args_dict = {'iterations': '3'}\nNAME"));
        assert!(TestDefinition::parse("p", &text).is_ok());
    }
}
