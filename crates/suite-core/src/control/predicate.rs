//! Test selection predicates

use super::{AttributeExpression, ControlError, TestDefinition};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

/// Signature of a caller-supplied predicate
pub type PredicateFn = dyn Fn(&TestDefinition) -> bool + Send + Sync;

/// A pure `TestDefinition -> bool` filter
#[derive(Clone)]
pub enum Predicate {
    /// SUITE contains the tag
    NameInSuite(String),
    TestNameEquals(String),
    /// Regex anchored at the start of the test name
    TestNameMatches(Regex),
    /// Regex anchored at the start of the control file path
    TestFileMatches(Regex),
    AttributeExpression(AttributeExpression),
    NonExperimental,
    /// Always true
    All,
    Custom(String, Arc<PredicateFn>),
}

/// Compile `pattern` so that it only matches at the start of the input
fn anchored(pattern: &str) -> Result<Regex, ControlError> {
    Regex::new(&format!("^(?:{pattern})")).map_err(|e| ControlError::InvalidPredicate {
        message: format!("bad pattern '{pattern}': {e}"),
    })
}

impl Predicate {
    pub fn name_in_suite(tag: impl Into<String>) -> Self {
        Predicate::NameInSuite(tag.into())
    }

    pub fn test_name_equals(name: impl Into<String>) -> Self {
        Predicate::TestNameEquals(name.into())
    }

    pub fn test_name_matches(pattern: &str) -> Result<Self, ControlError> {
        anchored(pattern).map(Predicate::TestNameMatches)
    }

    pub fn test_file_matches(pattern: &str) -> Result<Self, ControlError> {
        anchored(pattern).map(Predicate::TestFileMatches)
    }

    pub fn attribute_expression(source: &str) -> Result<Self, ControlError> {
        AttributeExpression::parse(source).map(Predicate::AttributeExpression)
    }

    pub fn custom(
        name: impl Into<String>,
        f: impl Fn(&TestDefinition) -> bool + Send + Sync + 'static,
    ) -> Self {
        Predicate::Custom(name.into(), Arc::new(f))
    }

    pub fn matches(&self, test: &TestDefinition) -> bool {
        match self {
            Predicate::NameInSuite(tag) => test.in_suite(tag),
            Predicate::TestNameEquals(name) => test.name == *name,
            Predicate::TestNameMatches(re) => re.is_match(&test.name),
            Predicate::TestFileMatches(re) => re.is_match(&test.path),
            Predicate::AttributeExpression(expr) => expr.matches(&test.attributes),
            Predicate::NonExperimental => !test.experimental,
            Predicate::All => true,
            Predicate::Custom(_, f) => f(test),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::NameInSuite(tag) => write!(f, "NameInSuite({tag:?})"),
            Predicate::TestNameEquals(name) => write!(f, "TestNameEquals({name:?})"),
            Predicate::TestNameMatches(re) => write!(f, "TestNameMatches({:?})", re.as_str()),
            Predicate::TestFileMatches(re) => write!(f, "TestFileMatches({:?})", re.as_str()),
            Predicate::AttributeExpression(expr) => {
                write!(f, "AttributeExpression({:?})", expr.as_str())
            }
            Predicate::NonExperimental => f.write_str("NonExperimental"),
            Predicate::All => f.write_str("All"),
            Predicate::Custom(name, _) => write!(f, "Custom({name:?})"),
        }
    }
}

/// Logical AND over a list of predicates; an empty list matches everything
#[derive(Debug, Clone, Default)]
pub struct ComposedPredicate {
    predicates: Vec<Predicate>,
}

impl ComposedPredicate {
    pub fn new(predicates: Vec<Predicate>) -> Self {
        Self { predicates }
    }

    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn matches(&self, test: &TestDefinition) -> bool {
        self.predicates.iter().all(|p| p.matches(test))
    }
}

impl From<Predicate> for ComposedPredicate {
    fn from(predicate: Predicate) -> Self {
        Self::new(vec![predicate])
    }
}
