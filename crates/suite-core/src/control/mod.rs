//! Control files: parsing, sources, predicates and the catalog that turns a
//! control file repository into an ordered list of test definitions

mod attr_expr;
mod catalog;
mod data;
mod getter;
mod literal;
mod predicate;
mod similarity;

pub use attr_expr::AttributeExpression;
pub use catalog::{CatalogOptions, ControlFileCatalog};
pub use data::{MAX_SYNC_COUNT, TestDefinition, TestTime, TestType, inject_vars};
pub use getter::{ControlFileGetter, DEFAULT_TEST_DIRS, FileSystemGetter, StaticGetter};
pub use predicate::{ComposedPredicate, Predicate};
pub use similarity::{Similarity, similarity_ratio};

use thiserror::Error;

/// Control file errors
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("failed to parse control file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("control file {path} is missing required variable {field}")]
    MissingField { path: String, field: &'static str },

    #[error("no control file found for {name}")]
    NotFound { name: String },

    #[error("{name} matches more than one control file: {}", candidates.join(", "))]
    Ambiguous { name: String, candidates: Vec<String> },

    #[error("invalid predicate: {message}")]
    InvalidPredicate { message: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ControlError {
    pub(crate) fn parse(path: &str, message: impl Into<String>) -> Self {
        ControlError::Parse {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// Per-file problems that forgiving retrieval skips
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            ControlError::Parse { .. } | ControlError::MissingField { .. }
        )
    }
}
