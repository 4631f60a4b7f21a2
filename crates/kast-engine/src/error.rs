//! Engine errors.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// A problem located in a module source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceIssue {
    /// File name (and document index for multi-document YAML).
    pub source: String,
    /// 1-based line, when known.
    pub line: Option<usize>,
    /// 1-based column, when known.
    pub column: Option<usize>,
    /// What went wrong.
    pub message: String,
}

impl fmt::Display for SourceIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)?;
        if let Some(line) = self.line {
            write!(f, ":{line}")?;
            if let Some(column) = self.column {
                write!(f, ":{column}")?;
            }
        }
        write!(f, ": {}", self.message)
    }
}

/// A value that is not concrete after evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incomplete {
    /// Path of the offending node.
    pub path: String,
    /// Why the node is not concrete.
    pub reason: String,
}

impl fmt::Display for Incomplete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

fn first_of<T: fmt::Display>(items: &[T]) -> String {
    match items {
        [] => "no details".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{first} (and {} more)", rest.len()),
    }
}

/// Errors raised while loading, unifying or evaluating modules.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A module document uses the dialect incorrectly.
    #[error("invalid module value at {path}: {message}")]
    Dialect {
        /// Path of the offending node.
        path: String,
        /// What is wrong.
        message: String,
    },

    /// A path expression is malformed.
    #[error("invalid path \"{path}\"")]
    InvalidPath {
        /// The offending expression.
        path: String,
    },

    /// One or more module files failed to parse or build.
    #[error("module failed to load: {}", first_of(issues))]
    Parse {
        /// Every problem found, in file order.
        issues: Vec<SourceIssue>,
    },

    /// The module directory holds no instance.
    #[error("no module instances found in {}", path.display())]
    NoInstances {
        /// The module directory.
        path: PathBuf,
    },

    /// Reading a module file failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// File or directory being read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Two values cannot be unified.
    #[error("conflicting values at {path}: {left} and {right}")]
    Conflict {
        /// Path where the values meet.
        path: String,
        /// Left operand.
        left: String,
        /// Right operand.
        right: String,
    },

    /// A closed struct received a field it does not declare.
    #[error("field not allowed: {path}")]
    FieldNotAllowed {
        /// Path of the undeclared field.
        path: String,
    },

    /// References form a cycle.
    #[error("reference cycle at {path} via {reference}")]
    Cycle {
        /// Path where the cycle was detected.
        path: String,
        /// The reference closing the cycle.
        reference: String,
    },

    /// Some non-optional values are not concrete.
    #[error("value is not concrete: {}", first_of(issues))]
    Incomplete {
        /// Every non-concrete node.
        issues: Vec<Incomplete>,
    },

    /// A string interpolation referenced a value that cannot be rendered.
    #[error("cannot interpolate {reference} at {path}: {message}")]
    Interpolation {
        /// Path of the interpolated string.
        path: String,
        /// The offending reference.
        reference: String,
        /// What is wrong.
        message: String,
    },
}

impl EngineError {
    /// The value path this error is about, if any.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Dialect { path, .. }
            | Self::Conflict { path, .. }
            | Self::FieldNotAllowed { path }
            | Self::Cycle { path, .. }
            | Self::Interpolation { path, .. } => Some(path),
            Self::Incomplete { issues } => issues.first().map(|i| i.path.as_str()),
            Self::InvalidPath { .. } | Self::Parse { .. } | Self::NoInstances { .. } | Self::Io { .. } => {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_reports_first_issue_and_count() {
        let err = EngineError::Parse {
            issues: vec![
                SourceIssue {
                    source: "schema.yaml".into(),
                    line: Some(3),
                    column: Some(7),
                    message: "mapping values are not allowed here".into(),
                },
                SourceIssue {
                    source: "extra.json".into(),
                    line: None,
                    column: None,
                    message: "document must be a mapping".into(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "module failed to load: schema.yaml:3:7: mapping values are not allowed here (and 1 more)"
        );
    }

    #[test]
    fn path_is_exposed_for_located_errors() {
        let err = EngineError::Conflict {
            path: "input.replicas".into(),
            left: "3".into(),
            right: "5".into(),
        };
        assert_eq!(err.path(), Some("input.replicas"));
        assert_eq!(EngineError::InvalidPath { path: "a..b".into() }.path(), None);
    }
}
