//! Selector errors.

use thiserror::Error;

/// Errors raised while compiling a selector.
#[derive(Debug, Error)]
pub enum SelectorError {
    /// A GVK, name or namespace pattern is not a valid regular expression.
    #[error("invalid {field} pattern \"{pattern}\": {source}")]
    InvalidPattern {
        /// Selector field holding the pattern.
        field: &'static str,
        /// The offending pattern.
        pattern: String,
        /// Underlying regex error.
        source: regex::Error,
    },

    /// A label or annotation selector expression cannot be parsed.
    #[error("invalid {field} \"{input}\": {message}")]
    InvalidSelector {
        /// Selector field holding the expression.
        field: &'static str,
        /// The offending expression.
        input: String,
        /// What went wrong.
        message: String,
    },
}
