//! # kast-engine
//!
//! The declarative engine behind kast modules.
//!
//! Handles:
//! - **Dialect**: Plain YAML/JSON documents with `$` directives decoded into
//!   constraint values.
//! - **Unify**: The lattice meet of two values, reporting conflicts by path.
//! - **Eval**: Lazy resolution of `${path}` references and the concreteness
//!   check run before export.
//! - **Engine**: The fill/unify/validate/extract seam used by the function
//!   pipeline, implemented by [`ConstraintEngine`].

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod diagnostics;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod eval;
pub mod loader;
pub mod path;
pub mod unify;
pub mod value;

pub use engine::{ConstraintEngine, Engine, Instance};
pub use error::{EngineError, Incomplete, SourceIssue};
pub use loader::{Source, SourceFormat, load_sources};
pub use path::FieldPath;
pub use value::Value;
