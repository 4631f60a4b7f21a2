//! # kast-select
//!
//! Selector matching for KRM resource items.
//!
//! Handles:
//! - **Labels**: Kubernetes label selector expressions, parsed with `nom`.
//! - **Matcher**: Conjunctive evaluation of label, annotation, GVK, name and
//!   namespace predicates.
//! - **Index**: The include index handed to the module, keyed by
//!   `(apiVersion, kind, namespace, name)`.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod error;
pub mod index;
pub mod labels;
pub mod matcher;

pub use error::SelectorError;
pub use index::{IncludeIndex, IndexKey, build_include_index};
pub use matcher::{CompiledSelector, matches};
