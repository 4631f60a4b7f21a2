//! # kast-runtime
//!
//! Runs a kast module as a KRM function.
//!
//! Handles:
//! - **Credentials**: Registry auth from a selected Secret, with an
//!   environment fallback.
//! - **Providers**: Local module directories and modules fetched from a
//!   registry.
//! - **Pipeline**: Load, fill, validate and extract, one stage at a time,
//!   each failure tagged with its stage.
//! - **Processor**: `ResourceList` in, `ResourceList` out.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod builder;
pub mod credential;
pub mod error;
pub mod pipeline;
pub mod processor;
pub mod provider;

pub use builder::{FunctionBuilder, FunctionOptions};
pub use error::{FillStage, FunctionError};
pub use pipeline::Function;
pub use processor::{process, read_items, write_items};
pub use provider::{LocalProvider, ModuleProvider, OciProvider};
