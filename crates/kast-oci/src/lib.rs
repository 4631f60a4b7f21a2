//! # kast-oci
//!
//! Distribution of kast modules as OCI artifacts.
//!
//! Handles:
//! - **References**: `registry/repository:tag` parsing and validation.
//! - **Digests**: SHA-256 content addressing and verification.
//! - **Manifests**: one layer per module file, titled by its relative path.
//! - **Repositories**: the [`Repository`] seam with an HTTP client and an
//!   in-memory implementation.
//! - **Push / fetch**: tag-last publishing and staged, verified retrieval.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod auth;
pub mod client;
pub mod digest;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod memory;
pub mod options;
pub mod push;
pub mod reference;
pub mod repository;

pub use auth::Credential;
pub use client::{HttpConnector, RemoteRepository};
pub use digest::Digest;
pub use error::{TransferError, TransferErrorKind};
pub use fetch::{FetchedArtifact, fetch_artifact};
pub use manifest::{Descriptor, Manifest};
pub use memory::{MemoryRegistry, MemoryRepository};
pub use options::{CancelToken, TransferOptions};
pub use push::push_directory;
pub use reference::ModuleReference;
pub use repository::{Connector, Repository};
