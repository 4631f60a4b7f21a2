//! The repository seam between transfer logic and a registry.

use crate::auth::Credential;
use crate::digest::Digest;
use crate::error::TransferError;
use crate::manifest::Descriptor;
use crate::reference::ModuleReference;

/// Content-addressed blob and tagged manifest storage for one repository.
///
/// Implementations only move bytes; digest verification, ordering and
/// cancellation checks belong to the push and fetch operations.
pub trait Repository {
    /// The repository this handle talks to.
    fn reference(&self) -> &ModuleReference;

    /// Whether a blob is present.
    ///
    /// # Errors
    ///
    /// Returns a `TransferError` if the registry cannot be queried.
    fn blob_exists(&self, digest: &Digest) -> Result<bool, TransferError>;

    /// Uploads a blob.
    ///
    /// # Errors
    ///
    /// Returns a `TransferError` if the upload is rejected or fails.
    fn push_blob(&self, descriptor: &Descriptor, content: &[u8]) -> Result<(), TransferError>;

    /// Downloads a blob.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::NotFound` if the blob is absent.
    fn fetch_blob(&self, descriptor: &Descriptor) -> Result<Vec<u8>, TransferError>;

    /// Stores a manifest and points `tag` at it, returning its digest.
    ///
    /// # Errors
    ///
    /// Returns a `TransferError` if the registry rejects the manifest.
    fn push_manifest(&self, tag: &str, manifest: &[u8]) -> Result<Digest, TransferError>;

    /// Downloads the manifest `tag` points at.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::NotFound` if the tag is absent.
    fn fetch_manifest(&self, tag: &str) -> Result<Vec<u8>, TransferError>;
}

/// Opens repositories for references.
pub trait Connector {
    /// Opens the repository named by `reference`, authenticating with
    /// `credential` when given.
    ///
    /// # Errors
    ///
    /// Returns a `TransferError` if the client cannot be set up.
    fn connect(
        &self,
        reference: &ModuleReference,
        credential: Option<&Credential>,
    ) -> Result<Box<dyn Repository>, TransferError>;
}
