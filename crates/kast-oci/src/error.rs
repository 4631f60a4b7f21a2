//! Transfer errors.

use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of a transfer failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferErrorKind {
    /// The repository, tag or blob does not exist.
    NotFound,
    /// The registry rejected the credential.
    Auth,
    /// The transport failed, or the registry is temporarily unavailable.
    Network,
    /// Anything else.
    Other,
}

/// Errors raised while pushing or fetching an artifact.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The module reference is malformed.
    #[error("invalid reference \"{reference}\": {message}")]
    InvalidReference {
        /// The offending reference.
        reference: String,
        /// What is wrong with it.
        message: String,
    },

    /// The directory to push holds no regular file.
    #[error("no files to push under {}", path.display())]
    EmptyArtifact {
        /// Directory that was walked.
        path: PathBuf,
    },

    /// The registry reports the resource as absent.
    #[error("not found: {what}")]
    NotFound {
        /// Resource that was requested.
        what: String,
    },

    /// The registry refused the credential (or its absence).
    #[error("authentication failed: {message}")]
    Auth {
        /// Registry response summary.
        message: String,
    },

    /// Transport-level failure.
    #[error("network error: {source}")]
    Network {
        /// Underlying HTTP client error.
        #[from]
        source: reqwest::Error,
    },

    /// The registry answered with an unexpected status.
    #[error("registry returned {status}: {message}")]
    Registry {
        /// HTTP status code.
        status: u16,
        /// Response summary.
        message: String,
    },

    /// A blob's content does not hash to its descriptor digest.
    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        /// Digest announced by the manifest.
        expected: String,
        /// Digest of the received bytes.
        actual: String,
    },

    /// A blob's length differs from its descriptor size.
    #[error("size mismatch for {digest}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Digest of the blob.
        digest: String,
        /// Size announced by the manifest.
        expected: u64,
        /// Size of the received bytes.
        actual: u64,
    },

    /// The manifest cannot be decoded or is inconsistent.
    #[error("invalid manifest: {message}")]
    InvalidManifest {
        /// What is wrong with it.
        message: String,
    },

    /// A layer title would escape the destination directory.
    #[error("unsafe path in artifact: \"{path}\"")]
    UnsafePath {
        /// The offending title.
        path: String,
    },

    /// The transfer was cancelled by the caller.
    #[error("transfer cancelled")]
    Cancelled,

    /// The transfer ran past its deadline.
    #[error("transfer deadline exceeded")]
    DeadlineExceeded,

    /// Pushing to `reference` failed.
    #[error("push to {reference} failed: {source}")]
    Push {
        /// Target reference.
        reference: String,
        /// Underlying failure.
        #[source]
        source: Box<TransferError>,
    },

    /// Fetching `reference` failed.
    #[error("fetch of {reference} failed: {source}")]
    Fetch {
        /// Source reference.
        reference: String,
        /// Underlying failure.
        #[source]
        source: Box<TransferError>,
    },

    /// Local filesystem access failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// Path where the error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl TransferError {
    /// Classifies the failure, looking through push/fetch context.
    #[must_use]
    pub fn kind(&self) -> TransferErrorKind {
        match self {
            Self::NotFound { .. } => TransferErrorKind::NotFound,
            Self::Auth { .. } => TransferErrorKind::Auth,
            Self::Network { .. } => TransferErrorKind::Network,
            Self::Registry { status, .. } if (500..600).contains(status) => {
                TransferErrorKind::Network
            }
            Self::Push { source, .. } | Self::Fetch { source, .. } => source.kind(),
            _ => TransferErrorKind::Other,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
