//! SHA-256 content digests in OCI `algorithm:hex` form.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::error::TransferError;

const ALGORITHM: &str = "sha256";

/// A `sha256:<hex>` content digest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// Computes the digest of `content`.
    #[must_use]
    pub fn of(content: &[u8]) -> Self {
        Self(format!("{ALGORITHM}:{}", hex::encode(Sha256::digest(content))))
    }

    /// Parses a digest string.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::InvalidManifest` unless the input is `sha256:`
    /// followed by 64 lowercase hex characters.
    pub fn parse(input: &str) -> Result<Self, TransferError> {
        let valid = input.strip_prefix("sha256:").is_some_and(|hex| {
            hex.len() == 64 && hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        });
        if !valid {
            return Err(TransferError::InvalidManifest {
                message: format!("unsupported digest \"{input}\""),
            });
        }
        Ok(Self(input.to_string()))
    }

    /// Returns the full `sha256:<hex>` form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks `content` against this digest and an expected size.
    ///
    /// # Errors
    ///
    /// Returns `SizeMismatch` or `DigestMismatch` when the content differs.
    pub fn verify(&self, content: &[u8], size: u64) -> Result<(), TransferError> {
        let actual_size = content.len() as u64;
        if actual_size != size {
            return Err(TransferError::SizeMismatch {
                digest: self.0.clone(),
                expected: size,
                actual: actual_size,
            });
        }
        let actual = Self::of(content);
        if &actual != self {
            return Err(TransferError::DigestMismatch {
                expected: self.0.clone(),
                actual: actual.0,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Digest {
    type Error = TransferError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}
