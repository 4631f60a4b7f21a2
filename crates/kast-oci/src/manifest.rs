//! OCI image manifests carrying a module: one layer per file.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::TransferError;

/// Media type of an OCI image manifest.
pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
/// Media type of the empty config blob.
pub const EMPTY_CONFIG_MEDIA_TYPE: &str = "application/vnd.oci.empty.v1+json";
/// Content of the empty config blob.
pub const EMPTY_CONFIG_CONTENT: &[u8] = b"{}";
/// Media type of a file layer.
pub const LAYER_MEDIA_TYPE: &str = "application/vnd.oci.image.layer.v1.tar";
/// Annotation holding a layer's relative file path.
pub const TITLE_ANNOTATION: &str = "org.opencontainers.image.title";

/// Content descriptor: media type, digest, size and annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content.
    pub media_type: String,
    /// Digest of the referenced content.
    pub digest: Digest,
    /// Size of the referenced content in bytes.
    pub size: u64,
    /// Artifact type, set on manifest descriptors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
    /// Free-form annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Descriptor {
    /// Describes `content` with the given media type.
    #[must_use]
    pub fn for_content(media_type: &str, content: &[u8]) -> Self {
        Self {
            media_type: media_type.to_string(),
            digest: Digest::of(content),
            size: content.len() as u64,
            artifact_type: None,
            annotations: BTreeMap::new(),
        }
    }

    /// Describes one module file stored under its relative path.
    #[must_use]
    pub fn for_file(relative_path: &str, content: &[u8]) -> Self {
        let mut descriptor = Self::for_content(LAYER_MEDIA_TYPE, content);
        let _ = descriptor
            .annotations
            .insert(TITLE_ANNOTATION.to_string(), relative_path.to_string());
        descriptor
    }

    /// The OCI empty config descriptor.
    #[must_use]
    pub fn empty_config() -> Self {
        Self::for_content(EMPTY_CONFIG_MEDIA_TYPE, EMPTY_CONFIG_CONTENT)
    }

    /// Returns the layer title (relative file path), if any.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.annotations.get(TITLE_ANNOTATION).map(String::as_str)
    }
}

/// An OCI image manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Always 2.
    pub schema_version: u32,
    /// Always [`MANIFEST_MEDIA_TYPE`].
    #[serde(default)]
    pub media_type: String,
    /// Artifact type distinguishing kast modules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,
    /// Config blob descriptor.
    pub config: Descriptor,
    /// One descriptor per file.
    #[serde(default)]
    pub layers: Vec<Descriptor>,
    /// Free-form annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Manifest {
    /// Builds a manifest over the given file layers.
    #[must_use]
    pub fn new(artifact_type: &str, layers: Vec<Descriptor>) -> Self {
        Self {
            schema_version: 2,
            media_type: MANIFEST_MEDIA_TYPE.to_string(),
            artifact_type: Some(artifact_type.to_string()),
            config: Descriptor::empty_config(),
            layers,
            annotations: BTreeMap::new(),
        }
    }

    /// Serializes the manifest.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::InvalidManifest` if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TransferError> {
        serde_json::to_vec(self).map_err(|e| TransferError::InvalidManifest {
            message: e.to_string(),
        })
    }

    /// Decodes and checks a manifest.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::InvalidManifest` if the bytes are not a schema 2
    /// manifest.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransferError> {
        let manifest: Self =
            serde_json::from_slice(bytes).map_err(|e| TransferError::InvalidManifest {
                message: e.to_string(),
            })?;
        if manifest.schema_version != 2 {
            return Err(TransferError::InvalidManifest {
                message: format!("unsupported schema version {}", manifest.schema_version),
            });
        }
        Ok(manifest)
    }

    /// Returns every layer with its checked destination path.
    ///
    /// # Errors
    ///
    /// Returns `InvalidManifest` for an untitled or duplicated layer and
    /// `UnsafePath` for a title that would leave the destination.
    pub fn file_layers(&self) -> Result<Vec<(PathBuf, &Descriptor)>, TransferError> {
        let mut seen = BTreeSet::new();
        let mut files = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let title = layer.title().ok_or_else(|| TransferError::InvalidManifest {
                message: format!("layer {} has no title", layer.digest),
            })?;
            let path = safe_relative_path(title)?;
            if !seen.insert(path.clone()) {
                return Err(TransferError::InvalidManifest {
                    message: format!("duplicate layer title \"{title}\""),
                });
            }
            files.push((path, layer));
        }
        Ok(files)
    }
}

/// Converts a layer title into a relative path that stays below its root.
///
/// # Errors
///
/// Returns `TransferError::UnsafePath` for empty, absolute or parent-relative titles.
pub fn safe_relative_path(title: &str) -> Result<PathBuf, TransferError> {
    let unsafe_path = || TransferError::UnsafePath {
        path: title.to_string(),
    };
    if title.is_empty() || title.starts_with('/') || title.contains('\\') {
        return Err(unsafe_path());
    }
    let mut path = PathBuf::new();
    for segment in title.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(unsafe_path());
        }
        path.push(segment);
    }
    if !Path::new(&path)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(unsafe_path());
    }
    Ok(path)
}
