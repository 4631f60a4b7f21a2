//! Publishing a directory as a module artifact.

use std::path::{Path, PathBuf};

use crate::error::TransferError;
use crate::manifest::{Descriptor, EMPTY_CONFIG_CONTENT, MANIFEST_MEDIA_TYPE, Manifest};
use crate::options::TransferOptions;
use crate::repository::Repository;

/// Pushes every regular file under `root` to `repository` and points `tag`
/// at the resulting manifest.
///
/// The tag is written last, after every blob has been confirmed present, so
/// a reader never observes the tag on a manifest with missing blobs.
///
/// # Errors
///
/// Returns `TransferError::EmptyArtifact` if `root` holds no file, and
/// `TransferError::Push` wrapping the cause for any walk, read or registry
/// failure.
pub fn push_directory(
    repository: &dyn Repository,
    root: &Path,
    artifact_type: &str,
    tag: &str,
    options: &TransferOptions,
) -> Result<Descriptor, TransferError> {
    let reference = repository.reference().with_tag(tag)?;
    let wrap = |source: TransferError| TransferError::Push {
        reference: reference.to_string(),
        source: Box::new(source),
    };

    let files = collect_files(root).map_err(wrap)?;
    if files.is_empty() {
        return Err(TransferError::EmptyArtifact {
            path: root.to_path_buf(),
        });
    }
    tracing::info!(
        root = %root.display(),
        reference = %reference,
        files = files.len(),
        "pushing module"
    );

    upload(repository, files, artifact_type, tag, options).map_err(wrap)
}

fn upload(
    repository: &dyn Repository,
    files: Vec<(String, PathBuf)>,
    artifact_type: &str,
    tag: &str,
    options: &TransferOptions,
) -> Result<Descriptor, TransferError> {
    let config = Descriptor::empty_config();
    upload_blob(repository, &config, EMPTY_CONFIG_CONTENT, options)?;

    let mut layers = Vec::with_capacity(files.len());
    for (name, path) in files {
        let content = std::fs::read(&path).map_err(|e| TransferError::io(&path, e))?;
        let layer = Descriptor::for_file(&name, &content);
        upload_blob(repository, &layer, &content, options)?;
        tracing::debug!(file = %name, digest = %layer.digest, "layer uploaded");
        layers.push(layer);
    }

    for descriptor in std::iter::once(&config).chain(&layers) {
        options.check()?;
        if !repository.blob_exists(&descriptor.digest)? {
            return Err(TransferError::NotFound {
                what: format!("blob {} after upload", descriptor.digest),
            });
        }
    }

    let manifest = Manifest::new(artifact_type, layers).to_bytes()?;
    options.check()?;
    let digest = repository.push_manifest(tag, &manifest)?;
    tracing::info!(tag, digest = %digest, "manifest tagged");

    let mut descriptor = Descriptor::for_content(MANIFEST_MEDIA_TYPE, &manifest);
    descriptor.artifact_type = Some(artifact_type.to_string());
    Ok(descriptor)
}

fn upload_blob(
    repository: &dyn Repository,
    descriptor: &Descriptor,
    content: &[u8],
    options: &TransferOptions,
) -> Result<(), TransferError> {
    options.check()?;
    if repository.blob_exists(&descriptor.digest)? {
        return Ok(());
    }
    options.check()?;
    repository.push_blob(descriptor, content)
}

/// Lists regular files below `root` as `(relative name, path)` pairs in
/// sorted order. Relative names always use `/`.
fn collect_files(root: &Path) -> Result<Vec<(String, PathBuf)>, TransferError> {
    let mut files = Vec::new();
    walk(root, root, &mut files)?;
    files.sort();
    Ok(files)
}

fn walk(root: &Path, dir: &Path, files: &mut Vec<(String, PathBuf)>) -> Result<(), TransferError> {
    let entries = std::fs::read_dir(dir).map_err(|e| TransferError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| TransferError::io(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| TransferError::io(&path, e))?;
        if file_type.is_dir() {
            walk(root, &path, files)?;
        } else if file_type.is_file() {
            let relative = path
                .strip_prefix(root)
                .map_err(|_| TransferError::UnsafePath {
                    path: path.display().to_string(),
                })?;
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push((name, path));
        }
    }
    Ok(())
}
