//! Retrieving a module artifact into a directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use kast_common::constants;

use crate::digest::Digest;
use crate::error::TransferError;
use crate::manifest::Manifest;
use crate::options::TransferOptions;
use crate::repository::Repository;

/// Result of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArtifact {
    /// Digest of the fetched manifest.
    pub manifest_digest: Digest,
    /// Files written, relative to the destination, in manifest order.
    pub files: Vec<PathBuf>,
    /// Whether the module marker file is present after the fetch.
    pub has_marker: bool,
}

/// Fetches the artifact `tag` points at into `destination`.
///
/// Every blob is downloaded into a staging directory inside `destination`
/// and verified against its digest and size; files are moved into place only
/// once all of them verified, and a failed move puts back what it replaced.
/// Existing content of `destination` is kept and overwritten per path. A
/// missing module marker is reported as a warning.
///
/// # Errors
///
/// Returns `TransferError::Fetch` wrapping the cause: `NotFound`, `Auth` or
/// `Network` from the registry, `InvalidManifest`/`UnsafePath` for a bad
/// manifest, `DigestMismatch`/`SizeMismatch` for corrupted blobs, or
/// `Cancelled`/`DeadlineExceeded`. On error `destination` is left as it was.
pub fn fetch_artifact(
    repository: &dyn Repository,
    tag: &str,
    destination: &Path,
    options: &TransferOptions,
) -> Result<FetchedArtifact, TransferError> {
    let reference = repository.reference().with_tag(tag)?;
    tracing::info!(
        reference = %reference,
        destination = %destination.display(),
        "fetching module"
    );
    let fetched = download(repository, tag, destination, options).map_err(|source| {
        TransferError::Fetch {
            reference: reference.to_string(),
            source: Box::new(source),
        }
    })?;
    if !fetched.has_marker {
        tracing::warn!(
            reference = %reference,
            marker = constants::MODULE_MARKER_PATH,
            "fetched artifact has no module marker"
        );
    }
    Ok(fetched)
}

fn download(
    repository: &dyn Repository,
    tag: &str,
    destination: &Path,
    options: &TransferOptions,
) -> Result<FetchedArtifact, TransferError> {
    options.check()?;
    let bytes = repository.fetch_manifest(tag)?;
    let manifest_digest = Digest::of(&bytes);
    let manifest = Manifest::from_bytes(&bytes)?;
    if manifest.artifact_type.as_deref() != Some(constants::MODULE_ARTIFACT_TYPE) {
        tracing::debug!(
            artifact_type = manifest.artifact_type.as_deref().unwrap_or_default(),
            "artifact type differs from the module type"
        );
    }
    let layers = manifest.file_layers()?;

    std::fs::create_dir_all(destination).map_err(|e| TransferError::io(destination, e))?;
    let staging = tempfile::Builder::new()
        .prefix(".kast-fetch-")
        .tempdir_in(destination)
        .map_err(|e| TransferError::io(destination, e))?;

    for (path, layer) in &layers {
        options.check()?;
        let content = repository.fetch_blob(layer)?;
        layer.digest.verify(&content, layer.size)?;
        write_file(&staging.path().join(path), &content)?;
        tracing::debug!(file = %path.display(), digest = %layer.digest, "blob verified");
    }

    options.check()?;
    let files: Vec<PathBuf> = layers.into_iter().map(|(path, _)| path).collect();
    install(staging.path(), destination, &files)?;

    Ok(FetchedArtifact {
        manifest_digest,
        files,
        has_marker: destination.join(constants::MODULE_MARKER_PATH).is_file(),
    })
}

/// A file moved into the destination, and whether it replaced one.
struct Installed<'a> {
    path: &'a Path,
    replaced: bool,
}

/// Moves the staged `files` into `destination`.
///
/// All targets are checked before anything moves. If a move still fails,
/// files already moved are taken out again and the ones they replaced are
/// put back.
fn install(staging: &Path, destination: &Path, files: &[PathBuf]) -> Result<(), TransferError> {
    for path in files {
        check_target(destination, path)?;
    }
    let backup = tempfile::Builder::new()
        .prefix(".kast-replaced-")
        .tempdir_in(destination)
        .map_err(|e| TransferError::io(destination, e))?;

    let mut installed = Vec::with_capacity(files.len());
    for path in files {
        match install_file(staging, backup.path(), destination, path) {
            Ok(replaced) => installed.push(Installed { path, replaced }),
            Err(err) => {
                roll_back(backup.path(), destination, &installed);
                return Err(err);
            }
        }
    }
    Ok(())
}

/// Fails if `path` cannot be written below `destination`: a directory sits
/// at the target, or a regular file sits where a parent directory goes.
fn check_target(destination: &Path, path: &Path) -> Result<(), TransferError> {
    let target = destination.join(path);
    if target.is_dir() {
        return Err(TransferError::io(&target, ErrorKind::IsADirectory.into()));
    }
    for ancestor in path.ancestors().skip(1) {
        if ancestor.as_os_str().is_empty() {
            break;
        }
        let dir = destination.join(ancestor);
        if dir.exists() && !dir.is_dir() {
            return Err(TransferError::io(&dir, ErrorKind::NotADirectory.into()));
        }
    }
    Ok(())
}

/// Moves one staged file into place, parking any file it replaces under
/// `backup`. Returns whether a file was replaced.
fn install_file(
    staging: &Path,
    backup: &Path,
    destination: &Path,
    path: &Path,
) -> Result<bool, TransferError> {
    let target = destination.join(path);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| TransferError::io(parent, e))?;
    }
    let parked = backup.join(path);
    let replaced = target.is_file();
    if replaced {
        if let Some(parent) = parked.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TransferError::io(parent, e))?;
        }
        std::fs::rename(&target, &parked).map_err(|e| TransferError::io(&target, e))?;
    }
    if let Err(e) = std::fs::rename(staging.join(path), &target) {
        if replaced {
            restore(&parked, &target);
        }
        return Err(TransferError::io(&target, e));
    }
    Ok(replaced)
}

fn roll_back(backup: &Path, destination: &Path, installed: &[Installed<'_>]) {
    for file in installed.iter().rev() {
        let target = destination.join(file.path);
        if let Err(e) = std::fs::remove_file(&target) {
            tracing::warn!(file = %target.display(), error = %e, "failed to remove fetched file");
        }
        if file.replaced {
            restore(&backup.join(file.path), &target);
        }
    }
}

fn restore(parked: &Path, target: &Path) {
    if let Err(e) = std::fs::rename(parked, target) {
        tracing::warn!(file = %target.display(), error = %e, "failed to restore replaced file");
    }
}

fn write_file(path: &Path, content: &[u8]) -> Result<(), TransferError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| TransferError::io(parent, e))?;
    }
    std::fs::write(path, content).map_err(|e| TransferError::io(path, e))
}
