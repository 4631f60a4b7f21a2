//! Module providers: where the module files come from.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use kast_common::config::RemoteModule;
use kast_common::types::ResourceItem;
use kast_oci::{Connector, ModuleReference, TransferOptions, fetch_artifact};

use crate::credential::{EnvLookup, resolve_credential};
use crate::error::FunctionError;

/// Makes a module available as a local directory.
pub trait ModuleProvider {
    /// Directory the module is read from.
    fn path(&self) -> &Path;

    /// Makes the module files available at [`ModuleProvider::path`].
    ///
    /// # Errors
    ///
    /// Returns an error if the module cannot be obtained.
    fn prepare(&self, items: &[ResourceItem]) -> Result<(), FunctionError>;
}

/// A module already present on disk.
#[derive(Debug, Clone)]
pub struct LocalProvider {
    path: PathBuf,
}

impl LocalProvider {
    /// Uses the module at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ModuleProvider for LocalProvider {
    fn path(&self) -> &Path {
        &self.path
    }

    fn prepare(&self, _items: &[ResourceItem]) -> Result<(), FunctionError> {
        if self.path.is_dir() {
            Ok(())
        } else {
            Err(FunctionError::config(format!(
                "module path {} is not a directory",
                self.path.display()
            )))
        }
    }
}

/// A module fetched from a registry into a working directory.
pub struct OciProvider {
    remote: RemoteModule,
    working_dir: PathBuf,
    connector: Arc<dyn Connector + Send + Sync>,
    transfer: TransferOptions,
    env: Arc<EnvLookup>,
}

impl OciProvider {
    /// Fetches `remote` into `working_dir` through `connector`.
    #[must_use]
    pub fn new(
        remote: RemoteModule,
        working_dir: impl Into<PathBuf>,
        connector: Arc<dyn Connector + Send + Sync>,
        transfer: TransferOptions,
        env: Arc<EnvLookup>,
    ) -> Self {
        Self {
            remote,
            working_dir: working_dir.into(),
            connector,
            transfer,
            env,
        }
    }
}

impl ModuleProvider for OciProvider {
    fn path(&self) -> &Path {
        &self.working_dir
    }

    fn prepare(&self, items: &[ResourceItem]) -> Result<(), FunctionError> {
        let reference = ModuleReference::from_remote_module(&self.remote)?;
        let credential = resolve_credential(&self.remote, items, self.env.as_ref())?;
        std::fs::create_dir_all(&self.working_dir).map_err(|source| {
            kast_common::error::KastError::Io {
                path: self.working_dir.clone(),
                source,
            }
        })?;

        let repository = self.connector.connect(&reference, credential.as_ref())?;
        let fetched = fetch_artifact(
            repository.as_ref(),
            &reference.tag,
            &self.working_dir,
            &self.transfer,
        )?;
        tracing::info!(
            reference = %reference,
            digest = %fetched.manifest_digest,
            files = fetched.files.len(),
            "module fetched"
        );
        Ok(())
    }
}

impl std::fmt::Debug for OciProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OciProvider")
            .field("remote", &self.remote)
            .field("working_dir", &self.working_dir)
            .finish_non_exhaustive()
    }
}
