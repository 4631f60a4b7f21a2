//! Builder for the options a function invocation runs with.

use std::path::PathBuf;
use std::sync::Arc;

use kast_common::config::RuntimeConfig;
use kast_oci::{Connector, HttpConnector, TransferOptions};

use crate::credential::EnvLookup;
use crate::error::FunctionError;

/// Validated options for running the function.
#[derive(Clone)]
pub struct FunctionOptions {
    /// Local module directory, or the working directory a remote module is
    /// fetched into.
    pub module_path: PathBuf,
    /// Opens registry repositories for remote modules.
    pub connector: Arc<dyn Connector + Send + Sync>,
    /// Timeout, deadline and cancellation for registry transfers.
    pub transfer: TransferOptions,
    /// Environment used for the credential fallback.
    pub env: Arc<EnvLookup>,
}

impl std::fmt::Debug for FunctionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionOptions")
            .field("module_path", &self.module_path)
            .field("transfer", &self.transfer)
            .finish_non_exhaustive()
    }
}

/// Fluent builder for [`FunctionOptions`].
#[derive(Default)]
pub struct FunctionBuilder {
    module_path: Option<PathBuf>,
    connector: Option<Arc<dyn Connector + Send + Sync>>,
    transfer: Option<TransferOptions>,
    env: Option<Arc<EnvLookup>>,
}

impl FunctionBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from process-level settings.
    #[must_use]
    pub fn from_runtime_config(config: &RuntimeConfig) -> Self {
        Self::new()
            .module_path(config.module_path.clone())
            .transfer_options(TransferOptions::with_timeout(config.transfer_timeout))
    }

    /// Sets the module directory.
    #[must_use]
    pub fn module_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.module_path = Some(path.into());
        self
    }

    /// Sets the registry connector. Defaults to HTTP.
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector + Send + Sync>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Sets the transfer options.
    #[must_use]
    pub fn transfer_options(mut self, options: TransferOptions) -> Self {
        self.transfer = Some(options);
        self
    }

    /// Sets the environment lookup. Defaults to the process environment.
    #[must_use]
    pub fn env(mut self, lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.env = Some(Arc::new(lookup));
        self
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns `FunctionError::Config` if no module path is set.
    pub fn build(self) -> Result<FunctionOptions, FunctionError> {
        let module_path = self
            .module_path
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| FunctionError::config("module path is required"))?;
        let transfer = self.transfer.unwrap_or_default();
        let connector: Arc<dyn Connector + Send + Sync> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(HttpConnector::new(transfer.clone())),
        };
        let env: Arc<EnvLookup> = match self.env {
            Some(env) => env,
            None => Arc::new(|key: &str| std::env::var(key).ok()),
        };
        Ok(FunctionOptions {
            module_path,
            connector,
            transfer,
            env,
        })
    }
}
