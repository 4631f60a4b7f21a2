//! Function errors: one variant per pipeline failure class.

use std::fmt;
use std::path::PathBuf;

use kast_common::error::KastError;
use kast_engine::EngineError;
use kast_oci::{TransferError, TransferErrorKind};
use kast_select::SelectorError;
use thiserror::Error;

/// The fixed fills applied to the module schema, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillStage {
    /// `apiVersion` of the function config.
    ApiVersion,
    /// `kind` of the function config.
    Kind,
    /// `metadata` of the function config.
    Metadata,
    /// `input` of the function config.
    Input,
    /// The include index.
    Includes,
}

impl FillStage {
    /// Every stage in fill order.
    pub const ALL: [Self; 5] = [
        Self::ApiVersion,
        Self::Kind,
        Self::Metadata,
        Self::Input,
        Self::Includes,
    ];

    /// Path the stage fills.
    #[must_use]
    pub const fn path(self) -> &'static str {
        use kast_common::constants::{
            API_VERSION_FILL_PATH, INCLUDES_FILL_PATH, INPUT_FILL_PATH, KIND_FILL_PATH,
            METADATA_FILL_PATH,
        };
        match self {
            Self::ApiVersion => API_VERSION_FILL_PATH,
            Self::Kind => KIND_FILL_PATH,
            Self::Metadata => METADATA_FILL_PATH,
            Self::Input => INPUT_FILL_PATH,
            Self::Includes => INCLUDES_FILL_PATH,
        }
    }
}

impl fmt::Display for FillStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Errors raised by a function invocation.
#[derive(Debug, Error)]
pub enum FunctionError {
    /// An include selector is malformed.
    #[error("failed to compute includes: {source}")]
    Selector {
        /// Underlying selector error.
        #[from]
        source: SelectorError,
    },

    /// The configuration is missing, invalid or contradictory.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },

    /// No Secret matches the auth selector.
    #[error("no items matched for auth selector {selector}")]
    SecretNotFound {
        /// The selector, rendered.
        selector: String,
    },

    /// The matched Secret cannot be turned into a credential.
    #[error("invalid registry credential in {secret}: {message}")]
    Credential {
        /// Identity of the Secret.
        secret: String,
        /// What is wrong with it.
        message: String,
    },

    /// Fetching the remote module failed. The transfer error already names
    /// the reference.
    #[error("{source}")]
    Transfer {
        /// Underlying transfer error.
        #[from]
        source: TransferError,
    },

    /// The module files cannot be loaded.
    #[error("failed to load module from {}: {source}", path.display())]
    Load {
        /// Module directory.
        path: PathBuf,
        /// Underlying engine error.
        source: EngineError,
        /// Rendered engine diagnostics.
        diagnostics: String,
    },

    /// A module instance contradicts the instances unified before it.
    #[error("failed to build module schema: instance {instance} conflicts: {source}")]
    SchemaConflict {
        /// Name of the conflicting instance.
        instance: String,
        /// Underlying engine error.
        source: EngineError,
        /// Rendered engine diagnostics.
        diagnostics: String,
    },

    /// A fill contradicts the schema.
    #[error("failed to fill {stage}: {source}")]
    Unification {
        /// The fill that failed.
        stage: FillStage,
        /// Underlying engine error.
        source: EngineError,
        /// Rendered engine diagnostics.
        diagnostics: String,
    },

    /// The filled value is not fully concrete.
    #[error("failed to validate module value: {source}")]
    Concreteness {
        /// Underlying engine error.
        source: EngineError,
        /// Rendered engine diagnostics.
        diagnostics: String,
    },

    /// The module outputs are missing or have the wrong shape.
    #[error("invalid module outputs: {message}")]
    OutputShape {
        /// What is wrong with them.
        message: String,
    },

    /// A shared failure (I/O, serialization, invalid resource).
    #[error(transparent)]
    Common(#[from] KastError),
}

impl FunctionError {
    /// Shorthand for building a [`FunctionError::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Engine-rendered diagnostics, for errors raised by the engine.
    #[must_use]
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::Load { diagnostics, .. }
            | Self::SchemaConflict { diagnostics, .. }
            | Self::Unification { diagnostics, .. }
            | Self::Concreteness { diagnostics, .. } => Some(diagnostics),
            _ => None,
        }
    }

    /// Classification of a transfer failure.
    #[must_use]
    pub fn transfer_kind(&self) -> Option<TransferErrorKind> {
        match self {
            Self::Transfer { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn fill_stages_are_ordered() {
        let paths: Vec<&str> = FillStage::ALL.iter().map(|s| s.path()).collect();
        assert_eq!(paths, vec!["apiVersion", "kind", "metadata", "input", "includes"]);
    }

    #[test]
    fn unification_error_keeps_cause_and_diagnostics_apart() {
        let err = FunctionError::Unification {
            stage: FillStage::Input,
            source: EngineError::Conflict {
                path: "input.replicas".into(),
                left: "3".into(),
                right: "5".into(),
            },
            diagnostics: "conflicting values\n    declared in: schema.yaml".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to fill input: conflicting values at input.replicas: 3 and 5"
        );
        assert!(err.diagnostics().is_some_and(|d| d.contains("schema.yaml")));
        let cause = err.source().expect("source");
        assert!(cause.downcast_ref::<EngineError>().is_some());
    }
}
