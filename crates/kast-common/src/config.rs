//! Configuration models: the function config read from the `ResourceList`
//! and the process-level runtime settings.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants;
use crate::error::{KastError, Result};

/// Resource selector as written in configuration.
///
/// Every pattern is a regular expression matched against the whole field;
/// an omitted pattern matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Selector {
    /// API group pattern.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
    /// API version pattern.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Kind pattern.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    /// Name pattern.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Namespace pattern.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Kubernetes label selector expression.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label_selector: String,
    /// Kubernetes label selector expression applied to annotations.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub annotation_selector: String,
}

impl Selector {
    /// Selector matching every item.
    #[must_use]
    pub fn all() -> Self {
        Self {
            group: ".*".into(),
            version: ".*".into(),
            kind: ".*".into(),
            ..Self::default()
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = [
            ("group", &self.group),
            ("version", &self.version),
            ("kind", &self.kind),
            ("name", &self.name),
            ("namespace", &self.namespace),
            ("labelSelector", &self.label_selector),
            ("annotationSelector", &self.annotation_selector),
        ];
        let parts: Vec<String> = fields
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        write!(f, "[{}]", parts.join(" "))
    }
}

/// Remote module stored as an OCI artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RemoteModule {
    /// Registry host, optionally with a port.
    pub registry: String,
    /// Repository path inside the registry.
    pub repo: String,
    /// Tag to fetch.
    pub tag: String,
    /// Selector locating the Secret holding registry credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Selector>,
    /// Talk to the registry over plain HTTP.
    #[serde(default, rename = "plainHTTP")]
    pub plain_http: bool,
}

/// Configuration handed to the function through `ResourceList.functionConfig`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FunctionConfig {
    /// `apiVersion` of the config resource.
    #[serde(default)]
    pub api_version: String,
    /// `kind` of the config resource.
    #[serde(default)]
    pub kind: String,
    /// Object metadata, passed to the module verbatim.
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Free-form module input.
    #[serde(default)]
    pub input: Map<String, Value>,
    /// Selectors choosing the items forwarded to the module.
    #[serde(default)]
    pub includes: Vec<Selector>,
    /// Remote module reference, if the module is not local.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_module: Option<RemoteModule>,
}

impl FunctionConfig {
    /// Loads a config strictly: unknown fields are rejected.
    ///
    /// # Errors
    ///
    /// Returns `KastError::Serialization` if the value has the wrong shape.
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Loads a config strictly from YAML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not YAML or has the wrong shape.
    pub fn from_yaml(input: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(input)?;
        Self::from_value(value)
    }

    /// Returns `metadata.annotations` as a sorted map.
    #[must_use]
    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.metadata
            .get("annotations")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Sets a single annotation, creating `metadata.annotations` if needed.
    pub fn set_annotation(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let annotations = self
            .metadata
            .entry("annotations")
            .or_insert_with(|| Value::Object(Map::new()));
        if !annotations.is_object() {
            *annotations = Value::Object(Map::new());
        }
        if let Value::Object(map) = annotations {
            let _ = map.insert(key.into(), Value::String(value.into()));
        }
    }

    /// Whether the config carries the validator marker annotation.
    #[must_use]
    pub fn is_validator(&self) -> bool {
        self.annotations()
            .get(constants::VALIDATOR_ANNOTATION_KEY)
            .is_some_and(|v| v == constants::VALIDATOR_ANNOTATION_VALUE)
    }
}

/// Process-level settings for running the function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Directory holding (or receiving) the module.
    pub module_path: PathBuf,
    /// Per-request timeout for registry transfers.
    pub transfer_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            module_path: PathBuf::from(constants::DEFAULT_MODULE_PATH),
            transfer_timeout: Duration::from_secs(constants::DEFAULT_TRANSFER_TIMEOUT_SECS),
        }
    }
}

impl RuntimeConfig {
    /// Builds the settings from environment-style lookups, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns `KastError::Config` if the timeout is not a whole number of seconds.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = lookup(constants::MODULE_PATH_ENV_VAR).filter(|p| !p.is_empty()) {
            config.module_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(constants::TRANSFER_TIMEOUT_ENV_VAR).filter(|t| !t.is_empty()) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                KastError::config(format!(
                    "{} must be a number of seconds, got \"{raw}\"",
                    constants::TRANSFER_TIMEOUT_ENV_VAR
                ))
            })?;
            config.transfer_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// Builds the settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `KastError::Config` if a variable holds an invalid value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}
