//! Domain primitive types used across the kast workspace.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{KastError, Result};

/// Identity of a resource item: group, version, kind, namespace and name.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId {
    /// API group (empty for the core group).
    pub group: String,
    /// API version within the group.
    pub version: String,
    /// Resource kind.
    pub kind: String,
    /// Namespace (empty for cluster-scoped or unset).
    pub namespace: String,
    /// Resource name.
    pub name: String,
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}.{}", self.kind, self.version)?;
        } else {
            write!(f, "{}.{}.{}", self.kind, self.version, self.group)?;
        }
        if self.namespace.is_empty() {
            write!(f, " {}", self.name)
        } else {
            write!(f, " {}/{}", self.namespace, self.name)
        }
    }
}

/// Splits an `apiVersion` into its group and version parts.
///
/// `apps/v1` yields `("apps", "v1")`, `v1` yields `("", "v1")`.
#[must_use]
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    api_version
        .split_once('/')
        .unwrap_or(("", api_version))
}

/// A generic, semi-schema-less KRM resource document.
///
/// Content is carried through unchanged; only the identifying fields are
/// interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceItem(Map<String, Value>);

impl ResourceItem {
    /// Wraps a JSON value as a resource item.
    ///
    /// # Errors
    ///
    /// Returns `KastError::InvalidResource` if the value is not an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(KastError::InvalidResource {
                message: format!("expected a mapping, got {}", json_kind(&other)),
            }),
        }
    }

    /// Wraps an object map as a resource item.
    #[must_use]
    pub const fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Returns the item's `apiVersion`, or an empty string.
    #[must_use]
    pub fn api_version(&self) -> &str {
        self.str_field("apiVersion")
    }

    /// Returns the item's `kind`, or an empty string.
    #[must_use]
    pub fn kind(&self) -> &str {
        self.str_field("kind")
    }

    /// Returns `metadata.name`, or an empty string.
    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata_str("name")
    }

    /// Returns `metadata.namespace`, or an empty string.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.metadata_str("namespace")
    }

    /// Returns `metadata.labels` as a sorted map. Non-string values are skipped.
    #[must_use]
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.metadata_string_map("labels")
    }

    /// Returns `metadata.annotations` as a sorted map. Non-string values are skipped.
    #[must_use]
    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.metadata_string_map("annotations")
    }

    /// Returns the item's identity.
    #[must_use]
    pub fn id(&self) -> ResourceId {
        let (group, version) = split_api_version(self.api_version());
        ResourceId {
            group: group.to_string(),
            version: version.to_string(),
            kind: self.kind().to_string(),
            namespace: self.namespace().to_string(),
            name: self.name().to_string(),
        }
    }

    /// Returns a top-level field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Borrows the underlying object.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Converts the item into a JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Returns a JSON copy of the item.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    fn str_field(&self, key: &str) -> &str {
        self.0.get(key).and_then(Value::as_str).unwrap_or_default()
    }

    fn metadata(&self) -> Option<&Map<String, Value>> {
        self.0.get("metadata").and_then(Value::as_object)
    }

    fn metadata_str(&self, key: &str) -> &str {
        self.metadata()
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    fn metadata_string_map(&self, key: &str) -> BTreeMap<String, String> {
        self.metadata()
            .and_then(|m| m.get(key))
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl TryFrom<Value> for ResourceItem {
    type Error = KastError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

/// Returns a short name for the kind of a JSON value.
#[must_use]
pub const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

/// A KRM `ResourceList` exchanged with the orchestrator over stdin/stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceList {
    /// Always `config.kubernetes.io/v1`.
    pub api_version: String,
    /// Always `ResourceList`.
    pub kind: String,
    /// Resource items.
    #[serde(default)]
    pub items: Vec<ResourceItem>,
    /// Raw function configuration, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_config: Option<Value>,
}

impl ResourceList {
    /// Builds a `ResourceList` holding the given items.
    #[must_use]
    pub fn new(items: Vec<ResourceItem>) -> Self {
        Self {
            api_version: crate::constants::RESOURCE_LIST_API_VERSION.to_string(),
            kind: crate::constants::RESOURCE_LIST_KIND.to_string(),
            items,
            function_config: None,
        }
    }

    /// Parses a `ResourceList` from YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid YAML or has the wrong kind.
    pub fn from_yaml(input: &str) -> Result<Self> {
        let list: Self = serde_yaml::from_str(input)?;
        if list.kind != crate::constants::RESOURCE_LIST_KIND {
            return Err(KastError::InvalidResource {
                message: format!("expected kind ResourceList, got \"{}\"", list.kind),
            });
        }
        Ok(list)
    }

    /// Serializes the list to YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
