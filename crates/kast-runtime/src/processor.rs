//! KRM `ResourceList` processing and plain YAML resource streams.

use kast_common::config::FunctionConfig;
use kast_common::constants::RESOURCE_LIST_KIND;
use kast_common::error::KastError;
use kast_common::types::{ResourceItem, ResourceList};
use kast_engine::Engine;
use serde::Deserialize;
use serde_json::Value;

use crate::error::FunctionError;
use crate::pipeline::Function;

/// Runs `function` over a `ResourceList` read from YAML and returns the
/// resulting `ResourceList` as YAML.
///
/// The input `functionConfig` is echoed back unchanged.
///
/// # Errors
///
/// Returns `FunctionError::Config` if the list carries no `functionConfig`
/// or it has unknown fields, and any pipeline error otherwise.
pub fn process<E: Engine>(function: &Function<E>, input: &str) -> Result<String, FunctionError> {
    let list = ResourceList::from_yaml(input)?;
    let raw = list
        .function_config
        .clone()
        .ok_or_else(|| FunctionError::config("ResourceList has no functionConfig"))?;
    let config = FunctionConfig::from_value(raw)
        .map_err(|e| FunctionError::config(format!("functionConfig: {e}")))?;
    tracing::debug!(items = list.items.len(), "processing ResourceList");

    let items = function.run(list.items, &config)?;
    let output = ResourceList {
        items,
        function_config: list.function_config,
        ..ResourceList::new(Vec::new())
    };
    Ok(output.to_yaml()?)
}

/// Reads resource items from YAML: either a `ResourceList` or a stream of
/// bare resource documents.
///
/// # Errors
///
/// Returns an error if the text is not YAML or a document is not a mapping.
pub fn read_items(input: &str) -> Result<Vec<ResourceItem>, KastError> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(input) {
        let value = Value::deserialize(document)?;
        if !value.is_null() {
            documents.push(value);
        }
    }

    if let [single] = documents.as_slice() {
        if single.get("kind").and_then(Value::as_str) == Some(RESOURCE_LIST_KIND) {
            let list: ResourceList = serde_json::from_value(single.clone())?;
            return Ok(list.items);
        }
    }
    documents.into_iter().map(ResourceItem::from_value).collect()
}

/// Writes resource items as a multi-document YAML stream.
///
/// # Errors
///
/// Returns an error if an item cannot be serialized.
pub fn write_items(items: &[ResourceItem]) -> Result<String, KastError> {
    let mut out = String::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str("---\n");
        }
        out.push_str(&serde_yaml::to_string(item)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_items_accepts_resource_list() {
        let input = "\
apiVersion: config.kubernetes.io/v1
kind: ResourceList
items:
- apiVersion: v1
  kind: ConfigMap
  metadata:
    name: a
";
        let items = read_items(input).expect("items");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name(), "a");
    }

    #[test]
    fn read_items_accepts_document_stream() {
        let input = "\
apiVersion: v1
kind: ConfigMap
metadata:
  name: a
---
---
apiVersion: v1
kind: Secret
metadata:
  name: b
";
        let items = read_items(input).expect("items");
        let names: Vec<&str> = items.iter().map(ResourceItem::name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn read_items_rejects_scalar_document() {
        let err = read_items("just a string\n").expect_err("scalar");
        assert!(matches!(err, KastError::InvalidResource { .. }));
    }

    #[test]
    fn write_items_separates_documents() {
        let items = read_items("kind: A\n---\nkind: B\n").expect("items");
        let out = write_items(&items).expect("yaml");
        assert_eq!(out, "kind: A\n---\nkind: B\n");
        assert_eq!(write_items(&[]).expect("yaml"), "");
    }
}
