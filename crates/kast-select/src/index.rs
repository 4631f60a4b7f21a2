//! Include index construction.
//!
//! The index maps `(apiVersion, kind, namespace, name)` to the full content of
//! the matched item. A later match at an identical coordinate replaces the
//! earlier one; contents are never merged.

use std::collections::BTreeMap;

use kast_common::config::Selector;
use kast_common::types::ResourceItem;
use serde_json::{Map, Value};

use crate::error::SelectorError;
use crate::matcher::CompiledSelector;

/// Coordinate of an entry in the include index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexKey {
    /// Item `apiVersion`.
    pub api_version: String,
    /// Item kind.
    pub kind: String,
    /// Item namespace (empty when unset).
    pub namespace: String,
    /// Item name.
    pub name: String,
}

impl IndexKey {
    /// Returns the coordinate of an item.
    #[must_use]
    pub fn of(item: &ResourceItem) -> Self {
        Self {
            api_version: item.api_version().to_string(),
            kind: item.kind().to_string(),
            namespace: item.namespace().to_string(),
            name: item.name().to_string(),
        }
    }
}

/// Items selected for the module, keyed by coordinate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncludeIndex {
    entries: BTreeMap<IndexKey, Value>,
}

impl IncludeIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an item, returning the content it replaced, if any.
    pub fn insert(&mut self, item: &ResourceItem) -> Option<Value> {
        self.entries.insert(IndexKey::of(item), item.to_value())
    }

    /// Looks up an entry by coordinate.
    #[must_use]
    pub fn get(&self, api_version: &str, kind: &str, namespace: &str, name: &str) -> Option<&Value> {
        self.entries.get(&IndexKey {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in coordinate order.
    pub fn iter(&self) -> impl Iterator<Item = (&IndexKey, &Value)> {
        self.entries.iter()
    }

    /// Renders the index as the nested `apiVersion -> kind -> namespace -> name`
    /// mapping handed to the module.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut root = Value::Object(Map::new());
        for (key, content) in &self.entries {
            root[key.api_version.as_str()][key.kind.as_str()][key.namespace.as_str()]
                [key.name.as_str()] = content.clone();
        }
        root
    }
}

/// Scans `items` with every selector and collects the matches.
///
/// A selector matching nothing is reported and skipped. Items are never
/// modified.
///
/// # Errors
///
/// Returns `SelectorError` if any selector fails to compile; the whole
/// extraction is then aborted.
pub fn build_include_index(
    selectors: &[Selector],
    items: &[ResourceItem],
) -> Result<IncludeIndex, SelectorError> {
    let mut index = IncludeIndex::new();
    for selector in selectors {
        let compiled = CompiledSelector::compile(selector)?;
        let mut matched = 0_usize;
        for item in items.iter().filter(|item| compiled.matches(item)) {
            matched += 1;
            if index.insert(item).is_some() {
                tracing::debug!(
                    selector = %selector,
                    id = %item.id(),
                    "include replaced an earlier match at the same coordinate"
                );
            }
        }
        if matched == 0 {
            tracing::info!(selector = %selector, "no items matched include selector");
        } else {
            tracing::debug!(selector = %selector, matched, "include selector matched");
        }
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn item(api_version: &str, kind: &str, namespace: &str, name: &str, data: &str) -> ResourceItem {
        ResourceItem::from_value(json!({
            "apiVersion": api_version,
            "kind": kind,
            "metadata": {"name": name, "namespace": namespace},
            "data": {"value": data}
        }))
        .expect("valid item")
    }

    #[test]
    fn index_nests_by_coordinate() {
        let mut index = IncludeIndex::new();
        let _ = index.insert(&item("v1", "ConfigMap", "default", "a", "1"));
        let _ = index.insert(&item("apps/v1", "Deployment", "app", "b", "2"));
        let value = index.to_value();
        assert_eq!(value["v1"]["ConfigMap"]["default"]["a"]["data"]["value"], json!("1"));
        assert_eq!(value["apps/v1"]["Deployment"]["app"]["b"]["kind"], json!("Deployment"));
        assert_eq!(value.as_object().map(Map::len), Some(2));
    }

    #[test]
    fn same_coordinate_last_write_wins() {
        let first = item("v1", "ConfigMap", "default", "a", "first");
        let second = item("v1", "ConfigMap", "default", "a", "second");
        let selectors = vec![
            Selector {
                kind: "ConfigMap".into(),
                ..Selector::default()
            },
            Selector {
                name: "a".into(),
                ..Selector::default()
            },
        ];
        let index = build_include_index(&selectors, &[first, second]).expect("build");
        assert_eq!(index.len(), 1);
        let content = index.get("v1", "ConfigMap", "default", "a").expect("entry");
        assert_eq!(content["data"]["value"], json!("second"));
    }

    #[test]
    fn zero_matches_is_not_an_error() {
        let selectors = vec![Selector {
            kind: "Secret".into(),
            ..Selector::default()
        }];
        let items = vec![item("v1", "ConfigMap", "", "a", "1")];
        let index = build_include_index(&selectors, &items).expect("build");
        assert!(index.is_empty());
        assert_eq!(index.to_value(), json!({}));
    }

    #[test]
    fn no_selectors_yield_empty_index() {
        let items = vec![item("v1", "ConfigMap", "", "a", "1")];
        let index = build_include_index(&[], &items).expect("build");
        assert!(index.is_empty());
    }

    #[test]
    fn malformed_selector_aborts_extraction() {
        let selectors = vec![
            Selector::all(),
            Selector {
                kind: "[".into(),
                ..Selector::default()
            },
        ];
        let items = vec![item("v1", "ConfigMap", "", "a", "1")];
        assert!(build_include_index(&selectors, &items).is_err());
    }
}
