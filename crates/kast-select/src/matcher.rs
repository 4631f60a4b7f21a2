//! Selector evaluation over a single resource item.
//!
//! An item matches when its labels and annotations satisfy the respective
//! selectors *and* its group, version, kind, name and namespace satisfy the
//! corresponding patterns. Patterns are anchored regular expressions; an
//! empty pattern matches anything.

use kast_common::config::Selector;
use kast_common::types::{ResourceItem, split_api_version};
use regex::Regex;

use crate::error::SelectorError;
use crate::labels::LabelSelector;

/// A selector with its patterns compiled, ready to be evaluated many times.
#[derive(Debug, Clone)]
pub struct CompiledSelector {
    group: Option<Regex>,
    version: Option<Regex>,
    kind: Option<Regex>,
    name: Option<Regex>,
    namespace: Option<Regex>,
    labels: LabelSelector,
    annotations: LabelSelector,
}

impl CompiledSelector {
    /// Compiles every pattern of the selector.
    ///
    /// # Errors
    ///
    /// Returns `SelectorError` if a pattern or a label/annotation expression
    /// is malformed.
    pub fn compile(selector: &Selector) -> Result<Self, SelectorError> {
        Ok(Self {
            group: compile_pattern("group", &selector.group)?,
            version: compile_pattern("version", &selector.version)?,
            kind: compile_pattern("kind", &selector.kind)?,
            name: compile_pattern("name", &selector.name)?,
            namespace: compile_pattern("namespace", &selector.namespace)?,
            labels: LabelSelector::parse("labelSelector", &selector.label_selector)?,
            annotations: LabelSelector::parse(
                "annotationSelector",
                &selector.annotation_selector,
            )?,
        })
    }

    /// Evaluates the selector against an item.
    #[must_use]
    pub fn matches(&self, item: &ResourceItem) -> bool {
        if !self.labels.matches(&item.labels()) || !self.annotations.matches(&item.annotations())
        {
            return false;
        }
        let (group, version) = split_api_version(item.api_version());
        pattern_matches(self.group.as_ref(), group)
            && pattern_matches(self.version.as_ref(), version)
            && pattern_matches(self.kind.as_ref(), item.kind())
            && pattern_matches(self.name.as_ref(), item.name())
            && pattern_matches(self.namespace.as_ref(), item.namespace())
    }
}

/// Checks whether `item` matches `selector`.
///
/// # Errors
///
/// Returns `SelectorError` if the selector cannot be compiled.
pub fn matches(item: &ResourceItem, selector: &Selector) -> Result<bool, SelectorError> {
    Ok(CompiledSelector::compile(selector)?.matches(item))
}

fn compile_pattern(field: &'static str, pattern: &str) -> Result<Option<Regex>, SelectorError> {
    if pattern.is_empty() {
        return Ok(None);
    }
    Regex::new(&format!("^(?:{pattern})$"))
        .map(Some)
        .map_err(|source| SelectorError::InvalidPattern {
            field,
            pattern: pattern.to_string(),
            source,
        })
}

fn pattern_matches(pattern: Option<&Regex>, value: &str) -> bool {
    pattern.is_none_or(|re| re.is_match(value))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn item(api_version: &str, kind: &str, namespace: &str, name: &str) -> ResourceItem {
        ResourceItem::from_value(json!({
            "apiVersion": api_version,
            "kind": kind,
            "metadata": {
                "name": name,
                "namespace": namespace,
                "labels": {"app": "web"},
                "annotations": {"kast.dev/include": "yes"}
            }
        }))
        .expect("valid item")
    }

    #[test]
    fn empty_selector_matches_any_item() {
        let sel = Selector::default();
        for it in [
            item("v1", "ConfigMap", "default", "a"),
            item("apps/v1", "Deployment", "", "b"),
            item("", "", "", ""),
        ] {
            assert!(matches(&it, &sel).expect("compile"));
        }
    }

    #[test]
    fn kind_and_name_patterns_are_anchored() {
        let sel = Selector {
            kind: "Secret".into(),
            name: "db".into(),
            ..Selector::default()
        };
        assert!(matches(&item("v1", "Secret", "", "db"), &sel).expect("compile"));
        assert!(!matches(&item("v1", "Secret", "", "db-auth"), &sel).expect("compile"));
        assert!(!matches(&item("v1", "SecretStore", "", "db"), &sel).expect("compile"));
    }

    #[test]
    fn group_and_version_come_from_api_version() {
        let sel = Selector {
            group: "apps".into(),
            version: "v1.*".into(),
            ..Selector::default()
        };
        assert!(matches(&item("apps/v1beta1", "Deployment", "", "x"), &sel).expect("compile"));
        assert!(!matches(&item("v1", "Deployment", "", "x"), &sel).expect("compile"));

        let core = Selector {
            group: String::new(),
            version: "v1".into(),
            ..Selector::default()
        };
        assert!(matches(&item("v1", "Service", "", "x"), &core).expect("compile"));
    }

    #[test]
    fn label_mismatch_excludes_item_despite_gvk_match() {
        let sel = Selector {
            kind: "ConfigMap".into(),
            label_selector: "app=db".into(),
            ..Selector::default()
        };
        assert!(!matches(&item("v1", "ConfigMap", "default", "a"), &sel).expect("compile"));
    }

    #[test]
    fn annotation_mismatch_excludes_item_despite_gvk_match() {
        let sel = Selector {
            kind: ".*".into(),
            annotation_selector: "kast.dev/include=no".into(),
            ..Selector::default()
        };
        assert!(!matches(&item("v1", "ConfigMap", "default", "a"), &sel).expect("compile"));

        let ok = Selector {
            annotation_selector: "kast.dev/include".into(),
            ..Selector::default()
        };
        assert!(matches(&item("v1", "ConfigMap", "default", "a"), &ok).expect("compile"));
    }

    #[test]
    fn namespace_pattern_supports_alternation() {
        let sel = Selector {
            namespace: "prod|staging".into(),
            ..Selector::default()
        };
        assert!(matches(&item("v1", "ConfigMap", "staging", "a"), &sel).expect("compile"));
        assert!(!matches(&item("v1", "ConfigMap", "dev", "a"), &sel).expect("compile"));
    }

    #[test]
    fn invalid_pattern_fails_to_compile() {
        let sel = Selector {
            name: "web(".into(),
            ..Selector::default()
        };
        let err = matches(&item("v1", "ConfigMap", "", "web"), &sel).expect_err("bad regex");
        assert!(matches!(err, SelectorError::InvalidPattern { field: "name", .. }));
    }

    #[test]
    fn invalid_label_selector_fails_to_compile() {
        let sel = Selector {
            label_selector: "app in web".into(),
            ..Selector::default()
        };
        assert!(CompiledSelector::compile(&sel).is_err());
    }
}
