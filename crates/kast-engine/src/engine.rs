//! The engine seam and its constraint implementation.

use std::fmt;
use std::path::Path;

use crate::diagnostics;
use crate::dialect;
use crate::error::{EngineError, SourceIssue};
use crate::eval::{concreteness_issues, evaluate};
use crate::loader::{Source, load_sources, parse_documents};
use crate::path::FieldPath;
use crate::unify::unify;
use crate::value::Value;

/// A module document built into an engine value.
#[derive(Debug, Clone)]
pub struct Instance<V> {
    /// Source document name (`file` or `file#n`).
    pub name: String,
    /// The built value.
    pub value: V,
}

/// The capabilities the function pipeline needs from a declarative engine.
///
/// Values are immutable: every operation returns a new value.
pub trait Engine {
    /// Engine-native value.
    type Value: Clone + fmt::Debug;

    /// Encodes plain data as a value. Strings are taken literally.
    fn encode(&self, data: &serde_json::Value) -> Self::Value;

    /// Builds one instance per module document.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Parse` carrying every problem found.
    fn build_instances(&self, sources: &[Source]) -> Result<Vec<Instance<Self::Value>>, EngineError>;

    /// Unifies two values.
    ///
    /// # Errors
    ///
    /// Returns an error if the values contradict each other.
    fn unify(&self, a: &Self::Value, b: &Self::Value) -> Result<Self::Value, EngineError>;

    /// Unifies `content` into `value` at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or the content contradicts
    /// the value.
    fn fill_path(
        &self,
        value: &Self::Value,
        path: &str,
        content: &serde_json::Value,
    ) -> Result<Self::Value, EngineError>;

    /// Checks that the value is final and fully concrete.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Incomplete` listing every non-concrete node.
    fn validate_concrete(&self, value: &Self::Value) -> Result<(), EngineError>;

    /// Returns the evaluated value at `path`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or evaluation fails.
    fn lookup_path(&self, value: &Self::Value, path: &str) -> Result<Option<Self::Value>, EngineError>;

    /// Converts a concrete value to plain data.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Incomplete` if the value is not concrete.
    fn export(&self, value: &Self::Value) -> Result<serde_json::Value, EngineError>;

    /// Renders an error for humans, locating it in the module sources.
    fn diagnostics(&self, err: &EngineError, instances: &[Instance<Self::Value>]) -> String;

    /// Loads and builds every instance of the module in `dir`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NoInstances` if the directory holds no
    /// document, or any error from reading and building the sources.
    fn load_dir(&self, dir: &Path) -> Result<Vec<Instance<Self::Value>>, EngineError> {
        let sources = load_sources(dir)?;
        let instances = self.build_instances(&sources)?;
        if instances.is_empty() {
            return Err(EngineError::NoInstances {
                path: dir.to_path_buf(),
            });
        }
        tracing::debug!(dir = %dir.display(), count = instances.len(), "module instances built");
        Ok(instances)
    }
}

/// The built-in engine for the `$` module dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintEngine;

impl ConstraintEngine {
    /// Creates the engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Engine for ConstraintEngine {
    type Value = Value;

    fn encode(&self, data: &serde_json::Value) -> Value {
        Value::from_json(data)
    }

    fn build_instances(&self, sources: &[Source]) -> Result<Vec<Instance<Value>>, EngineError> {
        let mut issues = Vec::new();
        let mut instances = Vec::new();
        for source in sources {
            let documents = match parse_documents(source) {
                Ok(documents) => documents,
                Err(found) => {
                    issues.extend(found);
                    continue;
                }
            };
            for document in documents {
                match dialect::decode(&document.data) {
                    Ok(value) => instances.push(Instance {
                        name: document.name,
                        value,
                    }),
                    Err(e) => issues.push(SourceIssue {
                        source: document.name,
                        line: None,
                        column: None,
                        message: e.to_string(),
                    }),
                }
            }
        }
        if issues.is_empty() {
            Ok(instances)
        } else {
            Err(EngineError::Parse { issues })
        }
    }

    fn unify(&self, a: &Value, b: &Value) -> Result<Value, EngineError> {
        let unified = unify(&FieldPath::root(), a, b)?;
        let _ = evaluate(&unified)?;
        Ok(unified)
    }

    fn fill_path(
        &self,
        value: &Value,
        path: &str,
        content: &serde_json::Value,
    ) -> Result<Value, EngineError> {
        let at = FieldPath::parse(path)?;
        let patch = Value::nest(&at, self.encode(content)).ok_or_else(|| EngineError::InvalidPath {
            path: path.to_string(),
        })?;
        self.unify(value, &patch)
    }

    fn validate_concrete(&self, value: &Value) -> Result<(), EngineError> {
        let evaluated = evaluate(value)?;
        let issues = concreteness_issues(&evaluated);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Incomplete { issues })
        }
    }

    fn lookup_path(&self, value: &Value, path: &str) -> Result<Option<Value>, EngineError> {
        let at = FieldPath::parse(path)?;
        let evaluated = evaluate(value)?;
        Ok(evaluated.lookup(&at).cloned())
    }

    fn export(&self, value: &Value) -> Result<serde_json::Value, EngineError> {
        let evaluated = evaluate(value)?;
        let issues = concreteness_issues(&evaluated);
        if !issues.is_empty() {
            return Err(EngineError::Incomplete { issues });
        }
        evaluated.to_json().ok_or_else(|| EngineError::Incomplete {
            issues: vec![crate::error::Incomplete {
                path: FieldPath::root().to_string(),
                reason: format!("cannot export {evaluated}"),
            }],
        })
    }

    fn diagnostics(&self, err: &EngineError, instances: &[Instance<Value>]) -> String {
        diagnostics::render(err, instances)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::loader::SourceFormat;

    fn yaml(name: &str, content: &str) -> Source {
        Source {
            name: name.into(),
            content: content.into(),
            format: SourceFormat::Yaml,
        }
    }

    #[test]
    fn build_instances_collects_every_issue() {
        let engine = ConstraintEngine::new();
        let err = engine
            .build_instances(&[
                yaml("a.yaml", "a: [unclosed\n"),
                yaml("b.yaml", "b: $strnig\n"),
                yaml("c.yaml", "c: 1\n"),
            ])
            .expect_err("issues");
        let EngineError::Parse { issues } = err else {
            panic!("expected parse error");
        };
        let sources: Vec<&str> = issues.iter().map(|i| i.source.as_str()).collect();
        assert_eq!(sources, vec!["a.yaml", "b.yaml"]);
    }

    #[test]
    fn fill_then_export_produces_concrete_data() {
        let engine = ConstraintEngine::new();
        let instances = engine
            .build_instances(&[yaml(
                "schema.yaml",
                "input:\n  name: $string\noutputs:\n  - kind: ConfigMap\n    metadata:\n      name: ${input.name}-cfg\n",
            )])
            .expect("build");
        let schema = &instances[0].value;
        let filled = engine
            .fill_path(schema, "input", &json!({"name": "web"}))
            .expect("fill");
        engine.validate_concrete(&filled).expect("concrete");
        let outputs = engine.lookup_path(&filled, "outputs").expect("lookup").expect("present");
        assert_eq!(
            engine.export(&outputs).expect("export"),
            json!([{"kind": "ConfigMap", "metadata": {"name": "web-cfg"}}])
        );
    }

    #[test]
    fn filled_strings_are_literal() {
        let engine = ConstraintEngine::new();
        let filled = engine
            .fill_path(&Value::Top, "input", &json!({"raw": "${not.a.reference}"}))
            .expect("fill");
        assert_eq!(
            engine.export(&filled).expect("export"),
            json!({"input": {"raw": "${not.a.reference}"}})
        );
    }

    #[test]
    fn fill_with_index_segment_is_rejected() {
        let engine = ConstraintEngine::new();
        let err = engine
            .fill_path(&Value::Top, "items[0]", &json!(1))
            .expect_err("index");
        assert!(matches!(err, EngineError::InvalidPath { .. }));
    }

    #[test]
    fn contradicting_fill_is_a_conflict() {
        let engine = ConstraintEngine::new();
        let schema = engine.encode(&json!({"kind": "ConfigMap"}));
        let err = engine
            .fill_path(&schema, "kind", &json!("Secret"))
            .expect_err("conflict");
        assert!(matches!(err, EngineError::Conflict { ref path, .. } if path == "kind"));
    }

    #[test]
    fn load_dir_without_documents_reports_no_instances() {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        std::fs::write(dir.path().join("empty.yaml"), "\n").expect("write");
        let err = ConstraintEngine::new().load_dir(dir.path()).expect_err("empty");
        assert!(matches!(err, EngineError::NoInstances { .. }));
    }
}
