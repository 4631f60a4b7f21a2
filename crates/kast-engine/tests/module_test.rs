//! Loading module directories and driving them through fills.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::Path;

use kast_engine::{ConstraintEngine, Engine, EngineError};
use serde_json::json;

fn write(root: &Path, name: &str, content: &str) {
    std::fs::write(root.join(name), content).expect("write");
}

fn web_module(root: &Path) {
    write(
        root,
        "schema.yaml",
        r"
apiVersion: $string
kind: $string
metadata: $struct
input:
  $closed: true
  name: $string
  replicas: $int
  env:
    $oneOf: [dev, prod]
    $default: dev
  labels?: $struct
",
    );
    write(
        root,
        "outputs.yaml",
        r"
outputs:
  deployment:
    apiVersion: apps/v1
    kind: Deployment
    metadata:
      name: ${input.name}
      labels:
        env: ${input.env}
    spec:
      replicas: ${input.replicas}
",
    );
}

fn build(engine: &ConstraintEngine, dir: &Path) -> kast_engine::Value {
    let instances = engine.load_dir(dir).expect("load");
    instances
        .iter()
        .skip(1)
        .try_fold(instances[0].value.clone(), |acc, i| engine.unify(&acc, &i.value))
        .expect("schema")
}

// ── Fill and export ──────────────────────────────────────────────────

#[test]
fn module_with_input_exports_outputs() {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    web_module(dir.path());
    let engine = ConstraintEngine::new();
    let mut value = build(&engine, dir.path());

    for (path, content) in [
        ("apiVersion", json!("fn.kast.dev/v1")),
        ("kind", json!("Web")),
        ("metadata", json!({"name": "web"})),
        ("input", json!({"name": "web", "replicas": 2})),
        ("includes", json!({})),
    ] {
        value = engine.fill_path(&value, path, &content).expect("fill");
    }
    engine.validate_concrete(&value).expect("concrete");

    let outputs = engine.lookup_path(&value, "outputs").expect("lookup").expect("outputs");
    assert_eq!(
        engine.export(&outputs).expect("export"),
        json!({
            "deployment": {
                "apiVersion": "apps/v1",
                "kind": "Deployment",
                "metadata": {"name": "web", "labels": {"env": "dev"}},
                "spec": {"replicas": 2},
            }
        })
    );
}

// ── Failures ─────────────────────────────────────────────────────────

#[test]
fn missing_input_fails_concreteness_with_every_path() {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    web_module(dir.path());
    let engine = ConstraintEngine::new();
    let value = engine
        .fill_path(&build(&engine, dir.path()), "input", &json!({"name": "web"}))
        .expect("fill");

    let err = engine.validate_concrete(&value).expect_err("incomplete");
    let EngineError::Incomplete { issues } = err else {
        panic!("expected incomplete");
    };
    let paths: Vec<&str> = issues.iter().map(|i| i.path.as_str()).collect();
    assert!(paths.contains(&"input.replicas"), "{paths:?}");
    assert!(paths.contains(&"outputs.deployment.spec.replicas"), "{paths:?}");
    assert!(paths.contains(&"apiVersion"), "{paths:?}");
}

#[test]
fn unknown_input_field_is_rejected_with_location() {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    web_module(dir.path());
    let engine = ConstraintEngine::new();
    let instances = engine.load_dir(dir.path()).expect("load");
    let value = build(&engine, dir.path());

    let err = engine
        .fill_path(&value, "input", &json!({"name": "web", "replicas": 1, "extra": true}))
        .expect_err("closed");
    assert!(matches!(err, EngineError::FieldNotAllowed { .. }), "{err}");
    let text = engine.diagnostics(&err, &instances);
    assert!(text.contains("input declared in: schema.yaml"), "{text}");
}

#[test]
fn conflicting_module_files_report_both_values() {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    write(dir.path(), "a.yaml", "input:\n  replicas: 3\n");
    write(dir.path(), "b.yaml", "input:\n  replicas: 5\n");
    let engine = ConstraintEngine::new();
    let instances = engine.load_dir(dir.path()).expect("load");
    let err = engine
        .unify(&instances[0].value, &instances[1].value)
        .expect_err("conflict");
    let text = engine.diagnostics(&err, &instances);
    assert!(text.contains("input.replicas: 3 and 5"), "{text}");
    assert!(text.contains("declared in: a.yaml, b.yaml"), "{text}");
}

#[test]
fn broken_files_are_all_reported() {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    write(dir.path(), "a.yaml", "a: [\n");
    write(dir.path(), "b.json", "[1, 2]");
    let err = ConstraintEngine::new().load_dir(dir.path()).expect_err("broken");
    let EngineError::Parse { issues } = err else {
        panic!("expected parse error");
    };
    assert_eq!(issues.len(), 2);
    assert_eq!(issues[1].source, "b.json");
}
