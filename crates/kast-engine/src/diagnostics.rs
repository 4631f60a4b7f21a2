//! Human-readable rendering of engine errors.

use std::fmt::Write as _;

use crate::engine::Instance;
use crate::error::EngineError;
use crate::path::FieldPath;
use crate::value::Value;

/// Renders `err` with the module files that declare the offending path.
///
/// For paths no instance declares (such as a field rejected by a closed
/// struct) the closest declared ancestor is reported instead.
#[must_use]
pub fn render(err: &EngineError, instances: &[Instance<Value>]) -> String {
    let mut out = err.to_string();
    match err {
        EngineError::Parse { issues } if issues.len() > 1 => {
            for issue in issues {
                let _ = write!(out, "\n    {issue}");
            }
        }
        EngineError::Incomplete { issues } if issues.len() > 1 => {
            for issue in issues {
                let _ = write!(out, "\n    {issue}");
            }
        }
        _ => {}
    }

    let Some(path) = err.path().and_then(|p| FieldPath::parse(p).ok()) else {
        return out;
    };
    if let Some((declared_at, files)) = declarers(&path, instances) {
        if declared_at == path {
            let _ = write!(out, "\n    declared in: {}", files.join(", "));
        } else {
            let _ = write!(out, "\n    {declared_at} declared in: {}", files.join(", "));
        }
    }
    out
}

fn declarers<'a>(
    path: &FieldPath,
    instances: &'a [Instance<Value>],
) -> Option<(FieldPath, Vec<&'a str>)> {
    let mut current = Some(path.clone());
    while let Some(at) = current {
        if at.is_root() {
            return None;
        }
        let files: Vec<&str> = instances
            .iter()
            .filter(|i| i.value.lookup(&at).is_some())
            .map(|i| i.name.as_str())
            .collect();
        if !files.is_empty() {
            return Some((at, files));
        }
        current = at.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dialect::decode;

    fn instance(name: &str, doc: serde_json::Value) -> Instance<Value> {
        Instance {
            name: name.into(),
            value: decode(&doc).expect("decode"),
        }
    }

    #[test]
    fn conflict_lists_declaring_files() {
        let instances = vec![
            instance("schema.yaml", json!({"input": {"replicas": "$int"}})),
            instance("defaults.yaml", json!({"input": {"replicas": 3}})),
            instance("outputs.yaml", json!({"outputs": []})),
        ];
        let err = EngineError::Conflict {
            path: "input.replicas".into(),
            left: "3".into(),
            right: "5".into(),
        };
        let text = render(&err, &instances);
        assert!(text.starts_with("conflicting values at input.replicas: 3 and 5"), "{text}");
        assert!(text.ends_with("declared in: schema.yaml, defaults.yaml"), "{text}");
    }

    #[test]
    fn undeclared_field_falls_back_to_ancestor() {
        let instances = vec![instance("schema.yaml", json!({"input": {"$closed": true}}))];
        let err = EngineError::FieldNotAllowed {
            path: "input.extra".into(),
        };
        let text = render(&err, &instances);
        assert!(text.ends_with("input declared in: schema.yaml"), "{text}");
    }

    #[test]
    fn incomplete_lists_every_issue() {
        let err = EngineError::Incomplete {
            issues: vec![
                crate::error::Incomplete {
                    path: "a".into(),
                    reason: "incomplete value int".into(),
                },
                crate::error::Incomplete {
                    path: "b".into(),
                    reason: "value is unset".into(),
                },
            ],
        };
        let text = render(&err, &[]);
        assert!(text.contains("\n    a: incomplete value int"), "{text}");
        assert!(text.contains("\n    b: value is unset"), "{text}");
    }
}
