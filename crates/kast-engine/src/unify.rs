//! Unification: the greatest value satisfying both operands.

use regex::Regex;

use crate::dialect::normalize_disjunction;
use crate::error::EngineError;
use crate::path::FieldPath;
use crate::value::{Deferred, Field, Kind, StructValue, Value};

/// Unifies `a` and `b`, located at `at`.
///
/// # Errors
///
/// Returns `EngineError::Conflict` when no value satisfies both operands, or
/// `EngineError::FieldNotAllowed` when a closed struct meets an undeclared
/// field.
pub fn unify(at: &FieldPath, a: &Value, b: &Value) -> Result<Value, EngineError> {
    match (a, b) {
        (Value::Top, other) | (other, Value::Top) => Ok(other.clone()),
        (Value::Deferred(d), other) | (other, Value::Deferred(d)) => unify_deferred(at, d, other),
        (Value::Disjunction { alternatives, default }, other)
        | (other, Value::Disjunction { alternatives, default }) => {
            unify_disjunction(at, alternatives, default.as_deref(), other)
        }
        (Value::Struct(x), Value::Struct(y)) => unify_structs(at, x, y).map(Value::Struct),
        (Value::List(x), Value::List(y)) => {
            if x.len() != y.len() {
                return Err(conflict(at, a, b));
            }
            x.iter()
                .zip(y)
                .enumerate()
                .map(|(i, (l, r))| unify(&at.index(i), l, r))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List)
        }
        (Value::Type(x), Value::Type(y)) => x
            .meet(*y)
            .map(Value::Type)
            .ok_or_else(|| conflict(at, a, b)),
        (Value::Type(kind), other) | (other, Value::Type(kind)) => {
            if admits(*kind, other) {
                Ok(other.clone())
            } else {
                Err(conflict(at, a, b))
            }
        }
        (Value::Pattern(x), Value::Pattern(y)) => {
            let mut patterns = x.clone();
            patterns.extend(y.iter().filter(|p| !x.contains(p)).cloned());
            Ok(Value::Pattern(patterns))
        }
        (Value::Pattern(patterns), Value::String(s)) | (Value::String(s), Value::Pattern(patterns)) => {
            if patterns.iter().all(|p| pattern_matches(p, s)) {
                Ok(Value::String(s.clone()))
            } else {
                Err(conflict(at, a, b))
            }
        }
        _ if a == b => Ok(a.clone()),
        _ => Err(conflict(at, a, b)),
    }
}

fn conflict(at: &FieldPath, a: &Value, b: &Value) -> EngineError {
    EngineError::Conflict {
        path: at.to_string(),
        left: a.to_string(),
        right: b.to_string(),
    }
}

/// Whether a value of `kind` can be `value`.
fn admits(kind: Kind, value: &Value) -> bool {
    match value {
        Value::Bool(_) => kind == Kind::Bool,
        Value::Int(_) => matches!(kind, Kind::Int | Kind::Number),
        Value::Float(_) => matches!(kind, Kind::Float | Kind::Number),
        Value::String(_) | Value::Pattern(_) => kind == Kind::String,
        Value::Struct(_) => kind == Kind::Struct,
        Value::List(_) => kind == Kind::List,
        _ => false,
    }
}

fn pattern_matches(pattern: &str, s: &str) -> bool {
    Regex::new(pattern).is_ok_and(|re| re.is_match(s))
}

fn unify_deferred(at: &FieldPath, d: &Deferred, other: &Value) -> Result<Value, EngineError> {
    if let Value::Deferred(e) = other {
        if e.expr == d.expr {
            return Ok(Value::Deferred(Deferred {
                expr: d.expr.clone(),
                constraint: Box::new(unify(at, &d.constraint, &e.constraint)?),
            }));
        }
    }
    Ok(Value::Deferred(Deferred {
        expr: d.expr.clone(),
        constraint: Box::new(unify(at, &d.constraint, other)?),
    }))
}

fn unify_disjunction(
    at: &FieldPath,
    alternatives: &[Value],
    default: Option<&Value>,
    other: &Value,
) -> Result<Value, EngineError> {
    let (others, other_default) = match other {
        Value::Disjunction {
            alternatives,
            default,
        } => (alternatives.clone(), default.as_deref()),
        single => (vec![single.clone()], None),
    };

    let mut narrowed = Vec::new();
    for alt in alternatives {
        for candidate in &others {
            if let Ok(v) = unify(at, alt, candidate) {
                narrowed.push(v);
            }
        }
    }
    if narrowed.is_empty() {
        let whole = Value::Disjunction {
            alternatives: alternatives.to_vec(),
            default: default.cloned().map(Box::new),
        };
        return Err(conflict(at, &whole, other));
    }

    let default = match (default, other_default) {
        (Some(x), Some(y)) => unify(at, x, y).ok(),
        (Some(x), None) if !matches!(other, Value::Disjunction { .. }) => unify(at, x, other).ok(),
        (Some(x), None) => Some(x.clone()),
        (None, Some(y)) => Some(y.clone()),
        (None, None) => None,
    }
    .filter(|d| narrowed.contains(d));
    Ok(normalize_disjunction(narrowed, default))
}

fn unify_structs(
    at: &FieldPath,
    x: &StructValue,
    y: &StructValue,
) -> Result<StructValue, EngineError> {
    let mut fields: Vec<Field> = Vec::with_capacity(x.fields.len() + y.fields.len());
    for field in &x.fields {
        match y.get(&field.name) {
            Some(other) => fields.push(Field {
                name: field.name.clone(),
                value: unify(&at.field(&field.name), &field.value, &other.value)?,
                optional: field.optional && other.optional,
            }),
            None if y.closed => {
                return Err(EngineError::FieldNotAllowed {
                    path: at.field(&field.name).to_string(),
                });
            }
            None => fields.push(field.clone()),
        }
    }
    for field in &y.fields {
        if x.get(&field.name).is_some() {
            continue;
        }
        if x.closed {
            return Err(EngineError::FieldNotAllowed {
                path: at.field(&field.name).to_string(),
            });
        }
        fields.push(field.clone());
    }
    Ok(StructValue {
        fields,
        closed: x.closed || y.closed,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dialect::decode;

    fn root() -> FieldPath {
        FieldPath::root()
    }

    fn module(doc: serde_json::Value) -> Value {
        decode(&doc).expect("decode")
    }

    #[test]
    fn top_is_neutral() {
        let v = Value::Int(3);
        assert_eq!(unify(&root(), &Value::Top, &v).expect("unify"), v);
        assert_eq!(unify(&root(), &v, &Value::Top).expect("unify"), v);
    }

    #[test]
    fn types_narrow_to_literals() {
        let int = Value::Type(Kind::Int);
        assert_eq!(unify(&root(), &int, &Value::Int(2)).expect("unify"), Value::Int(2));
        assert!(unify(&root(), &int, &Value::String("2".into())).is_err());
        assert_eq!(
            unify(&root(), &Value::Type(Kind::Number), &Value::Float(1.5)).expect("unify"),
            Value::Float(1.5)
        );
        assert!(unify(&root(), &Value::Type(Kind::Int), &Value::Float(1.5)).is_err());
    }

    #[test]
    fn distinct_literals_conflict_with_path() {
        let at = FieldPath::parse("input.replicas").expect("path");
        let err = unify(&at, &Value::Int(3), &Value::Int(5)).expect_err("conflict");
        match err {
            EngineError::Conflict { path, left, right } => {
                assert_eq!(path, "input.replicas");
                assert_eq!(left, "3");
                assert_eq!(right, "5");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn structs_merge_in_declaration_order() {
        let a = module(json!({"b": "$int", "a": 1}));
        let b = module(json!({"c": true, "b": 2}));
        let merged = unify(&root(), &a, &b).expect("unify");
        assert_eq!(merged.to_json(), Some(json!({"b": 2, "a": 1, "c": true})));
    }

    #[test]
    fn closed_struct_rejects_unknown_field() {
        let schema = module(json!({"input": {"$closed": true, "replicas": "$int"}}));
        let data = Value::from_json(&json!({"input": {"replicas": 2, "extra": 1}}));
        let err = unify(&root(), &schema, &data).expect_err("closed");
        assert!(matches!(err, EngineError::FieldNotAllowed { ref path } if path == "input.extra"));
    }

    #[test]
    fn lists_unify_elementwise_and_require_equal_length() {
        let a = module(json!(["$string", "$int"]));
        let ok = unify(&root(), &a, &Value::from_json(&json!(["x", 1]))).expect("unify");
        assert_eq!(ok.to_json(), Some(json!(["x", 1])));
        assert!(unify(&root(), &a, &Value::from_json(&json!(["x"]))).is_err());
    }

    #[test]
    fn disjunction_filters_alternatives_and_keeps_default() {
        let env = module(json!({"$oneOf": ["dev", "staging", "prod"], "$default": "dev"}));
        let narrowed = unify(&root(), &env, &Value::String("prod".into())).expect("unify");
        assert_eq!(narrowed, Value::String("prod".into()));

        let open = unify(&root(), &env, &Value::Type(Kind::String)).expect("unify");
        assert_eq!(open.settled(), &Value::String("dev".into()));

        assert!(unify(&root(), &env, &Value::String("qa".into())).is_err());
    }

    #[test]
    fn patterns_check_strings() {
        let image = module(json!("$match:^registry\\.local/"));
        assert!(unify(&root(), &image, &Value::String("registry.local/web:1".into())).is_ok());
        assert!(unify(&root(), &image, &Value::String("docker.io/web:1".into())).is_err());
        let both = unify(&root(), &image, &module(json!("$match::[0-9]+$"))).expect("patterns");
        assert!(unify(&root(), &both, &Value::String("registry.local/web:12".into())).is_ok());
        assert!(unify(&root(), &both, &Value::String("registry.local/web:latest".into())).is_err());
    }

    #[test]
    fn deferred_accumulates_constraints() {
        let reference = module(json!("${input.replicas}"));
        let constrained = unify(&root(), &reference, &Value::Type(Kind::Int)).expect("unify");
        let Value::Deferred(d) = constrained else {
            panic!("expected deferred");
        };
        assert_eq!(*d.constraint, Value::Type(Kind::Int));
    }
}
