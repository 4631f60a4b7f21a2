//! Reference evaluation and the concreteness check.
//!
//! References are resolved lazily against the unevaluated root: looking up
//! `a.b` only evaluates the nodes on the way to `a.b` that cannot be walked
//! as they are (references and disjunctions). A reference whose target does
//! not exist yet stays deferred; a later fill may provide it.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

use crate::dialect::normalize_disjunction;
use crate::error::{EngineError, Incomplete};
use crate::path::FieldPath;
use crate::unify::unify;
use crate::value::{Deferred, Expr, Field, Part, StructValue, Value};

const MAX_DEPTH: usize = 256;

/// Resolves every reference in `root` that can be resolved.
///
/// # Errors
///
/// Returns `EngineError::Conflict` when a resolved value contradicts its
/// constraint, `EngineError::Cycle` for self-referencing values and
/// `EngineError::Interpolation` when a struct or list is interpolated.
pub fn evaluate(root: &Value) -> Result<Value, EngineError> {
    Evaluator::new(root).eval_node(&FieldPath::root(), root)
}

/// Lists every non-optional node of an evaluated value that is not concrete.
#[must_use]
pub fn concreteness_issues(value: &Value) -> Vec<Incomplete> {
    let mut issues = Vec::new();
    collect_issues(&FieldPath::root(), value, &mut issues);
    issues
}

fn collect_issues(at: &FieldPath, value: &Value, issues: &mut Vec<Incomplete>) {
    match value.settled() {
        Value::Struct(s) => {
            for field in &s.fields {
                if field.optional && field.value.to_json().is_none() {
                    continue;
                }
                collect_issues(&at.field(&field.name), &field.value, issues);
            }
        }
        Value::List(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_issues(&at.index(i), item, issues);
            }
        }
        Value::Float(x) if !x.is_finite() => issues.push(Incomplete {
            path: at.to_string(),
            reason: format!("non-finite number {x}"),
        }),
        v if v.is_scalar_literal() => {}
        v => issues.push(Incomplete {
            path: at.to_string(),
            reason: reason(v),
        }),
    }
}

fn reason(value: &Value) -> String {
    match value {
        Value::Top => "value is unset".to_string(),
        Value::Type(kind) => format!("incomplete value {kind}"),
        Value::Pattern(_) => format!("incomplete string {value}"),
        Value::Disjunction { .. } => format!("unresolved disjunction {value}"),
        Value::Deferred(d) => format!("unresolved reference {}", d.expr),
        other => format!("not concrete: {other}"),
    }
}

/// Nodes that must be evaluated before they can be walked into.
const fn needs_evaluation(value: &Value) -> bool {
    matches!(value, Value::Deferred(_) | Value::Disjunction { .. })
}

/// A plain `${path}` with no further constraint.
fn alias_of(value: &Value) -> Option<&FieldPath> {
    match value {
        Value::Deferred(Deferred {
            expr: Expr::Ref(target),
            constraint,
        }) if **constraint == Value::Top => Some(target),
        _ => None,
    }
}

struct Evaluator<'a> {
    root: &'a Value,
    cache: HashMap<FieldPath, Value>,
    active: HashSet<String>,
    depth: usize,
}

impl<'a> Evaluator<'a> {
    fn new(root: &'a Value) -> Self {
        Self {
            root,
            cache: HashMap::new(),
            active: HashSet::new(),
            depth: 0,
        }
    }

    fn eval_node(&mut self, at: &FieldPath, raw: &Value) -> Result<Value, EngineError> {
        match raw {
            Value::Struct(s) => {
                let mut fields = Vec::with_capacity(s.fields.len());
                for field in &s.fields {
                    fields.push(Field {
                        name: field.name.clone(),
                        value: self.eval_node(&at.field(&field.name), &field.value)?,
                        optional: field.optional,
                    });
                }
                Ok(Value::Struct(StructValue {
                    fields,
                    closed: s.closed,
                }))
            }
            Value::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.eval_node(&at.index(i), item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Value::Deferred(d) => self.eval_deferred(at, d),
            Value::Disjunction {
                alternatives,
                default,
            } => self.eval_disjunction(at, alternatives, default.as_deref()),
            other => Ok(other.clone()),
        }
    }

    fn eval_deferred(&mut self, at: &FieldPath, d: &Deferred) -> Result<Value, EngineError> {
        let key = format!("{at}={}", d.expr);
        if !self.active.insert(key.clone()) {
            return Err(EngineError::Cycle {
                path: at.to_string(),
                reference: d.expr.to_string(),
            });
        }
        let result = self.eval_expr(at, d);
        let _ = self.active.remove(&key);
        result
    }

    fn eval_expr(&mut self, at: &FieldPath, d: &Deferred) -> Result<Value, EngineError> {
        let constraint = self.eval_node(at, &d.constraint)?;
        let resolved = match &d.expr {
            Expr::Ref(target) => self.resolve(target)?,
            Expr::Interpolation(parts) => self.interpolate(at, parts)?,
        };
        match resolved {
            Some(value) => unify(at, &value, &constraint),
            None => Ok(Value::Deferred(Deferred {
                expr: d.expr.clone(),
                constraint: Box::new(constraint),
            })),
        }
    }

    fn interpolate(&mut self, at: &FieldPath, parts: &[Part]) -> Result<Option<Value>, EngineError> {
        let mut out = String::new();
        for part in parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Ref(target) => {
                    let Some(value) = self.resolve(target)? else {
                        return Ok(None);
                    };
                    let settled = value.settled();
                    if let Some(text) = settled.as_text() {
                        out.push_str(&text);
                    } else if matches!(settled, Value::Struct(_) | Value::List(_)) {
                        return Err(EngineError::Interpolation {
                            path: at.to_string(),
                            reference: target.to_string(),
                            message: format!("{settled} is not a scalar"),
                        });
                    } else {
                        return Ok(None);
                    }
                }
            }
        }
        Ok(Some(Value::String(out)))
    }

    fn eval_disjunction(
        &mut self,
        at: &FieldPath,
        alternatives: &[Value],
        default: Option<&Value>,
    ) -> Result<Value, EngineError> {
        let mut kept = Vec::with_capacity(alternatives.len());
        let mut first_error = None;
        for alt in alternatives {
            match self.eval_node(at, alt) {
                Ok(v) => kept.push(v),
                Err(e @ EngineError::Cycle { .. }) => return Err(e),
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        if kept.is_empty() {
            return Err(first_error.unwrap_or_else(|| EngineError::Conflict {
                path: at.to_string(),
                left: "empty disjunction".to_string(),
                right: Value::Top.to_string(),
            }));
        }
        let default = match default.map(|d| self.eval_node(at, d)) {
            Some(Ok(v)) => Some(v).filter(|v| kept.contains(v)),
            Some(Err(e @ EngineError::Cycle { .. })) => return Err(e),
            Some(Err(_)) | None => None,
        };
        Ok(normalize_disjunction(kept, default))
    }

    /// The evaluated value at `target`, or `None` if nothing is there yet.
    fn resolve(&mut self, target: &FieldPath) -> Result<Option<Value>, EngineError> {
        if let Some(hit) = self.cache.get(target) {
            return Ok(Some(hit.clone()));
        }
        if self.depth >= MAX_DEPTH {
            return Err(EngineError::Cycle {
                path: target.to_string(),
                reference: Expr::Ref(target.clone()).to_string(),
            });
        }
        self.depth += 1;
        let result = self.resolve_uncached(target);
        self.depth -= 1;
        if let Ok(Some(value)) = &result {
            let _ = self.cache.insert(target.clone(), value.clone());
        }
        result
    }

    fn resolve_uncached(&mut self, target: &FieldPath) -> Result<Option<Value>, EngineError> {
        let root: &'a Value = self.root;
        let segments = target.segments();
        let mut at = FieldPath::root();
        let mut current = Cow::Borrowed(root);
        let mut evaluated = false;

        for (i, segment) in segments.iter().enumerate() {
            if !evaluated {
                if let Some(alias) = alias_of(&current) {
                    let redirected = alias.join(&segments[i..]);
                    return self.resolve(&redirected);
                }
                if needs_evaluation(&current) {
                    current = Cow::Owned(self.eval_node(&at, &current)?);
                    evaluated = true;
                }
            }
            let child = match current {
                Cow::Borrowed(v) => v.child(segment).map(Cow::Borrowed),
                Cow::Owned(v) => v.child(segment).cloned().map(Cow::Owned),
            };
            let Some(child) = child else {
                return Ok(None);
            };
            current = child;
            at = at.join(std::slice::from_ref(segment));
        }

        if evaluated {
            Ok(Some(current.into_owned()))
        } else {
            self.eval_node(&at, &current).map(Some)
        }
    }
}
