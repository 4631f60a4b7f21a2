//! The constraint value model.
//!
//! A [`Value`] is either concrete data (literals, structs, lists) or a
//! constraint still waiting to be narrowed: a type, a string pattern, a
//! disjunction, or a reference deferred until its target is known.

use std::fmt;

use serde_json::{Map, Number};

use crate::path::{FieldPath, Segment};

/// Type constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Any string.
    String,
    /// Any integer.
    Int,
    /// Any float.
    Float,
    /// Any integer or float.
    Number,
    /// `true` or `false`.
    Bool,
    /// Any struct.
    Struct,
    /// Any list.
    List,
}

impl Kind {
    /// Greatest kind contained in both, if any.
    #[must_use]
    pub fn meet(self, other: Self) -> Option<Self> {
        match (self, other) {
            (a, b) if a == b => Some(a),
            (Self::Number, k @ (Self::Int | Self::Float))
            | (k @ (Self::Int | Self::Float), Self::Number) => Some(k),
            _ => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::Struct => "struct",
            Self::List => "list",
        })
    }
}

/// A struct field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name.
    pub name: String,
    /// Field value.
    pub value: Value,
    /// Optional fields may stay non-concrete; they are then omitted on export.
    pub optional: bool,
}

/// An ordered struct.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructValue {
    /// Fields in declaration order.
    pub fields: Vec<Field>,
    /// Closed structs reject fields they do not declare.
    pub closed: bool,
}

impl StructValue {
    /// Looks up a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Appends or replaces a required field.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        if let Some(field) = self.fields.iter_mut().find(|f| f.name == name) {
            field.value = value;
        } else {
            self.fields.push(Field {
                name,
                value,
                optional: false,
            });
        }
    }
}

/// A piece of an interpolated string.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    /// Literal text.
    Text(String),
    /// Reference rendered as text.
    Ref(FieldPath),
}

/// An expression whose value depends on other parts of the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// The value at an absolute path.
    Ref(FieldPath),
    /// A string assembled from text and scalar references.
    Interpolation(Vec<Part>),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ref(path) => write!(f, "${{{path}}}"),
            Self::Interpolation(parts) => {
                f.write_str("\"")?;
                for part in parts {
                    match part {
                        Part::Text(text) => f.write_str(&text.replace('$', "$$"))?,
                        Part::Ref(path) => write!(f, "${{{path}}}")?,
                    }
                }
                f.write_str("\"")
            }
        }
    }
}

/// A reference that has not been resolved yet, plus whatever else is known
/// about the value at its position.
#[derive(Debug, Clone, PartialEq)]
pub struct Deferred {
    /// The expression to resolve.
    pub expr: Expr,
    /// Constraint the resolved value must also satisfy.
    pub constraint: Box<Value>,
}

/// A constraint value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Anything; the neutral element of unification.
    Top,
    /// `null`.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// String literal.
    String(String),
    /// Any value of a kind.
    Type(Kind),
    /// A string matching every listed regular expression.
    Pattern(Vec<String>),
    /// One of several alternatives, with an optional default.
    Disjunction {
        /// Remaining alternatives.
        alternatives: Vec<Value>,
        /// Alternative chosen when nothing narrows the disjunction further.
        default: Option<Box<Value>>,
    },
    /// A struct.
    Struct(StructValue),
    /// A list.
    List(Vec<Value>),
    /// An unresolved reference.
    Deferred(Deferred),
}

impl Value {
    /// Converts plain data into literal values. Strings are never
    /// interpreted.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or(f64::NAN)), Self::Int),
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            serde_json::Value::Object(map) => Self::Struct(StructValue {
                fields: map
                    .iter()
                    .map(|(k, v)| Field {
                        name: k.clone(),
                        value: Self::from_json(v),
                        optional: false,
                    })
                    .collect(),
                closed: false,
            }),
        }
    }

    /// Builds the value holding `content` at `path` and nothing else.
    ///
    /// Returns `None` when the path contains a list index.
    #[must_use]
    pub fn nest(path: &FieldPath, content: Self) -> Option<Self> {
        let mut value = content;
        for segment in path.segments().iter().rev() {
            match segment {
                Segment::Field(name) => {
                    let mut inner = StructValue::default();
                    inner.set(name.clone(), value);
                    value = Self::Struct(inner);
                }
                Segment::Index(_) => return None,
            }
        }
        Some(value)
    }

    /// Follows `path` through structs, lists and disjunction defaults.
    #[must_use]
    pub fn lookup(&self, path: &FieldPath) -> Option<&Self> {
        path.segments()
            .iter()
            .try_fold(self, |current, segment| current.child(segment))
    }

    /// Returns the direct child at `segment`, seeing through disjunction
    /// defaults.
    #[must_use]
    pub fn child(&self, segment: &Segment) -> Option<&Self> {
        match (self.settled(), segment) {
            (Self::Struct(s), Segment::Field(name)) => s.get(name).map(|f| &f.value),
            (Self::List(items), Segment::Index(i)) => items.get(*i),
            _ => None,
        }
    }

    /// The value a disjunction settles on (its only alternative or its
    /// default); any other value is returned as is.
    #[must_use]
    pub fn settled(&self) -> &Self {
        match self {
            Self::Disjunction {
                alternatives,
                default,
            } => match (alternatives.as_slice(), default) {
                ([only], _) => only.settled(),
                (_, Some(d)) => d.settled(),
                _ => self,
            },
            other => other,
        }
    }

    /// Whether the value is a scalar literal.
    #[must_use]
    pub const fn is_scalar_literal(&self) -> bool {
        matches!(
            self,
            Self::Null | Self::Bool(_) | Self::Int(_) | Self::Float(_) | Self::String(_)
        )
    }

    /// Renders a scalar literal as interpolated text.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => Some("null".to_string()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(x) => Some(x.to_string()),
            Self::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Converts a fully concrete value to JSON. Optional fields that are not
    /// concrete are skipped. Returns `None` if anything else is not concrete.
    #[must_use]
    pub fn to_json(&self) -> Option<serde_json::Value> {
        match self.settled() {
            Self::Null => Some(serde_json::Value::Null),
            Self::Bool(b) => Some(serde_json::Value::Bool(*b)),
            Self::Int(i) => Some(serde_json::Value::Number((*i).into())),
            Self::Float(x) => Number::from_f64(*x).map(serde_json::Value::Number),
            Self::String(s) => Some(serde_json::Value::String(s.clone())),
            Self::List(items) => items
                .iter()
                .map(Self::to_json)
                .collect::<Option<Vec<_>>>()
                .map(serde_json::Value::Array),
            Self::Struct(s) => {
                let mut map = Map::new();
                for field in &s.fields {
                    match field.value.to_json() {
                        Some(v) => {
                            let _ = map.insert(field.name.clone(), v);
                        }
                        None if field.optional => {}
                        None => return None,
                    }
                }
                Some(serde_json::Value::Object(map))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Top => f.write_str("_"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Type(kind) => write!(f, "{kind}"),
            Self::Pattern(patterns) => {
                let rendered: Vec<String> = patterns.iter().map(|p| format!("=~{p:?}")).collect();
                f.write_str(&rendered.join(" & "))
            }
            Self::Disjunction {
                alternatives,
                default,
            } => {
                let rendered: Vec<String> = alternatives
                    .iter()
                    .map(|alt| {
                        if default.as_deref() == Some(alt) {
                            format!("*{alt}")
                        } else {
                            alt.to_string()
                        }
                    })
                    .collect();
                f.write_str(&rendered.join(" | "))
            }
            Self::Struct(s) => {
                let names: Vec<&str> = s.fields.iter().map(|fl| fl.name.as_str()).collect();
                write!(f, "{{{}}}", names.join(", "))
            }
            Self::List(items) => write!(f, "[{} items]", items.len()),
            Self::Deferred(d) => write!(f, "{}", d.expr),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn from_json_keeps_field_order_and_literal_strings() {
        let value = Value::from_json(&json!({"b": 1, "a": "${not.a.ref}", "c": [1.5, null]}));
        let Value::Struct(s) = &value else {
            panic!("expected struct");
        };
        let names: Vec<&str> = s.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert_eq!(s.get("a").map(|f| &f.value), Some(&Value::String("${not.a.ref}".into())));
    }

    #[test]
    fn nest_builds_struct_chain() {
        let path = FieldPath::parse("a.b").expect("path");
        let value = Value::nest(&path, Value::Int(1)).expect("nest");
        assert_eq!(value.lookup(&path), Some(&Value::Int(1)));
        assert!(Value::nest(&FieldPath::parse("a[0]").expect("path"), Value::Null).is_none());
    }

    #[test]
    fn lookup_sees_through_disjunction_default() {
        let value = Value::from_json(&json!({"env": {"name": "dev"}}));
        let disjunction = Value::Disjunction {
            alternatives: vec![value.clone(), Value::Top],
            default: Some(Box::new(value)),
        };
        let path = FieldPath::parse("env.name").expect("path");
        assert_eq!(disjunction.lookup(&path), Some(&Value::String("dev".into())));
    }

    #[test]
    fn to_json_skips_incomplete_optional_fields() {
        let value = Value::Struct(StructValue {
            fields: vec![
                Field {
                    name: "name".into(),
                    value: Value::String("web".into()),
                    optional: false,
                },
                Field {
                    name: "labels".into(),
                    value: Value::Type(Kind::Struct),
                    optional: true,
                },
            ],
            closed: false,
        });
        assert_eq!(value.to_json(), Some(json!({"name": "web"})));

        let incomplete = Value::List(vec![Value::Type(Kind::Int)]);
        assert_eq!(incomplete.to_json(), None);
    }

    #[test]
    fn kind_meet_narrows_number() {
        assert_eq!(Kind::Number.meet(Kind::Int), Some(Kind::Int));
        assert_eq!(Kind::Float.meet(Kind::Number), Some(Kind::Float));
        assert_eq!(Kind::Int.meet(Kind::Float), None);
    }
}
