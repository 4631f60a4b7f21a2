//! Module documents: plain YAML/JSON data with a few `$` directives.
//!
//! | written as | meaning |
//! |---|---|
//! | `$string` `$int` `$float` `$number` `$bool` `$struct` `$list` | any value of that kind |
//! | `$any` | anything |
//! | `$match:<regex>` | a string matching the regex |
//! | `${path}` | the value at `path` |
//! | `text ${path} text` | string interpolation |
//! | `$$text` | the literal string `$text` |
//! | `{$oneOf: [..], $default: x}` | one of the alternatives, `x` by default |
//! | `$closed: true` | the struct rejects undeclared fields |
//! | `key?: v` | optional field |

use regex::Regex;
use serde_json::Map;

use crate::error::EngineError;
use crate::path::FieldPath;
use crate::unify::unify;
use crate::value::{Deferred, Expr, Field, Kind, Part, StructValue, Value};

const ONE_OF: &str = "$oneOf";
const DEFAULT: &str = "$default";
const CLOSED: &str = "$closed";
const MATCH_PREFIX: &str = "$match:";

/// Decodes a module document into a constraint value.
///
/// # Errors
///
/// Returns `EngineError::Dialect` naming the offending path for unknown
/// directives, invalid regexes, malformed references or misplaced keys.
pub fn decode(document: &serde_json::Value) -> Result<Value, EngineError> {
    decode_at(&FieldPath::root(), document)
}

fn decode_at(at: &FieldPath, document: &serde_json::Value) -> Result<Value, EngineError> {
    match document {
        serde_json::Value::String(s) => decode_string(at, s),
        serde_json::Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| decode_at(&at.index(i), item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        serde_json::Value::Object(map) => decode_object(at, map),
        scalar => Ok(Value::from_json(scalar)),
    }
}

fn dialect_error(at: &FieldPath, message: impl Into<String>) -> EngineError {
    EngineError::Dialect {
        path: at.to_string(),
        message: message.into(),
    }
}

fn decode_string(at: &FieldPath, s: &str) -> Result<Value, EngineError> {
    if !s.starts_with("$$") {
        if let Some(pattern) = s.strip_prefix(MATCH_PREFIX) {
            return Regex::new(pattern)
                .map(|_| Value::Pattern(vec![pattern.to_string()]))
                .map_err(|e| dialect_error(at, format!("invalid pattern: {e}")));
        }
        let kind = match s {
            "$any" => return Ok(Value::Top),
            "$string" => Some(Kind::String),
            "$int" => Some(Kind::Int),
            "$float" => Some(Kind::Float),
            "$number" => Some(Kind::Number),
            "$bool" => Some(Kind::Bool),
            "$struct" => Some(Kind::Struct),
            "$list" => Some(Kind::List),
            _ => None,
        };
        if let Some(kind) = kind {
            return Ok(Value::Type(kind));
        }
        if s.starts_with('$') && !s.starts_with("${") {
            return Err(dialect_error(
                at,
                format!("unknown directive \"{s}\" (write \"${s}\" for a literal)"),
            ));
        }
    }
    if s.contains('$') {
        return decode_template(at, s);
    }
    Ok(Value::String(s.to_string()))
}

/// Splits a string into text and `${path}` references. `$$` stands for `$`.
fn decode_template(at: &FieldPath, s: &str) -> Result<Value, EngineError> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut rest = s;
    while let Some(pos) = rest.find('$') {
        text.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if let Some(after) = tail.strip_prefix("$$") {
            text.push('$');
            rest = after;
        } else if let Some(after) = tail.strip_prefix("${") {
            let end = after
                .find('}')
                .ok_or_else(|| dialect_error(at, format!("unterminated reference in \"{s}\"")))?;
            let reference = &after[..end];
            let path = FieldPath::parse(reference)
                .map_err(|_| dialect_error(at, format!("invalid reference \"{reference}\"")))?;
            if path.is_root() {
                return Err(dialect_error(at, "empty reference"));
            }
            if !text.is_empty() {
                parts.push(Part::Text(std::mem::take(&mut text)));
            }
            parts.push(Part::Ref(path));
            rest = &after[end + 1..];
        } else {
            text.push('$');
            rest = &tail[1..];
        }
    }
    text.push_str(rest);
    if parts.is_empty() {
        return Ok(Value::String(text));
    }
    if !text.is_empty() {
        parts.push(Part::Text(text));
    }
    let expr = match parts.as_slice() {
        [Part::Ref(path)] => Expr::Ref(path.clone()),
        _ => Expr::Interpolation(parts),
    };
    Ok(Value::Deferred(Deferred {
        expr,
        constraint: Box::new(Value::Top),
    }))
}

fn decode_object(
    at: &FieldPath,
    map: &Map<String, serde_json::Value>,
) -> Result<Value, EngineError> {
    if let Some(alternatives) = map.get(ONE_OF) {
        return decode_disjunction(at, map, alternatives);
    }
    if map.contains_key(DEFAULT) {
        return Err(dialect_error(at, "$default requires $oneOf"));
    }

    let mut out = StructValue::default();
    for (key, raw) in map {
        if key == CLOSED {
            out.closed = raw
                .as_bool()
                .ok_or_else(|| dialect_error(at, "$closed must be a boolean"))?;
            continue;
        }
        let (name, optional) = field_name(at, key)?;
        let field_at = at.field(&name);
        let value = decode_at(&field_at, raw)?;
        match out.fields.iter_mut().find(|f| f.name == name) {
            Some(existing) => {
                existing.value = unify(&field_at, &existing.value, &value)?;
                existing.optional &= optional;
            }
            None => out.fields.push(Field {
                name,
                value,
                optional,
            }),
        }
    }
    Ok(Value::Struct(out))
}

fn field_name(at: &FieldPath, key: &str) -> Result<(String, bool), EngineError> {
    let (key, optional) = key
        .strip_suffix('?')
        .map_or((key, false), |stripped| (stripped, true));
    if let Some(literal) = key.strip_prefix("$$") {
        return Ok((format!("${literal}"), optional));
    }
    if key.starts_with('$') {
        return Err(dialect_error(at, format!("unknown directive key \"{key}\"")));
    }
    Ok((key.to_string(), optional))
}

fn decode_disjunction(
    at: &FieldPath,
    map: &Map<String, serde_json::Value>,
    alternatives: &serde_json::Value,
) -> Result<Value, EngineError> {
    if let Some(extra) = map.keys().find(|k| *k != ONE_OF && *k != DEFAULT) {
        return Err(dialect_error(at, format!("unexpected key \"{extra}\" next to $oneOf")));
    }
    let serde_json::Value::Array(raw_alternatives) = alternatives else {
        return Err(dialect_error(at, "$oneOf must be a list"));
    };
    if raw_alternatives.is_empty() {
        return Err(dialect_error(at, "$oneOf needs at least one alternative"));
    }
    let alternatives = raw_alternatives
        .iter()
        .map(|alt| decode_at(at, alt))
        .collect::<Result<Vec<_>, _>>()?;
    let default = map
        .get(DEFAULT)
        .map(|raw| decode_at(at, raw))
        .transpose()?;
    if let Some(d) = &default {
        if !alternatives.iter().any(|alt| unify(at, alt, d).is_ok()) {
            return Err(dialect_error(at, format!("$default {d} matches no alternative")));
        }
    }
    Ok(normalize_disjunction(alternatives, default))
}

/// Collapses trivial disjunctions and removes duplicate alternatives.
#[must_use]
pub fn normalize_disjunction(alternatives: Vec<Value>, default: Option<Value>) -> Value {
    let mut unique: Vec<Value> = Vec::with_capacity(alternatives.len());
    for alt in alternatives {
        if !unique.contains(&alt) {
            unique.push(alt);
        }
    }
    if unique.len() == 1 {
        return unique.remove(0);
    }
    Value::Disjunction {
        alternatives: unique,
        default: default.map(Box::new),
    }
}
