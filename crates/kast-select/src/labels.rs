//! Kubernetes label selector expressions, parsed with `nom`.
//!
//! Grammar (comma-separated conjunction of requirements):
//!
//! ```text
//! key                    key exists
//! !key                   key does not exist
//! key=value, key==value  key equals value
//! key!=value             key absent or different
//! key in (a, b)          key present with one of the values
//! key notin (a, b)       key absent or with none of the values
//! ```

use std::collections::{BTreeMap, BTreeSet};

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, multispace0, multispace1},
    multi::{separated_list0, separated_list1},
};

use crate::error::SelectorError;

type Res<'a, T> = IResult<&'a str, T>;

/// A single selector requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// The key must be present.
    Exists(String),
    /// The key must be absent.
    DoesNotExist(String),
    /// The key must be present with this value.
    Equals(String, String),
    /// The key must be absent or hold a different value.
    NotEquals(String, String),
    /// The key must be present with one of these values.
    In(String, BTreeSet<String>),
    /// The key must be absent or hold none of these values.
    NotIn(String, BTreeSet<String>),
}

impl Requirement {
    /// Evaluates the requirement against a label (or annotation) set.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Self::Exists(key) => labels.contains_key(key),
            Self::DoesNotExist(key) => !labels.contains_key(key),
            Self::Equals(key, value) => labels.get(key) == Some(value),
            Self::NotEquals(key, value) => labels.get(key) != Some(value),
            Self::In(key, values) => labels.get(key).is_some_and(|v| values.contains(v)),
            Self::NotIn(key, values) => labels.get(key).is_none_or(|v| !values.contains(v)),
        }
    }
}

/// A parsed label selector. The empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    /// Parses a selector expression.
    ///
    /// `field` names the configuration field, for error messages.
    ///
    /// # Errors
    ///
    /// Returns `SelectorError::InvalidSelector` if the expression is malformed.
    pub fn parse(field: &'static str, input: &str) -> Result<Self, SelectorError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        let invalid = |message: String| SelectorError::InvalidSelector {
            field,
            input: input.to_string(),
            message,
        };
        let (rest, requirements) = selector(trimmed).map_err(|e| match e {
            nom::Err::Error(inner) | nom::Err::Failure(inner) => {
                invalid(format!("unexpected input at \"{}\"", inner.input))
            }
            nom::Err::Incomplete(_) => invalid("incomplete expression".to_string()),
        })?;
        if !rest.trim().is_empty() {
            return Err(invalid(format!("unexpected input at \"{rest}\"")));
        }
        for req in &requirements {
            if let Requirement::In(key, values) | Requirement::NotIn(key, values) = req {
                if values.is_empty() {
                    return Err(invalid(format!("empty value set for key \"{key}\"")));
                }
            }
        }
        Ok(Self { requirements })
    }

    /// Whether every requirement holds for the given labels.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }

    /// Whether the selector has no requirements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Returns the parsed requirements.
    #[must_use]
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }
}

const fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')
}

const fn is_value_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

fn ws0(input: &str) -> Res<'_, &str> {
    multispace0(input)
}

fn ws1(input: &str) -> Res<'_, &str> {
    multispace1(input)
}

fn sym(c: char, input: &str) -> Res<'_, char> {
    char(c).parse(input)
}

fn key(input: &str) -> Res<'_, &str> {
    take_while1(is_key_char).parse(input)
}

fn value(input: &str) -> Res<'_, &str> {
    take_while(is_value_char).parse(input)
}

fn set_value(input: &str) -> Res<'_, &str> {
    take_while1(is_value_char).parse(input)
}

fn comma(input: &str) -> Res<'_, (&str, char, &str)> {
    (ws0, char(','), ws0).parse(input)
}

fn does_not_exist(input: &str) -> Res<'_, Requirement> {
    let (input, _) = sym('!', input)?;
    let (input, _) = ws0(input)?;
    let (input, k) = key(input)?;
    Ok((input, Requirement::DoesNotExist(k.to_string())))
}

fn set_operator(input: &str) -> Res<'_, &str> {
    alt((tag("notin"), tag("in"))).parse(input)
}

fn set_based(input: &str) -> Res<'_, Requirement> {
    let (input, k) = key(input)?;
    let (input, _) = ws1(input)?;
    let (input, op) = set_operator(input)?;
    let (input, _) = ws0(input)?;
    let (input, _) = sym('(', input)?;
    let (input, _) = ws0(input)?;
    let (input, values) = separated_list0(comma, set_value).parse(input)?;
    let (input, _) = ws0(input)?;
    let (input, _) = sym(')', input)?;

    let key = k.to_string();
    let set: BTreeSet<String> = values.into_iter().map(str::to_string).collect();
    let req = if op == "in" {
        Requirement::In(key, set)
    } else {
        Requirement::NotIn(key, set)
    };
    Ok((input, req))
}

fn equality_operator(input: &str) -> Res<'_, &str> {
    alt((tag("=="), tag("!="), tag("="))).parse(input)
}

fn equality(input: &str) -> Res<'_, Requirement> {
    let (input, k) = key(input)?;
    let (input, _) = ws0(input)?;
    let (input, op) = equality_operator(input)?;
    let (input, _) = ws0(input)?;
    let (input, v) = value(input)?;
    let req = if op == "!=" {
        Requirement::NotEquals(k.to_string(), v.to_string())
    } else {
        Requirement::Equals(k.to_string(), v.to_string())
    };
    Ok((input, req))
}

fn exists(input: &str) -> Res<'_, Requirement> {
    let (input, k) = key(input)?;
    Ok((input, Requirement::Exists(k.to_string())))
}

fn requirement(input: &str) -> Res<'_, Requirement> {
    alt((does_not_exist, set_based, equality, exists)).parse(input)
}

fn selector(input: &str) -> Res<'_, Vec<Requirement>> {
    separated_list1(comma, requirement).parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn parse(input: &str) -> LabelSelector {
        LabelSelector::parse("labelSelector", input).expect("valid selector")
    }

    #[test]
    fn empty_selector_matches_everything() {
        let sel = parse("   ");
        assert!(sel.is_empty());
        assert!(sel.matches(&labels(&[])));
        assert!(sel.matches(&labels(&[("app", "web")])));
    }

    #[test]
    fn parse_equality_forms() {
        let sel = parse("app=web, tier == frontend,env!=prod");
        assert_eq!(
            sel.requirements(),
            &[
                Requirement::Equals("app".into(), "web".into()),
                Requirement::Equals("tier".into(), "frontend".into()),
                Requirement::NotEquals("env".into(), "prod".into()),
            ]
        );
    }

    #[test]
    fn parse_set_based_forms() {
        let sel = parse("env in (prod, staging),tier notin (db)");
        let reqs = sel.requirements();
        assert!(matches!(&reqs[0], Requirement::In(k, v) if k == "env" && v.len() == 2));
        assert!(matches!(&reqs[1], Requirement::NotIn(k, v) if k == "tier" && v.contains("db")));
    }

    #[test]
    fn parse_existence_forms_with_prefixed_keys() {
        let sel = parse("app.kubernetes.io/name,!deprecated");
        assert_eq!(
            sel.requirements(),
            &[
                Requirement::Exists("app.kubernetes.io/name".into()),
                Requirement::DoesNotExist("deprecated".into()),
            ]
        );
    }

    #[test]
    fn requirements_are_conjunctive() {
        let sel = parse("app=web,env in (prod)");
        assert!(sel.matches(&labels(&[("app", "web"), ("env", "prod")])));
        assert!(!sel.matches(&labels(&[("app", "web"), ("env", "dev")])));
        assert!(!sel.matches(&labels(&[("env", "prod")])));
    }

    #[test]
    fn negative_requirements_accept_missing_keys() {
        assert!(parse("env!=prod").matches(&labels(&[])));
        assert!(parse("env notin (prod)").matches(&labels(&[])));
        assert!(!parse("env notin (prod)").matches(&labels(&[("env", "prod")])));
        assert!(parse("!env").matches(&labels(&[("app", "x")])));
    }

    #[test]
    fn equality_with_empty_value_matches_empty_label() {
        let sel = parse("app=");
        assert!(sel.matches(&labels(&[("app", "")])));
        assert!(!sel.matches(&labels(&[("app", "web")])));
    }

    #[test]
    fn malformed_selectors_are_rejected() {
        for input in ["app=web,", "=web", "env in prod", "env in ()", "app=(web)"] {
            let err = LabelSelector::parse("labelSelector", input);
            assert!(err.is_err(), "expected {input:?} to be rejected");
        }
    }

    #[test]
    fn malformed_selector_error_names_field() {
        let err = LabelSelector::parse("annotationSelector", "a=b,,c").expect_err("invalid");
        assert!(err.to_string().starts_with("invalid annotationSelector"));
    }
}
