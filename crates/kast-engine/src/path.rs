//! Field paths: `a.b."quoted/key"[0].c`.

use std::fmt;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{escaped_transform, is_not, take_while1},
    character::complete::{char, digit1},
    combinator::{all_consuming, map, map_res, opt, value},
    multi::many0,
    sequence::{delimited, preceded},
};

use crate::error::EngineError;

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Struct field.
    Field(String),
    /// List index.
    Index(usize),
}

/// An absolute path from the root of a value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath(Vec<Segment>);

impl FieldPath {
    /// The root path.
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Parses a path expression. The empty string is the root.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidPath` if the expression is malformed.
    pub fn parse(input: &str) -> Result<Self, EngineError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        all_consuming(path)
            .parse(trimmed)
            .map(|(_, segments)| Self(segments))
            .map_err(|_| EngineError::InvalidPath {
                path: input.to_string(),
            })
    }

    /// Returns the segments.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    /// Whether this is the root path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The enclosing path, or `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0
            .split_last()
            .map(|(_, init)| Self(init.to_vec()))
    }

    /// Returns this path extended by a field.
    #[must_use]
    pub fn field(&self, name: &str) -> Self {
        let mut next = self.clone();
        next.0.push(Segment::Field(name.to_string()));
        next
    }

    /// Returns this path extended by `segments`.
    #[must_use]
    pub fn join(&self, segments: &[Segment]) -> Self {
        let mut next = self.clone();
        next.0.extend_from_slice(segments);
        next
    }

    /// Returns this path extended by an index.
    #[must_use]
    pub fn index(&self, index: usize) -> Self {
        let mut next = self.clone();
        next.0.push(Segment::Index(index));
        next
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                Segment::Field(name) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    if !name.is_empty() && name.chars().all(is_plain_char) {
                        f.write_str(name)?;
                    } else {
                        write!(f, "\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))?;
                    }
                }
                Segment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

fn is_plain_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '$')
}

type Res<'a, T> = IResult<&'a str, T>;

fn plain(input: &str) -> Res<'_, String> {
    map(take_while1(is_plain_char), str::to_string).parse(input)
}

fn quoted(input: &str) -> Res<'_, String> {
    map(
        delimited(
            char('"'),
            opt(escaped_transform(
                is_not("\\\""),
                '\\',
                alt((value("\\", char('\\')), value("\"", char('"')))),
            )),
            char('"'),
        ),
        Option::unwrap_or_default,
    )
    .parse(input)
}

fn field(input: &str) -> Res<'_, Segment> {
    map(alt((quoted, plain)), Segment::Field).parse(input)
}

fn index(input: &str) -> Res<'_, Segment> {
    map(
        delimited(char('['), map_res(digit1, str::parse::<usize>), char(']')),
        Segment::Index,
    )
    .parse(input)
}

fn path(input: &str) -> Res<'_, Vec<Segment>> {
    let (input, first) = field(input)?;
    let (input, rest) = many0(alt((preceded(char('.'), field), index))).parse(input)?;
    let mut segments = Vec::with_capacity(rest.len() + 1);
    segments.push(first);
    segments.extend(rest);
    Ok((input, segments))
}
