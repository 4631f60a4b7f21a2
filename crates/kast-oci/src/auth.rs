//! Registry credentials and `WWW-Authenticate` challenge parsing.

use std::collections::BTreeMap;
use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use nom::{
    IResult, Parser,
    bytes::complete::{escaped_transform, is_not, take_while1},
    character::complete::{char, multispace0},
    combinator::{opt, value},
    multi::separated_list0,
    sequence::delimited,
};

/// Registry credential. Every field is optional; an empty credential means
/// anonymous access.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    /// Username for basic authentication or token exchange.
    pub username: Option<String>,
    /// Password for basic authentication or token exchange.
    pub password: Option<String>,
    /// Bearer token sent as-is.
    pub access_token: Option<String>,
    /// Refresh token exchanged for an access token.
    pub refresh_token: Option<String>,
}

impl Credential {
    /// Whether no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.password.is_none()
            && self.access_token.is_none()
            && self.refresh_token.is_none()
    }

    /// Returns `None` for an empty credential.
    #[must_use]
    pub fn non_empty(self) -> Option<Self> {
        (!self.is_empty()).then_some(self)
    }

    /// `Basic` authorization header value, when username and password are set.
    #[must_use]
    pub fn basic_header(&self) -> Option<String> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => {
                Some(format!("Basic {}", STANDARD.encode(format!("{user}:{pass}"))))
            }
            _ => None,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .finish()
    }
}

/// A parsed `WWW-Authenticate` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// Scheme, lowercased (`bearer`, `basic`).
    pub scheme: String,
    /// Challenge parameters, keys lowercased.
    pub params: BTreeMap<String, String>,
}

impl Challenge {
    /// Parses a challenge header. Returns `None` if it is malformed.
    #[must_use]
    pub fn parse(header: &str) -> Option<Self> {
        let (rest, challenge) = challenge(header.trim()).ok()?;
        rest.trim().is_empty().then_some(challenge)
    }

    /// Returns a parameter by (lowercase) name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

type Res<'a, T> = IResult<&'a str, T>;

fn token(input: &str) -> Res<'_, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)).parse(input)
}

fn quoted(input: &str) -> Res<'_, String> {
    delimited(
        char('"'),
        opt(escaped_transform(
            is_not("\\\""),
            '\\',
            nom::branch::alt((value("\\", char('\\')), value("\"", char('"')))),
        )),
        char('"'),
    )
    .map(Option::unwrap_or_default)
    .parse(input)
}

fn param(input: &str) -> Res<'_, (String, String)> {
    let (input, _) = multispace0(input)?;
    let (input, name) = token(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char('=').parse(input)?;
    let (input, _) = multispace0(input)?;
    let (input, val) = nom::branch::alt((quoted, token.map(str::to_string))).parse(input)?;
    Ok((input, (name.to_ascii_lowercase(), val)))
}

fn comma(input: &str) -> Res<'_, char> {
    delimited(multispace0, char(','), multispace0).parse(input)
}

fn challenge(input: &str) -> Res<'_, Challenge> {
    let (input, scheme) = token(input)?;
    let (input, _) = multispace0(input)?;
    let (input, params) = separated_list0(comma, param).parse(input)?;
    Ok((
        input,
        Challenge {
            scheme: scheme.to_ascii_lowercase(),
            params: params.into_iter().collect(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_challenge_keeps_commas_inside_quotes() {
        let c = Challenge::parse(
            r#"Bearer realm="https://auth.example.com/token",service="registry.example.com",scope="repository:acme/web:pull,push""#,
        )
        .expect("valid challenge");
        assert_eq!(c.scheme, "bearer");
        assert_eq!(c.param("realm"), Some("https://auth.example.com/token"));
        assert_eq!(c.param("scope"), Some("repository:acme/web:pull,push"));
    }

    #[test]
    fn basic_challenge_parses_realm() {
        let c = Challenge::parse(r#"Basic realm="Registry Realm""#).expect("valid");
        assert_eq!(c.scheme, "basic");
        assert_eq!(c.param("realm"), Some("Registry Realm"));
    }

    #[test]
    fn malformed_challenge_is_rejected() {
        assert!(Challenge::parse(r#"Bearer realm="unterminated"#).is_none());
    }

    #[test]
    fn credential_debug_redacts_secrets() {
        let cred = Credential {
            username: Some("robot".into()),
            password: Some("s3cr3t".into()),
            access_token: None,
            refresh_token: Some("r3fr3sh".into()),
        };
        let rendered = format!("{cred:?}");
        assert!(rendered.contains("robot"));
        assert!(!rendered.contains("s3cr3t"));
        assert!(!rendered.contains("r3fr3sh"));
    }

    #[test]
    fn basic_header_needs_both_fields() {
        let mut cred = Credential {
            username: Some("u".into()),
            ..Credential::default()
        };
        assert_eq!(cred.basic_header(), None);
        cred.password = Some("p".into());
        assert_eq!(cred.basic_header().as_deref(), Some("Basic dTpw"));
        assert!(Credential::default().non_empty().is_none());
    }
}
