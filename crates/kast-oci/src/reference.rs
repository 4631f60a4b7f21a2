//! Module references: `registry/repository:tag`.

use std::fmt;
use std::sync::LazyLock;

use kast_common::config::RemoteModule;
use regex::Regex;

use crate::error::TransferError;

static REPOSITORY_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*(?:/[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*)*$")
        .ok()
});

static TAG_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9._-]{0,127}$").ok());

/// Location of a module artifact in a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleReference {
    /// Registry host, optionally with a port.
    pub registry: String,
    /// Repository path inside the registry.
    pub repository: String,
    /// Tag naming the artifact.
    pub tag: String,
    /// Use `http://` instead of `https://`.
    pub plain_http: bool,
}

impl ModuleReference {
    /// Builds and validates a reference from its parts.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::InvalidReference` if a part is malformed.
    pub fn new(
        registry: impl Into<String>,
        repository: impl Into<String>,
        tag: impl Into<String>,
        plain_http: bool,
    ) -> Result<Self, TransferError> {
        let reference = Self {
            registry: registry.into(),
            repository: repository.into(),
            tag: tag.into(),
            plain_http,
        };
        reference.validate()?;
        Ok(reference)
    }

    /// Parses `registry/repository:tag`.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::InvalidReference` if the string has no registry,
    /// repository or tag, or if a part is malformed.
    pub fn parse(input: &str, plain_http: bool) -> Result<Self, TransferError> {
        let invalid = |message: &str| TransferError::InvalidReference {
            reference: input.to_string(),
            message: message.to_string(),
        };
        let (registry, rest) = input
            .split_once('/')
            .ok_or_else(|| invalid("expected registry/repository:tag"))?;
        let (repository, tag) = rest
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing tag"))?;
        Self::new(registry, repository, tag, plain_http)
    }

    /// Builds a reference from a function config `remoteModule`.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::InvalidReference` if a part is malformed.
    pub fn from_remote_module(remote: &RemoteModule) -> Result<Self, TransferError> {
        Self::new(
            remote.registry.as_str(),
            remote.repo.as_str(),
            remote.tag.as_str(),
            remote.plain_http,
        )
    }

    /// Returns the same repository under another tag.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::InvalidReference` if the tag is malformed.
    pub fn with_tag(&self, tag: &str) -> Result<Self, TransferError> {
        Self::new(
            self.registry.as_str(),
            self.repository.as_str(),
            tag,
            self.plain_http,
        )
    }

    /// Base URL of the repository in the distribution API.
    #[must_use]
    pub fn base_url(&self) -> String {
        let scheme = if self.plain_http { "http" } else { "https" };
        format!("{scheme}://{}/v2/{}", self.registry, self.repository)
    }

    fn validate(&self) -> Result<(), TransferError> {
        let invalid = |message: String| TransferError::InvalidReference {
            reference: self.to_string(),
            message,
        };
        if self.registry.is_empty()
            || self.registry.contains("://")
            || self.registry.contains('/')
            || self.registry.chars().any(char::is_whitespace)
        {
            return Err(invalid(format!("invalid registry \"{}\"", self.registry)));
        }
        if !matches_pattern(&REPOSITORY_RE, &self.repository) {
            return Err(invalid(format!(
                "invalid repository \"{}\"",
                self.repository
            )));
        }
        if !matches_pattern(&TAG_RE, &self.tag) {
            return Err(invalid(format!("invalid tag \"{}\"", self.tag)));
        }
        Ok(())
    }
}

fn matches_pattern(pattern: &LazyLock<Option<Regex>>, value: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(value))
}

impl fmt::Display for ModuleReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_registry_repository_and_tag() {
        let r = ModuleReference::parse("localhost:5000/acme/modules/web:v1.2", true)
            .expect("valid reference");
        assert_eq!(r.registry, "localhost:5000");
        assert_eq!(r.repository, "acme/modules/web");
        assert_eq!(r.tag, "v1.2");
        assert_eq!(r.base_url(), "http://localhost:5000/v2/acme/modules/web");
        assert_eq!(r.to_string(), "localhost:5000/acme/modules/web:v1.2");
    }

    #[test]
    fn parse_rejects_missing_parts() {
        for input in ["ghcr.io", "ghcr.io/acme", "ghcr.io/:v1", "/acme:v1"] {
            let err = ModuleReference::parse(input, false).expect_err(input);
            assert!(matches!(err, TransferError::InvalidReference { .. }), "{input}");
        }
    }

    #[test]
    fn new_rejects_uppercase_repository_and_bad_tag() {
        assert!(ModuleReference::new("ghcr.io", "Acme/web", "v1", false).is_err());
        assert!(ModuleReference::new("ghcr.io", "acme/web", "-v1", false).is_err());
        assert!(ModuleReference::new("https://ghcr.io", "acme/web", "v1", false).is_err());
    }

    #[test]
    fn from_remote_module_keeps_plain_http() {
        let remote = RemoteModule {
            registry: "registry.local".into(),
            repo: "mods/web".into(),
            tag: "latest".into(),
            auth: None,
            plain_http: true,
        };
        let r = ModuleReference::from_remote_module(&remote).expect("valid");
        assert!(r.plain_http);
        assert_eq!(r.with_tag("v2").expect("tag").tag, "v2");
    }
}
