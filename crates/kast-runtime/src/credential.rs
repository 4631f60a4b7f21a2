//! Registry credential resolution from a matched Secret or the environment.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use kast_common::config::{RemoteModule, Selector};
use kast_common::constants::{
    ACCESS_TOKEN_ENV_VAR, DOCKER_CONFIG_JSON_KEY, DOCKER_CONFIG_JSON_SECRET_TYPE, PASSWORD_ENV_VAR,
    REFRESH_TOKEN_ENV_VAR, SECRET_KIND, USERNAME_ENV_VAR,
};
use kast_common::types::ResourceItem;
use kast_oci::Credential;
use kast_select::CompiledSelector;
use serde_json::Value;

use crate::error::FunctionError;

/// Environment-style lookup: returns the value of a variable, if set.
pub type EnvLookup = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Returns the first item matching the auth selector.
///
/// # Errors
///
/// Returns `FunctionError::Config` if the selector kind is not `Secret`,
/// `FunctionError::Selector` if it does not compile and
/// `FunctionError::SecretNotFound` if nothing matches.
pub fn find_auth_secret<'a>(
    selector: &Selector,
    items: &'a [ResourceItem],
) -> Result<&'a ResourceItem, FunctionError> {
    if selector.kind != SECRET_KIND {
        return Err(FunctionError::config(format!(
            "auth selector kind must be {SECRET_KIND}, got \"{}\"",
            selector.kind
        )));
    }
    let compiled = CompiledSelector::compile(selector)?;
    items
        .iter()
        .find(|item| compiled.matches(item))
        .ok_or_else(|| FunctionError::SecretNotFound {
            selector: selector.to_string(),
        })
}

/// Resolves the credential used to fetch `remote`.
///
/// With an auth selector, the matched Secret is the only source. When the
/// selector matches nothing, a warning is logged and the environment
/// fallback applies, as it does without a selector. `Ok(None)` means
/// anonymous access.
///
/// # Errors
///
/// Returns an error if the selector is invalid or the Secret is malformed.
pub fn resolve_credential(
    remote: &RemoteModule,
    items: &[ResourceItem],
    env: &EnvLookup,
) -> Result<Option<Credential>, FunctionError> {
    let Some(selector) = &remote.auth else {
        return Ok(credential_from_env(env));
    };
    match find_auth_secret(selector, items) {
        Ok(secret) => {
            tracing::info!(secret = %secret.id(), "using registry credential from secret");
            credential_from_secret(secret, &remote.registry).map(Credential::non_empty)
        }
        Err(FunctionError::SecretNotFound { selector }) => {
            tracing::warn!(%selector, "auth secret not found, falling back to environment credentials");
            Ok(credential_from_env(env))
        }
        Err(e) => Err(e),
    }
}

/// Reads the four `REGISTRY_*` variables. Empty values count as unset.
#[must_use]
pub fn credential_from_env(env: &EnvLookup) -> Option<Credential> {
    let read = |key: &str| env(key).filter(|v| !v.is_empty());
    Credential {
        username: read(USERNAME_ENV_VAR),
        password: read(PASSWORD_ENV_VAR),
        access_token: read(ACCESS_TOKEN_ENV_VAR),
        refresh_token: read(REFRESH_TOKEN_ENV_VAR),
    }
    .non_empty()
}

/// Extracts a credential from a Secret.
///
/// `data` values are base64-decoded and `stringData` overrides them per key.
/// Docker config Secrets yield the entry for `registry`.
///
/// # Errors
///
/// Returns `FunctionError::Credential` for undecodable values or a docker
/// config without an entry for `registry`.
pub fn credential_from_secret(
    secret: &ResourceItem,
    registry: &str,
) -> Result<Credential, FunctionError> {
    let data = secret_data(secret)?;
    let secret_type = secret.get("type").and_then(Value::as_str).unwrap_or_default();
    if secret_type == DOCKER_CONFIG_JSON_SECRET_TYPE {
        let raw = data
            .get(DOCKER_CONFIG_JSON_KEY)
            .ok_or_else(|| invalid(secret, format!("missing {DOCKER_CONFIG_JSON_KEY}")))?;
        return docker_config_credential(secret, raw, registry);
    }

    let mut credential = Credential::default();
    for (key, value) in data {
        match key.as_str() {
            "username" | USERNAME_ENV_VAR => credential.username = Some(value),
            "password" | PASSWORD_ENV_VAR => credential.password = Some(value),
            "accessToken" | ACCESS_TOKEN_ENV_VAR => credential.access_token = Some(value),
            "refreshToken" | REFRESH_TOKEN_ENV_VAR => credential.refresh_token = Some(value),
            _ => {}
        }
    }
    Ok(credential)
}

fn invalid(secret: &ResourceItem, message: impl Into<String>) -> FunctionError {
    FunctionError::Credential {
        secret: secret.id().to_string(),
        message: message.into(),
    }
}

fn secret_data(secret: &ResourceItem) -> Result<BTreeMap<String, String>, FunctionError> {
    let mut data = BTreeMap::new();
    if let Some(encoded) = secret.get("data").and_then(Value::as_object) {
        for (key, value) in encoded {
            let text = value
                .as_str()
                .ok_or_else(|| invalid(secret, format!("data.{key} is not a string")))?;
            let bytes = STANDARD
                .decode(text.trim())
                .map_err(|e| invalid(secret, format!("data.{key} is not base64: {e}")))?;
            let decoded = String::from_utf8(bytes)
                .map_err(|_| invalid(secret, format!("data.{key} is not UTF-8")))?;
            let _ = data.insert(key.clone(), decoded);
        }
    }
    if let Some(plain) = secret.get("stringData").and_then(Value::as_object) {
        for (key, value) in plain {
            let text = value
                .as_str()
                .ok_or_else(|| invalid(secret, format!("stringData.{key} is not a string")))?;
            let _ = data.insert(key.clone(), text.to_string());
        }
    }
    Ok(data)
}

fn docker_config_credential(
    secret: &ResourceItem,
    raw: &str,
    registry: &str,
) -> Result<Credential, FunctionError> {
    let config: Value = serde_json::from_str(raw)
        .map_err(|e| invalid(secret, format!("{DOCKER_CONFIG_JSON_KEY} is not JSON: {e}")))?;
    let auths = config
        .get("auths")
        .and_then(Value::as_object)
        .ok_or_else(|| invalid(secret, format!("{DOCKER_CONFIG_JSON_KEY} has no auths")))?;
    let entry = auths
        .iter()
        .find(|(host, _)| docker_host(host) == registry)
        .map(|(_, entry)| entry)
        .ok_or_else(|| invalid(secret, format!("no docker config entry for {registry}")))?;

    let field = |name: &str| {
        entry
            .get(name)
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    let mut credential = Credential {
        username: field("username"),
        password: field("password"),
        access_token: field("registrytoken"),
        refresh_token: field("identitytoken"),
    };
    if let Some(auth) = field("auth") {
        let decoded = STANDARD
            .decode(auth.trim())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| invalid(secret, format!("auth for {registry} is not base64")))?;
        let (user, pass) = decoded
            .split_once(':')
            .ok_or_else(|| invalid(secret, format!("auth for {registry} is not user:password")))?;
        credential.username = Some(user.to_string());
        credential.password = Some(pass.to_string());
    }
    Ok(credential)
}

/// `https://ghcr.io/v1/` → `ghcr.io`.
fn docker_host(key: &str) -> &str {
    let without_scheme = key
        .strip_prefix("https://")
        .or_else(|| key.strip_prefix("http://"))
        .unwrap_or(key);
    without_scheme.split('/').next().unwrap_or(without_scheme)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    fn item(value: serde_json::Value) -> ResourceItem {
        ResourceItem::from_value(value).expect("item")
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + Send + Sync + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    fn secret_selector(name: &str) -> Selector {
        Selector {
            kind: "Secret".into(),
            name: name.into(),
            ..Selector::default()
        }
    }

    fn remote(auth: Option<Selector>) -> RemoteModule {
        RemoteModule {
            registry: "ghcr.io".into(),
            repo: "acme/web".into(),
            tag: "v1".into(),
            auth,
            plain_http: false,
        }
    }

    fn opaque_secret() -> ResourceItem {
        item(json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {"name": "registry-auth"},
            "data": {
                "username": STANDARD.encode("robot"),
                "password": STANDARD.encode("from-data"),
            },
            "stringData": {"password": "from-string-data", "REGISTRY_ACCESS_TOKEN": "tok"},
        }))
    }

    #[test]
    fn find_auth_secret_rejects_non_secret_kind() {
        let selector = Selector {
            kind: "ConfigMap".into(),
            ..Selector::default()
        };
        let err = find_auth_secret(&selector, &[]).expect_err("wrong kind");
        assert!(matches!(err, FunctionError::Config { .. }));
    }

    #[test]
    fn find_auth_secret_without_match_is_not_found() {
        let err = find_auth_secret(&secret_selector("absent"), &[opaque_secret()])
            .expect_err("no match");
        assert!(matches!(err, FunctionError::SecretNotFound { .. }));
    }

    #[test]
    fn secret_fields_decode_with_string_data_overriding() {
        let credential =
            credential_from_secret(&opaque_secret(), "ghcr.io").expect("credential");
        assert_eq!(credential.username.as_deref(), Some("robot"));
        assert_eq!(credential.password.as_deref(), Some("from-string-data"));
        assert_eq!(credential.access_token.as_deref(), Some("tok"));
        assert_eq!(credential.refresh_token, None);
    }

    #[test]
    fn matched_secret_wins_over_environment() {
        let env = env_of(&[("REGISTRY_USERNAME", "env-user"), ("REGISTRY_REFRESH_TOKEN", "env-rt")]);
        let credential = resolve_credential(
            &remote(Some(secret_selector("registry-auth"))),
            &[opaque_secret()],
            &env,
        )
        .expect("resolve")
        .expect("credential");
        assert_eq!(credential.username.as_deref(), Some("robot"));
        assert_eq!(credential.refresh_token, None);
    }

    #[test]
    fn unmatched_auth_selector_falls_back_to_environment() {
        let env = env_of(&[("REGISTRY_USERNAME", "env-user"), ("REGISTRY_PASSWORD", "env-pw")]);
        let credential = resolve_credential(&remote(Some(secret_selector("absent"))), &[], &env)
            .expect("fallback")
            .expect("credential");
        assert_eq!(credential.username.as_deref(), Some("env-user"));
        assert_eq!(credential.password.as_deref(), Some("env-pw"));

        let anonymous = resolve_credential(&remote(Some(secret_selector("absent"))), &[], &env_of(&[]))
            .expect("fallback");
        assert!(anonymous.is_none());
    }

    #[test]
    fn empty_environment_values_are_ignored() {
        assert!(credential_from_env(&env_of(&[("REGISTRY_USERNAME", "")])).is_none());
    }

    #[test]
    fn docker_config_secret_yields_registry_entry() {
        let config = json!({
            "auths": {
                "https://index.docker.io/v1/": {"auth": STANDARD.encode("hub:hub-pw")},
                "ghcr.io": {"auth": STANDARD.encode("robot:s3cret"), "identitytoken": "rt"},
            }
        });
        let secret = item(json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "type": "kubernetes.io/dockerconfigjson",
            "metadata": {"name": "pull"},
            "data": {".dockerconfigjson": STANDARD.encode(config.to_string())},
        }));
        let credential = credential_from_secret(&secret, "ghcr.io").expect("credential");
        assert_eq!(credential.username.as_deref(), Some("robot"));
        assert_eq!(credential.password.as_deref(), Some("s3cret"));
        assert_eq!(credential.refresh_token.as_deref(), Some("rt"));

        let hub = credential_from_secret(&secret, "index.docker.io").expect("credential");
        assert_eq!(hub.username.as_deref(), Some("hub"));

        let err = credential_from_secret(&secret, "quay.io").expect_err("no entry");
        assert!(matches!(err, FunctionError::Credential { .. }));
    }

    #[test]
    fn malformed_data_is_a_credential_error() {
        let secret = item(json!({
            "kind": "Secret",
            "metadata": {"name": "bad"},
            "data": {"username": "%%% not base64"},
        }));
        let err = credential_from_secret(&secret, "ghcr.io").expect_err("bad base64");
        assert!(matches!(err, FunctionError::Credential { .. }));
    }
}
