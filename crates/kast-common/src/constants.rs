//! System-wide constants and well-known names.

/// Application name used in CLI output and temporary directory prefixes.
pub const APP_NAME: &str = "kast";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "kast";

/// Default directory holding the module when running as a KRM function container.
pub const DEFAULT_MODULE_PATH: &str = "/kast-module";

/// Default per-request timeout for registry transfers, in seconds.
pub const DEFAULT_TRANSFER_TIMEOUT_SECS: u64 = 60;

/// Annotation key that turns the function into a validator.
pub const VALIDATOR_ANNOTATION_KEY: &str = "config.kast.dev/validator";

/// Annotation value that turns the function into a validator.
pub const VALIDATOR_ANNOTATION_VALUE: &str = "true";

/// Path filled with the function config `apiVersion`.
pub const API_VERSION_FILL_PATH: &str = "apiVersion";
/// Path filled with the function config `kind`.
pub const KIND_FILL_PATH: &str = "kind";
/// Path filled with the function config `metadata`.
pub const METADATA_FILL_PATH: &str = "metadata";
/// Path filled with the function config `input`.
pub const INPUT_FILL_PATH: &str = "input";
/// Path filled with the include index.
pub const INCLUDES_FILL_PATH: &str = "includes";
/// Path holding the resources produced by the module.
pub const OUTPUTS_PATH: &str = "outputs";

/// Kind an auth selector must target.
pub const SECRET_KIND: &str = "Secret";

/// Secret type carrying a docker `config.json`.
pub const DOCKER_CONFIG_JSON_SECRET_TYPE: &str = "kubernetes.io/dockerconfigjson";
/// Data key of a docker config secret.
pub const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";

/// Environment variable holding the registry username.
pub const USERNAME_ENV_VAR: &str = "REGISTRY_USERNAME";
/// Environment variable holding the registry password.
pub const PASSWORD_ENV_VAR: &str = "REGISTRY_PASSWORD";
/// Environment variable holding the registry access token.
pub const ACCESS_TOKEN_ENV_VAR: &str = "REGISTRY_ACCESS_TOKEN";
/// Environment variable holding the registry refresh token.
pub const REFRESH_TOKEN_ENV_VAR: &str = "REGISTRY_REFRESH_TOKEN";

/// Environment variable overriding the module path.
pub const MODULE_PATH_ENV_VAR: &str = "KAST_MODULE_PATH";
/// Environment variable overriding the transfer timeout (seconds).
pub const TRANSFER_TIMEOUT_ENV_VAR: &str = "KAST_TRANSFER_TIMEOUT";

/// Marker file expected inside a fetched module.
pub const MODULE_MARKER_PATH: &str = "kast.mod/module.yaml";

/// Artifact type of a pushed module.
pub const MODULE_ARTIFACT_TYPE: &str = "application/vnd.kast.module.v1+json";

/// `apiVersion` of a KRM `ResourceList`.
pub const RESOURCE_LIST_API_VERSION: &str = "config.kubernetes.io/v1";
/// `kind` of a KRM `ResourceList`.
pub const RESOURCE_LIST_KIND: &str = "ResourceList";

/// `apiVersion` of a function config synthesised by `kast run --module`.
pub const CLI_CONFIG_API_VERSION: &str = "kast.dev/v1alpha1";
/// `kind` of a function config synthesised by `kast run --module`.
pub const CLI_CONFIG_KIND: &str = "Kast";
/// Tag used when a module reference names none.
pub const DEFAULT_MODULE_TAG: &str = "latest";

/// Environment variable holding the log filter directive.
pub const LOG_FILTER_ENV_VAR: &str = "KAST_LOG";
/// Fallback log level variable.
pub const LOG_LEVEL_ENV_VAR: &str = "LOG_LEVEL";
/// Environment variable selecting the log format (`json` or `text`).
pub const LOG_FORMAT_ENV_VAR: &str = "KAST_LOG_FORMAT";
