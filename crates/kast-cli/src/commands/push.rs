//! `kast push` — Publish a module directory to a registry.

use std::path::PathBuf;

use clap::Args;
use kast_common::constants::MODULE_ARTIFACT_TYPE;
use kast_oci::{Connector, HttpConnector, push_directory};
use kast_runtime::credential::credential_from_env;

use super::{TransferArgs, parse_reference};
use crate::output;

/// Arguments for the `push` command.
#[derive(Args, Debug)]
pub struct PushArgs {
    /// Module directory to publish.
    pub dir: PathBuf,

    /// Target `registry/repository[:tag]`.
    pub reference: String,

    /// Additional tags pointing at the same artifact.
    #[arg(long = "extra-tag", value_name = "TAG")]
    pub extra_tags: Vec<String>,

    /// Talk to the registry over plain HTTP.
    #[arg(long)]
    pub plain_http: bool,

    /// Artifact type recorded in the manifest.
    #[arg(long, default_value = MODULE_ARTIFACT_TYPE)]
    pub artifact_type: String,

    /// Registry transfer settings.
    #[command(flatten)]
    pub transfer: TransferArgs,
}

/// Executes the `push` command.
///
/// Credentials come from `REGISTRY_USERNAME`, `REGISTRY_PASSWORD`,
/// `REGISTRY_ACCESS_TOKEN` and `REGISTRY_REFRESH_TOKEN`.
///
/// # Errors
///
/// Returns an error if the directory is empty or any push fails.
pub fn execute(args: PushArgs) -> anyhow::Result<()> {
    if !args.dir.is_dir() {
        anyhow::bail!("module directory not found: {}", args.dir.display());
    }
    let reference = parse_reference(&args.reference, args.plain_http)?;
    let runtime = args.transfer.runtime_config()?;
    let options = args.transfer.transfer_options(&runtime)?;
    let credential = credential_from_env(&|key: &str| std::env::var(key).ok());

    let repository =
        HttpConnector::new(options.clone()).connect(&reference, credential.as_ref())?;
    for tag in std::iter::once(&reference.tag).chain(&args.extra_tags) {
        let target = reference.with_tag(tag)?;
        let descriptor = push_directory(
            repository.as_ref(),
            &args.dir,
            &args.artifact_type,
            tag,
            &options,
        )?;
        tracing::info!(
            reference = %target,
            digest = output::short_digest(descriptor.digest.as_str()),
            size = descriptor.size,
            "pushed"
        );
    }
    Ok(())
}
