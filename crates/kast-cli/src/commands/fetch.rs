//! `kast fetch` — Retrieve a module from a registry into a directory.

use std::path::PathBuf;

use clap::Args;
use kast_oci::{Connector, HttpConnector, fetch_artifact};
use kast_runtime::credential::credential_from_env;

use super::{TransferArgs, parse_reference};
use crate::output;

/// Arguments for the `fetch` command.
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Source `registry/repository[:tag]`.
    pub reference: String,

    /// Destination directory, created if missing.
    pub dir: PathBuf,

    /// Talk to the registry over plain HTTP.
    #[arg(long)]
    pub plain_http: bool,

    /// Registry transfer settings.
    #[command(flatten)]
    pub transfer: TransferArgs,
}

/// Executes the `fetch` command.
///
/// # Errors
///
/// Returns an error if the artifact cannot be fetched. The destination is
/// left unchanged on error.
pub fn execute(args: FetchArgs) -> anyhow::Result<()> {
    let reference = parse_reference(&args.reference, args.plain_http)?;
    let runtime = args.transfer.runtime_config()?;
    let options = args.transfer.transfer_options(&runtime)?;
    let credential = credential_from_env(&|key: &str| std::env::var(key).ok());

    std::fs::create_dir_all(&args.dir)?;
    let repository =
        HttpConnector::new(options.clone()).connect(&reference, credential.as_ref())?;
    let fetched = fetch_artifact(repository.as_ref(), &reference.tag, &args.dir, &options)?;
    tracing::info!(
        reference = %reference,
        digest = output::short_digest(fetched.manifest_digest.as_str()),
        files = fetched.files.len(),
        destination = %args.dir.display(),
        "fetched"
    );
    Ok(())
}
