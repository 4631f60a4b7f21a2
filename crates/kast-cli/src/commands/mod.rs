//! CLI command definitions and dispatch.

pub mod fetch;
pub mod function;
pub mod push;
pub mod run;

use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use kast_common::config::RuntimeConfig;
use kast_common::constants::{APP_NAME, BIN_NAME, DEFAULT_MODULE_TAG};
use kast_oci::{CancelToken, ModuleReference, TransferOptions};
use kast_runtime::FunctionError;

use crate::output;

/// kast — KRM functions from constraint modules.
#[derive(Parser, Debug)]
#[command(name = BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run as a KRM function: ResourceList on stdin, ResourceList on stdout.
    #[command(name = "fn")]
    Fn(function::FnArgs),
    /// Run a module over resources read from stdin.
    Run(run::RunArgs),
    /// Publish a module directory to a registry.
    Push(push::PushArgs),
    /// Retrieve a module from a registry into a directory.
    Fetch(fetch::FetchArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Fn(args) => function::execute(args),
        Command::Run(args) => run::execute(args),
        Command::Push(args) => push::execute(args),
        Command::Fetch(args) => fetch::execute(args),
    }
}

/// Registry transfer settings shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct TransferArgs {
    /// Per-request registry timeout in seconds [env: KAST_TRANSFER_TIMEOUT].
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Overall budget for all registry transfers of the command, in seconds.
    #[arg(long, value_name = "SECS")]
    pub deadline: Option<u64>,
}

impl TransferArgs {
    /// Process settings from the environment, with flags taking precedence.
    ///
    /// # Errors
    ///
    /// Returns an error if an environment variable holds an invalid value.
    pub fn runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let mut config = RuntimeConfig::from_env()?;
        if let Some(secs) = self.timeout {
            config.transfer_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// Transfer options for `config`, cancelled on Ctrl+C.
    ///
    /// # Errors
    ///
    /// Returns an error if the Ctrl+C handler cannot be installed.
    pub fn transfer_options(&self, config: &RuntimeConfig) -> anyhow::Result<TransferOptions> {
        let mut options = TransferOptions::with_timeout(config.transfer_timeout)
            .cancel_with(cancel_on_interrupt()?);
        if let Some(secs) = self.deadline {
            options = options.deadline_in(Duration::from_secs(secs));
        }
        Ok(options)
    }
}

fn cancel_on_interrupt() -> anyhow::Result<CancelToken> {
    let token = CancelToken::new();
    let handler = token.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("interrupted, cancelling registry transfers");
        handler.cancel();
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;
    Ok(token)
}

/// Writes a successful result to stdout, or logs the engine diagnostics of
/// a failure and returns it.
///
/// # Errors
///
/// Returns the function error, or an error if stdout is closed.
pub fn emit(result: Result<String, FunctionError>) -> anyhow::Result<()> {
    match result {
        Ok(yaml) => output::write_stdout(&yaml),
        Err(err) => {
            if let Some(diagnostics) = err.diagnostics() {
                tracing::error!("{diagnostics}");
            }
            Err(err.into())
        }
    }
}

/// Creates the per-invocation directory a remote module is fetched into.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn module_working_dir(command: &str) -> anyhow::Result<tempfile::TempDir> {
    tempfile::Builder::new()
        .prefix(&format!("{APP_NAME}-{command}-"))
        .tempdir()
        .context("failed to create module working directory")
}

/// Parses `registry/repository[:tag]`, defaulting the tag.
///
/// # Errors
///
/// Returns an error if the reference is malformed.
pub fn parse_reference(input: &str, plain_http: bool) -> anyhow::Result<ModuleReference> {
    let tagged = match input.split_once('/') {
        Some((_, rest)) if !rest.contains(':') => format!("{input}:{DEFAULT_MODULE_TAG}"),
        _ => input.to_string(),
    };
    Ok(ModuleReference::parse(&tagged, plain_http)?)
}
