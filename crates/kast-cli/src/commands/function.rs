//! `kast fn` — Run as a KRM function.

use std::path::PathBuf;

use clap::Args;
use kast_common::types::ResourceList;
use kast_runtime::{Function, FunctionBuilder};

use super::{TransferArgs, emit, module_working_dir};
use crate::output;

/// Arguments for the `fn` command.
#[derive(Args, Debug)]
pub struct FnArgs {
    /// Local module directory [env: KAST_MODULE_PATH].
    #[arg(long, value_name = "DIR")]
    pub module_path: Option<PathBuf>,

    /// Registry transfer settings.
    #[command(flatten)]
    pub transfer: TransferArgs,
}

/// Executes the `fn` command.
///
/// A remote module is fetched into a fresh temporary directory that is
/// removed once the invocation returns.
///
/// # Errors
///
/// Returns an error if the input is not a `ResourceList` or the function
/// fails. Nothing is written to stdout on error.
pub fn execute(args: FnArgs) -> anyhow::Result<()> {
    let input = output::read_stdin()?;
    let list = ResourceList::from_yaml(&input)?;
    let remote = list
        .function_config
        .as_ref()
        .is_some_and(|config| config.get("remoteModule").is_some_and(|m| !m.is_null()));

    let mut runtime = args.transfer.runtime_config()?;
    if let Some(path) = args.module_path {
        runtime.module_path = path;
    }

    let working_dir = if remote {
        let dir = module_working_dir("fn")?;
        runtime.module_path = dir.path().join("module");
        Some(dir)
    } else {
        None
    };

    let options = FunctionBuilder::from_runtime_config(&runtime)
        .transfer_options(args.transfer.transfer_options(&runtime)?)
        .build()?;
    tracing::debug!(module_path = %options.module_path.display(), remote, "running function");

    let result = kast_runtime::process(&Function::new(options), &input);
    drop(working_dir);
    emit(result)
}
