//! `kast run` — Run a module over resources read from stdin.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgGroup, Args};
use kast_common::config::{FunctionConfig, RemoteModule, Selector};
use kast_common::constants::{
    CLI_CONFIG_API_VERSION, CLI_CONFIG_KIND, VALIDATOR_ANNOTATION_KEY, VALIDATOR_ANNOTATION_VALUE,
};
use kast_runtime::{Function, FunctionBuilder, FunctionError, read_items, write_items};

use super::{TransferArgs, emit, module_working_dir, parse_reference};
use crate::output;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("source").required(true).args(["config", "module"])))]
pub struct RunArgs {
    /// Function config file (the `functionConfig` of a ResourceList).
    #[arg(
        short,
        long,
        value_name = "FILE",
        conflicts_with_all = ["validate_only", "include_all", "plain_http"]
    )]
    pub config: Option<PathBuf>,

    /// Module to run: a local directory or a `registry/repository[:tag]` reference.
    #[arg(short, long, value_name = "MODULE")]
    pub module: Option<String>,

    /// Only validate the input; never append outputs.
    #[arg(short, long)]
    pub validate_only: bool,

    /// Forward every input resource to the module as an include.
    #[arg(short = 'a', long)]
    pub include_all: bool,

    /// Talk to the registry over plain HTTP.
    #[arg(long)]
    pub plain_http: bool,

    /// Registry transfer settings.
    #[command(flatten)]
    pub transfer: TransferArgs,
}

/// Executes the `run` command.
///
/// Resources are read from stdin as a ResourceList or a YAML stream and
/// written to stdout as a YAML stream.
///
/// # Errors
///
/// Returns an error if the config or module cannot be resolved, the input
/// cannot be parsed, or the function fails.
pub fn execute(args: RunArgs) -> anyhow::Result<()> {
    let (config, local_module) = match (&args.config, &args.module) {
        (Some(path), _) => (load_config(path)?, None),
        (None, Some(module)) => synthesize_config(module, &args)?,
        (None, None) => anyhow::bail!("either --config or --module must be specified"),
    };

    let input = output::read_stdin()?;
    let items = read_items(&input)?;

    let mut runtime = args.transfer.runtime_config()?;
    let working_dir = if config.remote_module.is_some() {
        let dir = module_working_dir("run")?;
        runtime.module_path = dir.path().join("module");
        Some(dir)
    } else {
        if let Some(path) = local_module {
            runtime.module_path = path;
        }
        None
    };

    let options = FunctionBuilder::from_runtime_config(&runtime)
        .transfer_options(args.transfer.transfer_options(&runtime)?)
        .build()?;
    tracing::info!(
        module_path = %options.module_path.display(),
        items = items.len(),
        validator = config.is_validator(),
        "running module"
    );

    let result = Function::new(options)
        .run(items, &config)
        .and_then(|out| write_items(&out).map_err(FunctionError::from));
    drop(working_dir);
    emit(result)
}

fn load_config(path: &Path) -> anyhow::Result<FunctionConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    FunctionConfig::from_yaml(&raw)
        .with_context(|| format!("invalid config file {}", path.display()))
}

/// Builds a config from the command-line flags. Returns the module directory
/// when `module` is local.
fn synthesize_config(
    module: &str,
    args: &RunArgs,
) -> anyhow::Result<(FunctionConfig, Option<PathBuf>)> {
    let mut config = FunctionConfig {
        api_version: CLI_CONFIG_API_VERSION.to_string(),
        kind: CLI_CONFIG_KIND.to_string(),
        ..FunctionConfig::default()
    };
    if args.validate_only {
        config.set_annotation(VALIDATOR_ANNOTATION_KEY, VALIDATOR_ANNOTATION_VALUE);
    }
    if args.include_all {
        config.includes = vec![Selector::all()];
    }

    let path = Path::new(module);
    if path.is_dir() {
        return Ok((config, Some(path.to_path_buf())));
    }
    if path.exists() {
        anyhow::bail!("module {module} is not a directory");
    }

    let reference = parse_reference(module, args.plain_http)?;
    config.remote_module = Some(RemoteModule {
        registry: reference.registry,
        repo: reference.repository,
        tag: reference.tag,
        auth: None,
        plain_http: args.plain_http,
    });
    Ok((config, None))
}
