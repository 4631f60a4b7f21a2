//! # kast — KRM functions from constraint modules
//!
//! Single binary for running a module as a KRM function, running it
//! standalone, and publishing or retrieving modules as OCI artifacts.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

mod commands;
mod output;

use clap::Parser;
use kast_common::constants::{LOG_FILTER_ENV_VAR, LOG_FORMAT_ENV_VAR, LOG_LEVEL_ENV_VAR};
use tracing_subscriber::EnvFilter;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    commands::execute(cli)
}

/// Logs go to stderr: stdout carries the resources.
fn init_tracing() {
    let directive = std::env::var(LOG_FILTER_ENV_VAR)
        .or_else(|_| std::env::var(LOG_LEVEL_ENV_VAR))
        .unwrap_or_else(|_| "info".to_string());
    let filter =
        EnvFilter::try_new(directive.to_lowercase()).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if std::env::var(LOG_FORMAT_ENV_VAR).is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}
