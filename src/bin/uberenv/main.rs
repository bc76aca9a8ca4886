//! Uberenv CLI - bootstrap third-party libraries with Spack or vcpkg

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::Cli;
use uberenv::util::ShellExecutor;

fn main() {
    match run() {
        Ok(status) => std::process::exit(status),
        Err(e) => {
            eprintln!("[ERROR: {:#}]", e);
            std::process::exit(-1);
        }
    }
}

fn run() -> Result<i32> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("uberenv=debug")
    } else {
        EnvFilter::new("uberenv=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    tracing::info!("uberenv {}", env!("CARGO_PKG_VERSION"));

    let cwd = std::env::current_dir().context("failed to read the current directory")?;
    let opts = cli.into_options().finalize(&cwd)?;
    uberenv::ops::run(opts, Arc::new(ShellExecutor))
}
