// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! pipeflow - Typed Pipe Orchestration
//!
//! Validate, inspect and run pipe bundles.

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pipeflow::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "pipeflow=debug" } else { "pipeflow=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Validate { bundle } => {
            pipeflow::cli::validate::run(bundle, config, cli.verbose).await
        }
        Commands::Graph { bundle, format } => {
            pipeflow::cli::graph::run(bundle, format, cli.verbose).await
        }
        Commands::DryRun {
            bundle,
            pipe,
            sequential,
        } => pipeflow::cli::dry_run::run(bundle, pipe, sequential, config, cli.verbose).await,
        Commands::Run {
            bundle,
            pipe,
            inputs,
            format,
        } => pipeflow::cli::run::run(bundle, pipe, inputs, format, config, cli.verbose).await,
    }
}
