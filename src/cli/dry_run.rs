// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Dry-run command - run pipes on mock inputs with the mock generator

use colored::Colorize;
use miette::Result;
use std::path::{Path, PathBuf};

use crate::run::{dry_run_pipe, DryRunOutput, Engine};
use crate::utils::{create_progress_bar, create_spinner};

/// Run the dry-run command
pub async fn run(
    bundle_path: PathBuf,
    pipe: Option<String>,
    sequential: bool,
    config_path: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    let config = super::load_config(config_path)?;
    let (_, blueprint) = super::read_bundle(&bundle_path)?;

    let mut engine = Engine::new(config);
    let loaded = engine.load_bundle(&blueprint)?;
    let codes = match pipe {
        Some(code) => vec![code],
        None => loaded.pipe_codes.clone(),
    };

    let outputs = if sequential {
        let ctx = engine.context();
        let progress = create_progress_bar(codes.len() as u64, "Dry-running");
        let mut outputs = Vec::with_capacity(codes.len());
        for code in &codes {
            let pipe = ctx.pipes().get_required(code)?;
            progress.set_message(code.clone());
            outputs.push(dry_run_pipe(&ctx, &pipe).await);
            progress.inc(1);
        }
        progress.finish_and_clear();
        outputs
    } else {
        let spinner = create_spinner(&format!("Dry-running {} pipes", codes.len()));
        let outputs = engine.dry_run(&codes, true).await;
        spinner.finish_and_clear();
        outputs?
    };

    report(&engine, &outputs, verbose)
}

fn report(engine: &Engine, outputs: &[DryRunOutput], verbose: bool) -> Result<()> {
    let config = engine.config();
    let mut failed = Vec::new();

    for output in outputs {
        if !output.status.is_failure() {
            println!("  {} {}", "✓".green(), output.pipe_code);
            continue;
        }
        let message = output.error_message.as_deref().unwrap_or("unknown error");
        if config.is_allowed_to_fail(&output.pipe_code) {
            println!("  {} {} {}", "⚠".yellow(), output.pipe_code, "(allowed to fail)".dimmed());
            if verbose {
                println!("      {}", message.dimmed());
            }
        } else {
            println!("  {} {} - {}", "✗".red(), output.pipe_code, message.dimmed());
            failed.push(output.pipe_code.as_str());
        }
    }

    println!();
    if failed.is_empty() {
        println!(
            "{}",
            format!("Dry run passed for {} pipes", outputs.len()).green().bold()
        );
        Ok(())
    } else {
        Err(miette::miette!("Dry run failed for: {}", failed.join(", ")))
    }
}
