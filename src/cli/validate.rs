// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Validate command - static validation plus a dry run of every pipe

use colored::Colorize;
use miette::Result;
use std::path::{Path, PathBuf};

use crate::run::{DryRunStatus, Engine};
use crate::utils::create_spinner;

/// Run the validate command
pub async fn run(bundle_path: PathBuf, config_path: Option<&Path>, verbose: bool) -> Result<()> {
    println!("{}", "Validating bundle...".bold());
    println!();

    let config = super::load_config(config_path)?;
    let (content, blueprint) = match super::read_bundle(&bundle_path) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("  {} Failed to parse bundle", "✗".red());
            eprintln!();
            return Err(e);
        }
    };
    println!("  {} Bundle file is valid TOML", "✓".green());

    let mut engine = Engine::new(config);
    let spinner = create_spinner("Loading and dry-running pipes");
    let result = engine.validate_bundle(&content).await;
    spinner.finish_and_clear();

    let validation = match result {
        Ok(validation) => validation,
        Err(e) => {
            eprintln!("  {} Bundle '{}' failed to load", "✗".red(), blueprint.domain);
            eprintln!();
            return Err(e.into());
        }
    };
    println!(
        "  {} Loaded domain '{}' with {} pipes",
        "✓".green(),
        validation.domain,
        validation.pipe_codes.len()
    );

    if !validation.report.warnings.is_empty() {
        println!();
        println!("{}:", "Warnings".yellow().bold());
        for warning in &validation.report.warnings {
            println!("  {} {}", "⚠".yellow(), warning);
        }
    }

    println!();
    println!("{}:", "Dry run".bold());
    let config = engine.config();
    for output in &validation.dry_run {
        match output.status {
            DryRunStatus::Success => println!("  {} {}", "✓".green(), output.pipe_code),
            DryRunStatus::Failure if config.is_allowed_to_fail(&output.pipe_code) => println!(
                "  {} {} {}",
                "⚠".yellow(),
                output.pipe_code,
                "(allowed to fail)".dimmed()
            ),
            DryRunStatus::Failure => println!(
                "  {} {} - {}",
                "✗".red(),
                output.pipe_code,
                output.error_message.as_deref().unwrap_or("unknown error").dimmed()
            ),
        }
    }

    if verbose {
        println!();
        println!("{}:", "Bundle summary".bold());
        println!("  Domain: {}", blueprint.domain);
        println!("  Concepts: {}", blueprint.concepts.len());
        if let Some(main_pipe) = &blueprint.main_pipe {
            println!("  Main pipe: {}", main_pipe);
        }
        for code in &validation.pipe_codes {
            let pipe_type = blueprint.pipes[code.as_str()].pipe_type;
            println!("    - {} ({})", code, pipe_type.to_string().dimmed());
        }
    }

    println!();

    if validation.has_unexpected_failures(config) {
        Err(miette::miette!("Bundle validation failed"))
    } else if validation.report.has_warnings() {
        println!("{}", "Bundle is valid but has warnings.".yellow().bold());
        Ok(())
    } else {
        println!("{}", "Bundle is valid!".green().bold());
        Ok(())
    }
}
