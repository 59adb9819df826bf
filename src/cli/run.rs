// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Run command - execute a pipe with the offline generator

use colored::Colorize;
use miette::Result;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::OutputFormat;
use crate::errors::PipeflowError;
use crate::run::{Engine, ExecuteRequest, LoggingObserver, PipeInputs};

/// Run a pipe and print its main stuff
pub async fn run(
    bundle_path: PathBuf,
    pipe: Option<String>,
    inputs_path: Option<PathBuf>,
    format: OutputFormat,
    config_path: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    let config = super::load_config(config_path)?;
    let (content, blueprint) = super::read_bundle(&bundle_path)?;

    let inputs = match &inputs_path {
        Some(path) => read_inputs(path)?,
        None => Map::new(),
    };

    let mut engine = Engine::new(config);
    if verbose {
        engine = engine.with_observer(Arc::new(LoggingObserver));
    }

    let request = ExecuteRequest {
        pipe_code: pipe,
        bundle_content: Some(content),
        inputs: PipeInputs::Values(inputs),
        job_name: Some(blueprint.domain.clone()),
        ..ExecuteRequest::default()
    };

    let output = match engine.execute(request).await {
        Ok(output) => output,
        Err(e) => {
            eprintln!("{}", "Pipe run failed:".red().bold());
            if let Some(stack) = e.pipe_stack() {
                eprintln!("  {} {}", "Stack:".dimmed(), stack.join(" > "));
            }
            if let Some(missing) = e.missing_inputs() {
                eprintln!("  {} {}", "Missing inputs:".dimmed(), missing.join(", "));
            }
            return Err(e.into());
        }
    };

    let stuff = output.pipe_output.main_stuff()?;
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(stuff).map_err(PipeflowError::from)?,
        OutputFormat::Yaml => serde_yaml::to_string(stuff).map_err(PipeflowError::from)?,
    };
    println!("{}", rendered);

    if verbose {
        eprintln!();
        eprintln!("{}", "Working memory:".bold());
        eprintln!("{}", output.working_memory.summary().dimmed());
    }

    Ok(())
}

fn read_inputs(path: &Path) -> Result<Map<String, Value>> {
    let content = std::fs::read_to_string(path).map_err(|e| PipeflowError::FileReadError {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    match serde_json::from_str(&content).map_err(PipeflowError::from)? {
        Value::Object(map) => Ok(map),
        _ => Err(miette::miette!(
            "Inputs file '{}' must hold a JSON object",
            path.display()
        )),
    }
}
