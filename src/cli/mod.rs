// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for pipeflow.

pub mod dry_run;
pub mod graph;
pub mod run;
pub mod validate;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::bundle::BundleBlueprint;
use crate::config::{EngineConfig, CONFIG_FILE_NAME};

/// Typed pipe orchestration
///
/// Validate, inspect and run pipe bundles.
#[derive(Parser, Debug)]
#[clap(
    name = "pipeflow",
    version,
    about = "Typed pipe orchestration: validate, graph, dry-run and run pipe bundles",
    long_about = None,
    after_help = "Examples:\n\
        pipeflow validate news.plx             Check a bundle and dry-run its pipes\n\
        pipeflow graph news.plx -f mermaid     Show the pipe dependency graph\n\
        pipeflow dry-run news.plx --pipe fetch Dry-run a single pipe\n\
        pipeflow run news.plx -i inputs.json   Run the bundle's main pipe\n\n\
        See 'pipeflow <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Engine configuration file
    #[clap(long, global = true, value_name = "FILE", env = "PIPEFLOW_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Statically validate a bundle and dry-run every pipe
    Validate {
        /// Bundle file to validate
        bundle: PathBuf,
    },

    /// Show the pipe dependency graph
    Graph {
        /// Bundle file
        bundle: PathBuf,

        /// Output format
        #[clap(short, long, default_value = "text")]
        format: GraphFormat,
    },

    /// Dry-run pipes on mock inputs
    DryRun {
        /// Bundle file
        bundle: PathBuf,

        /// Dry-run only this pipe
        #[clap(short, long)]
        pipe: Option<String>,

        /// Run pipes one after the other instead of in parallel
        #[clap(long)]
        sequential: bool,
    },

    /// Run a pipe with the offline generator
    Run {
        /// Bundle file
        bundle: PathBuf,

        /// Pipe to run (defaults to the bundle's main_pipe)
        #[clap(short, long)]
        pipe: Option<String>,

        /// JSON file with input values
        #[clap(short, long)]
        inputs: Option<PathBuf>,

        /// Output format
        #[clap(short, long, default_value = "json")]
        format: OutputFormat,
    },
}

/// Output format for the run command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "yaml" => Ok(Self::Yaml),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}

impl std::str::FromStr for GraphFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "dot" => Ok(Self::Dot),
            "mermaid" => Ok(Self::Mermaid),
            _ => Err(format!("Unknown graph format: {}", s)),
        }
    }
}

/// Engine configuration from `--config`, or `pipeflow.toml` when present
pub fn load_config(path: Option<&Path>) -> miette::Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::load(Path::new(CONFIG_FILE_NAME))?,
    };
    Ok(config)
}

/// Read and parse a bundle file
pub(crate) fn read_bundle(path: &Path) -> miette::Result<(String, BundleBlueprint)> {
    if !path.exists() {
        return Err(miette::miette!("Bundle file not found: {}", path.display()));
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| miette::miette!("Failed to read '{}': {}", path.display(), e))?;
    let blueprint = BundleBlueprint::from_toml(&content)?;
    Ok((content, blueprint))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_dry_run_flags() {
        let cli = Cli::parse_from(["pipeflow", "dry-run", "news.plx", "--pipe", "fetch", "--sequential"]);
        match cli.command {
            Commands::DryRun {
                bundle,
                pipe,
                sequential,
            } => {
                assert_eq!(bundle, PathBuf::from("news.plx"));
                assert_eq!(pipe.as_deref(), Some("fetch"));
                assert!(sequential);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("Mermaid".parse::<GraphFormat>(), Ok(GraphFormat::Mermaid));
        assert_eq!("yaml".parse::<OutputFormat>(), Ok(OutputFormat::Yaml));
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
