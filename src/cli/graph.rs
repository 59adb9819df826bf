// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Graph command - show pipe dependencies

use miette::Result;
use std::path::PathBuf;

use super::GraphFormat;
use crate::bundle::DependencyGraph;

/// Run the graph command
pub async fn run(bundle_path: PathBuf, format: GraphFormat, _verbose: bool) -> Result<()> {
    let (_, blueprint) = super::read_bundle(&bundle_path)?;

    let graph = DependencyGraph::from_blueprint(&blueprint)?;

    let output = match format {
        GraphFormat::Text => graph.to_text(),
        GraphFormat::Dot => graph.to_dot(),
        GraphFormat::Mermaid => graph.to_mermaid(),
    };

    println!("{}", output);

    Ok(())
}
