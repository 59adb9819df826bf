// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! # pipeflow - Typed Pipe Orchestration
//!
//! `pipeflow` runs graphs of typed pipes declared in TOML bundles.
//!
//! ## Features
//!
//! - **Typed data** - every stuff in working memory carries a concept
//! - **Operators** - LLM, image generation, extraction, templating and functions
//! - **Controllers** - sequence, parallel, batch and condition
//! - **Dry runs** - whole graphs execute against mock content before going live
//! - **Static validation** - inputs and concepts are checked at load time
//!
//! ## Quick Start
//!
//! ```bash
//! # Check a bundle and dry-run every pipe
//! pipeflow validate news.plx
//!
//! # Show which pipes run which
//! pipeflow graph news.plx --format mermaid
//!
//! # Run the main pipe offline
//! pipeflow run news.plx --inputs inputs.json
//! ```

pub mod bundle;
pub mod cli;
pub mod collaborators;
pub mod concept;
pub mod config;
pub mod controllers;
pub mod errors;
pub mod memory;
pub mod pipe;
pub mod run;
pub mod template;
pub mod utils;

// Re-export commonly used types
pub use bundle::{BundleBlueprint, BundleLoader, DependencyResolver};
pub use config::EngineConfig;
pub use errors::{PipeflowError, PipeflowResult};
pub use memory::{Stuff, StuffContent, WorkingMemory};
pub use pipe::{Pipe, PipeOutput, PipeRunParams, RunMode};
pub use run::{Engine, ExecuteRequest, ExecutionOutput, PipeInputs, RunContext};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
