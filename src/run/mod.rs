// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Running pipes
//!
//! [`Engine`] is the entry point: it loads bundles into its libraries and
//! runs pipes through the [`PipeRouter`], live or dry.

mod context;
pub mod dry_run;
mod execute;
mod router;

pub use context::{Libraries, RunContext};
pub use dry_run::{dry_run_pipe, dry_run_pipes, DryRunOutput, DryRunStatus};
pub use execute::{BundleValidation, Engine, ExecuteRequest, ExecutionOutput, PipeInputs};
pub use router::{LoggingObserver, NoOpObserver, PipeObserver, PipeRouter, PipeRunEvent};
