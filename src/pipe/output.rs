// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

use serde::{Deserialize, Serialize};

use crate::errors::{PipeflowError, PipeflowResult};
use crate::memory::Stuff;

/// Result of one pipe run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipeOutput {
    /// The stuff the pipe produced, also stored as main stuff
    pub main_stuff: Option<Stuff>,
    pub pipeline_run_id: String,
}

impl PipeOutput {
    pub fn new(main_stuff: Stuff, pipeline_run_id: &str) -> Self {
        Self {
            main_stuff: Some(main_stuff),
            pipeline_run_id: pipeline_run_id.to_string(),
        }
    }

    /// Output of a pipe that produced nothing new
    pub fn empty(pipeline_run_id: &str) -> Self {
        Self {
            main_stuff: None,
            pipeline_run_id: pipeline_run_id.to_string(),
        }
    }

    pub fn main_stuff(&self) -> PipeflowResult<&Stuff> {
        self.main_stuff.as_ref().ok_or(PipeflowError::NoMainStuff)
    }

    pub fn into_main_stuff(self) -> PipeflowResult<Stuff> {
        self.main_stuff.ok_or(PipeflowError::NoMainStuff)
    }
}
