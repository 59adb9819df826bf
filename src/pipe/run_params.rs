// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Run parameters carried down the pipe call tree

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::multiplicity::{resolve_output_multiplicity, OutputMultiplicity};
use crate::errors::{PipeflowError, PipeflowResult};

/// Whether a run does real work or mock work
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Live,
    Dry,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Dry => write!(f, "dry"),
        }
    }
}

/// Names used when mapping a pipe over a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchParams {
    /// Working memory name of the list
    pub input_list_name: String,
    /// Name each item is bound to inside a branch
    pub input_item_name: String,
}

impl BatchParams {
    pub fn new(input_list_name: &str, input_item_name: &str) -> Self {
        Self {
            input_list_name: input_list_name.to_string(),
            input_item_name: input_item_name.to_string(),
        }
    }
}

/// Identifies the job a pipe runs for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub pipeline_run_id: String,
    #[serde(default)]
    pub job_name: Option<String>,
}

impl JobMetadata {
    pub fn new(job_name: Option<&str>) -> Self {
        Self {
            pipeline_run_id: Uuid::new_v4().to_string(),
            job_name: job_name.map(str::to_string),
        }
    }
}

impl Default for JobMetadata {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Parameters of one pipe invocation
///
/// Controllers hand a copy to every concurrent branch, so a branch never
/// observes another branch's stack or overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipeRunParams {
    #[serde(default)]
    pub run_mode: RunMode,

    /// Caller override of the pipe's declared multiplicity
    #[serde(default)]
    pub output_multiplicity: Option<OutputMultiplicity>,

    /// Concept string used when the pipe outputs `Dynamic`
    #[serde(default)]
    pub dynamic_output_concept: Option<String>,

    #[serde(default)]
    pub batch_params: Option<BatchParams>,

    /// Codes of the pipes currently running, outermost first
    #[serde(default)]
    pub pipe_stack: Vec<String>,

    pub pipe_stack_limit: usize,

    #[serde(default)]
    pub extra_params: BTreeMap<String, Value>,
}

impl PipeRunParams {
    pub fn new(run_mode: RunMode, pipe_stack_limit: usize) -> Self {
        Self {
            run_mode,
            output_multiplicity: None,
            dynamic_output_concept: None,
            batch_params: None,
            pipe_stack: Vec::new(),
            pipe_stack_limit,
            extra_params: BTreeMap::new(),
        }
    }

    pub fn with_output_multiplicity(mut self, multiplicity: Option<OutputMultiplicity>) -> Self {
        self.output_multiplicity = multiplicity;
        self
    }

    pub fn is_dry(&self) -> bool {
        self.run_mode == RunMode::Dry
    }

    /// Push a frame, failing without any change if the stack is full
    pub fn push_pipe(&mut self, pipe_code: &str) -> PipeflowResult<()> {
        if self.pipe_stack.len() >= self.pipe_stack_limit {
            return Err(PipeflowError::PipeStackOverflow {
                limit: self.pipe_stack_limit,
                pipe_stack: self.pipe_stack.clone(),
            });
        }
        self.pipe_stack.push(pipe_code.to_string());
        Ok(())
    }

    pub fn pop_pipe(&mut self) -> Option<String> {
        self.pipe_stack.pop()
    }

    /// Whether the pipe must produce a list, given its declared multiplicity
    pub fn is_multiple_output_required(&self, base: Option<OutputMultiplicity>) -> bool {
        resolve_output_multiplicity(base, self.output_multiplicity).is_multiple_enabled
    }

    /// Copy handed to a sub pipe: same stack and mode, no per-call overrides
    pub fn for_sub_pipe(&self) -> Self {
        Self {
            output_multiplicity: None,
            batch_params: None,
            dynamic_output_concept: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_limit_leaves_stack_untouched() {
        let mut params = PipeRunParams::new(RunMode::Live, 2);
        params.push_pipe("outer").unwrap();
        params.push_pipe("inner").unwrap();

        let err = params.push_pipe("deeper").unwrap_err();
        match err {
            PipeflowError::PipeStackOverflow { limit, pipe_stack } => {
                assert_eq!(limit, 2);
                assert_eq!(pipe_stack, vec!["outer", "inner"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(params.pipe_stack, vec!["outer", "inner"]);
        assert_eq!(params.pop_pipe().as_deref(), Some("inner"));
    }

    #[test]
    fn test_sub_pipe_copy_drops_overrides() {
        let mut params = PipeRunParams::new(RunMode::Dry, 10)
            .with_output_multiplicity(Some(OutputMultiplicity::Count(2)));
        params.batch_params = Some(BatchParams::new("items", "item"));
        params.push_pipe("outer").unwrap();

        let sub = params.for_sub_pipe();
        assert!(sub.output_multiplicity.is_none());
        assert!(sub.batch_params.is_none());
        assert_eq!(sub.pipe_stack, params.pipe_stack);
        assert!(sub.is_dry());
        assert!(params.is_multiple_output_required(None));
    }
}
