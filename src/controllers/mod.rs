// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Controllers
//!
//! Controllers do no work of their own. They decide which pipes run, in
//! what order and on which view of the working memory.

mod batch;
mod condition;
mod parallel;
mod sequence;
mod sub_pipe;

pub use batch::PipeBatch;
pub use condition::{ConditionExpression, Outcome, PipeCondition, OUTCOME_CONTINUE, OUTCOME_FAIL};
pub use parallel::PipeParallel;
pub use sequence::PipeSequence;
pub use sub_pipe::SubPipe;

use std::collections::{BTreeSet, HashSet};

use crate::errors::PipeflowResult;
use crate::memory::WorkingMemory;
use crate::pipe::{
    InputRequirements, JobMetadata, Pipe, PipeLibrary, PipeOutput, PipeRunParams, PipeType,
};
use crate::run::RunContext;

/// The four controller kinds
#[derive(Debug, Clone, PartialEq)]
pub enum Controller {
    Sequence(PipeSequence),
    Parallel(PipeParallel),
    Batch(PipeBatch),
    Condition(PipeCondition),
}

impl Controller {
    pub fn pipe_type(&self) -> PipeType {
        match self {
            Self::Sequence(_) => PipeType::Sequence,
            Self::Parallel(_) => PipeType::Parallel,
            Self::Batch(_) => PipeType::Batch,
            Self::Condition(_) => PipeType::Condition,
        }
    }

    /// Variables checked before the controller starts
    ///
    /// Sequences and parallels check nothing up front: each step checks
    /// its own inputs when it runs.
    pub fn required_variables(
        &self,
        pipes: &PipeLibrary,
        visited: &mut HashSet<String>,
    ) -> BTreeSet<String> {
        match self {
            Self::Sequence(_) | Self::Parallel(_) => BTreeSet::new(),
            Self::Batch(batch) => batch.required_variables(pipes),
            Self::Condition(condition) => condition.required_variables(pipes, visited),
        }
    }

    pub fn needed_inputs(
        &self,
        pipe: &Pipe,
        pipes: &PipeLibrary,
        visited: &HashSet<String>,
    ) -> PipeflowResult<InputRequirements> {
        match self {
            Self::Sequence(sequence) => sequence.needed_inputs(pipe, pipes, visited),
            Self::Parallel(parallel) => parallel.needed_inputs(pipe, pipes, visited),
            Self::Batch(_) => Ok(pipe.inputs.clone()),
            Self::Condition(condition) => condition.needed_inputs(pipes, visited),
        }
    }

    pub fn pipe_dependencies(&self) -> BTreeSet<String> {
        match self {
            Self::Sequence(sequence) => sequence.pipe_dependencies(),
            Self::Parallel(parallel) => parallel.pipe_dependencies(),
            Self::Batch(batch) => batch.pipe_dependencies(),
            Self::Condition(condition) => condition.mapped_pipe_codes(),
        }
    }

    /// Declaration order, for the controllers where order matters
    pub fn ordered_pipe_dependencies(&self) -> Option<Vec<String>> {
        match self {
            Self::Sequence(sequence) => Some(sequence.ordered_pipe_dependencies()),
            _ => None,
        }
    }

    pub async fn run(
        &self,
        pipe: &Pipe,
        ctx: &RunContext,
        job: &JobMetadata,
        memory: &mut WorkingMemory,
        params: &PipeRunParams,
        output_name: Option<&str>,
    ) -> PipeflowResult<PipeOutput> {
        match self {
            Self::Sequence(sequence) => sequence.run(pipe, ctx, job, memory, params, output_name).await,
            Self::Parallel(parallel) => parallel.run(pipe, ctx, job, memory, params, output_name).await,
            Self::Batch(batch) => batch.run(pipe, ctx, job, memory, params, output_name).await,
            Self::Condition(condition) => {
                condition.run(pipe, ctx, job, memory, params, output_name).await
            }
        }
    }
}
