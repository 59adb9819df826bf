// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Pipes
//!
//! A pipe is either an operator, which does one unit of work through a
//! collaborator, or a controller, which runs other pipes. Both go through
//! the same [`Pipe::run`] contract.

mod input;
mod library;
pub mod multiplicity;
pub mod operators;
mod output;
mod run_params;

pub use input::{InputRequirement, InputRequirements};
pub use library::PipeLibrary;
pub use multiplicity::{
    parse_concept_with_multiplicity, resolve_output_multiplicity, ConceptWithMultiplicity,
    MultiplicityResolution, OutputMultiplicity,
};
pub use operators::{Operator, PipeCompose, PipeExtract, PipeFunc, PipeImgGen, PipeLlm};
pub use output::PipeOutput;
pub use run_params::{BatchParams, JobMetadata, PipeRunParams, RunMode};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::concept::{Concept, NativeConceptCode};
use crate::controllers::Controller;
use crate::errors::{PipeflowError, PipeflowResult};
use crate::memory::{Stuff, WorkingMemory};
use crate::run::RunContext;

/// Operator or controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipeCategory {
    Operator,
    Controller,
}

/// Concrete pipe type, as written in bundle files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PipeType {
    #[serde(rename = "PipeLLM")]
    Llm,
    #[serde(rename = "PipeImgGen")]
    ImgGen,
    #[serde(rename = "PipeExtract")]
    Extract,
    #[serde(rename = "PipeCompose")]
    Compose,
    #[serde(rename = "PipeFunc")]
    Func,
    #[serde(rename = "PipeSequence")]
    Sequence,
    #[serde(rename = "PipeParallel")]
    Parallel,
    #[serde(rename = "PipeBatch")]
    Batch,
    #[serde(rename = "PipeCondition")]
    Condition,
}

impl PipeType {
    pub const ALL: [PipeType; 9] = [
        Self::Llm,
        Self::ImgGen,
        Self::Extract,
        Self::Compose,
        Self::Func,
        Self::Sequence,
        Self::Parallel,
        Self::Batch,
        Self::Condition,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Llm => "PipeLLM",
            Self::ImgGen => "PipeImgGen",
            Self::Extract => "PipeExtract",
            Self::Compose => "PipeCompose",
            Self::Func => "PipeFunc",
            Self::Sequence => "PipeSequence",
            Self::Parallel => "PipeParallel",
            Self::Batch => "PipeBatch",
            Self::Condition => "PipeCondition",
        }
    }

    pub fn category(&self) -> PipeCategory {
        match self {
            Self::Llm | Self::ImgGen | Self::Extract | Self::Compose | Self::Func => {
                PipeCategory::Operator
            }
            Self::Sequence | Self::Parallel | Self::Batch | Self::Condition => {
                PipeCategory::Controller
            }
        }
    }
}

impl fmt::Display for PipeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static references from a pipe (or pipe definition) to other pipes
pub trait PipeDependencies {
    /// Codes of every pipe this one may run
    fn pipe_dependencies(&self) -> BTreeSet<String>;

    /// Dependencies in execution order, when that order is meaningful
    fn ordered_pipe_dependencies(&self) -> Option<Vec<String>> {
        None
    }
}

/// Work done by a pipe
#[derive(Debug, Clone)]
pub enum PipeKind {
    Operator(Operator),
    Controller(Controller),
}

/// A typed unit of work
#[derive(Debug, Clone)]
pub struct Pipe {
    pub code: String,
    pub domain: String,
    pub description: String,
    pub inputs: InputRequirements,
    pub output: Concept,
    pub output_multiplicity: Option<OutputMultiplicity>,
    pub kind: PipeKind,
}

impl Pipe {
    pub fn pipe_type(&self) -> PipeType {
        match &self.kind {
            PipeKind::Operator(op) => op.pipe_type(),
            PipeKind::Controller(c) => c.pipe_type(),
        }
    }

    pub fn category(&self) -> PipeCategory {
        self.pipe_type().category()
    }

    /// `domain.code`
    pub fn full_code(&self) -> String {
        format!("{}.{}", self.domain, self.code)
    }

    pub fn as_controller(&self) -> Option<&Controller> {
        match &self.kind {
            PipeKind::Controller(c) => Some(c),
            PipeKind::Operator(_) => None,
        }
    }

    /// Variables that must be present in working memory before running
    pub fn required_variables(&self, pipes: &PipeLibrary) -> BTreeSet<String> {
        self.required_variables_guarded(pipes, &mut HashSet::new())
    }

    pub(crate) fn required_variables_guarded(
        &self,
        pipes: &PipeLibrary,
        visited: &mut HashSet<String>,
    ) -> BTreeSet<String> {
        if !visited.insert(self.code.clone()) {
            return BTreeSet::new();
        }
        match &self.kind {
            PipeKind::Operator(op) => op.required_variables(&self.inputs),
            PipeKind::Controller(c) => c.required_variables(pipes, visited),
        }
    }

    /// Inputs needed to run this pipe from an empty memory
    ///
    /// Follows controllers into their sub pipes. `visited` holds the codes
    /// on the current path so self-referencing graphs terminate.
    pub fn needed_inputs(
        &self,
        pipes: &PipeLibrary,
        visited: &HashSet<String>,
    ) -> PipeflowResult<InputRequirements> {
        match &self.kind {
            PipeKind::Operator(_) => Ok(self.inputs.clone()),
            PipeKind::Controller(controller) => {
                if visited.contains(&self.code) {
                    return Ok(InputRequirements::new());
                }
                let mut path = visited.clone();
                path.insert(self.code.clone());
                controller.needed_inputs(self, pipes, &path)
            }
        }
    }

    /// Concept of the produced stuff, resolving `Dynamic` from the params
    pub fn output_concept(&self, ctx: &RunContext, params: &PipeRunParams) -> PipeflowResult<Concept> {
        if self.output.native_code() == Some(NativeConceptCode::Dynamic) {
            if let Some(concept_string) = &params.dynamic_output_concept {
                return Ok(ctx.concepts().get_required(concept_string)?.clone());
            }
        }
        Ok(self.output.clone())
    }

    /// Multiplicity the pipe must honor for this call
    pub fn resolved_multiplicity(&self, params: &PipeRunParams) -> MultiplicityResolution {
        resolve_output_multiplicity(self.output_multiplicity, params.output_multiplicity)
    }

    /// Run the pipe
    ///
    /// Pushes the pipe on the stack, checks its required variables,
    /// dispatches to the operator or controller and pops the stack on every
    /// exit path. Errors leave wrapped once in `PipeRunFailed` with the
    /// stack at the point of failure.
    pub fn run<'a>(
        &'a self,
        ctx: &'a RunContext,
        job: &'a JobMetadata,
        memory: &'a mut WorkingMemory,
        params: &'a mut PipeRunParams,
        output_name: Option<&'a str>,
    ) -> BoxFuture<'a, PipeflowResult<PipeOutput>> {
        Box::pin(async move {
            params.push_pipe(&self.code)?;
            tracing::debug!(
                "Running {} '{}' ({} mode, depth {})",
                self.pipe_type(),
                self.code,
                params.run_mode,
                params.pipe_stack.len()
            );

            let result = self
                .run_inner(ctx, job, memory, params, output_name)
                .await
                .map_err(|e| {
                    if e.pipe_stack().is_some() {
                        e
                    } else {
                        PipeflowError::PipeRunFailed {
                            pipe_code: self.code.clone(),
                            pipe_stack: params.pipe_stack.clone(),
                            source: Box::new(e),
                        }
                    }
                });

            params.pop_pipe();
            if result.is_ok() {
                tracing::debug!("Finished '{}'", self.code);
            }
            result
        })
    }

    async fn run_inner(
        &self,
        ctx: &RunContext,
        job: &JobMetadata,
        memory: &mut WorkingMemory,
        params: &mut PipeRunParams,
        output_name: Option<&str>,
    ) -> PipeflowResult<PipeOutput> {
        self.check_inputs_in_memory(ctx, memory)?;

        match &self.kind {
            PipeKind::Operator(op) => {
                let concept = self.output_concept(ctx, params)?;
                let content = op.run(self, ctx, job, memory, params, &concept).await?;
                let name = output_name
                    .map(str::to_string)
                    .unwrap_or_else(|| concept.default_stuff_name());
                let stuff = Stuff::new(concept, content).named(&name);
                memory.set_new_main_stuff(stuff.clone(), Some(name.as_str()));
                Ok(PipeOutput::new(stuff, &job.pipeline_run_id))
            }
            PipeKind::Controller(c) => c.run(self, ctx, job, memory, params, output_name).await,
        }
    }

    fn check_inputs_in_memory(&self, ctx: &RunContext, memory: &WorkingMemory) -> PipeflowResult<()> {
        let required = match &self.kind {
            // the chosen branch is checked once the expression is evaluated
            PipeKind::Controller(Controller::Condition(condition)) => condition.expression_variables(),
            _ => self.required_variables(ctx.pipes()),
        };
        let missing: Vec<String> = required
            .into_iter()
            .filter(|name| !name.starts_with('_') && !memory.contains(name))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipeflowError::PipeInputs {
                pipe_code: self.code.clone(),
                missing,
            })
        }
    }
}

impl PipeDependencies for Pipe {
    fn pipe_dependencies(&self) -> BTreeSet<String> {
        match &self.kind {
            PipeKind::Operator(_) => BTreeSet::new(),
            PipeKind::Controller(c) => c.pipe_dependencies(),
        }
    }

    fn ordered_pipe_dependencies(&self) -> Option<Vec<String>> {
        match &self.kind {
            PipeKind::Operator(_) => None,
            PipeKind::Controller(c) => c.ordered_pipe_dependencies(),
        }
    }
}
