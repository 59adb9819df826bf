// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Sub pipe: one step of a controller

use std::sync::Arc;

use super::{Controller, PipeBatch};
use crate::errors::{PipeflowError, PipeflowResult};
use crate::memory::WorkingMemory;
use crate::pipe::{
    BatchParams, InputRequirements, JobMetadata, OutputMultiplicity, Pipe, PipeKind, PipeOutput,
    PipeRunParams,
};
use crate::run::RunContext;

/// A reference to a pipe with per-call options
#[derive(Debug, Clone, PartialEq)]
pub struct SubPipe {
    pub pipe_code: String,
    /// Name the output is stored under
    pub output_name: Option<String>,
    pub output_multiplicity: Option<OutputMultiplicity>,
    pub batch_params: Option<BatchParams>,
}

impl SubPipe {
    pub fn new(pipe_code: &str) -> Self {
        Self {
            pipe_code: pipe_code.to_string(),
            output_name: None,
            output_multiplicity: None,
            batch_params: None,
        }
    }

    pub fn with_output_name(mut self, output_name: &str) -> Self {
        self.output_name = Some(output_name.to_string());
        self
    }

    pub fn with_multiplicity(mut self, multiplicity: OutputMultiplicity) -> Self {
        self.output_multiplicity = Some(multiplicity);
        self
    }

    pub fn with_batch(mut self, input_list_name: &str, input_item_name: &str) -> Self {
        self.batch_params = Some(BatchParams::new(input_list_name, input_item_name));
        self
    }

    /// Run the referenced pipe on `memory`
    ///
    /// Works on a copy of `params` carrying this step's overrides.
    pub async fn run(
        &self,
        calling_pipe: &Pipe,
        ctx: &RunContext,
        job: &JobMetadata,
        memory: &mut WorkingMemory,
        params: &PipeRunParams,
    ) -> PipeflowResult<PipeOutput> {
        let mut sub_params = params.for_sub_pipe();
        if self.output_multiplicity.is_some() {
            sub_params.output_multiplicity = self.output_multiplicity;
        }
        let target = ctx.pipes().get_required(&self.pipe_code)?;
        let output_name = self.output_name.as_deref();

        if let Some(batch_params) = &self.batch_params {
            let batch = self.make_batch(calling_pipe, &target, batch_params, memory)?;
            return batch.run(ctx, job, memory, &mut sub_params, output_name).await;
        }

        if matches!(target.as_controller(), Some(Controller::Condition(_))) {
            return target.run(ctx, job, memory, &mut sub_params, output_name).await;
        }

        let required_names: Vec<String> = target
            .required_variables(ctx.pipes())
            .into_iter()
            .filter(|name| !name.starts_with('_'))
            .collect();
        let required_stuffs = memory
            .get_stuffs(required_names.iter().map(String::as_str))
            .map_err(|e| match e {
                PipeflowError::StuffNotFound { name, .. } => PipeflowError::PipeInputs {
                    pipe_code: self.pipe_code.clone(),
                    missing: vec![name],
                },
                other => other,
            })?
            .into_iter()
            .cloned()
            .collect::<Vec<_>>();

        let output = target.run(ctx, job, memory, &mut sub_params, output_name).await?;

        if let Some(produced) = &output.main_stuff {
            for stuff in &required_stuffs {
                ctx.tracker()
                    .add_pipe_step(Some(stuff), produced, &self.pipe_code, &params.pipe_stack);
            }
        }
        Ok(output)
    }

    /// Wrap the target in a transient batch over `batch_params`
    fn make_batch(
        &self,
        calling_pipe: &Pipe,
        target: &Arc<Pipe>,
        batch_params: &BatchParams,
        memory: &WorkingMemory,
    ) -> PipeflowResult<Pipe> {
        if !memory.contains(&batch_params.input_list_name) {
            return Err(PipeflowError::PipeInputs {
                pipe_code: self.pipe_code.clone(),
                missing: vec![batch_params.input_list_name.clone()],
            });
        }
        memory.get_as_list(&batch_params.input_list_name)?;

        let item_requirement = target
            .inputs
            .get(&batch_params.input_item_name)
            .ok_or_else(|| {
                PipeflowError::definition(
                    &calling_pipe.code,
                    format!(
                        "batch item '{}' is not an input of pipe '{}'",
                        batch_params.input_item_name, self.pipe_code
                    ),
                )
            })?;

        let mut inputs = InputRequirements::new();
        inputs.add(
            &batch_params.input_list_name,
            item_requirement.concept.clone(),
            Some(OutputMultiplicity::Flag(true)),
        );
        for (name, requirement) in target.inputs.iter() {
            if name != batch_params.input_item_name {
                inputs.add(name, requirement.concept.clone(), requirement.multiplicity);
            }
        }

        Ok(Pipe {
            code: target.code.clone(),
            domain: target.domain.clone(),
            description: format!("Batch processing for {}", target.code),
            inputs,
            output: target.output.clone(),
            output_multiplicity: None,
            kind: PipeKind::Controller(Controller::Batch(PipeBatch {
                branch_pipe_code: target.code.clone(),
                batch_params: batch_params.clone(),
            })),
        })
    }
}
