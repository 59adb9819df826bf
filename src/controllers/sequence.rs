// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Sequence controller

use std::collections::{BTreeSet, HashSet};

use super::{Controller, SubPipe};
use crate::errors::{PipeflowError, PipeflowResult};
use crate::memory::WorkingMemory;
use crate::pipe::{
    InputRequirements, JobMetadata, OutputMultiplicity, Pipe, PipeLibrary, PipeOutput,
    PipeRunParams,
};
use crate::run::RunContext;

/// Runs its steps in order on the shared working memory
#[derive(Debug, Clone, PartialEq)]
pub struct PipeSequence {
    pub steps: Vec<SubPipe>,
}

impl PipeSequence {
    pub fn new(pipe_code: &str, steps: Vec<SubPipe>) -> PipeflowResult<Self> {
        if steps.is_empty() {
            return Err(PipeflowError::definition(pipe_code, "a sequence needs at least one step"));
        }
        Ok(Self { steps })
    }

    pub fn pipe_dependencies(&self) -> BTreeSet<String> {
        self.steps.iter().map(|step| step.pipe_code.clone()).collect()
    }

    /// Step codes in execution order, without repeats
    pub fn ordered_pipe_dependencies(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.steps
            .iter()
            .filter(|step| seen.insert(step.pipe_code.as_str()))
            .map(|step| step.pipe_code.clone())
            .collect()
    }

    /// Inputs the steps need that no earlier step produces
    pub fn needed_inputs(
        &self,
        pipe: &Pipe,
        pipes: &PipeLibrary,
        visited: &HashSet<String>,
    ) -> PipeflowResult<InputRequirements> {
        let mut needed = InputRequirements::new();
        let mut generated: HashSet<String> = HashSet::new();

        for step in &self.steps {
            let sub_pipe = pipes.get_required(&step.pipe_code)?;
            let sub_needed = sub_pipe.needed_inputs(pipes, visited)?;

            if let Some(Controller::Parallel(parallel)) = sub_pipe.as_controller() {
                if parallel.add_each_output {
                    generated.extend(
                        parallel
                            .branches
                            .iter()
                            .filter_map(|branch| branch.output_name.clone()),
                    );
                }
            }

            match &step.batch_params {
                Some(batch) => {
                    if !generated.contains(&batch.input_list_name) {
                        let item = sub_needed.get(&batch.input_item_name).ok_or_else(|| {
                            PipeflowError::definition(
                                &pipe.code,
                                format!(
                                    "batch item '{}' is not an input of step '{}'",
                                    batch.input_item_name, step.pipe_code
                                ),
                            )
                        })?;
                        needed.add(
                            &batch.input_list_name,
                            item.concept.clone(),
                            Some(OutputMultiplicity::Flag(true)),
                        );
                        for (name, requirement) in sub_needed.iter() {
                            if name != batch.input_item_name && !generated.contains(name) {
                                needed.add(name, requirement.concept.clone(), requirement.multiplicity);
                            }
                        }
                    }
                }
                None => {
                    for (name, requirement) in sub_needed.iter() {
                        if !generated.contains(name) {
                            needed.add(name, requirement.concept.clone(), requirement.multiplicity);
                        }
                    }
                }
            }

            if let Some(output_name) = &step.output_name {
                generated.insert(output_name.clone());
            }
        }

        Ok(needed)
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
        let mut last_output = None;

        for (step_index, step) in self.steps.iter().enumerate() {
            let output = step
                .run(pipe, ctx, job, memory, params)
                .await
                .map_err(|e| PipeflowError::SequenceStepFailed {
                    pipe_code: pipe.code.clone(),
                    step_index,
                    step_pipe_code: step.pipe_code.clone(),
                    source: Box::new(e),
                })?;
            last_output = Some(output);
        }

        let output = last_output
            .ok_or_else(|| PipeflowError::definition(&pipe.code, "a sequence needs at least one step"))?;

        match (output_name, output.main_stuff) {
            (Some(name), Some(stuff)) => {
                let stuff = stuff.named(name);
                memory.set_new_main_stuff(stuff.clone(), Some(name));
                Ok(PipeOutput::new(stuff, &job.pipeline_run_id))
            }
            (_, main_stuff) => Ok(PipeOutput {
                main_stuff,
                pipeline_run_id: job.pipeline_run_id.clone(),
            }),
        }
    }
}
