// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Batch controller

use futures::future::join_all;
use std::collections::BTreeSet;

use crate::errors::{PipeflowError, PipeflowResult};
use crate::memory::{Stuff, StuffContent, WorkingMemory};
use crate::pipe::{BatchParams, JobMetadata, Pipe, PipeLibrary, PipeOutput, PipeRunParams};
use crate::run::RunContext;

/// Maps a branch pipe over every item of a list
#[derive(Debug, Clone, PartialEq)]
pub struct PipeBatch {
    pub branch_pipe_code: String,
    pub batch_params: BatchParams,
}

impl PipeBatch {
    pub fn pipe_dependencies(&self) -> BTreeSet<String> {
        BTreeSet::from([self.branch_pipe_code.clone()])
    }

    /// Branch inputs, with the item replaced by the list
    pub fn required_variables(&self, pipes: &PipeLibrary) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = pipes
            .get(&self.branch_pipe_code)
            .map(|branch| branch.inputs.names().map(str::to_string).collect())
            .unwrap_or_default();
        names.remove(&self.batch_params.input_item_name);
        names.insert(self.batch_params.input_list_name.clone());
        names
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
        let BatchParams {
            input_list_name,
            input_item_name,
        } = &self.batch_params;

        let item_concept = pipe
            .inputs
            .get(input_list_name)
            .map(|requirement| requirement.concept.clone())
            .ok_or_else(|| {
                PipeflowError::definition(
                    &pipe.code,
                    format!("batch list '{}' is not among the pipe inputs", input_list_name),
                )
            })?;
        let list_stuff = memory.get(input_list_name)?.clone();
        let items: Vec<StuffContent> = memory.get_as_list(input_list_name)?.to_vec();
        let branch_pipe = ctx.pipes().get_required(&self.branch_pipe_code)?;
        let branch_pipe = &branch_pipe;

        let item_stuffs: Vec<Stuff> = items
            .into_iter()
            .map(|item| Stuff::new(item_concept.clone(), item).named(input_item_name))
            .collect();

        tracing::debug!(
            "Batch '{}' mapping '{}' over {} items",
            pipe.code,
            self.branch_pipe_code,
            item_stuffs.len()
        );

        let base_name = output_name
            .map(str::to_string)
            .unwrap_or_else(|| pipe.output.default_stuff_name());

        let branch_runs: Vec<_> = item_stuffs
            .iter()
            .enumerate()
            .map(|(branch_index, item_stuff)| {
                let mut branch_memory = memory.clone();
                branch_memory.set_new_main_stuff(item_stuff.clone(), Some(input_item_name.as_str()));
                let mut branch_params = params.for_sub_pipe();
                let branch_output_name = format!("{}_item_{}", base_name, branch_index + 1);
                async move {
                    branch_pipe
                        .run(
                            ctx,
                            job,
                            &mut branch_memory,
                            &mut branch_params,
                            Some(branch_output_name.as_str()),
                        )
                        .await
                }
            })
            .collect();
        let results = join_all(branch_runs).await;

        let mut outputs = Vec::with_capacity(results.len());
        for (branch_index, (result, item_stuff)) in results.into_iter().zip(&item_stuffs).enumerate() {
            let output = result.map_err(|e| PipeflowError::BatchBranchFailed {
                pipe_code: pipe.code.clone(),
                branch_index,
                source: Box::new(e),
            })?;
            let produced = output.into_main_stuff()?;
            ctx.tracker()
                .add_batch_step(&list_stuff, item_stuff, branch_index, &params.pipe_stack);
            outputs.push(produced.content);
        }

        let output_stuff = Stuff::new(pipe.output.clone(), StuffContent::list(outputs)).named(&base_name);
        memory.set_new_main_stuff(output_stuff.clone(), Some(base_name.as_str()));

        Ok(PipeOutput::new(output_stuff, &job.pipeline_run_id))
    }
}
