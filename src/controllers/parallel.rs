// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Parallel controller

use futures::future::join_all;
use std::collections::{BTreeSet, HashSet};

use super::SubPipe;
use crate::concept::Concept;
use crate::errors::{PipeflowError, PipeflowResult};
use crate::memory::{Stuff, StuffContent, WorkingMemory, MAIN_STUFF_NAME};
use crate::pipe::{
    InputRequirements, JobMetadata, OutputMultiplicity, Pipe, PipeLibrary, PipeOutput,
    PipeRunParams,
};
use crate::run::RunContext;

/// Runs its branches concurrently, each on a snapshot of the memory
#[derive(Debug, Clone, PartialEq)]
pub struct PipeParallel {
    pub branches: Vec<SubPipe>,
    /// Store every branch result under its own name
    pub add_each_output: bool,
    /// Fold every branch result into one list of this concept
    pub combined_output: Option<Concept>,
}

impl PipeParallel {
    pub fn new(
        pipe_code: &str,
        branches: Vec<SubPipe>,
        add_each_output: bool,
        combined_output: Option<Concept>,
    ) -> PipeflowResult<Self> {
        if !add_each_output && combined_output.is_none() {
            return Err(PipeflowError::definition(
                pipe_code,
                "a parallel needs add_each_output or combined_output",
            ));
        }
        if branches.is_empty() {
            return Err(PipeflowError::definition(pipe_code, "a parallel needs at least one branch"));
        }
        let mut seen = HashSet::new();
        for branch in &branches {
            let name = branch.output_name.as_deref().ok_or_else(|| {
                PipeflowError::definition(
                    pipe_code,
                    format!("branch '{}' has no result name", branch.pipe_code),
                )
            })?;
            if !seen.insert(name) {
                return Err(PipeflowError::definition(
                    pipe_code,
                    format!("result name '{}' is used by several branches", name),
                ));
            }
        }
        Ok(Self {
            branches,
            add_each_output,
            combined_output,
        })
    }

    pub fn pipe_dependencies(&self) -> BTreeSet<String> {
        self.branches
            .iter()
            .map(|branch| branch.pipe_code.clone())
            .collect()
    }

    /// Union of what the branches need
    pub fn needed_inputs(
        &self,
        pipe: &Pipe,
        pipes: &PipeLibrary,
        visited: &HashSet<String>,
    ) -> PipeflowResult<InputRequirements> {
        let mut needed = InputRequirements::new();
        for branch in &self.branches {
            let sub_pipe = pipes.get_required(&branch.pipe_code)?;
            let sub_needed = sub_pipe.needed_inputs(pipes, visited)?;
            match &branch.batch_params {
                Some(batch) => {
                    let item = sub_needed.get(&batch.input_item_name).ok_or_else(|| {
                        PipeflowError::definition(
                            &pipe.code,
                            format!(
                                "batch item '{}' is not an input of branch '{}'",
                                batch.input_item_name, branch.pipe_code
                            ),
                        )
                    })?;
                    needed.add(
                        &batch.input_list_name,
                        item.concept.clone(),
                        Some(OutputMultiplicity::Flag(true)),
                    );
                    for (name, requirement) in sub_needed.iter() {
                        if name != batch.input_item_name {
                            needed.add(name, requirement.concept.clone(), requirement.multiplicity);
                        }
                    }
                }
                None => needed.merge(&sub_needed),
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
        let branch_runs: Vec<_> = self
            .branches
            .iter()
            .map(|branch| {
                let mut branch_memory = memory.clone();
                let branch_params = params.clone();
                async move {
                    branch
                        .run(pipe, ctx, job, &mut branch_memory, &branch_params)
                        .await
                }
            })
            .collect();
        let results = join_all(branch_runs).await;

        let mut branch_stuffs: Vec<Stuff> = Vec::with_capacity(results.len());
        for (branch, result) in self.branches.iter().zip(results) {
            let output = result.map_err(|e| PipeflowError::ParallelBranchFailed {
                pipe_code: pipe.code.clone(),
                branch_pipe_code: branch.pipe_code.clone(),
                source: Box::new(e),
            })?;
            let stuff = output.into_main_stuff()?;
            if self.add_each_output {
                if let Some(name) = &branch.output_name {
                    memory.add_new_stuff(name, stuff.clone());
                }
            }
            branch_stuffs.push(stuff);
        }

        let Some(concept) = &self.combined_output else {
            return self.finish_with_last_branch(job, memory, branch_stuffs, output_name);
        };

        let name = output_name
            .map(str::to_string)
            .unwrap_or_else(|| concept.default_stuff_name());
        let items = branch_stuffs.iter().map(|s| s.content.clone()).collect();
        let combined = Stuff::new(concept.clone(), StuffContent::list(items)).named(&name);
        memory.set_new_main_stuff(combined.clone(), Some(name.as_str()));
        for stuff in &branch_stuffs {
            ctx.tracker()
                .add_pipe_step(Some(stuff), &combined, &pipe.code, &params.pipe_stack);
        }

        Ok(PipeOutput::new(combined, &job.pipeline_run_id))
    }

    /// Without a combined output the last branch is the main stuff
    fn finish_with_last_branch(
        &self,
        job: &JobMetadata,
        memory: &mut WorkingMemory,
        mut branch_stuffs: Vec<Stuff>,
        output_name: Option<&str>,
    ) -> PipeflowResult<PipeOutput> {
        let last = branch_stuffs.pop().ok_or(PipeflowError::NoMainStuff)?;
        let stored_name = self
            .branches
            .last()
            .and_then(|branch| branch.output_name.as_deref())
            .filter(|_| self.add_each_output);
        let stuff = match (output_name, stored_name) {
            (Some(name), _) => {
                let stuff = last.named(name);
                memory.set_new_main_stuff(stuff.clone(), Some(name));
                stuff
            }
            (None, Some(name)) => {
                memory.set_alias(MAIN_STUFF_NAME, name)?;
                memory.get(name)?.clone()
            }
            (None, None) => {
                memory.set_new_main_stuff(last.clone(), None);
                last
            }
        };
        Ok(PipeOutput::new(stuff, &job.pipeline_run_id))
    }
}
