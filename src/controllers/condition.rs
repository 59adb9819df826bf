// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Condition controller

use indexmap::IndexMap;
use std::collections::{BTreeSet, HashSet};

use crate::concept::{Concept, NativeConceptCode};
use crate::errors::{PipeflowError, PipeflowResult};
use crate::memory::WorkingMemory;
use crate::pipe::{InputRequirements, JobMetadata, Pipe, PipeLibrary, PipeOutput, PipeRunParams};
use crate::run::RunContext;
use crate::template::{self, TemplateContext};

/// Outcome that stops the run with an error
pub const OUTCOME_FAIL: &str = "fail";
/// Outcome that leaves the memory as it is
pub const OUTCOME_CONTINUE: &str = "continue";

/// Expression evaluated by a condition
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionExpression {
    /// A bare expression such as `category.kind`
    Expression(String),
    /// A full template
    Template(String),
}

/// Where an evaluated value leads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<'a> {
    Fail,
    Continue,
    Pipe(&'a str),
}

impl<'a> Outcome<'a> {
    pub fn parse(value: &'a str) -> Self {
        match value {
            OUTCOME_FAIL => Self::Fail,
            OUTCOME_CONTINUE => Self::Continue,
            code => Self::Pipe(code),
        }
    }
}

/// Routes to a pipe chosen by evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub struct PipeCondition {
    pub expression: ConditionExpression,
    /// Evaluated value -> pipe code or special outcome
    pub outcomes: IndexMap<String, String>,
    pub default_outcome: Option<String>,
    /// Adds an alias named after the evaluated value, pointing at this stuff
    pub add_alias_from_expression_to: Option<String>,
}

impl PipeCondition {
    pub fn new(
        pipe_code: &str,
        expression: Option<String>,
        expression_template: Option<String>,
        outcomes: IndexMap<String, String>,
        default_outcome: Option<String>,
    ) -> PipeflowResult<Self> {
        let expression = match (expression, expression_template) {
            (Some(e), None) => ConditionExpression::Expression(e),
            (None, Some(t)) => ConditionExpression::Template(t),
            (Some(_), Some(_)) => {
                return Err(PipeflowError::definition(
                    pipe_code,
                    "a condition takes either expression or expression_template, not both",
                ))
            }
            (None, None) => {
                return Err(PipeflowError::definition(
                    pipe_code,
                    "a condition needs an expression or an expression_template",
                ))
            }
        };
        if outcomes.is_empty() && default_outcome.is_none() {
            return Err(PipeflowError::definition(
                pipe_code,
                "a condition needs outcomes or a default_outcome",
            ));
        }
        Ok(Self {
            expression,
            outcomes,
            default_outcome,
            add_alias_from_expression_to: None,
        })
    }

    pub fn with_alias_target(mut self, target: Option<String>) -> Self {
        self.add_alias_from_expression_to = target;
        self
    }

    /// The expression as a template
    pub fn applied_template(&self) -> String {
        match &self.expression {
            ConditionExpression::Expression(e) => format!("{{{{ {} }}}}", e),
            ConditionExpression::Template(t) => t.clone(),
        }
    }

    /// Variables read by the expression itself
    pub fn expression_variables(&self) -> BTreeSet<String> {
        template::required_variables(&self.applied_template())
            .into_iter()
            .filter(|name| !name.starts_with('_'))
            .collect()
    }

    /// Pipe codes reachable through the outcome table and the default
    pub fn mapped_pipe_codes(&self) -> BTreeSet<String> {
        self.outcomes
            .values()
            .chain(self.default_outcome.iter())
            .filter(|value| matches!(Outcome::parse(value), Outcome::Pipe(_)))
            .cloned()
            .collect()
    }

    pub fn required_variables(
        &self,
        pipes: &PipeLibrary,
        visited: &mut HashSet<String>,
    ) -> BTreeSet<String> {
        let mut names = self.expression_variables();
        for code in self.mapped_pipe_codes() {
            if let Some(target) = pipes.get(&code) {
                names.extend(target.required_variables_guarded(pipes, visited));
            }
        }
        names
    }

    pub fn needed_inputs(
        &self,
        pipes: &PipeLibrary,
        visited: &HashSet<String>,
    ) -> PipeflowResult<InputRequirements> {
        let mut needed = InputRequirements::new();
        for name in self.expression_variables() {
            needed.add(&name, Concept::native(NativeConceptCode::Anything), None);
        }
        for code in self.mapped_pipe_codes() {
            let target = pipes.get_required(&code)?;
            for (name, requirement) in target.needed_inputs(pipes, visited)?.iter() {
                needed.add(name, requirement.concept.clone(), None);
            }
        }
        Ok(needed)
    }

    /// Outcome for an evaluated value
    pub fn select_outcome(&self, evaluated: &str) -> Option<&str> {
        self.outcomes
            .get(evaluated)
            .or(self.default_outcome.as_ref())
            .map(String::as_str)
    }

    async fn evaluate(
        &self,
        pipe: &Pipe,
        ctx: &RunContext,
        job: &JobMetadata,
        memory: &mut WorkingMemory,
        params: &PipeRunParams,
    ) -> PipeflowResult<String> {
        let evaluated = ctx
            .generator(params.run_mode)
            .make_templated_text(job, &self.applied_template(), &TemplateContext::from_memory(memory))
            .await
            .map_err(|source| PipeflowError::Generation {
                pipe_code: pipe.code.clone(),
                source,
            })?;
        let evaluated = evaluated.trim().to_string();
        if evaluated.is_empty() || evaluated == "None" {
            return Err(PipeflowError::Condition {
                pipe_code: pipe.code.clone(),
                reason: format!("expression '{}' returned no result", self.applied_template()),
            });
        }
        tracing::debug!("Condition '{}' evaluated to '{}'", pipe.code, evaluated);

        if let Some(target) = &self.add_alias_from_expression_to {
            memory.add_alias(&evaluated, target)?;
        }
        Ok(evaluated)
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
        if params.is_dry() {
            return self.dry_run(pipe, ctx, job, memory, params).await;
        }

        let evaluated = self.evaluate(pipe, ctx, job, memory, params).await?;
        let outcome = self.select_outcome(&evaluated).ok_or_else(|| PipeflowError::Condition {
            pipe_code: pipe.code.clone(),
            reason: format!("no outcome for '{}' and no default_outcome", evaluated),
        })?;

        let chosen_code = match Outcome::parse(outcome) {
            Outcome::Continue => {
                tracing::debug!("Condition '{}' continues", pipe.code);
                return Ok(PipeOutput {
                    main_stuff: memory.get_main().ok().cloned(),
                    pipeline_run_id: job.pipeline_run_id.clone(),
                });
            }
            Outcome::Fail => {
                return Err(PipeflowError::Condition {
                    pipe_code: pipe.code.clone(),
                    reason: format!("outcome for '{}' is fail", evaluated),
                })
            }
            Outcome::Pipe(code) => code,
        };

        let chosen = ctx.pipes().get_required(chosen_code)?;
        let required_names: Vec<String> = chosen
            .required_variables(ctx.pipes())
            .into_iter()
            .filter(|name| !name.starts_with('_'))
            .collect();
        let required = memory
            .get_stuffs(required_names.iter().map(String::as_str))
            .map_err(|e| match e {
                PipeflowError::StuffNotFound { name, .. } => PipeflowError::PipeInputs {
                    pipe_code: chosen_code.to_string(),
                    missing: vec![name],
                },
                other => other,
            })?;

        let expression = self.applied_template();
        if required.is_empty() {
            ctx.tracker()
                .add_condition_step(None, &expression, chosen_code, &pipe.code, &params.pipe_stack);
        }
        for stuff in required {
            ctx.tracker()
                .add_condition_step(Some(stuff), &expression, chosen_code, &pipe.code, &params.pipe_stack);
        }

        let mut sub_params = params.for_sub_pipe();
        chosen.run(ctx, job, memory, &mut sub_params, output_name).await
    }

    /// Check inputs and targets, then dry run every reachable pipe
    async fn dry_run(
        &self,
        pipe: &Pipe,
        ctx: &RunContext,
        job: &JobMetadata,
        memory: &mut WorkingMemory,
        params: &PipeRunParams,
    ) -> PipeflowResult<PipeOutput> {
        let needed = self.needed_inputs(ctx.pipes(), &HashSet::from([pipe.code.clone()]))?;
        let missing: Vec<String> = needed
            .names()
            .filter(|name| !memory.contains(name))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(PipeflowError::DryRunMissingInputs {
                pipe_code: pipe.code.clone(),
                missing,
            });
        }

        let mapped = self.mapped_pipe_codes();
        let unknown: Vec<&str> = mapped
            .iter()
            .filter(|code| !ctx.pipes().contains(code))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(PipeflowError::Condition {
                pipe_code: pipe.code.clone(),
                reason: format!("outcomes point to unknown pipes: {}", unknown.join(", ")),
            });
        }

        let mut last = PipeOutput::empty(&job.pipeline_run_id);
        for code in &mapped {
            let target = ctx.pipes().get_required(code)?;
            let mut sub_params = params.for_sub_pipe();
            last = target.run(ctx, job, memory, &mut sub_params, None).await?;
        }
        Ok(last)
    }
}
