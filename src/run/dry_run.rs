// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Dry runs
//!
//! A dry run executes a pipe graph end to end against mock content, so
//! structural errors surface before any real generation happens.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use super::RunContext;
use crate::concept::{Concept, NativeConceptCode};
use crate::errors::{PipeflowError, PipeflowResult};
use crate::memory::{Stuff, StuffContent, WorkingMemory};
use crate::pipe::{InputRequirements, JobMetadata, Pipe, PipeRunParams, RunMode};

const MOCK_PDF_URL: &str = "https://placehold.co/document.pdf";

/// Outcome of one pipe's dry run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DryRunStatus {
    Success,
    Failure,
}

impl DryRunStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DryRunOutput {
    pub pipe_code: String,
    pub status: DryRunStatus,
    pub error_message: Option<String>,
}

impl DryRunOutput {
    fn success(pipe_code: &str) -> Self {
        Self {
            pipe_code: pipe_code.to_string(),
            status: DryRunStatus::Success,
            error_message: None,
        }
    }

    fn failure(pipe_code: &str, message: String) -> Self {
        Self {
            pipe_code: pipe_code.to_string(),
            status: DryRunStatus::Failure,
            error_message: Some(message),
        }
    }
}

/// Placeholder content for a stuff of `concept`
pub fn mock_content(ctx: &RunContext, concept: &Concept, is_list: bool) -> StuffContent {
    if is_list {
        let nb_items = ctx.config().dry_run.nb_list_items;
        return StuffContent::list((0..nb_items).map(|_| mock_content(ctx, concept, false)).collect());
    }

    let class_name = &concept.structure_class_name;
    let native = NativeConceptCode::from_code(class_name.strip_suffix("Content").unwrap_or(class_name));
    let image_url = || {
        ctx.config()
            .dry_run
            .image_urls
            .first()
            .cloned()
            .unwrap_or_default()
    };

    match native {
        Some(NativeConceptCode::Number) => StuffContent::Number { number: 1.0 },
        Some(NativeConceptCode::Image) => StuffContent::Image {
            url: image_url(),
            caption: None,
        },
        Some(NativeConceptCode::Pdf) => StuffContent::Pdf {
            url: MOCK_PDF_URL.to_string(),
        },
        Some(NativeConceptCode::TextAndImages) => StuffContent::TextAndImages {
            text: Some(format!("DRY RUN: {}", concept.code)),
            images: vec![image_url()],
        },
        Some(NativeConceptCode::Page) => StuffContent::Page {
            page_number: 1,
            text: format!("DRY RUN: {}", concept.code),
            images: vec![],
        },
        Some(_) => StuffContent::text(format!("DRY RUN: {}", concept.code)),
        None => match ctx.classes().get_class(class_name) {
            Some(class) => StuffContent::Structured {
                class_name: class.name.clone(),
                value: class.mock_value(),
            },
            None => {
                tracing::warn!(
                    "Structure class '{}' of concept '{}' is not registered, using text",
                    class_name,
                    concept
                );
                StuffContent::text(format!("DRY RUN: {}", concept.code))
            }
        },
    }
}

/// A memory holding one mock stuff per needed input
pub fn make_dry_memory(ctx: &RunContext, needed: &InputRequirements) -> WorkingMemory {
    let mut memory = WorkingMemory::new();
    for (name, requirement) in needed.iter() {
        let content = mock_content(ctx, &requirement.concept, requirement.is_list());
        memory.add_new_stuff(name, Stuff::new(requirement.concept.clone(), content));
    }
    memory
}

async fn try_dry_run(ctx: &RunContext, pipe: &Pipe) -> PipeflowResult<()> {
    let needed = pipe.needed_inputs(ctx.pipes(), &HashSet::new())?;
    let mut memory = make_dry_memory(ctx, &needed);
    let mut params = PipeRunParams::new(RunMode::Dry, ctx.config().pipe_run.pipe_stack_limit);
    let job = JobMetadata::new(Some(&format!("dry_run_{}", pipe.code)));
    pipe.run(ctx, &job, &mut memory, &mut params, None).await?;
    Ok(())
}

/// Dry run one pipe on synthesized inputs
pub async fn dry_run_pipe(ctx: &RunContext, pipe: &Pipe) -> DryRunOutput {
    match try_dry_run(ctx, pipe).await {
        Ok(()) => {
            tracing::debug!("Pipe '{}' dry run completed successfully", pipe.code);
            DryRunOutput::success(&pipe.code)
        }
        Err(e) => {
            let message = match e.root_cause() {
                root if !std::ptr::eq(root, &e) => format!("{}: {}", e, root),
                _ => e.to_string(),
            };
            if ctx.config().is_allowed_to_fail(&pipe.code) {
                tracing::debug!("Pipe '{}' is allowed to fail its dry run: {}", pipe.code, message);
            }
            DryRunOutput::failure(&pipe.code, message)
        }
    }
}

fn dry_run_on_own_runtime(ctx: RunContext, pipe: Arc<Pipe>) -> DryRunOutput {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build();
    match runtime {
        Ok(runtime) => runtime.block_on(dry_run_pipe(&ctx, &pipe)),
        Err(e) => DryRunOutput::failure(&pipe.code, format!("could not start a runtime: {}", e)),
    }
}

/// Dry run several pipes
///
/// In parallel mode every pipe runs on its own blocking thread with its
/// own current-thread runtime. Outputs keep the order of `pipes`. Failures
/// of pipes listed in `dry_run.allowed_to_fail_pipes` never count; the
/// others are raised together when `raise_on_failure` is set.
pub async fn dry_run_pipes(
    ctx: &RunContext,
    pipes: &[Arc<Pipe>],
    parallel: bool,
    raise_on_failure: bool,
) -> PipeflowResult<Vec<DryRunOutput>> {
    let started = Instant::now();
    let mut outputs = Vec::with_capacity(pipes.len());

    if parallel {
        let handles: Vec<_> = pipes
            .iter()
            .map(|pipe| {
                let ctx = ctx.clone();
                let pipe = Arc::clone(pipe);
                tokio::task::spawn_blocking(move || dry_run_on_own_runtime(ctx, pipe))
            })
            .collect();
        for (pipe, handle) in pipes.iter().zip(handles) {
            let output = handle
                .await
                .unwrap_or_else(|e| DryRunOutput::failure(&pipe.code, format!("dry run thread failed: {}", e)));
            outputs.push(output);
        }
    } else {
        for pipe in pipes {
            outputs.push(dry_run_pipe(ctx, pipe).await);
        }
    }

    let config = ctx.config();
    let failed: Vec<&DryRunOutput> = outputs.iter().filter(|o| o.status.is_failure()).collect();
    let unexpected: Vec<&DryRunOutput> = failed
        .iter()
        .copied()
        .filter(|o| !config.is_allowed_to_fail(&o.pipe_code))
        .collect();

    tracing::info!(
        "Dry run completed: {} successful, {} failed, {} allowed to fail, in {:.2}s",
        outputs.len() - failed.len(),
        failed.len(),
        failed.len() - unexpected.len(),
        started.elapsed().as_secs_f64()
    );

    if !unexpected.is_empty() {
        for output in &unexpected {
            tracing::error!(
                "Dry run failed for '{}': {}",
                output.pipe_code,
                output.error_message.as_deref().unwrap_or("unknown error")
            );
        }
        if raise_on_failure {
            return Err(PipeflowError::DryRunFailed {
                failed_pipes: unexpected.iter().map(|o| o.pipe_code.clone()).collect(),
            });
        }
    }

    Ok(outputs)
}
