// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Pipe router: the single outward entry to running a pipe

use async_trait::async_trait;
use std::sync::Arc;

use super::RunContext;
use crate::errors::{PipeflowError, PipeflowResult};
use crate::memory::WorkingMemory;
use crate::pipe::{JobMetadata, Pipe, PipeOutput, PipeRunParams, RunMode};

/// What an observer learns about a routed run
#[derive(Debug, Clone, Copy)]
pub struct PipeRunEvent<'a> {
    pub pipeline_run_id: &'a str,
    pub pipe_code: &'a str,
    pub run_mode: RunMode,
    pub output_name: Option<&'a str>,
}

/// Hooks called around every routed run
#[async_trait]
pub trait PipeObserver: Send + Sync {
    async fn before_run(&self, event: &PipeRunEvent<'_>);

    async fn after_success(&self, event: &PipeRunEvent<'_>, output: &PipeOutput);

    async fn after_failure(&self, event: &PipeRunEvent<'_>, error: &PipeflowError);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpObserver;

#[async_trait]
impl PipeObserver for NoOpObserver {
    async fn before_run(&self, _event: &PipeRunEvent<'_>) {}

    async fn after_success(&self, _event: &PipeRunEvent<'_>, _output: &PipeOutput) {}

    async fn after_failure(&self, _event: &PipeRunEvent<'_>, _error: &PipeflowError) {}
}

/// Observer writing every event to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

#[async_trait]
impl PipeObserver for LoggingObserver {
    async fn before_run(&self, event: &PipeRunEvent<'_>) {
        tracing::info!(
            run_id = event.pipeline_run_id,
            "Starting pipe '{}' ({} mode)",
            event.pipe_code,
            event.run_mode
        );
    }

    async fn after_success(&self, event: &PipeRunEvent<'_>, output: &PipeOutput) {
        let produced = output
            .main_stuff
            .as_ref()
            .map(|stuff| stuff.short_desc())
            .unwrap_or_else(|| "nothing".to_string());
        tracing::info!(
            run_id = event.pipeline_run_id,
            "Pipe '{}' produced {}",
            event.pipe_code,
            produced
        );
    }

    async fn after_failure(&self, event: &PipeRunEvent<'_>, error: &PipeflowError) {
        tracing::warn!(
            run_id = event.pipeline_run_id,
            "Pipe '{}' failed: {}",
            event.pipe_code,
            error
        );
    }
}

/// Runs pipes on behalf of callers and normalizes their failures
#[derive(Clone)]
pub struct PipeRouter {
    observer: Arc<dyn PipeObserver>,
}

impl PipeRouter {
    pub fn new(observer: Arc<dyn PipeObserver>) -> Self {
        Self { observer }
    }

    /// Run `pipe`, turning any failure into `PipeRouterFailed`
    pub async fn run(
        &self,
        ctx: &RunContext,
        job: &JobMetadata,
        memory: &mut WorkingMemory,
        params: &mut PipeRunParams,
        pipe: &Pipe,
        output_name: Option<&str>,
    ) -> PipeflowResult<PipeOutput> {
        let event = PipeRunEvent {
            pipeline_run_id: &job.pipeline_run_id,
            pipe_code: &pipe.code,
            run_mode: params.run_mode,
            output_name,
        };
        self.observer.before_run(&event).await;

        match pipe.run(ctx, job, memory, params, output_name).await {
            Ok(output) => {
                self.observer.after_success(&event, &output).await;
                Ok(output)
            }
            Err(error) => {
                self.observer.after_failure(&event, &error).await;
                Err(Self::normalize(error, pipe, event.run_mode, output_name))
            }
        }
    }

    fn normalize(
        error: PipeflowError,
        pipe: &Pipe,
        run_mode: RunMode,
        output_name: Option<&str>,
    ) -> PipeflowError {
        let root = error.root_cause();
        let message = if std::ptr::eq(root, &error) {
            format!("Pipe router failed to run '{}': {}", pipe.code, error)
        } else {
            format!("Pipe router failed to run '{}': {}: {}", pipe.code, error, root)
        };
        PipeflowError::PipeRouterFailed {
            message,
            pipe_code: pipe.code.clone(),
            run_mode,
            output_name: output_name.map(str::to_string),
            pipe_stack: error.pipe_stack().map(<[String]>::to_vec).unwrap_or_default(),
            missing_inputs: error.missing_inputs().map(<[String]>::to_vec).unwrap_or_default(),
            source: Box::new(error),
        }
    }
}

impl Default for PipeRouter {
    fn default() -> Self {
        Self::new(Arc::new(NoOpObserver))
    }
}

impl std::fmt::Debug for PipeRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeRouter").finish_non_exhaustive()
    }
}
