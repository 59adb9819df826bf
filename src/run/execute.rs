// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Engine
//!
//! Owns the libraries and configuration, loads bundles and runs pipes
//! through the router.

use serde_json::{Map, Value};
use std::sync::Arc;

use super::dry_run::{dry_run_pipes, DryRunOutput};
use super::{PipeObserver, PipeRouter, RunContext};
use crate::bundle::{BundleBlueprint, BundleLoader, DependencyResolver, LoadedBundle, ValidationReport};
use crate::collaborators::{ContentGenerator, PipelineTracker};
use crate::config::EngineConfig;
use crate::errors::{PipeflowError, PipeflowResult};
use crate::memory::{WorkingMemory, WorkingMemoryFactory};
use crate::pipe::{JobMetadata, OutputMultiplicity, Pipe, PipeOutput, PipeRunParams, RunMode};
use crate::run::Libraries;

/// Inputs for an execution
#[derive(Debug, Clone)]
pub enum PipeInputs {
    /// A ready working memory
    Memory(WorkingMemory),
    /// Plain values converted by [`WorkingMemoryFactory`]
    Values(Map<String, Value>),
}

impl Default for PipeInputs {
    fn default() -> Self {
        Self::Memory(WorkingMemory::new())
    }
}

/// What to run and how
#[derive(Debug, Clone, Default)]
pub struct ExecuteRequest {
    /// Pipe to run; defaults to the bundle's `main_pipe`
    pub pipe_code: Option<String>,
    /// Bundle to load before running, replacing a loaded bundle of the same domain
    pub bundle_content: Option<String>,
    pub inputs: PipeInputs,
    pub output_name: Option<String>,
    pub output_multiplicity: Option<OutputMultiplicity>,
    /// Concept string used when the pipe's output is `Dynamic`
    pub dynamic_output_concept: Option<String>,
    pub run_mode: RunMode,
    pub job_name: Option<String>,
}

impl ExecuteRequest {
    pub fn for_pipe(pipe_code: &str) -> Self {
        Self {
            pipe_code: Some(pipe_code.to_string()),
            ..Self::default()
        }
    }

    pub fn for_bundle(bundle_content: &str) -> Self {
        Self {
            bundle_content: Some(bundle_content.to_string()),
            ..Self::default()
        }
    }

    pub fn with_inputs(mut self, inputs: PipeInputs) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_run_mode(mut self, run_mode: RunMode) -> Self {
        self.run_mode = run_mode;
        self
    }
}

/// Result of an execution
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    pub pipe_output: PipeOutput,
    /// Memory as the run left it
    pub working_memory: WorkingMemory,
}

/// Result of validating a bundle
#[derive(Debug, Clone)]
pub struct BundleValidation {
    pub domain: String,
    pub pipe_codes: Vec<String>,
    pub report: ValidationReport,
    pub dry_run: Vec<DryRunOutput>,
}

impl BundleValidation {
    /// Whether any pipe failed its dry run without being allowed to
    pub fn has_unexpected_failures(&self, config: &EngineConfig) -> bool {
        self.dry_run
            .iter()
            .any(|o| o.status.is_failure() && !config.is_allowed_to_fail(&o.pipe_code))
    }
}

/// Pipe execution engine
pub struct Engine {
    libraries: Arc<Libraries>,
    config: Arc<EngineConfig>,
    content_generator: Option<Arc<dyn ContentGenerator>>,
    tracker: Option<Arc<dyn PipelineTracker>>,
    router: PipeRouter,
}

impl Engine {
    /// Create an engine with empty libraries
    pub fn new(config: EngineConfig) -> Self {
        Self::with_libraries(Libraries::default(), config)
    }

    /// Create an engine around pre-filled libraries, e.g. with functions registered
    pub fn with_libraries(libraries: Libraries, config: EngineConfig) -> Self {
        Self {
            libraries: Arc::new(libraries),
            config: Arc::new(config),
            content_generator: None,
            tracker: None,
            router: PipeRouter::default(),
        }
    }

    pub fn with_content_generator(mut self, generator: Arc<dyn ContentGenerator>) -> Self {
        self.content_generator = Some(generator);
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn PipelineTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipeObserver>) -> Self {
        self.router = PipeRouter::new(observer);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn libraries(&self) -> &Libraries {
        &self.libraries
    }

    /// Mutable libraries; contexts handed out earlier keep their snapshot
    pub fn libraries_mut(&mut self) -> &mut Libraries {
        Arc::make_mut(&mut self.libraries)
    }

    /// Run context over the current libraries
    pub fn context(&self) -> RunContext {
        let mut ctx = RunContext::new(Arc::clone(&self.libraries), Arc::clone(&self.config));
        if let Some(generator) = &self.content_generator {
            ctx = ctx.with_content_generator(Arc::clone(generator));
        }
        if let Some(tracker) = &self.tracker {
            ctx = ctx.with_tracker(Arc::clone(tracker));
        }
        ctx
    }

    pub fn is_domain_loaded(&self, domain: &str) -> bool {
        self.libraries.concepts.iter().any(|c| c.domain == domain)
            || self.libraries.pipes.iter().any(|p| p.domain == domain)
    }

    pub fn load_bundle(&mut self, blueprint: &BundleBlueprint) -> PipeflowResult<LoadedBundle> {
        let config = Arc::clone(&self.config);
        BundleLoader::load(self.libraries_mut(), blueprint, &config)
    }

    pub fn load_bundle_str(&mut self, content: &str) -> PipeflowResult<LoadedBundle> {
        let blueprint = BundleBlueprint::from_toml(content)?;
        self.load_bundle(&blueprint)
    }

    pub fn remove_bundle(&mut self, domain: &str) -> Vec<String> {
        BundleLoader::remove(self.libraries_mut(), domain)
    }

    /// Load a bundle in place of its loaded domain
    ///
    /// The loaded domain is only removed once the new bundle resolves, and
    /// comes back if the new one fails to load.
    pub fn replace_bundle(&mut self, blueprint: &BundleBlueprint) -> PipeflowResult<LoadedBundle> {
        if !self.is_domain_loaded(&blueprint.domain) {
            return self.load_bundle(blueprint);
        }
        DependencyResolver::resolve(&blueprint.pipes)?;

        tracing::debug!("Replacing loaded domain '{}'", blueprint.domain);
        let previous = Arc::clone(&self.libraries);
        self.remove_bundle(&blueprint.domain);
        self.load_bundle(blueprint).map_err(|e| {
            tracing::warn!("Keeping the loaded domain '{}': {}", blueprint.domain, e);
            self.libraries = previous;
            e
        })
    }

    /// Run a pipe, loading the request's bundle first if it carries one
    pub async fn execute(&mut self, request: ExecuteRequest) -> PipeflowResult<ExecutionOutput> {
        let mut main_pipe = None;
        if let Some(content) = &request.bundle_content {
            let blueprint = BundleBlueprint::from_toml(content)?;
            main_pipe = self.replace_bundle(&blueprint)?.main_pipe;
        }

        let pipe_code = request
            .pipe_code
            .or(main_pipe)
            .ok_or(PipeflowError::NoPipeToRun)?;

        let ctx = self.context();
        let pipe = ctx.pipes().get_required(&pipe_code)?;
        let mut memory = match request.inputs {
            PipeInputs::Memory(memory) => memory,
            PipeInputs::Values(values) => {
                WorkingMemoryFactory::from_json_values(ctx.concepts(), &pipe.domain, &values)?
            }
        };

        let mut params = PipeRunParams::new(request.run_mode, self.config.pipe_run.pipe_stack_limit)
            .with_output_multiplicity(request.output_multiplicity);
        params.dynamic_output_concept = request.dynamic_output_concept;
        let job = JobMetadata::new(request.job_name.as_deref());

        let pipe_output = self
            .router
            .run(&ctx, &job, &mut memory, &mut params, &pipe, request.output_name.as_deref())
            .await?;

        Ok(ExecutionOutput {
            pipe_output,
            working_memory: memory,
        })
    }

    /// Dry run loaded pipes, all of them when `pipe_codes` is empty
    pub async fn dry_run(
        &self,
        pipe_codes: &[String],
        parallel: bool,
    ) -> PipeflowResult<Vec<DryRunOutput>> {
        let ctx = self.context();
        let pipes: Vec<Arc<Pipe>> = if pipe_codes.is_empty() {
            ctx.pipes().iter().cloned().collect()
        } else {
            pipe_codes
                .iter()
                .map(|code| ctx.pipes().get_required(code))
                .collect::<PipeflowResult<_>>()?
        };
        dry_run_pipes(&ctx, &pipes, parallel, false).await
    }

    /// Parse, load, validate and dry run a bundle, then unload it
    pub async fn validate_bundle(&mut self, content: &str) -> PipeflowResult<BundleValidation> {
        let loaded = self.load_bundle_str(content)?;
        let dry_run = self.dry_run(&loaded.pipe_codes, true).await;
        self.remove_bundle(&loaded.domain);

        Ok(BundleValidation {
            domain: loaded.domain,
            pipe_codes: loaded.pipe_codes,
            report: loaded.report,
            dry_run: dry_run?,
        })
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("pipes", &self.libraries.pipes.len())
            .field("concepts", &self.libraries.concepts.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::StuffContent;

    const GREETING_BUNDLE: &str = r#"
domain = "greeting"
main_pipe = "greet"

[pipe.greet]
type = "PipeCompose"
inputs = { name = "Text" }
output = "Text"
template = "Hello {{ name }}!"
"#;

    fn name_input(name: &str) -> PipeInputs {
        let mut values = Map::new();
        values.insert("name".into(), Value::String(name.into()));
        PipeInputs::Values(values)
    }

    #[tokio::test]
    async fn test_execute_main_pipe() {
        let mut engine = Engine::default();
        let output = engine
            .execute(ExecuteRequest::for_bundle(GREETING_BUNDLE).with_inputs(name_input("Ada")))
            .await
            .unwrap();

        let stuff = output.pipe_output.main_stuff().unwrap();
        assert_eq!(stuff.content, StuffContent::text("Hello Ada!"));
        assert!(output.working_memory.contains("name"));
    }

    #[tokio::test]
    async fn test_execute_replaces_loaded_domain() {
        let mut engine = Engine::default();
        engine.load_bundle_str(GREETING_BUNDLE).unwrap();

        let result = engine
            .execute(ExecuteRequest::for_bundle(GREETING_BUNDLE).with_inputs(name_input("Grace")))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_failed_replacement_keeps_loaded_domain() {
        let mut engine = Engine::default();
        engine.load_bundle_str(GREETING_BUNDLE).unwrap();

        let cyclic = r#"
domain = "greeting"

[pipe.a]
type = "PipeSequence"
inputs = { name = "Text" }
output = "Text"
steps = [{ pipe = "b" }]

[pipe.b]
type = "PipeSequence"
inputs = { name = "Text" }
output = "Text"
steps = [{ pipe = "a" }]
"#;
        let result = engine.execute(ExecuteRequest::for_bundle(cyclic)).await;
        assert!(matches!(result, Err(PipeflowError::CircularDependency { .. })));

        let unresolved_input = r#"
domain = "greeting"
main_pipe = "greet"

[pipe.greet]
type = "PipeCompose"
inputs = { name = "Text" }
output = "Text"
template = "Hello {{ nickname }}!"
"#;
        let result = engine.execute(ExecuteRequest::for_bundle(unresolved_input)).await;
        assert!(matches!(result, Err(PipeflowError::StaticValidation { .. })));

        assert!(engine.libraries().pipes.get("a").is_none());
        let output = engine
            .execute(ExecuteRequest::for_pipe("greet").with_inputs(name_input("Ada")))
            .await
            .unwrap();
        assert_eq!(
            output.pipe_output.main_stuff().unwrap().content,
            StuffContent::text("Hello Ada!")
        );
    }

    #[tokio::test]
    async fn test_no_pipe_to_run() {
        let mut engine = Engine::default();
        let result = engine.execute(ExecuteRequest::default()).await;
        assert!(matches!(result, Err(PipeflowError::NoPipeToRun)));
    }

    #[tokio::test]
    async fn test_missing_input_goes_through_router() {
        let mut engine = Engine::default();
        let result = engine
            .execute(ExecuteRequest::for_bundle(GREETING_BUNDLE))
            .await;

        match result {
            Err(PipeflowError::PipeRouterFailed {
                pipe_code,
                missing_inputs,
                ..
            }) => {
                assert_eq!(pipe_code, "greet");
                assert_eq!(missing_inputs, vec!["name"]);
            }
            other => panic!("expected a router failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_validate_bundle_unloads() {
        let mut engine = Engine::default();
        let validation = engine.validate_bundle(GREETING_BUNDLE).await.unwrap();

        assert_eq!(validation.pipe_codes, vec!["greet"]);
        assert!(validation.report.is_valid());
        assert!(!validation.has_unexpected_failures(engine.config()));
        assert!(!engine.is_domain_loaded("greeting"));
    }
}
