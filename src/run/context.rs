// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Everything a pipe needs at run time besides its memory and params

use std::sync::Arc;

use crate::collaborators::{
    ClassRegistry, ContentGenerator, DryContentGenerator, FuncRegistry, NoOpTracker,
    OfflineContentGenerator, PipelineTracker,
};
use crate::concept::ConceptLibrary;
use crate::config::EngineConfig;
use crate::pipe::{PipeLibrary, RunMode};

/// The registries a run resolves names against
#[derive(Debug, Clone, Default)]
pub struct Libraries {
    pub concepts: ConceptLibrary,
    pub classes: ClassRegistry,
    pub pipes: PipeLibrary,
    pub funcs: FuncRegistry,
}

/// Shared, read-only context threaded through every pipe call
#[derive(Clone)]
pub struct RunContext {
    libraries: Arc<Libraries>,
    content_generator: Arc<dyn ContentGenerator>,
    dry_generator: Arc<dyn ContentGenerator>,
    tracker: Arc<dyn PipelineTracker>,
    config: Arc<EngineConfig>,
}

impl RunContext {
    /// Context with the offline generator and no tracking
    pub fn new(libraries: Arc<Libraries>, config: Arc<EngineConfig>) -> Self {
        Self {
            libraries,
            content_generator: Arc::new(OfflineContentGenerator::new()),
            dry_generator: Arc::new(DryContentGenerator::new(config.dry_run.clone())),
            tracker: Arc::new(NoOpTracker),
            config,
        }
    }

    pub fn with_content_generator(mut self, generator: Arc<dyn ContentGenerator>) -> Self {
        self.content_generator = generator;
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn PipelineTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn libraries(&self) -> &Libraries {
        &self.libraries
    }

    pub fn pipes(&self) -> &PipeLibrary {
        &self.libraries.pipes
    }

    pub fn concepts(&self) -> &ConceptLibrary {
        &self.libraries.concepts
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.libraries.classes
    }

    pub fn funcs(&self) -> &FuncRegistry {
        &self.libraries.funcs
    }

    pub fn tracker(&self) -> &dyn PipelineTracker {
        self.tracker.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Generator for the given mode; dry runs never see the real one
    pub fn generator(&self, run_mode: RunMode) -> &dyn ContentGenerator {
        match run_mode {
            RunMode::Live => self.content_generator.as_ref(),
            RunMode::Dry => self.dry_generator.as_ref(),
        }
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("pipes", &self.libraries.pipes.len())
            .field("concepts", &self.libraries.concepts.len())
            .field("content_generator", &self.content_generator.name())
            .finish()
    }
}
