// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! External collaborators
//!
//! The engine consumes inference backends, the class registry, the function
//! registry and the pipeline tracker through the narrow interfaces defined
//! here.

mod content;
mod dry;
mod registry;
mod tracker;

pub use content::{ContentGenerator, DocumentKind, ExtractedPage, GenerationError, LlmPrompt};
pub use dry::{DryContentGenerator, OfflineContentGenerator};
pub use registry::{ClassRegistry, FieldSpec, FieldType, FuncRegistry, PipeFunction, StructureClass};
pub use tracker::{NoOpTracker, PipelineTracker, RecordingTracker, TrackedStep};
