// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Error types
//!
//! Every failure the engine can produce is a [`PipeflowError`]. Controllers
//! wrap the failures of their branches to add context, and the pipe router
//! is the single place that turns any of them into the outward error shape.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

use crate::bundle::StaticValidationErrorType;
use crate::collaborators::GenerationError;
use crate::pipe::RunMode;

/// Result type for pipeflow operations
pub type PipeflowResult<T> = Result<T, PipeflowError>;

/// Broad classification of an error, used by callers to decide whether
/// a failure is worth retrying with different inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Definition,
    Input,
    StackOverflow,
    StaticValidation,
    DryRun,
    Run,
    Io,
}

/// Main error type for pipeflow
#[derive(Error, Debug, Diagnostic)]
pub enum PipeflowError {
    // ─────────────────────────────────────────────────────────────────────────
    // Definition Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Pipe '{pipe_code}' is invalid: {reason}")]
    #[diagnostic(code(pipeflow::pipe_definition))]
    PipeDefinition { pipe_code: String, reason: String },

    #[error("Invalid bundle: {reason}")]
    #[diagnostic(code(pipeflow::bundle_definition))]
    BundleDefinition {
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("Circular dependency detected at pipe '{pipe_code}'")]
    #[diagnostic(
        code(pipeflow::circular_dependency),
        help("Remove one of the references between the pipes of the cycle")
    )]
    CircularDependency { pipe_code: String, cycle: Vec<String> },

    #[error("Pipe '{pipe_code}' not found")]
    #[diagnostic(
        code(pipeflow::pipe_not_found),
        help("Check that the pipe is declared in a loaded bundle")
    )]
    PipeNotFound { pipe_code: String },

    #[error("No pipe to run")]
    #[diagnostic(
        code(pipeflow::no_pipe_to_run),
        help("Provide a pipe code or a bundle that declares a main_pipe")
    )]
    NoPipeToRun,

    // ─────────────────────────────────────────────────────────────────────────
    // Concept Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Concept '{concept_string}' not found in the library")]
    #[diagnostic(code(pipeflow::concept_not_found))]
    ConceptNotFound { concept_string: String },

    #[error("Concept '{concept_string}' is already registered")]
    #[diagnostic(
        code(pipeflow::concept_conflict),
        help("Concept codes must be unique within their domain")
    )]
    ConceptConflict { concept_string: String },

    #[error("Invalid concept reference '{value}': {reason}")]
    #[diagnostic(code(pipeflow::invalid_concept))]
    InvalidConcept { value: String, reason: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Working Memory Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Stuff '{name}' not found in working memory")]
    #[diagnostic(code(pipeflow::stuff_not_found))]
    StuffNotFound {
        name: String,
        expected_concept: Option<String>,
    },

    #[error("Stuff '{name}' of concept '{concept}' is not a list")]
    #[diagnostic(code(pipeflow::stuff_not_a_list))]
    StuffNotAList { name: String, concept: String },

    #[error("Alias '{alias}' points to '{target}' which is not in working memory")]
    #[diagnostic(code(pipeflow::alias_target_not_found))]
    AliasTargetNotFound { alias: String, target: String },

    #[error("Working memory has no main stuff")]
    #[diagnostic(code(pipeflow::no_main_stuff))]
    NoMainStuff,

    // ─────────────────────────────────────────────────────────────────────────
    // Input Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Missing inputs for pipe '{pipe_code}': {}", .missing.join(", "))]
    #[diagnostic(
        code(pipeflow::pipe_inputs),
        help("Supply the missing variables in the working memory before running")
    )]
    PipeInputs {
        pipe_code: String,
        missing: Vec<String>,
    },

    #[error("Input '{name}' could not be converted: {reason}")]
    #[diagnostic(code(pipeflow::input_value))]
    InputValue { name: String, reason: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Run Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Pipe stack limit of {limit} reached")]
    #[diagnostic(
        code(pipeflow::pipe_stack_overflow),
        help("Check for pipes that call each other recursively")
    )]
    PipeStackOverflow { limit: usize, pipe_stack: Vec<String> },

    #[error("Pipe '{pipe_code}' failed")]
    #[diagnostic(code(pipeflow::pipe_run_failed))]
    PipeRunFailed {
        pipe_code: String,
        pipe_stack: Vec<String>,
        #[source]
        source: Box<PipeflowError>,
    },

    #[error("Pipe '{pipe_code}' cannot run with these parameters: {reason}")]
    #[diagnostic(code(pipeflow::run_params))]
    RunParams { pipe_code: String, reason: String },

    #[error("Condition '{pipe_code}' failed: {reason}")]
    #[diagnostic(code(pipeflow::condition))]
    Condition { pipe_code: String, reason: String },

    #[error("Content generation failed in pipe '{pipe_code}'")]
    #[diagnostic(code(pipeflow::generation))]
    Generation {
        pipe_code: String,
        #[source]
        source: GenerationError,
    },

    #[error("Function '{function_name}' is not registered")]
    #[diagnostic(code(pipeflow::func_not_found))]
    FuncNotFound { function_name: String },

    #[error("Function '{function_name}' failed: {message}")]
    #[diagnostic(code(pipeflow::func_failed))]
    FuncFailed {
        function_name: String,
        message: String,
    },

    #[error("Template error: {reason}")]
    #[diagnostic(code(pipeflow::template))]
    Template { reason: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Controller Context
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Step {step_index} ('{step_pipe_code}') of sequence '{pipe_code}' failed")]
    #[diagnostic(code(pipeflow::sequence_step_failed))]
    SequenceStepFailed {
        pipe_code: String,
        step_index: usize,
        step_pipe_code: String,
        #[source]
        source: Box<PipeflowError>,
    },

    #[error("Branch '{branch_pipe_code}' of parallel '{pipe_code}' failed")]
    #[diagnostic(code(pipeflow::parallel_branch_failed))]
    ParallelBranchFailed {
        pipe_code: String,
        branch_pipe_code: String,
        #[source]
        source: Box<PipeflowError>,
    },

    #[error("Item {branch_index} of batch '{pipe_code}' failed")]
    #[diagnostic(code(pipeflow::batch_branch_failed))]
    BatchBranchFailed {
        pipe_code: String,
        branch_index: usize,
        #[source]
        source: Box<PipeflowError>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Static Validation Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("{error_type} in pipe '{domain}.{pipe_code}': {explanation}")]
    #[diagnostic(code(pipeflow::static_validation))]
    StaticValidation {
        error_type: StaticValidationErrorType,
        domain: String,
        pipe_code: String,
        explanation: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Dry Run Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Dry run failed for pipes: {}", .failed_pipes.join(", "))]
    #[diagnostic(
        code(pipeflow::dry_run_failed),
        help("Add a pipe to dry_run.allowed_to_fail_pipes if its failure is expected")
    )]
    DryRunFailed { failed_pipes: Vec<String> },

    #[error("Dry run of '{pipe_code}' is missing inputs: {}", .missing.join(", "))]
    #[diagnostic(code(pipeflow::dry_run_missing_inputs))]
    DryRunMissingInputs {
        pipe_code: String,
        missing: Vec<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Router Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(code(pipeflow::pipe_router))]
    PipeRouterFailed {
        message: String,
        pipe_code: String,
        run_mode: RunMode,
        output_name: Option<String>,
        pipe_stack: Vec<String>,
        missing_inputs: Vec<String>,
        #[source]
        source: Box<PipeflowError>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Invalid configuration: {reason}")]
    #[diagnostic(code(pipeflow::config))]
    Config { reason: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(pipeflow::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    #[error("IO error: {message}")]
    #[diagnostic(code(pipeflow::io_error))]
    Io { message: String },

    #[error("TOML parsing error: {message}")]
    #[diagnostic(code(pipeflow::toml_error))]
    Toml { message: String },

    #[error("JSON parsing error: {message}")]
    #[diagnostic(code(pipeflow::json_error))]
    Json { message: String },

    #[error("YAML error: {message}")]
    #[diagnostic(code(pipeflow::yaml_error))]
    Yaml { message: String },
}

impl From<std::io::Error> for PipeflowError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<toml::de::Error> for PipeflowError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for PipeflowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for PipeflowError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl PipeflowError {
    /// Create a pipe definition error
    pub fn definition(pipe_code: &str, reason: impl Into<String>) -> Self {
        Self::PipeDefinition {
            pipe_code: pipe_code.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a bundle definition error without help text
    pub fn bundle(reason: impl Into<String>) -> Self {
        Self::BundleDefinition {
            reason: reason.into(),
            help: None,
        }
    }

    /// The wrapped cause, if this error adds context around another one
    fn inner(&self) -> Option<&PipeflowError> {
        match self {
            Self::PipeRunFailed { source, .. }
            | Self::SequenceStepFailed { source, .. }
            | Self::ParallelBranchFailed { source, .. }
            | Self::BatchBranchFailed { source, .. }
            | Self::PipeRouterFailed { source, .. } => Some(source),
            _ => None,
        }
    }

    /// The pipe stack recorded at the point of failure, if any
    pub fn pipe_stack(&self) -> Option<&[String]> {
        match self {
            Self::PipeStackOverflow { pipe_stack, .. }
            | Self::PipeRunFailed { pipe_stack, .. }
            | Self::PipeRouterFailed { pipe_stack, .. } => Some(pipe_stack),
            other => other.inner().and_then(|inner| inner.pipe_stack()),
        }
    }

    /// Names of missing inputs, if the failure was caused by any
    pub fn missing_inputs(&self) -> Option<&[String]> {
        match self {
            Self::PipeInputs { missing, .. } | Self::DryRunMissingInputs { missing, .. } => {
                Some(missing)
            }
            Self::StuffNotFound { name, .. } => Some(std::slice::from_ref(name)),
            other => other.inner().and_then(|inner| inner.missing_inputs()),
        }
    }

    /// The innermost error, following every context wrapper
    pub fn root_cause(&self) -> &PipeflowError {
        let mut current = self;
        while let Some(inner) = current.inner() {
            current = inner;
        }
        current
    }

    /// Classify the root cause
    pub fn kind(&self) -> ErrorKind {
        match self.root_cause() {
            Self::PipeDefinition { .. }
            | Self::BundleDefinition { .. }
            | Self::CircularDependency { .. }
            | Self::PipeNotFound { .. }
            | Self::NoPipeToRun
            | Self::ConceptNotFound { .. }
            | Self::ConceptConflict { .. }
            | Self::InvalidConcept { .. }
            | Self::FuncNotFound { .. }
            | Self::Config { .. } => ErrorKind::Definition,
            Self::StuffNotFound { .. }
            | Self::StuffNotAList { .. }
            | Self::AliasTargetNotFound { .. }
            | Self::PipeInputs { .. }
            | Self::InputValue { .. } => ErrorKind::Input,
            Self::PipeStackOverflow { .. } => ErrorKind::StackOverflow,
            Self::StaticValidation { .. } => ErrorKind::StaticValidation,
            Self::DryRunFailed { .. } | Self::DryRunMissingInputs { .. } => ErrorKind::DryRun,
            Self::FileReadError { .. }
            | Self::Io { .. }
            | Self::Toml { .. }
            | Self::Json { .. }
            | Self::Yaml { .. } => ErrorKind::Io,
            _ => ErrorKind::Run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs_error() -> PipeflowError {
        PipeflowError::PipeInputs {
            pipe_code: "summarize".into(),
            missing: vec!["text".into(), "topic".into()],
        }
    }

    #[test]
    fn test_missing_inputs_message_lists_all_names() {
        let message = inputs_error().to_string();
        assert!(message.contains("summarize"));
        assert!(message.contains("text, topic"));
    }

    #[test]
    fn test_pipe_stack_found_through_wrappers() {
        let wrapped = PipeflowError::BatchBranchFailed {
            pipe_code: "batch".into(),
            branch_index: 2,
            source: Box::new(PipeflowError::PipeRunFailed {
                pipe_code: "summarize".into(),
                pipe_stack: vec!["batch".into(), "summarize".into()],
                source: Box::new(inputs_error()),
            }),
        };

        assert_eq!(
            wrapped.pipe_stack(),
            Some(&["batch".to_string(), "summarize".to_string()][..])
        );
        assert_eq!(wrapped.missing_inputs().map(|m| m.len()), Some(2));
        assert_eq!(wrapped.kind(), ErrorKind::Input);
    }

    #[test]
    fn test_root_cause_of_plain_error_is_itself() {
        let error = PipeflowError::NoPipeToRun;
        assert!(matches!(error.root_cause(), PipeflowError::NoPipeToRun));
        assert_eq!(error.kind(), ErrorKind::Definition);
        assert!(error.pipe_stack().is_none());
    }
}
