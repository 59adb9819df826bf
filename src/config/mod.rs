// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Engine configuration
//!
//! Loaded from `pipeflow.toml`. Every field has a default so a missing file
//! or a partial one is always usable.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bundle::{StaticValidationErrorType, StaticValidationReaction};
use crate::errors::{PipeflowError, PipeflowResult};

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "pipeflow.toml";

/// Engine configuration from pipeflow.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Run limits
    #[serde(default)]
    pub pipe_run: PipeRunConfig,

    /// Dry run behavior
    #[serde(default)]
    pub dry_run: DryRunConfig,

    /// Static validation reactions
    #[serde(default)]
    pub static_validation: StaticValidationConfig,
}

/// Limits applied to every run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipeRunConfig {
    /// Maximum depth of nested pipe calls
    #[serde(default = "default_pipe_stack_limit")]
    pub pipe_stack_limit: usize,
}

fn default_pipe_stack_limit() -> usize {
    20
}

impl Default for PipeRunConfig {
    fn default() -> Self {
        Self {
            pipe_stack_limit: default_pipe_stack_limit(),
        }
    }
}

/// Dry run configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DryRunConfig {
    /// Pipes whose dry run failure is expected and never aborts a batch
    #[serde(default)]
    pub allowed_to_fail_pipes: Vec<String>,

    /// Number of items in mocked lists
    #[serde(default = "default_nb_list_items")]
    pub nb_list_items: usize,

    /// Number of pages returned by mocked extractions
    #[serde(default = "default_nb_extracted_pages")]
    pub nb_extracted_pages: usize,

    /// Maximum length of mocked text
    #[serde(default = "default_text_gen_truncate_length")]
    pub text_gen_truncate_length: usize,

    /// Image urls handed out by mocked image generation
    #[serde(default = "default_image_urls")]
    pub image_urls: Vec<String>,
}

fn default_nb_list_items() -> usize {
    3
}

fn default_nb_extracted_pages() -> usize {
    2
}

fn default_text_gen_truncate_length() -> usize {
    256
}

fn default_image_urls() -> Vec<String> {
    vec![
        "https://placehold.co/600x400.png".to_string(),
        "https://placehold.co/400x600.png".to_string(),
    ]
}

impl Default for DryRunConfig {
    fn default() -> Self {
        Self {
            allowed_to_fail_pipes: Vec::new(),
            nb_list_items: default_nb_list_items(),
            nb_extracted_pages: default_nb_extracted_pages(),
            text_gen_truncate_length: default_text_gen_truncate_length(),
            image_urls: default_image_urls(),
        }
    }
}

/// How static validation findings are handled
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StaticValidationConfig {
    /// Reaction used when a finding type has no explicit entry
    #[serde(default)]
    pub default_reaction: StaticValidationReaction,

    /// Per-type reactions
    #[serde(default)]
    pub reactions: HashMap<StaticValidationErrorType, StaticValidationReaction>,
}

impl StaticValidationConfig {
    /// Reaction for a given finding type
    pub fn reaction_for(&self, error_type: StaticValidationErrorType) -> StaticValidationReaction {
        self.reactions
            .get(&error_type)
            .copied()
            .unwrap_or(self.default_reaction)
    }
}

impl EngineConfig {
    /// Load from file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> PipeflowResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    /// Load from an existing file
    pub fn from_file(path: &Path) -> PipeflowResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| PipeflowError::FileReadError {
                path: path.to_path_buf(),
                error: e.to_string(),
            })?;

        Self::from_toml(&content)
    }

    /// Parse from a TOML string
    pub fn from_toml(content: &str) -> PipeflowResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> PipeflowResult<()> {
        if self.pipe_run.pipe_stack_limit == 0 {
            return Err(PipeflowError::Config {
                reason: "pipe_run.pipe_stack_limit must be at least 1".into(),
            });
        }
        if self.dry_run.image_urls.is_empty() {
            return Err(PipeflowError::Config {
                reason: "dry_run.image_urls must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Whether a pipe's dry run failure is expected
    pub fn is_allowed_to_fail(&self, pipe_code: &str) -> bool {
        self.dry_run
            .allowed_to_fail_pipes
            .iter()
            .any(|code| code == pipe_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_file_missing() {
        let temp = TempDir::new().unwrap();
        let config = EngineConfig::load(&temp.path().join(CONFIG_FILE_NAME)).unwrap();

        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.pipe_run.pipe_stack_limit, 20);
        assert_eq!(config.dry_run.nb_list_items, 3);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = EngineConfig::from_toml(
            r#"
[dry_run]
allowed_to_fail_pipes = ["flaky"]

[static_validation]
default_reaction = "log"

[static_validation.reactions]
extraneous_input_variable = "ignore"
"#,
        )
        .unwrap();

        assert!(config.is_allowed_to_fail("flaky"));
        assert!(!config.is_allowed_to_fail("steady"));
        assert_eq!(config.pipe_run.pipe_stack_limit, 20);
        assert_eq!(
            config
                .static_validation
                .reaction_for(StaticValidationErrorType::ExtraneousInputVariable),
            StaticValidationReaction::Ignore
        );
        assert_eq!(
            config
                .static_validation
                .reaction_for(StaticValidationErrorType::MissingInputVariable),
            StaticValidationReaction::Log
        );
    }

    #[test]
    fn test_zero_stack_limit_rejected() {
        let result = EngineConfig::from_toml("[pipe_run]\npipe_stack_limit = 0\n");
        assert!(matches!(result, Err(PipeflowError::Config { .. })));
    }
}
