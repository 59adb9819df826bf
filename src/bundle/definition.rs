// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Bundle definition structures
//!
//! Defines the schema for `.plx` bundle files (TOML).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::collaborators::FieldType;
use crate::concept::{is_pascal_case, is_snake_case};
use crate::controllers::Outcome;
use crate::errors::{PipeflowError, PipeflowResult};
use crate::pipe::{PipeDependencies, PipeType};

/// A bundle file: one domain's concepts and pipes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BundleBlueprint {
    /// Domain every concept and pipe of the bundle belongs to
    pub domain: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Default system prompt for the bundle's LLM pipes
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Pipe run when no pipe code is given
    #[serde(default)]
    pub main_pipe: Option<String>,

    #[serde(default, rename = "concept")]
    pub concepts: IndexMap<String, ConceptBlueprint>,

    #[serde(default, rename = "pipe")]
    pub pipes: IndexMap<String, PipeBlueprint>,
}

impl BundleBlueprint {
    /// Load a bundle from a file
    pub fn from_file(path: &Path) -> PipeflowResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PipeflowError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::from_toml(&content)
    }

    /// Parse a bundle and check its syntax rules
    pub fn from_toml(content: &str) -> PipeflowResult<Self> {
        let blueprint: Self = toml::from_str(content)?;
        blueprint.validate_syntax()?;
        Ok(blueprint)
    }

    /// Serialize the bundle back to TOML
    pub fn to_toml(&self) -> PipeflowResult<String> {
        toml::to_string_pretty(self).map_err(|e| PipeflowError::Toml {
            message: e.to_string(),
        })
    }

    /// Naming rules and the main pipe reference
    pub fn validate_syntax(&self) -> PipeflowResult<()> {
        if !is_snake_case(&self.domain) {
            return Err(PipeflowError::BundleDefinition {
                reason: format!("domain '{}' must be snake_case", self.domain),
                help: Some("Use lowercase letters, digits and underscores".into()),
            });
        }

        for code in self.concepts.keys() {
            if !is_pascal_case(code) {
                return Err(PipeflowError::BundleDefinition {
                    reason: format!("concept code '{}' must be PascalCase", code),
                    help: Some("Start with an uppercase letter, no separators".into()),
                });
            }
        }

        for code in self.pipes.keys() {
            if !is_snake_case(code) {
                return Err(PipeflowError::BundleDefinition {
                    reason: format!("pipe code '{}' must be snake_case", code),
                    help: Some("Use lowercase letters, digits and underscores".into()),
                });
            }
        }

        if let Some(main_pipe) = &self.main_pipe {
            if !self.pipes.contains_key(main_pipe) {
                return Err(PipeflowError::BundleDefinition {
                    reason: format!("main_pipe '{}' is not declared in the bundle", main_pipe),
                    help: Some(format!("Declare it as [pipe.{}]", main_pipe)),
                });
            }
        }

        Ok(())
    }

    /// Pipe codes in declaration order
    pub fn pipe_codes(&self) -> Vec<&str> {
        self.pipes.keys().map(String::as_str).collect()
    }
}

/// A concept declared in a bundle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ConceptBlueprint {
    /// Just a description; the content is text
    Description(String),

    Detailed {
        #[serde(default)]
        description: String,

        /// Registered class name or inline field table
        #[serde(default)]
        structure: Option<StructureBlueprint>,

        /// Concept reference this one refines
        #[serde(default)]
        refines: Option<String>,
    },
}

impl ConceptBlueprint {
    pub fn description(&self) -> &str {
        match self {
            Self::Description(description) => description,
            Self::Detailed { description, .. } => description,
        }
    }

    pub fn structure(&self) -> Option<&StructureBlueprint> {
        match self {
            Self::Description(_) => None,
            Self::Detailed { structure, .. } => structure.as_ref(),
        }
    }

    pub fn refines(&self) -> Option<&str> {
        match self {
            Self::Description(_) => None,
            Self::Detailed { refines, .. } => refines.as_deref(),
        }
    }
}

/// Structure of a concept's content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StructureBlueprint {
    ClassName(String),
    Fields(IndexMap<String, FieldBlueprint>),
}

/// One field of an inline structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldBlueprint {
    /// A required text field with this description
    Description(String),

    Detailed {
        #[serde(default, rename = "type")]
        field_type: Option<FieldType>,

        #[serde(default)]
        description: String,

        #[serde(default = "default_true")]
        required: bool,
    },
}

fn default_true() -> bool {
    true
}

/// A pipe declared in a bundle
///
/// Fields are shared by every pipe type; the loader picks the ones that
/// apply to `pipe_type` and rejects a definition missing any it needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PipeBlueprint {
    #[serde(rename = "type")]
    pub pipe_type: PipeType,

    #[serde(default)]
    pub description: String,

    /// Variable name -> concept reference, e.g. `Text` or `Page[]`
    #[serde(default)]
    pub inputs: IndexMap<String, String>,

    /// Output concept reference, with an optional multiplicity suffix
    pub output: String,

    // PipeLLM, PipeImgGen
    #[serde(default)]
    pub prompt: Option<String>,

    // PipeLLM
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,

    // PipeExtract
    #[serde(default)]
    pub max_pages: Option<usize>,

    // PipeCompose
    #[serde(default)]
    pub template: Option<String>,

    // PipeFunc
    #[serde(default)]
    pub function_name: Option<String>,

    // PipeSequence
    #[serde(default)]
    pub steps: Vec<SubPipeBlueprint>,

    // PipeParallel
    #[serde(default)]
    pub parallels: Vec<SubPipeBlueprint>,
    #[serde(default)]
    pub add_each_output: bool,
    #[serde(default)]
    pub combined_output: Option<String>,

    // PipeBatch
    #[serde(default)]
    pub branch_pipe_code: Option<String>,
    #[serde(default)]
    pub input_list_name: Option<String>,
    #[serde(default)]
    pub input_item_name: Option<String>,

    // PipeCondition
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub expression_template: Option<String>,
    #[serde(default)]
    pub outcomes: IndexMap<String, String>,
    #[serde(default)]
    pub default_outcome: Option<String>,
    #[serde(default)]
    pub add_alias_from_expression_to: Option<String>,
}

impl PipeDependencies for PipeBlueprint {
    fn pipe_dependencies(&self) -> BTreeSet<String> {
        match self.pipe_type {
            PipeType::Sequence => self.steps.iter().map(|s| s.pipe.clone()).collect(),
            PipeType::Parallel => self.parallels.iter().map(|s| s.pipe.clone()).collect(),
            PipeType::Batch => self.branch_pipe_code.iter().cloned().collect(),
            PipeType::Condition => self
                .outcomes
                .values()
                .chain(self.default_outcome.iter())
                .filter(|value| matches!(Outcome::parse(value), Outcome::Pipe(_)))
                .cloned()
                .collect(),
            _ => BTreeSet::new(),
        }
    }

    fn ordered_pipe_dependencies(&self) -> Option<Vec<String>> {
        if self.pipe_type != PipeType::Sequence {
            return None;
        }
        let mut ordered: Vec<String> = Vec::new();
        for step in &self.steps {
            if !ordered.contains(&step.pipe) {
                ordered.push(step.pipe.clone());
            }
        }
        Some(ordered)
    }
}

/// A reference to a pipe from inside a controller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SubPipeBlueprint {
    pub pipe: String,

    /// Name the output is stored under
    #[serde(default)]
    pub result: Option<String>,

    #[serde(default)]
    pub nb_output: Option<u32>,

    #[serde(default)]
    pub multiple_output: Option<bool>,

    /// List to map the pipe over
    #[serde(default)]
    pub batch_over: Option<String>,

    /// Name each item is bound to
    #[serde(default)]
    pub batch_as: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUMMARY_BUNDLE: &str = r#"
domain = "news"
description = "Fetch and summarize articles"
main_pipe = "pipeline"

[concept]
Article = "A news article"

[concept.Summary]
description = "A short summary"
refines = "Text"

[concept.Headline.structure]
title = "The headline"
score = { type = "number", description = "Relevance", required = false }

[pipe.fetch]
type = "PipeFunc"
inputs = { url = "Text" }
output = "Article"
function_name = "fetch_article"

[pipe.summarize]
type = "PipeLLM"
inputs = { article = "Article" }
output = "Summary"
prompt = "Summarize @article"

[pipe.pipeline]
type = "PipeSequence"
inputs = { url = "Text" }
output = "Summary"
steps = [
    { pipe = "fetch", result = "article" },
    { pipe = "summarize", result = "summary" },
]
"#;

    #[test]
    fn test_parse_bundle() {
        let bundle = BundleBlueprint::from_toml(SUMMARY_BUNDLE).unwrap();

        assert_eq!(bundle.domain, "news");
        assert_eq!(bundle.main_pipe.as_deref(), Some("pipeline"));
        assert_eq!(bundle.concepts.len(), 3);
        assert_eq!(bundle.pipes.len(), 3);
        assert_eq!(bundle.concepts["Article"].description(), "A news article");
        assert_eq!(bundle.concepts["Summary"].refines(), Some("Text"));
        assert!(matches!(
            bundle.concepts["Headline"].structure(),
            Some(StructureBlueprint::Fields(fields)) if fields.len() == 2
        ));

        let pipeline = &bundle.pipes["pipeline"];
        assert_eq!(pipeline.pipe_type, PipeType::Sequence);
        assert_eq!(
            pipeline.ordered_pipe_dependencies(),
            Some(vec!["fetch".to_string(), "summarize".to_string()])
        );
    }

    #[test]
    fn test_syntax_rules() {
        let bad_domain = SUMMARY_BUNDLE.replace("domain = \"news\"", "domain = \"News\"");
        assert!(matches!(
            BundleBlueprint::from_toml(&bad_domain),
            Err(PipeflowError::BundleDefinition { .. })
        ));

        let bad_main = SUMMARY_BUNDLE.replace("main_pipe = \"pipeline\"", "main_pipe = \"missing\"");
        assert!(matches!(
            BundleBlueprint::from_toml(&bad_main),
            Err(PipeflowError::BundleDefinition { .. })
        ));

        let bad_concept = SUMMARY_BUNDLE.replace("[concept.Summary]", "[concept.summary]");
        assert!(BundleBlueprint::from_toml(&bad_concept).is_err());
    }

    #[test]
    fn test_unknown_pipe_field_rejected() {
        let typo = SUMMARY_BUNDLE.replace("prompt = \"Summarize @article\"", "promt = \"Summarize\"");
        assert!(matches!(
            BundleBlueprint::from_toml(&typo),
            Err(PipeflowError::Toml { .. })
        ));
    }

    #[test]
    fn test_condition_dependencies_skip_special_outcomes() {
        let bundle = BundleBlueprint::from_toml(
            r#"
domain = "support"

[pipe.route]
type = "PipeCondition"
inputs = { ticket = "Text" }
output = "Text"
expression = "ticket"
outcomes = { bug = "triage", spam = "fail" }
default_outcome = "continue"
"#,
        )
        .unwrap();

        let deps = bundle.pipes["route"].pipe_dependencies();
        assert_eq!(deps.into_iter().collect::<Vec<_>>(), vec!["triage"]);
    }
}
