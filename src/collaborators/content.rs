// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Content generation seam
//!
//! Operators never talk to an inference backend directly. They hand a
//! request to a [`ContentGenerator`], which can be a real backend, the
//! offline echo generator, or the dry-run mock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::StructureClass;
use crate::pipe::JobMetadata;
use crate::template::{self, TemplateContext};

/// Failure reported by a content generator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("Generator '{generator}' is unavailable: {reason}")]
    Unavailable { generator: String, reason: String },

    #[error("Invalid generation request: {0}")]
    InvalidRequest(String),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Generated content does not match class '{class_name}': {reason}")]
    InvalidOutput { class_name: String, reason: String },

    #[error("{0}")]
    Backend(String),
}

/// Prompt handed to a text or object generator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmPrompt {
    #[serde(default)]
    pub system_prompt: Option<String>,
    pub user_text: String,
    /// Image urls attached to the prompt
    #[serde(default)]
    pub images: Vec<String>,
}

impl LlmPrompt {
    pub fn new(user_text: impl Into<String>) -> Self {
        Self {
            user_text: user_text.into(),
            ..Default::default()
        }
    }
}

/// One page produced by an extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPage {
    pub text: String,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Kind of document handed to an extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Image,
    Pdf,
}

/// Backend producing text, objects, images and extracted pages
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Generate free text
    async fn make_llm_text(
        &self,
        job: &JobMetadata,
        prompt: &LlmPrompt,
    ) -> Result<String, GenerationError>;

    /// Generate one object of `class`
    async fn make_object(
        &self,
        job: &JobMetadata,
        prompt: &LlmPrompt,
        class: &StructureClass,
    ) -> Result<Value, GenerationError>;

    /// Generate several objects of `class`
    ///
    /// `nb_items` is set when an exact count is required.
    async fn make_object_list(
        &self,
        job: &JobMetadata,
        prompt: &LlmPrompt,
        class: &StructureClass,
        nb_items: Option<usize>,
    ) -> Result<Vec<Value>, GenerationError>;

    /// Render a template
    async fn make_templated_text(
        &self,
        _job: &JobMetadata,
        template_source: &str,
        context: &TemplateContext,
    ) -> Result<String, GenerationError> {
        template::render(template_source, context)
            .map_err(|e| GenerationError::Template(e.to_string()))
    }

    /// Generate one image, returning its url
    async fn make_image(&self, job: &JobMetadata, prompt: &str) -> Result<String, GenerationError>;

    /// Generate several images, returning their urls
    async fn make_images(
        &self,
        job: &JobMetadata,
        prompt: &str,
        nb_images: usize,
    ) -> Result<Vec<String>, GenerationError>;

    /// Extract the pages of a document
    async fn make_extracted_pages(
        &self,
        job: &JobMetadata,
        document_url: &str,
        kind: DocumentKind,
    ) -> Result<Vec<ExtractedPage>, GenerationError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::StuffContent;

    struct TextOnly;

    #[async_trait]
    impl ContentGenerator for TextOnly {
        fn name(&self) -> &str {
            "text_only"
        }

        async fn make_llm_text(
            &self,
            _job: &JobMetadata,
            prompt: &LlmPrompt,
        ) -> Result<String, GenerationError> {
            Ok(prompt.user_text.to_uppercase())
        }

        async fn make_object(
            &self,
            _job: &JobMetadata,
            _prompt: &LlmPrompt,
            class: &StructureClass,
        ) -> Result<Value, GenerationError> {
            Err(GenerationError::Unavailable {
                generator: self.name().into(),
                reason: format!("no object support for {}", class.name),
            })
        }

        async fn make_object_list(
            &self,
            _job: &JobMetadata,
            _prompt: &LlmPrompt,
            _class: &StructureClass,
            _nb_items: Option<usize>,
        ) -> Result<Vec<Value>, GenerationError> {
            Ok(vec![])
        }

        async fn make_image(&self, _job: &JobMetadata, _prompt: &str) -> Result<String, GenerationError> {
            Err(GenerationError::Backend("no images".into()))
        }

        async fn make_images(
            &self,
            _job: &JobMetadata,
            _prompt: &str,
            _nb_images: usize,
        ) -> Result<Vec<String>, GenerationError> {
            Err(GenerationError::Backend("no images".into()))
        }

        async fn make_extracted_pages(
            &self,
            _job: &JobMetadata,
            _document_url: &str,
            _kind: DocumentKind,
        ) -> Result<Vec<ExtractedPage>, GenerationError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_default_templated_text_renders() {
        let job = JobMetadata::default();
        let mut context = TemplateContext::new();
        context.insert("name", StuffContent::text("Ferris"));

        let out = TextOnly
            .make_templated_text(&job, "Hi {{ name }}", &context)
            .await
            .unwrap();
        assert_eq!(out, "Hi Ferris");

        let err = TextOnly
            .make_templated_text(&job, "Hi {{ other }}", &context)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Template(_)));
    }

    #[tokio::test]
    async fn test_generator_errors_carry_reason() {
        let job = JobMetadata::default();
        let class = StructureClass::new("Invoice");
        let err = TextOnly
            .make_object(&job, &LlmPrompt::new("x"), &class)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invoice"));
    }
}
