// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Generators that never reach a real backend
//!
//! [`DryContentGenerator`] produces structurally valid placeholders for dry
//! runs. [`OfflineContentGenerator`] echoes prompts back so a bundle can be
//! run live from the command line without any network access.

use async_trait::async_trait;
use serde_json::Value;

use super::{ContentGenerator, DocumentKind, ExtractedPage, GenerationError, LlmPrompt, StructureClass};
use crate::config::DryRunConfig;
use crate::pipe::JobMetadata;

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Mock generator used by every operator in dry mode
#[derive(Debug, Clone, Default)]
pub struct DryContentGenerator {
    config: DryRunConfig,
}

impl DryContentGenerator {
    pub fn new(config: DryRunConfig) -> Self {
        Self { config }
    }

    fn image_url(&self, index: usize) -> String {
        // image_urls is validated non-empty when loaded from a file
        match self.config.image_urls.len() {
            0 => format!("https://placehold.co/{}.png", index),
            len => self.config.image_urls[index % len].clone(),
        }
    }
}

#[async_trait]
impl ContentGenerator for DryContentGenerator {
    fn name(&self) -> &str {
        "dry"
    }

    async fn make_llm_text(
        &self,
        _job: &JobMetadata,
        prompt: &LlmPrompt,
    ) -> Result<String, GenerationError> {
        Ok(truncate(
            &format!("DRY RUN: {}", prompt.user_text),
            self.config.text_gen_truncate_length,
        ))
    }

    async fn make_object(
        &self,
        _job: &JobMetadata,
        _prompt: &LlmPrompt,
        class: &StructureClass,
    ) -> Result<Value, GenerationError> {
        Ok(class.mock_value())
    }

    async fn make_object_list(
        &self,
        _job: &JobMetadata,
        _prompt: &LlmPrompt,
        class: &StructureClass,
        nb_items: Option<usize>,
    ) -> Result<Vec<Value>, GenerationError> {
        let count = nb_items.unwrap_or(self.config.nb_list_items);
        Ok((0..count).map(|_| class.mock_value()).collect())
    }

    async fn make_image(&self, _job: &JobMetadata, _prompt: &str) -> Result<String, GenerationError> {
        Ok(self.image_url(0))
    }

    async fn make_images(
        &self,
        _job: &JobMetadata,
        _prompt: &str,
        nb_images: usize,
    ) -> Result<Vec<String>, GenerationError> {
        Ok((0..nb_images).map(|i| self.image_url(i)).collect())
    }

    async fn make_extracted_pages(
        &self,
        _job: &JobMetadata,
        document_url: &str,
        _kind: DocumentKind,
    ) -> Result<Vec<ExtractedPage>, GenerationError> {
        Ok((1..=self.config.nb_extracted_pages)
            .map(|n| ExtractedPage {
                text: format!("DRY RUN: page {} of {}", n, document_url),
                images: vec![],
            })
            .collect())
    }
}

/// Live generator that works without any backend
///
/// Text outputs echo the prompt, objects are filled with placeholders,
/// images get `offline://` urls.
#[derive(Debug, Clone, Default)]
pub struct OfflineContentGenerator;

impl OfflineContentGenerator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ContentGenerator for OfflineContentGenerator {
    fn name(&self) -> &str {
        "offline"
    }

    async fn make_llm_text(
        &self,
        _job: &JobMetadata,
        prompt: &LlmPrompt,
    ) -> Result<String, GenerationError> {
        Ok(prompt.user_text.clone())
    }

    async fn make_object(
        &self,
        _job: &JobMetadata,
        _prompt: &LlmPrompt,
        class: &StructureClass,
    ) -> Result<Value, GenerationError> {
        Ok(class.mock_value())
    }

    async fn make_object_list(
        &self,
        _job: &JobMetadata,
        _prompt: &LlmPrompt,
        class: &StructureClass,
        nb_items: Option<usize>,
    ) -> Result<Vec<Value>, GenerationError> {
        Ok((0..nb_items.unwrap_or(1)).map(|_| class.mock_value()).collect())
    }

    async fn make_image(&self, _job: &JobMetadata, prompt: &str) -> Result<String, GenerationError> {
        if prompt.trim().is_empty() {
            return Err(GenerationError::InvalidRequest("empty image prompt".into()));
        }
        Ok("offline://image/0".to_string())
    }

    async fn make_images(
        &self,
        _job: &JobMetadata,
        prompt: &str,
        nb_images: usize,
    ) -> Result<Vec<String>, GenerationError> {
        if prompt.trim().is_empty() {
            return Err(GenerationError::InvalidRequest("empty image prompt".into()));
        }
        Ok((0..nb_images).map(|i| format!("offline://image/{}", i)).collect())
    }

    async fn make_extracted_pages(
        &self,
        _job: &JobMetadata,
        document_url: &str,
        _kind: DocumentKind,
    ) -> Result<Vec<ExtractedPage>, GenerationError> {
        Ok(vec![ExtractedPage {
            text: format!("Contents of {}", document_url),
            images: vec![],
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{FieldSpec, FieldType};

    #[tokio::test]
    async fn test_dry_text_is_truncated() {
        let config = DryRunConfig {
            text_gen_truncate_length: 12,
            ..Default::default()
        };
        let generator = DryContentGenerator::new(config);
        let text = generator
            .make_llm_text(&JobMetadata::default(), &LlmPrompt::new("a very long prompt"))
            .await
            .unwrap();
        assert_eq!(text, "DRY RUN: a v");
    }

    #[tokio::test]
    async fn test_dry_lists_use_configured_counts() {
        let generator = DryContentGenerator::default();
        let job = JobMetadata::default();
        let class = StructureClass::new("Tag").with_field("label", FieldSpec::new("", FieldType::Text));

        let objects = generator
            .make_object_list(&job, &LlmPrompt::new("tags"), &class, None)
            .await
            .unwrap();
        assert_eq!(objects.len(), 3);

        let exact = generator
            .make_object_list(&job, &LlmPrompt::new("tags"), &class, Some(5))
            .await
            .unwrap();
        assert_eq!(exact.len(), 5);

        let images = generator.make_images(&job, "cats", 3).await.unwrap();
        assert_eq!(images[0], images[2]);
        assert_ne!(images[0], images[1]);

        let pages = generator
            .make_extracted_pages(&job, "doc.pdf", DocumentKind::Pdf)
            .await
            .unwrap();
        assert_eq!(pages.len(), 2);
    }

    #[test]
    fn test_offline_echoes_prompt() {
        let generator = OfflineContentGenerator::new();
        let text = tokio_test::block_on(
            generator.make_llm_text(&JobMetadata::default(), &LlmPrompt::new("echo me")),
        )
        .unwrap();
        assert_eq!(text, "echo me");

        let err = tokio_test::block_on(generator.make_image(&JobMetadata::default(), "  "))
            .unwrap_err();
        assert!(matches!(err, GenerationError::InvalidRequest(_)));
    }
}
