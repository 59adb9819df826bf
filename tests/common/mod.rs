// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pipeflow::collaborators::{
    ContentGenerator, DocumentKind, ExtractedPage, GenerationError, LlmPrompt,
    OfflineContentGenerator, StructureClass,
};
use pipeflow::template::{self, TemplateContext};
use pipeflow::memory::StuffContent;
use pipeflow::pipe::JobMetadata;
use pipeflow::run::Libraries;
use pipeflow::{Engine, EngineConfig};

/// Generator failing every call, counting how often it was reached
#[derive(Debug, Default)]
pub struct FailingGenerator {
    calls: AtomicUsize,
}

impl FailingGenerator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail(&self) -> GenerationError {
        self.calls.fetch_add(1, Ordering::SeqCst);
        GenerationError::Unavailable {
            generator: "failing".into(),
            reason: "this generator must never be called".into(),
        }
    }
}

#[async_trait]
impl ContentGenerator for FailingGenerator {
    fn name(&self) -> &str {
        "failing"
    }

    async fn make_llm_text(&self, _: &JobMetadata, _: &LlmPrompt) -> Result<String, GenerationError> {
        Err(self.fail())
    }

    async fn make_object(
        &self,
        _: &JobMetadata,
        _: &LlmPrompt,
        _: &StructureClass,
    ) -> Result<Value, GenerationError> {
        Err(self.fail())
    }

    async fn make_object_list(
        &self,
        _: &JobMetadata,
        _: &LlmPrompt,
        _: &StructureClass,
        _: Option<usize>,
    ) -> Result<Vec<Value>, GenerationError> {
        Err(self.fail())
    }

    async fn make_templated_text(
        &self,
        _: &JobMetadata,
        _: &str,
        _: &TemplateContext,
    ) -> Result<String, GenerationError> {
        Err(self.fail())
    }

    async fn make_image(&self, _: &JobMetadata, _: &str) -> Result<String, GenerationError> {
        Err(self.fail())
    }

    async fn make_images(&self, _: &JobMetadata, _: &str, _: usize) -> Result<Vec<String>, GenerationError> {
        Err(self.fail())
    }

    async fn make_extracted_pages(
        &self,
        _: &JobMetadata,
        _: &str,
        _: DocumentKind,
    ) -> Result<Vec<ExtractedPage>, GenerationError> {
        Err(self.fail())
    }
}

/// Offline generator whose templates mentioning earlier names finish later
#[derive(Debug)]
pub struct StaggeredGenerator {
    inner: OfflineContentGenerator,
    names: Vec<String>,
    finished: Mutex<Vec<String>>,
}

impl StaggeredGenerator {
    pub fn new(names: &[&str]) -> Self {
        Self {
            inner: OfflineContentGenerator::new(),
            names: names.iter().map(|n| n.to_string()).collect(),
            finished: Mutex::new(Vec::new()),
        }
    }

    /// Rendered texts in completion order
    pub fn finished(&self) -> Vec<String> {
        self.finished.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentGenerator for StaggeredGenerator {
    fn name(&self) -> &str {
        "staggered"
    }

    async fn make_llm_text(&self, job: &JobMetadata, prompt: &LlmPrompt) -> Result<String, GenerationError> {
        self.inner.make_llm_text(job, prompt).await
    }

    async fn make_object(
        &self,
        job: &JobMetadata,
        prompt: &LlmPrompt,
        class: &StructureClass,
    ) -> Result<Value, GenerationError> {
        self.inner.make_object(job, prompt, class).await
    }

    async fn make_object_list(
        &self,
        job: &JobMetadata,
        prompt: &LlmPrompt,
        class: &StructureClass,
        nb_items: Option<usize>,
    ) -> Result<Vec<Value>, GenerationError> {
        self.inner.make_object_list(job, prompt, class, nb_items).await
    }

    async fn make_templated_text(
        &self,
        _: &JobMetadata,
        template_source: &str,
        context: &TemplateContext,
    ) -> Result<String, GenerationError> {
        let text = template::render(template_source, context)
            .map_err(|e| GenerationError::Template(e.to_string()))?;
        let position = self
            .names
            .iter()
            .position(|name| text.contains(name.as_str()))
            .unwrap_or(self.names.len());
        let delay = (self.names.len() - position) as u64 * 15;
        tokio::time::sleep(Duration::from_millis(delay)).await;
        self.finished.lock().unwrap().push(text.clone());
        Ok(text)
    }

    async fn make_image(&self, job: &JobMetadata, prompt: &str) -> Result<String, GenerationError> {
        self.inner.make_image(job, prompt).await
    }

    async fn make_images(
        &self,
        job: &JobMetadata,
        prompt: &str,
        nb_images: usize,
    ) -> Result<Vec<String>, GenerationError> {
        self.inner.make_images(job, prompt, nb_images).await
    }

    async fn make_extracted_pages(
        &self,
        job: &JobMetadata,
        document_url: &str,
        kind: DocumentKind,
    ) -> Result<Vec<ExtractedPage>, GenerationError> {
        self.inner.make_extracted_pages(job, document_url, kind).await
    }
}

/// Libraries with a `fetch` function returning a fixed article
pub fn libraries_with_fetch() -> Libraries {
    let mut libraries = Libraries::default();
    libraries.funcs.register("fetch", |memory| {
        let url = memory.get("url")?.content.rendered_text();
        Ok(StuffContent::text(format!("Article at {}", url)))
    });
    libraries
}

/// Engine whose live generator fails on every call
pub fn engine_with_failing_generator(config: EngineConfig) -> (Engine, Arc<FailingGenerator>) {
    let generator = Arc::new(FailingGenerator::default());
    let engine = Engine::with_libraries(libraries_with_fetch(), config)
        .with_content_generator(generator.clone());
    (engine, generator)
}

pub const NEWS_BUNDLE: &str = include_str!("../fixtures/news.plx");
