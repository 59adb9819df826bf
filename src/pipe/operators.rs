// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Operator pipes
//!
//! Each operator performs one call to a collaborator. In dry mode the call
//! goes to the run context's dry generator instead of the real one.

use serde_json::Value;
use std::collections::BTreeSet;

use super::{InputRequirements, JobMetadata, Pipe, PipeRunParams, PipeType};
use crate::collaborators::{DocumentKind, GenerationError, LlmPrompt, StructureClass};
use crate::concept::{Concept, NativeConceptCode};
use crate::errors::{PipeflowError, PipeflowResult};
use crate::memory::{StuffContent, WorkingMemory, WorkingMemoryFactory};
use crate::run::{dry_run, RunContext};
use crate::template::{self, TemplateContext};

/// Number of images generated when several are requested without a count
pub const DEFAULT_NB_IMAGES: usize = 2;

const TEXT_CLASS_NAME: &str = "TextContent";

/// One of the five operator kinds
#[derive(Debug, Clone)]
pub enum Operator {
    Llm(PipeLlm),
    ImgGen(PipeImgGen),
    Extract(PipeExtract),
    Compose(PipeCompose),
    Func(PipeFunc),
}

/// Text or structured generation from a prompt template
#[derive(Debug, Clone)]
pub struct PipeLlm {
    pub prompt: String,
    pub system_prompt: Option<String>,
    /// Names of image stuffs attached to the prompt
    pub images: Vec<String>,
}

/// Image generation
#[derive(Debug, Clone)]
pub struct PipeImgGen {
    /// Prompt template; when absent the single input is used as prompt
    pub prompt: Option<String>,
}

/// Page extraction from an image or a PDF
#[derive(Debug, Clone, Default)]
pub struct PipeExtract {
    pub max_pages: Option<usize>,
}

/// Template rendering
#[derive(Debug, Clone)]
pub struct PipeCompose {
    pub template: String,
}

/// Call to a registered function
#[derive(Debug, Clone)]
pub struct PipeFunc {
    pub function_name: String,
}

fn root_name(variable: &str) -> String {
    variable.split('.').next().unwrap_or(variable).to_string()
}

impl Operator {
    pub fn pipe_type(&self) -> PipeType {
        match self {
            Self::Llm(_) => PipeType::Llm,
            Self::ImgGen(_) => PipeType::ImgGen,
            Self::Extract(_) => PipeType::Extract,
            Self::Compose(_) => PipeType::Compose,
            Self::Func(_) => PipeType::Func,
        }
    }

    pub fn required_variables(&self, inputs: &InputRequirements) -> BTreeSet<String> {
        match self {
            Self::Llm(llm) => {
                let mut names = template::required_variables(&llm.prompt);
                if let Some(system_prompt) = &llm.system_prompt {
                    names.extend(template::required_variables(system_prompt));
                }
                names.extend(llm.images.iter().map(|image| root_name(image)));
                names
            }
            Self::ImgGen(img_gen) => match &img_gen.prompt {
                Some(prompt) => template::required_variables(prompt),
                None => inputs.names().map(str::to_string).collect(),
            },
            Self::Compose(compose) => template::required_variables(&compose.template),
            Self::Extract(_) | Self::Func(_) => inputs.names().map(str::to_string).collect(),
        }
    }

    /// Produce the content of the operator's output stuff
    pub async fn run(
        &self,
        pipe: &Pipe,
        ctx: &RunContext,
        job: &JobMetadata,
        memory: &WorkingMemory,
        params: &PipeRunParams,
        output_concept: &Concept,
    ) -> PipeflowResult<StuffContent> {
        match self {
            Self::Llm(llm) => llm.run(pipe, ctx, job, memory, params, output_concept).await,
            Self::ImgGen(img_gen) => img_gen.run(pipe, ctx, job, memory, params).await,
            Self::Extract(extract) => extract.run(pipe, ctx, job, memory, params).await,
            Self::Compose(compose) => compose.run(pipe, ctx, job, memory, params).await,
            Self::Func(func) => func.run(pipe, ctx, memory, params, output_concept),
        }
    }
}

fn generation_error(pipe: &Pipe) -> impl Fn(GenerationError) -> PipeflowError + '_ {
    move |source| PipeflowError::Generation {
        pipe_code: pipe.code.clone(),
        source,
    }
}

impl PipeLlm {
    fn image_urls(&self, memory: &WorkingMemory) -> PipeflowResult<Vec<String>> {
        let mut urls = Vec::new();
        for name in &self.images {
            let stuff = memory.get(&root_name(name))?;
            let mut push = |content: &StuffContent| {
                if let Some(url) = content.field_text("url") {
                    urls.push(url);
                }
            };
            match stuff.content.as_list() {
                Some(items) => items.iter().for_each(&mut push),
                None => push(&stuff.content),
            }
        }
        Ok(urls)
    }

    fn structure_class<'c>(
        &self,
        pipe: &Pipe,
        ctx: &'c RunContext,
        concept: &Concept,
    ) -> PipeflowResult<&'c StructureClass> {
        ctx.classes()
            .get_class(&concept.structure_class_name)
            .ok_or_else(|| {
                PipeflowError::definition(
                    &pipe.code,
                    format!(
                        "structure class '{}' of concept '{}' is not registered",
                        concept.structure_class_name, concept
                    ),
                )
            })
    }

    async fn run(
        &self,
        pipe: &Pipe,
        ctx: &RunContext,
        job: &JobMetadata,
        memory: &WorkingMemory,
        params: &PipeRunParams,
        concept: &Concept,
    ) -> PipeflowResult<StuffContent> {
        let context = TemplateContext::from_memory(memory);
        let prompt = LlmPrompt {
            system_prompt: self
                .system_prompt
                .as_deref()
                .map(|source| template::render(source, &context))
                .transpose()?,
            user_text: template::render(&self.prompt, &context)?,
            images: self.image_urls(memory)?,
        };

        let generator = ctx.generator(params.run_mode);
        let multiplicity = pipe.resolved_multiplicity(params);
        let class = self.structure_class(pipe, ctx, concept)?;
        let to_error = generation_error(pipe);

        if !multiplicity.is_multiple_enabled {
            if concept.structure_class_name == TEXT_CLASS_NAME {
                let text = generator.make_llm_text(job, &prompt).await.map_err(&to_error)?;
                return Ok(StuffContent::text(text));
            }
            let value = generator
                .make_object(job, &prompt, class)
                .await
                .map_err(&to_error)?;
            return content_from_value(concept, class, value).map_err(to_error);
        }

        let nb_items = multiplicity.exact_count.map(|n| n as usize);
        let values = generator
            .make_object_list(job, &prompt, class, nb_items)
            .await
            .map_err(&to_error)?;
        if let Some(expected) = nb_items {
            if values.len() != expected {
                return Err(to_error(GenerationError::InvalidOutput {
                    class_name: class.name.clone(),
                    reason: format!("expected {} items, got {}", expected, values.len()),
                }));
            }
        }
        let items = values
            .into_iter()
            .map(|value| content_from_value(concept, class, value))
            .collect::<Result<Vec<_>, _>>()
            .map_err(to_error)?;
        Ok(StuffContent::list(items))
    }
}

fn content_from_value(
    concept: &Concept,
    class: &StructureClass,
    value: Value,
) -> Result<StuffContent, GenerationError> {
    let invalid = |reason: String| GenerationError::InvalidOutput {
        class_name: class.name.clone(),
        reason,
    };
    class.check_value(&value).map_err(invalid)?;
    WorkingMemoryFactory::make_content(concept, &value).map_err(invalid)
}

impl PipeImgGen {
    async fn run(
        &self,
        pipe: &Pipe,
        ctx: &RunContext,
        job: &JobMetadata,
        memory: &WorkingMemory,
        params: &PipeRunParams,
    ) -> PipeflowResult<StuffContent> {
        let prompt = match &self.prompt {
            Some(source) => template::render(source, &TemplateContext::from_memory(memory))?,
            None => {
                let name = pipe.inputs.names().next().ok_or_else(|| {
                    PipeflowError::definition(&pipe.code, "image generation needs a prompt or one input")
                })?;
                memory.get(name)?.content.rendered_text()
            }
        };

        let generator = ctx.generator(params.run_mode);
        let multiplicity = pipe.resolved_multiplicity(params);
        let to_error = generation_error(pipe);
        let image = |url: String| StuffContent::Image { url, caption: None };

        if multiplicity.is_multiple_enabled {
            let nb_images = multiplicity
                .exact_count
                .map_or(DEFAULT_NB_IMAGES, |n| n as usize);
            let urls = generator
                .make_images(job, &prompt, nb_images)
                .await
                .map_err(to_error)?;
            Ok(StuffContent::list(urls.into_iter().map(image).collect()))
        } else {
            let url = generator.make_image(job, &prompt).await.map_err(to_error)?;
            Ok(image(url))
        }
    }
}

impl PipeExtract {
    async fn run(
        &self,
        pipe: &Pipe,
        ctx: &RunContext,
        job: &JobMetadata,
        memory: &WorkingMemory,
        params: &PipeRunParams,
    ) -> PipeflowResult<StuffContent> {
        let name = pipe
            .inputs
            .names()
            .next()
            .ok_or_else(|| PipeflowError::definition(&pipe.code, "extraction needs one input"))?;
        let stuff = memory.get(name)?;

        let kind = match &stuff.content {
            StuffContent::Pdf { .. } => DocumentKind::Pdf,
            StuffContent::Image { .. } => DocumentKind::Image,
            _ => {
                let concepts = ctx.concepts();
                let pdf = Concept::native(NativeConceptCode::Pdf);
                if concepts.is_compatible(ctx.classes(), &stuff.concept, &pdf, false) {
                    DocumentKind::Pdf
                } else {
                    DocumentKind::Image
                }
            }
        };
        let url = stuff
            .content
            .field_text("url")
            .ok_or_else(|| PipeflowError::InputValue {
                name: name.to_string(),
                reason: format!("expected an image or a PDF, got {}", stuff.content.kind_name()),
            })?;

        let mut pages = ctx
            .generator(params.run_mode)
            .make_extracted_pages(job, &url, kind)
            .await
            .map_err(generation_error(pipe))?;
        if let Some(max_pages) = self.max_pages {
            pages.truncate(max_pages);
        }

        Ok(StuffContent::list(
            pages
                .into_iter()
                .enumerate()
                .map(|(index, page)| StuffContent::Page {
                    page_number: index + 1,
                    text: page.text,
                    images: page.images,
                })
                .collect(),
        ))
    }
}

impl PipeCompose {
    async fn run(
        &self,
        pipe: &Pipe,
        ctx: &RunContext,
        job: &JobMetadata,
        memory: &WorkingMemory,
        params: &PipeRunParams,
    ) -> PipeflowResult<StuffContent> {
        let context = template::context_for(&self.template, memory);
        let text = ctx
            .generator(params.run_mode)
            .make_templated_text(job, &self.template, &context)
            .await
            .map_err(generation_error(pipe))?;
        Ok(StuffContent::text(text))
    }
}

impl PipeFunc {
    fn run(
        &self,
        pipe: &Pipe,
        ctx: &RunContext,
        memory: &WorkingMemory,
        params: &PipeRunParams,
        concept: &Concept,
    ) -> PipeflowResult<StuffContent> {
        let func = ctx.funcs().get_required(&self.function_name)?;
        if params.is_dry() {
            let is_list = pipe.resolved_multiplicity(params).is_multiple_enabled;
            return Ok(dry_run::mock_content(ctx, concept, is_list));
        }
        func(memory).map_err(|e| PipeflowError::FuncFailed {
            function_name: self.function_name.clone(),
            message: format!("{:#}", e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_variables_per_operator() {
        let mut inputs = InputRequirements::new();
        inputs.add("doc", Concept::native(NativeConceptCode::Pdf), None);

        let llm = Operator::Llm(PipeLlm {
            prompt: "Summarize @text for {{ audience.name }}".into(),
            system_prompt: Some("You write for $tone readers".into()),
            images: vec!["cover".into()],
        });
        assert_eq!(
            llm.required_variables(&inputs).into_iter().collect::<Vec<_>>(),
            vec!["audience", "cover", "text", "tone"]
        );

        let extract = Operator::Extract(PipeExtract::default());
        assert_eq!(
            extract.required_variables(&inputs).into_iter().collect::<Vec<_>>(),
            vec!["doc"]
        );

        let img_gen = Operator::ImgGen(PipeImgGen { prompt: None });
        assert!(img_gen.required_variables(&inputs).contains("doc"));
        assert_eq!(img_gen.pipe_type(), PipeType::ImgGen);
    }
}
