// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Bundle loading
//!
//! Turns a [`BundleBlueprint`] into concepts and pipes registered in a
//! [`Libraries`] set, then validates them statically. A load either fully
//! succeeds or leaves the libraries as they were.

use indexmap::IndexMap;
use std::sync::Arc;

use super::{
    BundleBlueprint, ConceptBlueprint, DependencyResolver, FieldBlueprint, PipeBlueprint,
    StaticValidator, StructureBlueprint, SubPipeBlueprint, ValidationReport,
};
use crate::collaborators::{FieldSpec, FieldType, StructureClass};
use crate::concept::{split_concept_reference, Concept, ConceptLibrary, NativeConceptCode};
use crate::config::EngineConfig;
use crate::controllers::{
    Controller, PipeBatch, PipeCondition, PipeParallel, PipeSequence, SubPipe,
};
use crate::errors::{PipeflowError, PipeflowResult};
use crate::pipe::{
    parse_concept_with_multiplicity, BatchParams, InputRequirements, Operator, OutputMultiplicity,
    Pipe, PipeCompose, PipeExtract, PipeFunc, PipeImgGen, PipeKind, PipeLlm, PipeType,
};
use crate::run::Libraries;

/// What a successful load registered
#[derive(Debug, Clone)]
pub struct LoadedBundle {
    pub domain: String,
    pub main_pipe: Option<String>,
    /// Codes of the loaded pipes, in resolver order
    pub pipe_codes: Vec<String>,
    pub report: ValidationReport,
}

/// Names a pipe factory can resolve while building
struct BuildContext<'a> {
    domain: &'a str,
    system_prompt: Option<&'a str>,
    concepts: &'a ConceptLibrary,
}

impl BuildContext<'_> {
    fn concept(&self, reference: &str) -> PipeflowResult<(Concept, Option<OutputMultiplicity>)> {
        let parsed = parse_concept_with_multiplicity(reference)?;
        let concept = self.concepts.resolve(self.domain, &parsed.concept)?;
        Ok((concept, parsed.multiplicity))
    }
}

type PipeFactory = fn(&BuildContext<'_>, &str, &PipeBlueprint) -> PipeflowResult<PipeKind>;

const PIPE_FACTORIES: [(PipeType, PipeFactory); 9] = [
    (PipeType::Llm, build_llm),
    (PipeType::ImgGen, build_img_gen),
    (PipeType::Extract, build_extract),
    (PipeType::Compose, build_compose),
    (PipeType::Func, build_func),
    (PipeType::Sequence, build_sequence),
    (PipeType::Parallel, build_parallel),
    (PipeType::Batch, build_batch),
    (PipeType::Condition, build_condition),
];

fn required_field<'a>(code: &str, value: &'a Option<String>, field: &str) -> PipeflowResult<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| PipeflowError::definition(code, format!("missing required field '{}'", field)))
}

fn build_llm(ctx: &BuildContext<'_>, code: &str, blueprint: &PipeBlueprint) -> PipeflowResult<PipeKind> {
    let prompt = required_field(code, &blueprint.prompt, "prompt")?;
    Ok(PipeKind::Operator(Operator::Llm(PipeLlm {
        prompt: prompt.to_string(),
        system_prompt: blueprint
            .system_prompt
            .clone()
            .or_else(|| ctx.system_prompt.map(str::to_string)),
        images: blueprint.images.clone(),
    })))
}

fn build_img_gen(_: &BuildContext<'_>, _: &str, blueprint: &PipeBlueprint) -> PipeflowResult<PipeKind> {
    Ok(PipeKind::Operator(Operator::ImgGen(PipeImgGen {
        prompt: blueprint.prompt.clone(),
    })))
}

fn build_extract(_: &BuildContext<'_>, _: &str, blueprint: &PipeBlueprint) -> PipeflowResult<PipeKind> {
    Ok(PipeKind::Operator(Operator::Extract(PipeExtract {
        max_pages: blueprint.max_pages,
    })))
}

fn build_compose(_: &BuildContext<'_>, code: &str, blueprint: &PipeBlueprint) -> PipeflowResult<PipeKind> {
    let template = required_field(code, &blueprint.template, "template")?;
    Ok(PipeKind::Operator(Operator::Compose(PipeCompose {
        template: template.to_string(),
    })))
}

fn build_func(_: &BuildContext<'_>, code: &str, blueprint: &PipeBlueprint) -> PipeflowResult<PipeKind> {
    let function_name = required_field(code, &blueprint.function_name, "function_name")?;
    Ok(PipeKind::Operator(Operator::Func(PipeFunc {
        function_name: function_name.to_string(),
    })))
}

fn build_sub_pipe(code: &str, blueprint: &SubPipeBlueprint) -> PipeflowResult<SubPipe> {
    let mut sub_pipe = SubPipe::new(&blueprint.pipe);
    if let Some(result) = &blueprint.result {
        sub_pipe = sub_pipe.with_output_name(result);
    }

    match (blueprint.nb_output, blueprint.multiple_output) {
        (Some(_), Some(_)) => {
            return Err(PipeflowError::definition(
                code,
                format!(
                    "step '{}' sets both nb_output and multiple_output",
                    blueprint.pipe
                ),
            ))
        }
        (Some(0), None) => {
            return Err(PipeflowError::definition(
                code,
                format!("step '{}' asks for zero outputs", blueprint.pipe),
            ))
        }
        (Some(count), None) => sub_pipe = sub_pipe.with_multiplicity(OutputMultiplicity::Count(count)),
        (None, Some(flag)) => sub_pipe = sub_pipe.with_multiplicity(OutputMultiplicity::Flag(flag)),
        (None, None) => {}
    }

    match (&blueprint.batch_over, &blueprint.batch_as) {
        (Some(list), Some(item)) => sub_pipe = sub_pipe.with_batch(list, item),
        (None, None) => {}
        _ => {
            return Err(PipeflowError::definition(
                code,
                format!(
                    "step '{}' needs both batch_over and batch_as, or neither",
                    blueprint.pipe
                ),
            ))
        }
    }

    Ok(sub_pipe)
}

fn build_sub_pipes(code: &str, blueprints: &[SubPipeBlueprint]) -> PipeflowResult<Vec<SubPipe>> {
    blueprints.iter().map(|b| build_sub_pipe(code, b)).collect()
}

fn build_sequence(_: &BuildContext<'_>, code: &str, blueprint: &PipeBlueprint) -> PipeflowResult<PipeKind> {
    let steps = build_sub_pipes(code, &blueprint.steps)?;
    Ok(PipeKind::Controller(Controller::Sequence(PipeSequence::new(code, steps)?)))
}

fn build_parallel(ctx: &BuildContext<'_>, code: &str, blueprint: &PipeBlueprint) -> PipeflowResult<PipeKind> {
    let branches = build_sub_pipes(code, &blueprint.parallels)?;
    let combined_output = blueprint
        .combined_output
        .as_deref()
        .map(|reference| ctx.concepts.resolve(ctx.domain, reference))
        .transpose()?;
    let parallel = PipeParallel::new(code, branches, blueprint.add_each_output, combined_output)?;
    Ok(PipeKind::Controller(Controller::Parallel(parallel)))
}

fn build_batch(_: &BuildContext<'_>, code: &str, blueprint: &PipeBlueprint) -> PipeflowResult<PipeKind> {
    let branch = required_field(code, &blueprint.branch_pipe_code, "branch_pipe_code")?;
    let list = required_field(code, &blueprint.input_list_name, "input_list_name")?;
    let item = required_field(code, &blueprint.input_item_name, "input_item_name")?;
    Ok(PipeKind::Controller(Controller::Batch(PipeBatch {
        branch_pipe_code: branch.to_string(),
        batch_params: BatchParams::new(list, item),
    })))
}

fn build_condition(_: &BuildContext<'_>, code: &str, blueprint: &PipeBlueprint) -> PipeflowResult<PipeKind> {
    let condition = PipeCondition::new(
        code,
        blueprint.expression.clone(),
        blueprint.expression_template.clone(),
        blueprint.outcomes.clone(),
        blueprint.default_outcome.clone(),
    )?
    .with_alias_target(blueprint.add_alias_from_expression_to.clone());
    Ok(PipeKind::Controller(Controller::Condition(condition)))
}

/// Loads and unloads bundles
pub struct BundleLoader;

impl BundleLoader {
    /// Register a bundle's concepts and pipes, then validate them
    ///
    /// On any failure, including a static validation error raised per
    /// config, everything the bundle registered is removed again.
    pub fn load(
        libraries: &mut Libraries,
        blueprint: &BundleBlueprint,
        config: &EngineConfig,
    ) -> PipeflowResult<LoadedBundle> {
        blueprint.validate_syntax()?;

        let domain = blueprint.domain.as_str();
        let already_loaded = libraries.concepts.iter().any(|c| c.domain == domain)
            || libraries.pipes.iter().any(|p| p.domain == domain);
        if already_loaded {
            return Err(PipeflowError::BundleDefinition {
                reason: format!("domain '{}' is already loaded", domain),
                help: Some("Remove the loaded bundle before loading it again".into()),
            });
        }

        let pipe_codes = DependencyResolver::resolve(&blueprint.pipes)?;

        match Self::register(libraries, blueprint, &pipe_codes, config) {
            Ok(report) => {
                tracing::debug!(
                    "Loaded bundle '{}': {} concepts, {} pipes",
                    domain,
                    blueprint.concepts.len(),
                    pipe_codes.len()
                );
                Ok(LoadedBundle {
                    domain: domain.to_string(),
                    main_pipe: blueprint.main_pipe.clone(),
                    pipe_codes,
                    report,
                })
            }
            Err(e) => {
                Self::remove(libraries, domain);
                Err(e)
            }
        }
    }

    /// Unload a domain's pipes and concepts, returning the removed pipe codes
    pub fn remove(libraries: &mut Libraries, domain: &str) -> Vec<String> {
        let removed = libraries.pipes.remove_domain(domain);
        let nb_concepts = libraries.concepts.remove_domain(domain);
        tracing::debug!(
            "Removed domain '{}': {} concepts, {} pipes",
            domain,
            nb_concepts,
            removed.len()
        );
        removed
    }

    fn register(
        libraries: &mut Libraries,
        blueprint: &BundleBlueprint,
        pipe_codes: &[String],
        config: &EngineConfig,
    ) -> PipeflowResult<ValidationReport> {
        Self::register_concepts(libraries, blueprint)?;

        let ctx = BuildContext {
            domain: &blueprint.domain,
            system_prompt: blueprint.system_prompt.as_deref(),
            concepts: &libraries.concepts,
        };
        let pipes = pipe_codes
            .iter()
            .map(|code| Self::build_pipe(&ctx, code, &blueprint.pipes[code.as_str()]))
            .collect::<PipeflowResult<Vec<Pipe>>>()?;
        for pipe in pipes {
            libraries.pipes.add(pipe)?;
        }

        let loaded = pipe_codes
            .iter()
            .map(|code| libraries.pipes.get_required(code))
            .collect::<PipeflowResult<Vec<Arc<Pipe>>>>()?;
        StaticValidator::new(libraries, &config.static_validation)
            .validate(&loaded)?
            .into_result()
    }

    /// Register concepts, each after the local concept it refines
    fn register_concepts(libraries: &mut Libraries, blueprint: &BundleBlueprint) -> PipeflowResult<()> {
        let domain = blueprint.domain.as_str();
        let mut pending: Vec<&String> = blueprint.concepts.keys().collect();

        while !pending.is_empty() {
            let before = pending.len();
            let mut deferred = Vec::new();

            for code in pending {
                let concept_blueprint = &blueprint.concepts[code.as_str()];
                if let Some(local) = Self::local_refinement(blueprint, concept_blueprint)? {
                    if libraries.concepts.get(&format!("{}.{}", domain, local)).is_none() {
                        deferred.push(code);
                        continue;
                    }
                }
                let concept = Self::build_concept(libraries, domain, code, concept_blueprint)?;
                libraries.concepts.add(concept)?;
            }

            if deferred.len() == before {
                let codes: Vec<&str> = deferred.iter().map(|c| c.as_str()).collect();
                return Err(PipeflowError::bundle(format!(
                    "concepts refine each other in a cycle: {}",
                    codes.join(", ")
                )));
            }
            pending = deferred;
        }

        Ok(())
    }

    /// Code of the same-bundle concept `concept` refines, if any
    fn local_refinement<'b>(
        blueprint: &'b BundleBlueprint,
        concept: &'b ConceptBlueprint,
    ) -> PipeflowResult<Option<&'b str>> {
        let Some(reference) = concept.refines() else {
            return Ok(None);
        };
        let (explicit_domain, code) = split_concept_reference(reference)?;
        let in_bundle = match explicit_domain {
            Some(domain) => domain == blueprint.domain,
            None => NativeConceptCode::from_code(code).is_none(),
        };
        Ok((in_bundle && blueprint.concepts.contains_key(code)).then_some(code))
    }

    fn build_concept(
        libraries: &mut Libraries,
        domain: &str,
        code: &str,
        blueprint: &ConceptBlueprint,
    ) -> PipeflowResult<Concept> {
        let refined = blueprint
            .refines()
            .map(|reference| libraries.concepts.resolve(domain, reference))
            .transpose()?;

        let class_name = match blueprint.structure() {
            Some(StructureBlueprint::Fields(fields)) => {
                libraries.classes.register(Self::inline_class(code, fields));
                code.to_string()
            }
            Some(StructureBlueprint::ClassName(name)) => {
                if !libraries.classes.has_class(name) {
                    return Err(PipeflowError::BundleDefinition {
                        reason: format!("concept '{}' uses unknown structure class '{}'", code, name),
                        help: Some("Register the class before loading the bundle".into()),
                    });
                }
                name.clone()
            }
            None if libraries.classes.has_class(code) => code.to_string(),
            None => match &refined {
                Some(parent) => parent.structure_class_name.clone(),
                None => NativeConceptCode::Text.structure_class_name(),
            },
        };

        let concept = Concept::new(domain, code, blueprint.description(), &class_name);
        Ok(match refined {
            Some(parent) => concept.refining(&parent.concept_string()),
            None => concept,
        })
    }

    fn inline_class(code: &str, fields: &IndexMap<String, FieldBlueprint>) -> StructureClass {
        fields
            .iter()
            .fold(StructureClass::new(code), |class, (name, field)| {
                let spec = match field {
                    FieldBlueprint::Description(description) => FieldSpec::new(description, FieldType::Text),
                    FieldBlueprint::Detailed {
                        field_type,
                        description,
                        required,
                    } => {
                        let spec = FieldSpec::new(description, field_type.unwrap_or(FieldType::Text));
                        if *required {
                            spec
                        } else {
                            spec.optional()
                        }
                    }
                };
                class.with_field(name, spec)
            })
    }

    fn build_pipe(ctx: &BuildContext<'_>, code: &str, blueprint: &PipeBlueprint) -> PipeflowResult<Pipe> {
        let factory = PIPE_FACTORIES
            .iter()
            .find(|(pipe_type, _)| *pipe_type == blueprint.pipe_type)
            .map(|(_, factory)| *factory)
            .ok_or_else(|| {
                PipeflowError::definition(code, format!("no factory for {}", blueprint.pipe_type))
            })?;

        let mut inputs = InputRequirements::new();
        for (name, reference) in &blueprint.inputs {
            let (concept, multiplicity) = ctx
                .concept(reference)
                .map_err(|e| PipeflowError::definition(code, format!("input '{}': {}", name, e)))?;
            inputs.add(name, concept, multiplicity);
        }
        let (output, output_multiplicity) = ctx
            .concept(&blueprint.output)
            .map_err(|e| PipeflowError::definition(code, format!("output: {}", e)))?;

        Ok(Pipe {
            code: code.to_string(),
            domain: ctx.domain.to_string(),
            description: blueprint.description.clone(),
            inputs,
            output,
            output_multiplicity,
            kind: factory(ctx, code, blueprint)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::StaticValidationErrorType;
    use crate::pipe::PipeCategory;

    const NEWS_BUNDLE: &str = r#"
domain = "news"
system_prompt = "You are a careful editor"
main_pipe = "pipeline"

[concept]
Article = "A news article"
Summary = { description = "A short summary", refines = "Text" }
Headline = { description = "A headline", refines = "Summary" }

[concept.Story]
description = "A story with a score"
structure = { title = "The title", score = { type = "number", description = "Score" } }

[pipe.fetch]
type = "PipeFunc"
inputs = { url = "Text" }
output = "Article"
function_name = "fetch"

[pipe.summarize]
type = "PipeLLM"
inputs = { article = "Article" }
output = "Summary"
prompt = "Summarize @article"

[pipe.pipeline]
type = "PipeSequence"
inputs = { url = "Text" }
output = "Summary"
steps = [{ pipe = "fetch", result = "article" }, { pipe = "summarize" }]
"#;

    fn load(content: &str) -> (Libraries, PipeflowResult<LoadedBundle>) {
        let mut libraries = Libraries::default();
        let blueprint = BundleBlueprint::from_toml(content).unwrap();
        let result = BundleLoader::load(&mut libraries, &blueprint, &EngineConfig::default());
        (libraries, result)
    }

    #[test]
    fn test_load_news_bundle() {
        let (libraries, result) = load(NEWS_BUNDLE);
        let loaded = result.unwrap();

        assert_eq!(loaded.pipe_codes, vec!["pipeline", "fetch", "summarize"]);
        assert_eq!(loaded.main_pipe.as_deref(), Some("pipeline"));
        assert!(loaded.report.is_valid());

        let headline = libraries.concepts.get("news.Headline").unwrap();
        assert_eq!(headline.refines.as_deref(), Some("news.Summary"));
        assert_eq!(headline.structure_class_name, "TextContent");

        let story = libraries.concepts.get("news.Story").unwrap();
        assert_eq!(story.structure_class_name, "Story");
        assert!(libraries.classes.has_class("Story"));

        let summarize = libraries.pipes.get_required("summarize").unwrap();
        assert_eq!(summarize.category(), PipeCategory::Operator);
        match &summarize.kind {
            PipeKind::Operator(Operator::Llm(llm)) => {
                assert_eq!(llm.system_prompt.as_deref(), Some("You are a careful editor"));
            }
            other => panic!("expected an LLM pipe, got {:?}", other),
        }
    }

    #[test]
    fn test_domain_loaded_twice_is_rejected() {
        let mut libraries = Libraries::default();
        let blueprint = BundleBlueprint::from_toml(NEWS_BUNDLE).unwrap();
        let config = EngineConfig::default();
        BundleLoader::load(&mut libraries, &blueprint, &config).unwrap();

        let second = BundleLoader::load(&mut libraries, &blueprint, &config);
        assert!(matches!(second, Err(PipeflowError::BundleDefinition { .. })));

        BundleLoader::remove(&mut libraries, "news");
        assert!(BundleLoader::load(&mut libraries, &blueprint, &config).is_ok());
    }

    #[test]
    fn test_parallel_without_output_option_fails_and_rolls_back() {
        let (libraries, result) = load(
            r#"
domain = "fanout"

[concept]
Note = "A note"

[pipe.left]
type = "PipeCompose"
inputs = { text = "Text" }
output = "Text"
template = "L {{ text }}"

[pipe.both]
type = "PipeParallel"
inputs = { text = "Text" }
output = "Text"
parallels = [{ pipe = "left", result = "l" }]
"#,
        );

        assert!(matches!(result, Err(PipeflowError::PipeDefinition { .. })));
        assert!(libraries.concepts.get("fanout.Note").is_none());
        assert!(!libraries.pipes.contains("left"));
    }

    #[test]
    fn test_static_validation_failure_rolls_back() {
        let (libraries, result) = load(
            r#"
domain = "sloppy"

[pipe.greet]
type = "PipeCompose"
inputs = { name = "Text" }
output = "Text"
template = "Hello {{ name }}"

[pipe.flow]
type = "PipeSequence"
inputs = { name = "Text", unused = "Text" }
output = "Text"
steps = [{ pipe = "greet" }]
"#,
        );

        match result {
            Err(PipeflowError::StaticValidation { error_type, .. }) => {
                assert_eq!(error_type, StaticValidationErrorType::ExtraneousInputVariable);
            }
            other => panic!("expected a static validation error, got {:?}", other),
        }
        assert!(libraries.pipes.is_empty());
    }

    #[test]
    fn test_sub_pipe_option_conflicts() {
        let (_, result) = load(
            r#"
domain = "conflict"

[pipe.one]
type = "PipeCompose"
inputs = { text = "Text" }
output = "Text"
template = "{{ text }}"

[pipe.seq]
type = "PipeSequence"
inputs = { text = "Text" }
output = "Text"
steps = [{ pipe = "one", nb_output = 2, multiple_output = true }]
"#,
        );
        assert!(matches!(result, Err(PipeflowError::PipeDefinition { .. })));
    }

    #[test]
    fn test_unknown_concept_is_a_definition_error() {
        let (_, result) = load(
            r#"
domain = "typo"

[pipe.one]
type = "PipeCompose"
inputs = { text = "Txt" }
output = "Text"
template = "{{ text }}"
"#,
        );
        assert!(matches!(result, Err(PipeflowError::PipeDefinition { .. })));
    }
}
