// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Static validation
//!
//! Checks every loaded pipe against the libraries before anything runs:
//! declared inputs against the variables the pipe actually reads, input
//! concepts against what operators accept, and sequence outputs against
//! their last step.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::concept::{Concept, NativeConceptCode};
use crate::config::StaticValidationConfig;
use crate::controllers::Controller;
use crate::errors::{PipeflowError, PipeflowResult};
use crate::pipe::{Operator, Pipe, PipeKind};
use crate::run::Libraries;

/// Kinds of static validation findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaticValidationErrorType {
    MissingInputVariable,
    ExtraneousInputVariable,
    InadequateInputConcept,
    TooManyCandidateInputs,
}

impl StaticValidationErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingInputVariable => "missing_input_variable",
            Self::ExtraneousInputVariable => "extraneous_input_variable",
            Self::InadequateInputConcept => "inadequate_input_concept",
            Self::TooManyCandidateInputs => "too_many_candidate_inputs",
        }
    }
}

impl fmt::Display for StaticValidationErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::MissingInputVariable => "Missing input variable",
            Self::ExtraneousInputVariable => "Extraneous input variable",
            Self::InadequateInputConcept => "Inadequate input concept",
            Self::TooManyCandidateInputs => "Too many candidate inputs",
        };
        f.write_str(label)
    }
}

/// What to do with a finding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaticValidationReaction {
    /// Fail the load
    #[default]
    Raise,
    /// Log a warning and keep going
    Log,
    Ignore,
}

/// One problem found on one pipe
#[derive(Debug, Clone, PartialEq)]
pub struct StaticValidationFinding {
    pub error_type: StaticValidationErrorType,
    pub domain: String,
    pub pipe_code: String,
    pub variable_names: Vec<String>,
    pub explanation: String,
}

impl StaticValidationFinding {
    fn new(
        pipe: &Pipe,
        error_type: StaticValidationErrorType,
        variable_names: Vec<String>,
        explanation: String,
    ) -> Self {
        Self {
            error_type,
            domain: pipe.domain.clone(),
            pipe_code: pipe.code.clone(),
            variable_names,
            explanation,
        }
    }

    pub fn to_error(&self) -> PipeflowError {
        PipeflowError::StaticValidation {
            error_type: self.error_type,
            domain: self.domain.clone(),
            pipe_code: self.pipe_code.clone(),
            explanation: self.explanation.clone(),
        }
    }
}

impl fmt::Display for StaticValidationFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in pipe '{}.{}': {}",
            self.error_type, self.domain, self.pipe_code, self.explanation
        )
    }
}

/// Findings of a validation pass, split by reaction
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<StaticValidationFinding>,
    pub warnings: Vec<StaticValidationFinding>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, finding: StaticValidationFinding) {
        self.errors.push(finding);
    }

    pub fn add_warning(&mut self, finding: StaticValidationFinding) {
        self.warnings.push(finding);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Fail with the first error, if any
    pub fn into_result(self) -> PipeflowResult<Self> {
        match self.errors.first() {
            Some(finding) => Err(finding.to_error()),
            None => Ok(self),
        }
    }
}

/// Validates pipes against complete libraries
pub struct StaticValidator<'a> {
    libraries: &'a Libraries,
    config: &'a StaticValidationConfig,
}

impl<'a> StaticValidator<'a> {
    pub fn new(libraries: &'a Libraries, config: &'a StaticValidationConfig) -> Self {
        Self { libraries, config }
    }

    /// Validate `pipes`, sorting findings by their configured reaction
    ///
    /// Structural problems that no reaction can excuse, such as a sequence
    /// whose output cannot come from its last step, fail immediately.
    pub fn validate(&self, pipes: &[Arc<Pipe>]) -> PipeflowResult<ValidationReport> {
        let mut report = ValidationReport::new();
        for pipe in pipes {
            for finding in self.check_pipe(pipe)? {
                self.record(&mut report, finding);
            }
        }
        Ok(report)
    }

    fn record(&self, report: &mut ValidationReport, finding: StaticValidationFinding) {
        match self.config.reaction_for(finding.error_type) {
            StaticValidationReaction::Raise => report.add_error(finding),
            StaticValidationReaction::Log => {
                tracing::warn!("{}", finding);
                report.add_warning(finding);
            }
            StaticValidationReaction::Ignore => {
                tracing::debug!("Ignored: {}", finding);
            }
        }
    }

    fn check_pipe(&self, pipe: &Pipe) -> PipeflowResult<Vec<StaticValidationFinding>> {
        let mut findings = Vec::new();
        match &pipe.kind {
            PipeKind::Operator(op @ (Operator::Llm(_) | Operator::Compose(_))) => {
                let read = op.required_variables(&pipe.inputs);
                self.check_declared(pipe, &read, false, &mut findings);
            }
            PipeKind::Operator(Operator::ImgGen(img_gen)) => match &img_gen.prompt {
                Some(_) => {
                    let read = pipe.required_variables(&self.libraries.pipes);
                    self.check_declared(pipe, &read, false, &mut findings);
                }
                None => self.check_single_input(
                    pipe,
                    &[NativeConceptCode::Text],
                    &mut findings,
                ),
            },
            PipeKind::Operator(Operator::Extract(_)) => self.check_single_input(
                pipe,
                &[NativeConceptCode::Image, NativeConceptCode::Pdf],
                &mut findings,
            ),
            PipeKind::Operator(Operator::Func(_)) => {}
            PipeKind::Controller(Controller::Sequence(sequence)) => {
                self.check_needed(pipe, &mut findings)?;
                if let Some(last) = sequence.steps.last() {
                    let last_pipe = self.libraries.pipes.get_required(&last.pipe_code)?;
                    if !self.compatible(&last_pipe.output, &pipe.output) {
                        return Err(PipeflowError::definition(
                            &pipe.code,
                            format!(
                                "output '{}' is not compatible with the output '{}' of last step '{}'",
                                pipe.output, last_pipe.output, last.pipe_code
                            ),
                        ));
                    }
                }
            }
            PipeKind::Controller(Controller::Parallel(_)) => {
                self.check_needed(pipe, &mut findings)?;
            }
            PipeKind::Controller(Controller::Batch(batch)) => {
                let list_name = &batch.batch_params.input_list_name;
                let item_name = &batch.batch_params.input_item_name;
                match pipe.inputs.get(list_name) {
                    None => findings.push(StaticValidationFinding::new(
                        pipe,
                        StaticValidationErrorType::MissingInputVariable,
                        vec![list_name.clone()],
                        format!("batch list '{}' is not declared in the inputs", list_name),
                    )),
                    Some(list) => {
                        let branch = self.libraries.pipes.get_required(&batch.branch_pipe_code)?;
                        if let Some(item) = branch.inputs.get(item_name) {
                            if !self.compatible(&list.concept, &item.concept) {
                                findings.push(StaticValidationFinding::new(
                                    pipe,
                                    StaticValidationErrorType::InadequateInputConcept,
                                    vec![list_name.clone()],
                                    format!(
                                        "list items of concept '{}' do not fit input '{}' ({}) of '{}'",
                                        list.concept, item_name, item.concept, batch.branch_pipe_code
                                    ),
                                ));
                            }
                        }
                    }
                }
            }
            PipeKind::Controller(Controller::Condition(condition)) => {
                let read = condition.expression_variables();
                let missing: Vec<String> = read
                    .into_iter()
                    .filter(|name| !pipe.inputs.contains(name))
                    .collect();
                if !missing.is_empty() {
                    findings.push(StaticValidationFinding::new(
                        pipe,
                        StaticValidationErrorType::MissingInputVariable,
                        missing.clone(),
                        format!("expression reads undeclared inputs: {}", missing.join(", ")),
                    ));
                }
            }
        }
        Ok(findings)
    }

    fn compatible(&self, tested: &Concept, wanted: &Concept) -> bool {
        self.libraries
            .concepts
            .is_compatible(&self.libraries.classes, tested, wanted, false)
    }

    /// Compare the variables a pipe reads with its declared inputs
    fn check_declared(
        &self,
        pipe: &Pipe,
        read: &BTreeSet<String>,
        check_extraneous: bool,
        findings: &mut Vec<StaticValidationFinding>,
    ) {
        let read: BTreeSet<&str> = read
            .iter()
            .map(String::as_str)
            .filter(|name| !name.starts_with('_'))
            .collect();

        let missing: Vec<String> = read
            .iter()
            .filter(|name| !pipe.inputs.contains(name))
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            findings.push(StaticValidationFinding::new(
                pipe,
                StaticValidationErrorType::MissingInputVariable,
                missing.clone(),
                format!("variables used but not declared as inputs: {}", missing.join(", ")),
            ));
        }

        if check_extraneous {
            let extraneous: Vec<String> = pipe
                .inputs
                .names()
                .filter(|name| !read.contains(name))
                .map(str::to_string)
                .collect();
            if !extraneous.is_empty() {
                findings.push(StaticValidationFinding::new(
                    pipe,
                    StaticValidationErrorType::ExtraneousInputVariable,
                    extraneous.clone(),
                    format!("inputs declared but never used: {}", extraneous.join(", ")),
                ));
            }
        }
    }

    /// Compare what a controller's sub pipes need with its declared inputs
    fn check_needed(
        &self,
        pipe: &Pipe,
        findings: &mut Vec<StaticValidationFinding>,
    ) -> PipeflowResult<()> {
        let needed = pipe.needed_inputs(&self.libraries.pipes, &HashSet::new())?;
        let read: BTreeSet<String> = needed.names().map(str::to_string).collect();
        self.check_declared(pipe, &read, true, findings);
        Ok(())
    }

    /// Operators that take exactly one input of an accepted concept
    fn check_single_input(
        &self,
        pipe: &Pipe,
        accepted: &[NativeConceptCode],
        findings: &mut Vec<StaticValidationFinding>,
    ) {
        let accepted_names: Vec<&str> = accepted.iter().map(NativeConceptCode::as_str).collect();
        match pipe.inputs.len() {
            0 => findings.push(StaticValidationFinding::new(
                pipe,
                StaticValidationErrorType::MissingInputVariable,
                vec![],
                format!("needs one input of concept {}", accepted_names.join(" or ")),
            )),
            1 => {
                let Some((name, requirement)) = pipe.inputs.iter().next() else {
                    return;
                };
                let fits = accepted
                    .iter()
                    .any(|code| self.compatible(&requirement.concept, &Concept::native(*code)));
                if !fits {
                    findings.push(StaticValidationFinding::new(
                        pipe,
                        StaticValidationErrorType::InadequateInputConcept,
                        vec![name.to_string()],
                        format!(
                            "input '{}' of concept '{}' is not {}",
                            name,
                            requirement.concept,
                            accepted_names.join(" or ")
                        ),
                    ));
                }
            }
            _ => findings.push(StaticValidationFinding::new(
                pipe,
                StaticValidationErrorType::TooManyCandidateInputs,
                pipe.inputs.names().map(str::to_string).collect(),
                format!(
                    "takes a single input but declares {}: {}",
                    pipe.inputs.len(),
                    pipe.inputs.names().collect::<Vec<_>>().join(", ")
                ),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::{InputRequirements, PipeCompose, PipeExtract};

    fn operator(code: &str, inputs: &[(&str, NativeConceptCode)], op: Operator) -> Arc<Pipe> {
        let mut requirements = InputRequirements::new();
        for (name, concept) in inputs {
            requirements.add(name, Concept::native(*concept), None);
        }
        Arc::new(Pipe {
            code: code.to_string(),
            domain: "test".to_string(),
            description: String::new(),
            inputs: requirements,
            output: Concept::native(NativeConceptCode::Text),
            output_multiplicity: None,
            kind: PipeKind::Operator(op),
        })
    }

    fn compose(template: &str) -> Operator {
        Operator::Compose(PipeCompose {
            template: template.to_string(),
        })
    }

    #[test]
    fn test_operator_reports_missing_inputs_only() {
        let libraries = Libraries::default();
        let config = StaticValidationConfig::default();
        let pipe = operator(
            "greet",
            &[("unused", NativeConceptCode::Text)],
            compose("Hello {{ name }}"),
        );

        let report = StaticValidator::new(&libraries, &config).validate(&[pipe]).unwrap();

        let types: Vec<_> = report.errors.iter().map(|f| f.error_type).collect();
        assert_eq!(types, vec![StaticValidationErrorType::MissingInputVariable]);
        assert_eq!(report.errors[0].variable_names, vec!["name"]);
        assert!(matches!(
            report.into_result(),
            Err(PipeflowError::StaticValidation { .. })
        ));
    }

    #[test]
    fn test_reactions_route_findings() {
        let libraries = Libraries::default();
        let mut config = StaticValidationConfig::default();
        config.reactions.insert(
            StaticValidationErrorType::MissingInputVariable,
            StaticValidationReaction::Log,
        );
        let pipe = operator(
            "greet",
            &[("unused", NativeConceptCode::Text)],
            compose("Hello {{ name }}"),
        );

        let report = StaticValidator::new(&libraries, &config).validate(&[pipe]).unwrap();

        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(
            report.warnings[0].error_type,
            StaticValidationErrorType::MissingInputVariable
        );
    }

    #[test]
    fn test_extract_input_rules() {
        let libraries = Libraries::default();
        let config = StaticValidationConfig::default();
        let extract = || Operator::Extract(PipeExtract::default());
        let validator = StaticValidator::new(&libraries, &config);

        let ok = operator("read_scan", &[("scan", NativeConceptCode::Pdf)], extract());
        assert!(validator.validate(&[ok]).unwrap().is_valid());

        let text = operator("read_text", &[("text", NativeConceptCode::Text)], extract());
        let report = validator.validate(&[text]).unwrap();
        assert_eq!(
            report.errors[0].error_type,
            StaticValidationErrorType::InadequateInputConcept
        );

        let none = operator("read_nothing", &[], extract());
        let report = validator.validate(&[none]).unwrap();
        assert_eq!(
            report.errors[0].error_type,
            StaticValidationErrorType::MissingInputVariable
        );

        let two = operator(
            "read_two",
            &[("a", NativeConceptCode::Image), ("b", NativeConceptCode::Pdf)],
            extract(),
        );
        let report = validator.validate(&[two]).unwrap();
        assert_eq!(
            report.errors[0].error_type,
            StaticValidationErrorType::TooManyCandidateInputs
        );
    }
}
