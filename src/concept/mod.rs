// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Concept model
//!
//! Concepts are the domain-qualified data types pipes communicate through.
//! A concept is identified by its concept string `domain.Code` and may
//! refine at most one other concept.

mod library;

pub use library::ConceptLibrary;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::errors::{PipeflowError, PipeflowResult};

/// Domain holding the built-in concepts
pub const NATIVE_DOMAIN: &str = "native";

/// A domain-qualified data type descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub domain: String,
    pub code: String,
    #[serde(default)]
    pub description: String,
    pub structure_class_name: String,
    /// Concept string of the refined concept
    #[serde(default)]
    pub refines: Option<String>,
}

impl Concept {
    pub fn new(domain: &str, code: &str, description: &str, structure_class_name: &str) -> Self {
        Self {
            domain: domain.to_string(),
            code: code.to_string(),
            description: description.to_string(),
            structure_class_name: structure_class_name.to_string(),
            refines: None,
        }
    }

    /// Declare the concept this one refines
    pub fn refining(mut self, concept_string: &str) -> Self {
        self.refines = Some(concept_string.to_string());
        self
    }

    /// Build one of the native concepts
    pub fn native(code: NativeConceptCode) -> Self {
        Self::new(
            NATIVE_DOMAIN,
            code.as_str(),
            code.description(),
            &code.structure_class_name(),
        )
    }

    /// `domain.Code`
    pub fn concept_string(&self) -> String {
        format!("{}.{}", self.domain, self.code)
    }

    pub fn is_native(&self) -> bool {
        self.domain == NATIVE_DOMAIN
    }

    pub fn native_code(&self) -> Option<NativeConceptCode> {
        if self.is_native() {
            NativeConceptCode::from_code(&self.code)
        } else {
            None
        }
    }

    /// Default working memory name for a stuff of this concept
    pub fn default_stuff_name(&self) -> String {
        pascal_to_snake(&self.code)
    }
}

impl std::fmt::Display for Concept {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.domain, self.code)
    }
}

/// Built-in concepts available in every library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeConceptCode {
    Dynamic,
    Text,
    Image,
    Pdf,
    TextAndImages,
    Number,
    Page,
    Anything,
}

impl NativeConceptCode {
    pub const ALL: [NativeConceptCode; 8] = [
        Self::Dynamic,
        Self::Text,
        Self::Image,
        Self::Pdf,
        Self::TextAndImages,
        Self::Number,
        Self::Page,
        Self::Anything,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dynamic => "Dynamic",
            Self::Text => "Text",
            Self::Image => "Image",
            Self::Pdf => "PDF",
            Self::TextAndImages => "TextAndImages",
            Self::Number => "Number",
            Self::Page => "Page",
            Self::Anything => "Anything",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|native| native.as_str() == code)
    }

    pub fn structure_class_name(&self) -> String {
        format!("{}Content", self.as_str())
    }

    pub fn concept_string(&self) -> String {
        format!("{}.{}", NATIVE_DOMAIN, self.as_str())
    }

    fn description(&self) -> &'static str {
        match self {
            Self::Dynamic => "A concept resolved at run time",
            Self::Text => "A text",
            Self::Image => "An image",
            Self::Pdf => "A PDF document",
            Self::TextAndImages => "A text with images",
            Self::Number => "A number",
            Self::Page => "A page of an extracted document",
            Self::Anything => "Any kind of content",
        }
    }
}

fn domain_code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid domain regex"))
}

fn concept_code_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z][A-Za-z0-9]*$").expect("valid concept code regex"))
}

/// lowercase_with_underscores, used for domains and pipe codes
pub fn is_snake_case(value: &str) -> bool {
    domain_code_regex().is_match(value)
}

/// CapitalizedWords, used for concept codes
pub fn is_pascal_case(value: &str) -> bool {
    concept_code_regex().is_match(value)
}

/// Split a concept reference into an optional domain and a code
///
/// Accepts `Code` or `domain.Code`, validating both parts.
pub fn split_concept_reference(reference: &str) -> PipeflowResult<(Option<&str>, &str)> {
    let invalid = |reason: &str| PipeflowError::InvalidConcept {
        value: reference.to_string(),
        reason: reason.to_string(),
    };

    match reference.split_once('.') {
        Some((domain, code)) => {
            if code.contains('.') {
                return Err(invalid("expected at most one '.' separator"));
            }
            if !is_snake_case(domain) {
                return Err(invalid("domain must be snake_case"));
            }
            if !is_pascal_case(code) {
                return Err(invalid("concept code must be PascalCase"));
            }
            Ok((Some(domain), code))
        }
        None => {
            if !is_pascal_case(reference) {
                return Err(invalid("concept code must be PascalCase"));
            }
            Ok((None, reference))
        }
    }
}

fn pascal_to_snake(code: &str) -> String {
    let mut out = String::with_capacity(code.len() + 4);
    let chars: Vec<char> = code.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower = i > 0 && !chars[i - 1].is_uppercase();
            let next_lower = chars.get(i + 1).map_or(false, |n| n.is_lowercase());
            if i > 0 && (prev_lower || (next_lower && chars[i - 1].is_uppercase())) {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(*c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_concepts() {
        let text = Concept::native(NativeConceptCode::Text);
        assert_eq!(text.concept_string(), "native.Text");
        assert_eq!(text.structure_class_name, "TextContent");
        assert_eq!(text.native_code(), Some(NativeConceptCode::Text));
        assert_eq!(NativeConceptCode::from_code("PDF"), Some(NativeConceptCode::Pdf));
        assert_eq!(NativeConceptCode::from_code("Invoice"), None);
    }

    #[test]
    fn test_default_stuff_name() {
        let concept = Concept::new("docs", "MeetingSummary", "", "TextContent");
        assert_eq!(concept.default_stuff_name(), "meeting_summary");
        assert_eq!(Concept::native(NativeConceptCode::Pdf).default_stuff_name(), "pdf");
        assert_eq!(
            Concept::native(NativeConceptCode::TextAndImages).default_stuff_name(),
            "text_and_images"
        );
    }

    #[test]
    fn test_split_concept_reference() {
        assert_eq!(split_concept_reference("Text").unwrap(), (None, "Text"));
        assert_eq!(
            split_concept_reference("docs.Summary").unwrap(),
            (Some("docs"), "Summary")
        );
        assert!(split_concept_reference("docs.summary").is_err());
        assert!(split_concept_reference("Docs.Summary").is_err());
        assert!(split_concept_reference("a.b.C").is_err());
    }

    #[test]
    fn test_case_rules() {
        assert!(is_snake_case("summarize_text"));
        assert!(!is_snake_case("SummarizeText"));
        assert!(!is_snake_case("_private"));
        assert!(is_pascal_case("Invoice2"));
        assert!(!is_pascal_case("invoice"));
    }
}
