// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Stuff: one named, typed value living in working memory

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::concept::Concept;
use crate::errors::{PipeflowError, PipeflowResult};

/// Polymorphic content of a stuff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StuffContent {
    Text {
        text: String,
    },
    Number {
        number: f64,
    },
    Image {
        url: String,
        #[serde(default)]
        caption: Option<String>,
    },
    Pdf {
        url: String,
    },
    TextAndImages {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        images: Vec<String>,
    },
    Page {
        page_number: usize,
        text: String,
        #[serde(default)]
        images: Vec<String>,
    },
    Structured {
        class_name: String,
        value: serde_json::Value,
    },
    List {
        items: Vec<StuffContent>,
    },
}

impl StuffContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn list(items: Vec<StuffContent>) -> Self {
        Self::List { items }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Number { .. } => "number",
            Self::Image { .. } => "image",
            Self::Pdf { .. } => "pdf",
            Self::TextAndImages { .. } => "text_and_images",
            Self::Page { .. } => "page",
            Self::Structured { .. } => "structured",
            Self::List { .. } => "list",
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::List { .. })
    }

    pub fn as_list(&self) -> Option<&[StuffContent]> {
        match self {
            Self::List { items } => Some(items),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Text form used when the content is inserted in a template
    pub fn rendered_text(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            Self::Number { number } if number.fract() == 0.0 && number.abs() < 1e15 => {
                format!("{}", *number as i64)
            }
            Self::Number { number } => number.to_string(),
            Self::Image { url, .. } | Self::Pdf { url } => url.clone(),
            Self::TextAndImages { text, .. } => text.clone().unwrap_or_default(),
            Self::Page { text, .. } => text.clone(),
            Self::Structured { value, .. } => match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            },
            Self::List { items } => items
                .iter()
                .map(StuffContent::rendered_text)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Text form of one field, for `{{ var.field }}` references
    pub fn field_text(&self, field: &str) -> Option<String> {
        match (self, field) {
            (Self::Text { text }, "text") => Some(text.clone()),
            (Self::Number { number }, "number") => Some(number.to_string()),
            (Self::Image { url, .. }, "url") | (Self::Pdf { url }, "url") => Some(url.clone()),
            (Self::Image { caption, .. }, "caption") => caption.clone(),
            (Self::TextAndImages { text, .. }, "text") => text.clone(),
            (Self::Page { text, .. }, "text") => Some(text.clone()),
            (Self::Page { page_number, .. }, "page_number") => Some(page_number.to_string()),
            (Self::Structured { value, .. }, field) => value.get(field).map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
            _ => None,
        }
    }
}

/// One named, typed value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stuff {
    pub id: String,
    pub name: Option<String>,
    pub concept: Concept,
    pub content: StuffContent,
}

impl Stuff {
    pub fn new(concept: Concept, content: StuffContent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: None,
            concept,
            content,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn is_list(&self) -> bool {
        self.content.is_list()
    }

    /// Append an item to list content in place
    pub fn push_item(&mut self, item: StuffContent) -> PipeflowResult<()> {
        match &mut self.content {
            StuffContent::List { items } => {
                items.push(item);
                Ok(())
            }
            _ => Err(PipeflowError::StuffNotAList {
                name: self.name.clone().unwrap_or_else(|| self.id.clone()),
                concept: self.concept.concept_string(),
            }),
        }
    }

    /// Short one-line description for logs
    pub fn short_desc(&self) -> String {
        let name = self.name.as_deref().unwrap_or("<unnamed>");
        match &self.content {
            StuffContent::List { items } => format!(
                "{} ({}[{}])",
                name,
                self.concept.concept_string(),
                items.len()
            ),
            content => format!(
                "{} ({}, {})",
                name,
                self.concept.concept_string(),
                content.kind_name()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concept::NativeConceptCode;

    #[test]
    fn test_rendered_text() {
        assert_eq!(StuffContent::Number { number: 3.0 }.rendered_text(), "3");
        assert_eq!(StuffContent::Number { number: 2.5 }.rendered_text(), "2.5");
        let list = StuffContent::list(vec![StuffContent::text("a"), StuffContent::text("b")]);
        assert_eq!(list.rendered_text(), "a\nb");
        let structured = StuffContent::Structured {
            class_name: "Invoice".into(),
            value: serde_json::json!({"total": 12, "vendor": "ACME"}),
        };
        assert_eq!(structured.field_text("vendor").as_deref(), Some("ACME"));
        assert_eq!(structured.field_text("total").as_deref(), Some("12"));
        assert_eq!(structured.field_text("missing"), None);
    }

    #[test]
    fn test_push_item_requires_list() {
        let concept = Concept::native(NativeConceptCode::Text);
        let mut list = Stuff::new(concept.clone(), StuffContent::list(vec![])).named("items");
        list.push_item(StuffContent::text("one")).unwrap();
        assert_eq!(list.content.as_list().map(|items| items.len()), Some(1));

        let mut single = Stuff::new(concept, StuffContent::text("solo")).named("solo");
        assert!(matches!(
            single.push_item(StuffContent::text("two")),
            Err(PipeflowError::StuffNotAList { .. })
        ));
    }

    #[test]
    fn test_ids_are_unique() {
        let concept = Concept::native(NativeConceptCode::Text);
        let a = Stuff::new(concept.clone(), StuffContent::text("x"));
        let b = Stuff::new(concept, StuffContent::text("x"));
        assert_ne!(a.id, b.id);
    }
}
