// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Working memory construction from plain values

use serde_json::{Map, Value};

use super::{Stuff, StuffContent, WorkingMemory};
use crate::concept::{Concept, ConceptLibrary, NativeConceptCode};
use crate::errors::{PipeflowError, PipeflowResult};

/// Builds working memories from caller-supplied values
pub struct WorkingMemoryFactory;

impl WorkingMemoryFactory {
    /// Convert a `name -> value` map into a working memory
    ///
    /// Strings become `Text`, numbers become `Number`, arrays become lists
    /// of their converted items. Objects must name their concept:
    /// `{"concept": "docs.Invoice", "content": {...}}`.
    pub fn from_json_values(
        library: &ConceptLibrary,
        domain: &str,
        values: &Map<String, Value>,
    ) -> PipeflowResult<WorkingMemory> {
        let mut memory = WorkingMemory::new();
        for (name, value) in values {
            let stuff = Self::make_stuff(library, domain, name, value)?;
            memory.add_new_stuff(name, stuff);
        }
        Ok(memory)
    }

    fn make_stuff(
        library: &ConceptLibrary,
        domain: &str,
        name: &str,
        value: &Value,
    ) -> PipeflowResult<Stuff> {
        let invalid = |reason: String| PipeflowError::InputValue {
            name: name.to_string(),
            reason,
        };

        match value {
            Value::Object(object) => {
                let concept_ref = object
                    .get("concept")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid("objects must carry a 'concept' string".into()))?;
                let concept = library.resolve(domain, concept_ref)?;
                let content = object
                    .get("content")
                    .ok_or_else(|| invalid("objects must carry a 'content' value".into()))?;
                let content = Self::make_content(&concept, content)
                    .map_err(|reason| invalid(reason))?;
                Ok(Stuff::new(concept, content))
            }
            Value::Array(items) => {
                let concept = match items.first() {
                    Some(Value::Number(_)) => Concept::native(NativeConceptCode::Number),
                    _ => Concept::native(NativeConceptCode::Text),
                };
                let items = items
                    .iter()
                    .map(|item| Self::make_content(&concept, item))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|reason| invalid(reason))?;
                Ok(Stuff::new(concept, StuffContent::list(items)))
            }
            Value::Number(_) => {
                let concept = Concept::native(NativeConceptCode::Number);
                let content = Self::make_content(&concept, value).map_err(|reason| invalid(reason))?;
                Ok(Stuff::new(concept, content))
            }
            Value::String(text) => Ok(Stuff::new(
                Concept::native(NativeConceptCode::Text),
                StuffContent::text(text.clone()),
            )),
            Value::Bool(_) | Value::Null => {
                Err(invalid(format!("unsupported input value: {}", value)))
            }
        }
    }

    /// Convert a JSON value into content for `concept`
    pub fn make_content(concept: &Concept, value: &Value) -> Result<StuffContent, String> {
        if let Value::Array(items) = value {
            let items = items
                .iter()
                .map(|item| Self::make_content(concept, item))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(StuffContent::list(items));
        }

        let native = NativeConceptCode::from_code(
            concept
                .structure_class_name
                .strip_suffix("Content")
                .unwrap_or(&concept.structure_class_name),
        );

        match native {
            Some(NativeConceptCode::Number) => value
                .as_f64()
                .map(|number| StuffContent::Number { number })
                .ok_or_else(|| format!("expected a number, got {}", value)),
            Some(NativeConceptCode::Image) => match value {
                Value::String(url) => Ok(StuffContent::Image {
                    url: url.clone(),
                    caption: None,
                }),
                _ => serde_json::from_value::<ImageValue>(value.clone())
                    .map(|image| StuffContent::Image {
                        url: image.url,
                        caption: image.caption,
                    })
                    .map_err(|e| e.to_string()),
            },
            Some(NativeConceptCode::Pdf) => match value {
                Value::String(url) => Ok(StuffContent::Pdf { url: url.clone() }),
                _ => value
                    .get("url")
                    .and_then(Value::as_str)
                    .map(|url| StuffContent::Pdf { url: url.to_string() })
                    .ok_or_else(|| "expected a url".to_string()),
            },
            Some(NativeConceptCode::Text)
            | Some(NativeConceptCode::Dynamic)
            | Some(NativeConceptCode::Anything) => match value {
                Value::String(text) => Ok(StuffContent::text(text.clone())),
                Value::Object(object) => object
                    .get("text")
                    .and_then(Value::as_str)
                    .map(StuffContent::text)
                    .ok_or_else(|| "expected a text".to_string()),
                other => Ok(StuffContent::text(other.to_string())),
            },
            Some(NativeConceptCode::TextAndImages) | Some(NativeConceptCode::Page) => {
                serde_json::from_value::<StuffContent>(value.clone()).map_err(|e| e.to_string())
            }
            None => Ok(StuffContent::Structured {
                class_name: concept.structure_class_name.clone(),
                value: value.clone(),
            }),
        }
    }
}

#[derive(serde::Deserialize)]
struct ImageValue {
    url: String,
    #[serde(default)]
    caption: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn library() -> ConceptLibrary {
        let mut library = ConceptLibrary::new();
        library
            .add(Concept::new("billing", "Invoice", "", "Invoice"))
            .unwrap();
        library
            .add(Concept::new("billing", "Scan", "", "ImageContent").refining("native.Image"))
            .unwrap();
        library
    }

    #[test]
    fn test_plain_values() {
        let values = json!({
            "topic": "rust",
            "count": 4,
            "tags": ["a", "b"],
        });
        let memory =
            WorkingMemoryFactory::from_json_values(&library(), "billing", values.as_object().unwrap())
                .unwrap();

        assert_eq!(memory.get("topic").unwrap().content.as_text(), Some("rust"));
        assert_eq!(
            memory.get("count").unwrap().concept.code,
            NativeConceptCode::Number.as_str()
        );
        assert_eq!(memory.get_as_list("tags").unwrap().len(), 2);
        assert_eq!(memory.len(), 3);
    }

    #[test]
    fn test_concept_objects() {
        let values = json!({
            "invoice": {"concept": "Invoice", "content": {"total": 10}},
            "scan": {"concept": "billing.Scan", "content": "https://example.com/a.png"},
        });
        let memory =
            WorkingMemoryFactory::from_json_values(&library(), "billing", values.as_object().unwrap())
                .unwrap();

        match &memory.get("invoice").unwrap().content {
            StuffContent::Structured { class_name, value } => {
                assert_eq!(class_name, "Invoice");
                assert_eq!(value["total"], 10);
            }
            other => panic!("unexpected content: {other:?}"),
        }
        assert!(matches!(
            memory.get("scan").unwrap().content,
            StuffContent::Image { .. }
        ));
    }

    #[test]
    fn test_invalid_values() {
        let lib = library();
        let missing_concept = json!({"x": {"content": 1}});
        assert!(matches!(
            WorkingMemoryFactory::from_json_values(&lib, "billing", missing_concept.as_object().unwrap()),
            Err(PipeflowError::InputValue { .. })
        ));

        let unknown = json!({"x": {"concept": "Unknown", "content": 1}});
        assert!(matches!(
            WorkingMemoryFactory::from_json_values(&lib, "billing", unknown.as_object().unwrap()),
            Err(PipeflowError::ConceptNotFound { .. })
        ));

        let boolean = json!({"x": true});
        assert!(WorkingMemoryFactory::from_json_values(&lib, "billing", boolean.as_object().unwrap()).is_err());
    }
}
