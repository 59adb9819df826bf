// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Class and function registries
//!
//! Both are explicit objects owned by a run context. Nothing here is global.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::concept::NativeConceptCode;
use crate::errors::{PipeflowError, PipeflowResult};
use crate::memory::{StuffContent, WorkingMemory};

/// Type of a structure field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Integer,
    Boolean,
    List,
    Object,
}

impl FieldType {
    fn mock_value(&self, field_name: &str) -> Value {
        match self {
            Self::Text => Value::String(format!("mock {}", field_name)),
            Self::Number => json!(1.5),
            Self::Integer => json!(1),
            Self::Boolean => json!(false),
            Self::List => json!([]),
            Self::Object => json!({}),
        }
    }
}

/// One field of a structure class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(default)]
    pub description: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl FieldSpec {
    pub fn new(description: &str, field_type: FieldType) -> Self {
        Self {
            description: description.to_string(),
            field_type,
            required: true,
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Shape of the content behind a concept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureClass {
    pub name: String,
    #[serde(default)]
    pub fields: IndexMap<String, FieldSpec>,
}

impl StructureClass {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: IndexMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, spec: FieldSpec) -> Self {
        self.fields.insert(name.to_string(), spec);
        self
    }

    /// Same field names with the same types
    pub fn is_equivalent(&self, other: &StructureClass) -> bool {
        self.fields.len() == other.fields.len() && self.covers(other)
    }

    /// Every field of `other` exists here with the same type
    pub fn covers(&self, other: &StructureClass) -> bool {
        other.fields.iter().all(|(name, spec)| {
            self.fields
                .get(name)
                .map_or(false, |own| own.field_type == spec.field_type)
        })
    }

    /// A JSON object with a placeholder for every field
    pub fn mock_value(&self) -> Value {
        let object: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, spec)| (name.clone(), spec.field_type.mock_value(name)))
            .collect();
        Value::Object(object)
    }

    /// Check that a value has every required field
    pub fn check_value(&self, value: &Value) -> Result<(), String> {
        let object = value
            .as_object()
            .ok_or_else(|| format!("expected an object for class '{}'", self.name))?;
        let missing: Vec<&str> = self
            .fields
            .iter()
            .filter(|(name, spec)| spec.required && !object.contains_key(name.as_str()))
            .map(|(name, _)| name.as_str())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "class '{}' is missing fields: {}",
                self.name,
                missing.join(", ")
            ))
        }
    }
}

/// Structure classes known to an engine
#[derive(Debug, Clone)]
pub struct ClassRegistry {
    classes: HashMap<String, StructureClass>,
}

impl ClassRegistry {
    /// Create a registry holding the native content classes
    pub fn new() -> Self {
        let text = || FieldSpec::new("", FieldType::Text);
        let mut registry = Self {
            classes: HashMap::new(),
        };

        for code in NativeConceptCode::ALL {
            let class = StructureClass::new(&code.structure_class_name());
            let class = match code {
                NativeConceptCode::Text => class.with_field("text", text()),
                NativeConceptCode::Number => {
                    class.with_field("number", FieldSpec::new("", FieldType::Number))
                }
                NativeConceptCode::Image => class
                    .with_field("url", text())
                    .with_field("caption", text().optional()),
                NativeConceptCode::Pdf => class.with_field("url", text()),
                NativeConceptCode::TextAndImages => class
                    .with_field("text", text().optional())
                    .with_field("images", FieldSpec::new("", FieldType::List)),
                NativeConceptCode::Page => class
                    .with_field("page_number", FieldSpec::new("", FieldType::Integer))
                    .with_field("text", text())
                    .with_field("images", FieldSpec::new("", FieldType::List)),
                NativeConceptCode::Dynamic | NativeConceptCode::Anything => class,
            };
            registry.register(class);
        }

        registry
    }

    /// Register a class, replacing any class with the same name
    pub fn register(&mut self, class: StructureClass) {
        tracing::debug!("Registered structure class {}", class.name);
        self.classes.insert(class.name.clone(), class);
    }

    pub fn get_class(&self, name: &str) -> Option<&StructureClass> {
        self.classes.get(name)
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Native content classes are backed by a dedicated [`StuffContent`] variant
    pub fn is_native_class(name: &str) -> bool {
        name.strip_suffix("Content")
            .and_then(NativeConceptCode::from_code)
            .is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<StructureClass> {
        self.classes.remove(name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A function callable from a `PipeFunc`
pub type PipeFunction = Arc<dyn Fn(&WorkingMemory) -> anyhow::Result<StuffContent> + Send + Sync>;

/// Functions callable by name from `PipeFunc` pipes
#[derive(Clone, Default)]
pub struct FuncRegistry {
    funcs: HashMap<String, PipeFunction>,
}

impl FuncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&WorkingMemory) -> anyhow::Result<StuffContent> + Send + Sync + 'static,
    {
        self.funcs.insert(name.to_string(), Arc::new(func));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.funcs.contains_key(name)
    }

    pub fn get_required(&self, name: &str) -> PipeflowResult<PipeFunction> {
        self.funcs
            .get(name)
            .cloned()
            .ok_or_else(|| PipeflowError::FuncNotFound {
                function_name: name.to_string(),
            })
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.funcs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for FuncRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuncRegistry")
            .field("funcs", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice() -> StructureClass {
        StructureClass::new("Invoice")
            .with_field("vendor", FieldSpec::new("Who billed", FieldType::Text))
            .with_field("total", FieldSpec::new("Amount due", FieldType::Number))
            .with_field("notes", FieldSpec::new("", FieldType::Text).optional())
    }

    #[test]
    fn test_native_classes_registered() {
        let registry = ClassRegistry::new();
        assert_eq!(registry.len(), NativeConceptCode::ALL.len());
        assert!(registry.has_class("PDFContent"));
        assert!(ClassRegistry::is_native_class("PageContent"));
        assert!(!ClassRegistry::is_native_class("Invoice"));

        let text = registry.get_class("TextContent").unwrap();
        let image = registry.get_class("ImageContent").unwrap();
        assert!(!image.covers(text));
        assert!(!text.covers(image));
    }

    #[test]
    fn test_mock_value_and_check() {
        let class = invoice();
        let mock = class.mock_value();
        assert_eq!(mock["vendor"], "mock vendor");
        assert!(class.check_value(&mock).is_ok());

        let err = class.check_value(&json!({"vendor": "ACME"})).unwrap_err();
        assert!(err.contains("total"));
        assert!(!err.contains("notes"));
        assert!(class.check_value(&json!("flat")).is_err());
    }

    #[test]
    fn test_func_registry() {
        let mut funcs = FuncRegistry::new();
        funcs.register("count_entries", |memory: &WorkingMemory| {
            Ok(StuffContent::Number {
                number: memory.len() as f64,
            })
        });

        assert!(funcs.contains("count_entries"));
        let func = funcs.get_required("count_entries").unwrap();
        let result = func(&WorkingMemory::new()).unwrap();
        assert_eq!(result, StuffContent::Number { number: 0.0 });
        assert!(matches!(
            funcs.get_required("nope"),
            Err(PipeflowError::FuncNotFound { .. })
        ));
    }
}
