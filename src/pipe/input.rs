// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Declared inputs of a pipe

use indexmap::IndexMap;

use super::multiplicity::OutputMultiplicity;
use crate::concept::Concept;

/// One declared input
#[derive(Debug, Clone, PartialEq)]
pub struct InputRequirement {
    pub concept: Concept,
    pub multiplicity: Option<OutputMultiplicity>,
}

impl InputRequirement {
    pub fn is_list(&self) -> bool {
        self.multiplicity.map_or(false, |m| m.is_multiple())
    }
}

/// Ordered `variable name -> requirement` map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputRequirements {
    items: IndexMap<String, InputRequirement>,
}

impl InputRequirements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a requirement, keeping the first one declared under a name
    pub fn add(&mut self, name: &str, concept: Concept, multiplicity: Option<OutputMultiplicity>) {
        self.items
            .entry(name.to_string())
            .or_insert(InputRequirement {
                concept,
                multiplicity,
            });
    }

    /// Add every requirement of `other` that is not already present
    pub fn merge(&mut self, other: &InputRequirements) {
        for (name, requirement) in other.iter() {
            self.add(name, requirement.concept.clone(), requirement.multiplicity);
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<InputRequirement> {
        self.items.shift_remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&InputRequirement> {
        self.items.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InputRequirement)> {
        self.items.iter().map(|(name, req)| (name.as_str(), req))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concept::NativeConceptCode;

    #[test]
    fn test_first_declaration_wins() {
        let mut inputs = InputRequirements::new();
        inputs.add("doc", Concept::native(NativeConceptCode::Pdf), None);
        inputs.add("doc", Concept::native(NativeConceptCode::Text), None);
        inputs.add("tags", Concept::native(NativeConceptCode::Text), Some(OutputMultiplicity::Flag(true)));

        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs.get("doc").unwrap().concept.code, "PDF");
        assert!(inputs.get("tags").unwrap().is_list());
        assert_eq!(inputs.names().collect::<Vec<_>>(), vec!["doc", "tags"]);
    }
}
