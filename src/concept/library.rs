// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Concept library
//!
//! Holds every concept known to an engine, keyed by concept string.

use indexmap::IndexMap;
use std::collections::HashSet;

use super::{split_concept_reference, Concept, NativeConceptCode};
use crate::collaborators::ClassRegistry;
use crate::errors::{PipeflowError, PipeflowResult};

/// Registry of concepts keyed by `domain.Code`
#[derive(Debug, Clone)]
pub struct ConceptLibrary {
    concepts: IndexMap<String, Concept>,
}

impl ConceptLibrary {
    /// Create a library holding the native concepts
    pub fn new() -> Self {
        let concepts = NativeConceptCode::ALL
            .into_iter()
            .map(|code| {
                let concept = Concept::native(code);
                (concept.concept_string(), concept)
            })
            .collect();
        Self { concepts }
    }

    /// Register a concept, failing if its concept string is taken
    pub fn add(&mut self, concept: Concept) -> PipeflowResult<()> {
        let concept_string = concept.concept_string();
        if self.concepts.contains_key(&concept_string) {
            return Err(PipeflowError::ConceptConflict { concept_string });
        }
        tracing::debug!("Registered concept {}", concept_string);
        self.concepts.insert(concept_string, concept);
        Ok(())
    }

    pub fn get(&self, concept_string: &str) -> Option<&Concept> {
        self.concepts.get(concept_string)
    }

    /// Look up a concept by concept string
    ///
    /// A bare code is accepted for native concepts.
    pub fn get_required(&self, concept_string: &str) -> PipeflowResult<&Concept> {
        let key = match NativeConceptCode::from_code(concept_string) {
            Some(native) => native.concept_string(),
            None => concept_string.to_string(),
        };
        self.concepts
            .get(&key)
            .ok_or_else(|| PipeflowError::ConceptNotFound {
                concept_string: concept_string.to_string(),
            })
    }

    /// Resolve a reference written inside a bundle of `domain`
    ///
    /// `Code` is looked up among native concepts first, then in `domain`.
    pub fn resolve(&self, domain: &str, reference: &str) -> PipeflowResult<Concept> {
        let (explicit_domain, code) = split_concept_reference(reference)?;
        let concept = match explicit_domain {
            Some(d) => self.get_required(&format!("{}.{}", d, code))?,
            None => match NativeConceptCode::from_code(code) {
                Some(native) => self.get_required(&native.concept_string())?,
                None => self.get_required(&format!("{}.{}", domain, code))?,
            },
        };
        Ok(concept.clone())
    }

    /// Remove every concept of a domain, returning how many were removed
    pub fn remove_domain(&mut self, domain: &str) -> usize {
        let before = self.concepts.len();
        self.concepts.retain(|_, concept| concept.domain != domain);
        before - self.concepts.len()
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Concept> {
        self.concepts.values()
    }

    /// Whether `tested` can be used where `wanted` is expected
    ///
    /// Strict mode only accepts a direct refinement or structurally
    /// identical classes; otherwise the refinement chain is followed and a
    /// structure covering the wanted fields is enough.
    pub fn is_compatible(
        &self,
        classes: &ClassRegistry,
        tested: &Concept,
        wanted: &Concept,
        strict: bool,
    ) -> bool {
        let is_code = |concept: &Concept, native: NativeConceptCode| {
            concept.native_code() == Some(native)
        };

        if is_code(tested, NativeConceptCode::Dynamic)
            || is_code(wanted, NativeConceptCode::Dynamic)
            || is_code(wanted, NativeConceptCode::Anything)
        {
            return true;
        }

        let wanted_string = wanted.concept_string();
        if tested.concept_string() == wanted_string {
            return true;
        }
        if tested.structure_class_name == wanted.structure_class_name {
            return true;
        }
        if tested.refines.as_deref() == Some(wanted_string.as_str()) {
            return true;
        }
        if !strict && self.refines_transitively(tested, &wanted_string) {
            return true;
        }

        if tested.refines.is_none() && wanted.refines.is_none() {
            let tested_class = classes.get_class(&tested.structure_class_name);
            let wanted_class = classes.get_class(&wanted.structure_class_name);
            return match (tested_class, wanted_class) {
                (Some(a), Some(b)) if strict => a.is_equivalent(b),
                (Some(a), Some(b)) => a.covers(b),
                _ => false,
            };
        }

        false
    }

    fn refines_transitively(&self, tested: &Concept, wanted_string: &str) -> bool {
        let mut visited = HashSet::new();
        let mut current = tested.refines.clone();

        while let Some(concept_string) = current {
            if concept_string == wanted_string {
                return true;
            }
            if !visited.insert(concept_string.clone()) {
                return false;
            }
            current = self
                .get(&concept_string)
                .and_then(|concept| concept.refines.clone());
        }

        false
    }
}

impl Default for ConceptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{FieldSpec, FieldType, StructureClass};

    fn library_with_chain() -> ConceptLibrary {
        let mut library = ConceptLibrary::new();
        library
            .add(Concept::new("docs", "Scan", "", "ImageContent").refining("native.Image"))
            .unwrap();
        library
            .add(Concept::new("docs", "Receipt", "", "ReceiptContent").refining("docs.Scan"))
            .unwrap();
        library
    }

    #[test]
    fn test_natives_present() {
        let library = ConceptLibrary::new();
        assert_eq!(library.len(), NativeConceptCode::ALL.len());
        assert!(library.get_required("Text").is_ok());
        assert!(library.get_required("native.PDF").is_ok());
        assert!(matches!(
            library.get_required("docs.Missing"),
            Err(PipeflowError::ConceptNotFound { .. })
        ));
    }

    #[test]
    fn test_conflict_on_duplicate() {
        let mut library = library_with_chain();
        let result = library.add(Concept::new("docs", "Scan", "again", "TextContent"));
        assert!(matches!(result, Err(PipeflowError::ConceptConflict { .. })));
    }

    #[test]
    fn test_resolve_prefers_native_then_domain() {
        let library = library_with_chain();
        assert_eq!(library.resolve("docs", "Text").unwrap().domain, "native");
        assert_eq!(library.resolve("docs", "Scan").unwrap().code, "Scan");
        assert_eq!(library.resolve("other", "docs.Receipt").unwrap().code, "Receipt");
        assert!(library.resolve("other", "Scan").is_err());
    }

    #[test]
    fn test_refinement_compatibility() {
        let library = library_with_chain();
        let classes = ClassRegistry::new();
        let receipt = library.get_required("docs.Receipt").unwrap();
        let scan = library.get_required("docs.Scan").unwrap();
        let image = library.get_required("Image").unwrap();
        let text = library.get_required("Text").unwrap();

        // direct refinement is enough even in strict mode
        assert!(library.is_compatible(&classes, receipt, scan, true));
        // transitive only when not strict
        assert!(library.is_compatible(&classes, receipt, image, false));
        assert!(!library.is_compatible(&classes, receipt, image, true));
        // never the other way round
        assert!(!library.is_compatible(&classes, image, receipt, false));
        assert!(!library.is_compatible(&classes, receipt, text, false));
    }

    #[test]
    fn test_dynamic_and_anything() {
        let library = ConceptLibrary::new();
        let classes = ClassRegistry::new();
        let text = library.get_required("Text").unwrap();
        let dynamic = library.get_required("Dynamic").unwrap();
        let anything = library.get_required("Anything").unwrap();
        let image = library.get_required("Image").unwrap();

        assert!(library.is_compatible(&classes, dynamic, image, true));
        assert!(library.is_compatible(&classes, text, dynamic, true));
        assert!(library.is_compatible(&classes, image, anything, true));
        assert!(!library.is_compatible(&classes, text, image, false));
    }

    #[test]
    fn test_structural_compatibility() {
        let mut library = ConceptLibrary::new();
        let mut classes = ClassRegistry::new();
        let field = |t| FieldSpec::new("", t);

        classes.register(
            StructureClass::new("Person")
                .with_field("name", field(FieldType::Text)),
        );
        classes.register(
            StructureClass::new("Employee")
                .with_field("name", field(FieldType::Text))
                .with_field("salary", field(FieldType::Number)),
        );
        library.add(Concept::new("hr", "Person", "", "Person")).unwrap();
        library.add(Concept::new("hr", "Employee", "", "Employee")).unwrap();

        let person = library.get_required("hr.Person").unwrap();
        let employee = library.get_required("hr.Employee").unwrap();

        assert!(library.is_compatible(&classes, employee, person, false));
        assert!(!library.is_compatible(&classes, employee, person, true));
        assert!(!library.is_compatible(&classes, person, employee, false));
    }

    #[test]
    fn test_refinement_cycle_terminates() {
        let mut library = ConceptLibrary::new();
        library
            .add(Concept::new("loop", "A", "", "AClass").refining("loop.B"))
            .unwrap();
        library
            .add(Concept::new("loop", "B", "", "BClass").refining("loop.A"))
            .unwrap();
        let classes = ClassRegistry::new();
        let a = library.get_required("loop.A").unwrap();
        let text = library.get_required("Text").unwrap();

        assert!(!library.is_compatible(&classes, a, text, false));
    }

    #[test]
    fn test_remove_domain() {
        let mut library = library_with_chain();
        assert_eq!(library.remove_domain("docs"), 2);
        assert_eq!(library.len(), NativeConceptCode::ALL.len());
    }
}
