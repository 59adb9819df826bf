// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Working memory
//!
//! The per-run blackboard pipes read from and write to. Entries keep their
//! insertion order; aliases always point at an existing entry.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{Stuff, StuffContent};
use crate::concept::Concept;
use crate::errors::{PipeflowError, PipeflowResult};

/// Reserved name of the main output
pub const MAIN_STUFF_NAME: &str = "main_stuff";

/// Ordered name -> stuff store with aliases
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkingMemory {
    root: IndexMap<String, Stuff>,
    #[serde(default)]
    aliases: IndexMap<String, String>,
}

impl WorkingMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a memory from stuffs that already carry a name
    pub fn from_stuffs(stuffs: impl IntoIterator<Item = Stuff>) -> PipeflowResult<Self> {
        let mut memory = Self::new();
        for stuff in stuffs {
            let name = stuff.name.clone().ok_or_else(|| PipeflowError::InputValue {
                name: stuff.id.clone(),
                reason: "stuff has no name".into(),
            })?;
            memory.add_new_stuff(&name, stuff);
        }
        Ok(memory)
    }

    /// Insert or overwrite a stuff under `name`
    pub fn add_new_stuff(&mut self, name: &str, mut stuff: Stuff) {
        if self.root.contains_key(name) {
            tracing::debug!("Overwriting stuff '{}' in working memory", name);
        }
        self.aliases.shift_remove(name);
        stuff.name = Some(name.to_string());
        self.root.insert(name.to_string(), stuff);
    }

    /// Store the output of a pipe and make it the main stuff
    pub fn set_new_main_stuff(&mut self, stuff: Stuff, name: Option<&str>) {
        match name {
            Some(name) if name != MAIN_STUFF_NAME => {
                self.add_new_stuff(name, stuff);
                self.remove_stuff(MAIN_STUFF_NAME);
                self.aliases
                    .insert(MAIN_STUFF_NAME.to_string(), name.to_string());
            }
            _ => {
                self.aliases.shift_remove(MAIN_STUFF_NAME);
                self.add_new_stuff(MAIN_STUFF_NAME, stuff);
            }
        }
    }

    /// Point `alias` at an existing entry, replacing any previous alias
    pub fn set_alias(&mut self, alias: &str, target: &str) -> PipeflowResult<()> {
        let resolved = self
            .resolve_name(target)
            .ok_or_else(|| PipeflowError::AliasTargetNotFound {
                alias: alias.to_string(),
                target: target.to_string(),
            })?
            .to_string();
        if alias == resolved {
            return Ok(());
        }
        self.remove_stuff(alias);
        self.aliases.insert(alias.to_string(), resolved);
        Ok(())
    }

    /// Like [`set_alias`](Self::set_alias) but keeps an existing alias
    /// and never shadows a stored entry
    pub fn add_alias(&mut self, alias: &str, target: &str) -> PipeflowResult<()> {
        if self.aliases.contains_key(alias) {
            tracing::debug!("Alias '{}' already set, keeping it", alias);
            return Ok(());
        }
        if self.root.contains_key(alias) {
            tracing::warn!(
                "Not adding alias '{}' -> '{}': a stuff is already stored under that name",
                alias,
                target
            );
            return Ok(());
        }
        self.set_alias(alias, target)
    }

    /// Remove an entry and every alias pointing at it
    pub fn remove_stuff(&mut self, name: &str) -> Option<Stuff> {
        let removed = self.root.shift_remove(name);
        if removed.is_some() {
            self.aliases.retain(|_, target| target != name);
        }
        removed
    }

    fn resolve_name<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        if self.root.contains_key(name) {
            return Some(name);
        }
        self.aliases.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve_name(name).is_some()
    }

    pub fn get_optional(&self, name: &str) -> Option<&Stuff> {
        self.resolve_name(name).and_then(|key| self.root.get(key))
    }

    pub fn get(&self, name: &str) -> PipeflowResult<&Stuff> {
        self.get_optional(name)
            .ok_or_else(|| PipeflowError::StuffNotFound {
                name: name.to_string(),
                expected_concept: None,
            })
    }

    /// Like [`get`](Self::get) but names the expected concept in the error
    pub fn get_expected(&self, name: &str, expected: &Concept) -> PipeflowResult<&Stuff> {
        self.get_optional(name)
            .ok_or_else(|| PipeflowError::StuffNotFound {
                name: name.to_string(),
                expected_concept: Some(expected.concept_string()),
            })
    }

    pub fn get_mut(&mut self, name: &str) -> PipeflowResult<&mut Stuff> {
        let key = self
            .resolve_name(name)
            .map(str::to_string)
            .ok_or_else(|| PipeflowError::StuffNotFound {
                name: name.to_string(),
                expected_concept: None,
            })?;
        self.root
            .get_mut(&key)
            .ok_or(PipeflowError::StuffNotFound {
                name: key,
                expected_concept: None,
            })
    }

    pub fn get_main(&self) -> PipeflowResult<&Stuff> {
        self.get_optional(MAIN_STUFF_NAME)
            .ok_or(PipeflowError::NoMainStuff)
    }

    /// Fetch several stuffs at once, failing on the first missing name
    pub fn get_stuffs<'a, I>(&self, names: I) -> PipeflowResult<Vec<&Stuff>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        names.into_iter().map(|name| self.get(name)).collect()
    }

    /// Items of a list-typed stuff
    pub fn get_as_list(&self, name: &str) -> PipeflowResult<&[StuffContent]> {
        let stuff = self.get(name)?;
        stuff
            .content
            .as_list()
            .ok_or_else(|| PipeflowError::StuffNotAList {
                name: name.to_string(),
                concept: stuff.concept.concept_string(),
            })
    }

    /// Names of the stored entries, in insertion order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.root.keys().map(String::as_str)
    }

    pub fn aliases(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases
            .iter()
            .map(|(alias, target)| (alias.as_str(), target.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Stuff)> {
        self.root.iter().map(|(name, stuff)| (name.as_str(), stuff))
    }

    pub fn len(&self) -> usize {
        self.root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// One line per entry, for logs
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for stuff in self.root.values() {
            out.push_str(&format!("  - {}\n", stuff.short_desc()));
        }
        for (alias, target) in &self.aliases {
            out.push_str(&format!("  - {} -> {}\n", alias, target));
        }
        out
    }
}
