// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

use indexmap::IndexMap;
use std::sync::Arc;

use super::Pipe;
use crate::errors::{PipeflowError, PipeflowResult};

/// Registry of loaded pipes keyed by code
#[derive(Debug, Clone, Default)]
pub struct PipeLibrary {
    pipes: IndexMap<String, Arc<Pipe>>,
}

impl PipeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pipe, failing if its code is taken
    pub fn add(&mut self, pipe: Pipe) -> PipeflowResult<()> {
        if let Some(existing) = self.pipes.get(&pipe.code) {
            return Err(PipeflowError::definition(
                &pipe.code,
                format!("a pipe with this code is already declared in domain '{}'", existing.domain),
            ));
        }
        self.pipes.insert(pipe.code.clone(), Arc::new(pipe));
        Ok(())
    }

    pub fn get(&self, pipe_code: &str) -> Option<&Arc<Pipe>> {
        self.pipes.get(pipe_code)
    }

    pub fn get_required(&self, pipe_code: &str) -> PipeflowResult<Arc<Pipe>> {
        self.pipes
            .get(pipe_code)
            .cloned()
            .ok_or_else(|| PipeflowError::PipeNotFound {
                pipe_code: pipe_code.to_string(),
            })
    }

    pub fn contains(&self, pipe_code: &str) -> bool {
        self.pipes.contains_key(pipe_code)
    }

    /// Remove every pipe of a domain, returning the removed codes
    pub fn remove_domain(&mut self, domain: &str) -> Vec<String> {
        let removed: Vec<String> = self
            .pipes
            .values()
            .filter(|pipe| pipe.domain == domain)
            .map(|pipe| pipe.code.clone())
            .collect();
        for code in &removed {
            self.pipes.shift_remove(code);
        }
        removed
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.pipes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Pipe>> {
        self.pipes.values()
    }

    pub fn len(&self) -> usize {
        self.pipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipes.is_empty()
    }
}
