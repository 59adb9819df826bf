// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Bundles
//!
//! A bundle is a TOML file declaring one domain's concepts and pipes.

mod dag;
mod definition;
mod loader;
mod validation;

pub use dag::{DependencyGraph, DependencyResolver};
pub use definition::{
    BundleBlueprint, ConceptBlueprint, FieldBlueprint, PipeBlueprint, StructureBlueprint,
    SubPipeBlueprint,
};
pub use loader::{BundleLoader, LoadedBundle};
pub use validation::{
    StaticValidationErrorType, StaticValidationFinding, StaticValidationReaction, StaticValidator,
    ValidationReport,
};
