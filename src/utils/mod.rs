// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Utility modules for the pipeflow CLI

pub mod spinner;

pub use spinner::*;
