// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Working memory and the values stored in it

mod factory;
mod stuff;
mod working_memory;

pub use factory::WorkingMemoryFactory;
pub use stuff::{Stuff, StuffContent};
pub use working_memory::{WorkingMemory, MAIN_STUFF_NAME};
