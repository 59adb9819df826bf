// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Pipeline tracking
//!
//! Trackers receive one call per data movement between stuffs and can
//! rebuild the flow of a run afterwards.

use std::sync::Mutex;

use crate::memory::Stuff;

/// Observer of the data flow of a run
pub trait PipelineTracker: Send + Sync {
    /// A pipe produced `to`, optionally from `from`
    fn add_pipe_step(&self, from: Option<&Stuff>, to: &Stuff, pipe_code: &str, pipe_stack: &[String]);

    /// A batch branch produced `to` from the item `from`
    fn add_batch_step(&self, from: &Stuff, to: &Stuff, branch_index: usize, pipe_stack: &[String]);

    /// A condition evaluated `expression` and chose `outcome`
    fn add_condition_step(
        &self,
        from: Option<&Stuff>,
        expression: &str,
        outcome: &str,
        pipe_code: &str,
        pipe_stack: &[String],
    );
}

/// Tracker that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpTracker;

impl PipelineTracker for NoOpTracker {
    fn add_pipe_step(&self, _: Option<&Stuff>, _: &Stuff, _: &str, _: &[String]) {}

    fn add_batch_step(&self, _: &Stuff, _: &Stuff, _: usize, _: &[String]) {}

    fn add_condition_step(&self, _: Option<&Stuff>, _: &str, _: &str, _: &str, _: &[String]) {}
}

/// One recorded movement
#[derive(Debug, Clone, PartialEq)]
pub enum TrackedStep {
    Pipe {
        from: Option<String>,
        to: String,
        pipe_code: String,
        depth: usize,
    },
    Batch {
        from: String,
        to: String,
        branch_index: usize,
        depth: usize,
    },
    Condition {
        from: Option<String>,
        expression: String,
        outcome: String,
        pipe_code: String,
        depth: usize,
    },
}

fn stuff_label(stuff: &Stuff) -> String {
    stuff.name.clone().unwrap_or_else(|| stuff.id.clone())
}

/// Tracker keeping every step in memory
#[derive(Debug, Default)]
pub struct RecordingTracker {
    steps: Mutex<Vec<TrackedStep>>,
}

impl RecordingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, step: TrackedStep) {
        self.steps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(step);
    }

    /// Snapshot of the recorded steps
    pub fn steps(&self) -> Vec<TrackedStep> {
        self.steps
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Render the recorded flow as a Mermaid flowchart
    pub fn to_mermaid(&self) -> String {
        let mut output = String::from("flowchart LR\n");
        for step in self.steps() {
            match step {
                TrackedStep::Pipe {
                    from: Some(from),
                    to,
                    pipe_code,
                    ..
                } => {
                    output.push_str(&format!("    {} -->|{}| {}\n", from, pipe_code, to));
                }
                TrackedStep::Pipe {
                    from: None,
                    to,
                    pipe_code,
                    ..
                } => {
                    output.push_str(&format!("    {}([{}]) --> {}\n", pipe_code, pipe_code, to));
                }
                TrackedStep::Batch {
                    from,
                    to,
                    branch_index,
                    ..
                } => {
                    output.push_str(&format!("    {} -.->|#{}| {}\n", from, branch_index, to));
                }
                TrackedStep::Condition {
                    from,
                    outcome,
                    pipe_code,
                    ..
                } => {
                    if let Some(from) = from {
                        output.push_str(&format!("    {} --> {}{{{}}}\n", from, pipe_code, pipe_code));
                    }
                    output.push_str(&format!("    {}{{{}}} -->|{}| {}\n", pipe_code, pipe_code, outcome, outcome));
                }
            }
        }
        output
    }
}

impl PipelineTracker for RecordingTracker {
    fn add_pipe_step(&self, from: Option<&Stuff>, to: &Stuff, pipe_code: &str, pipe_stack: &[String]) {
        self.record(TrackedStep::Pipe {
            from: from.map(stuff_label),
            to: stuff_label(to),
            pipe_code: pipe_code.to_string(),
            depth: pipe_stack.len(),
        });
    }

    fn add_batch_step(&self, from: &Stuff, to: &Stuff, branch_index: usize, pipe_stack: &[String]) {
        self.record(TrackedStep::Batch {
            from: stuff_label(from),
            to: stuff_label(to),
            branch_index,
            depth: pipe_stack.len(),
        });
    }

    fn add_condition_step(
        &self,
        from: Option<&Stuff>,
        expression: &str,
        outcome: &str,
        pipe_code: &str,
        pipe_stack: &[String],
    ) {
        self.record(TrackedStep::Condition {
            from: from.map(stuff_label),
            expression: expression.to_string(),
            outcome: outcome.to_string(),
            pipe_code: pipe_code.to_string(),
            depth: pipe_stack.len(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concept::{Concept, NativeConceptCode};
    use crate::memory::StuffContent;

    fn stuff(name: &str) -> Stuff {
        Stuff::new(Concept::native(NativeConceptCode::Text), StuffContent::text("x")).named(name)
    }

    #[test]
    fn test_recording_tracker_mermaid() {
        let tracker = RecordingTracker::new();
        let stack = vec!["pipeline".to_string(), "summarize".to_string()];
        tracker.add_pipe_step(Some(&stuff("article")), &stuff("summary"), "summarize", &stack);
        tracker.add_condition_step(Some(&stuff("summary")), "{{ summary }}", "publish", "route", &stack);

        assert_eq!(tracker.steps().len(), 2);
        insta::assert_snapshot!(
            tracker.to_mermaid(),
            @r###"
        flowchart LR
            article -->|summarize| summary
            summary --> route{route}
            route{route} -->|publish| publish
        "###
        );
    }

    #[test]
    fn test_noop_tracker_accepts_everything() {
        let tracker = NoOpTracker;
        tracker.add_batch_step(&stuff("a"), &stuff("b"), 0, &[]);
    }
}
