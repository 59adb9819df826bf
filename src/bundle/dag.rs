// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 pipeflow contributors

//! Pipe dependency ordering and graph rendering
//!
//! [`DependencyResolver`] orders a bundle's pipes so that controllers come
//! before the pipes they run. [`DependencyGraph`] renders the same relation
//! for humans.

use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, HashSet};

use super::BundleBlueprint;
use crate::errors::{PipeflowError, PipeflowResult};
use crate::pipe::{PipeDependencies, PipeType};

/// Deterministic depth-first ordering of pipes
pub struct DependencyResolver;

impl DependencyResolver {
    /// Order `pipes` with controllers before their dependencies
    ///
    /// Traversal is pre-order, from the pipes no other pipe references,
    /// taken alphabetically. Sequence steps are visited in step order,
    /// other dependencies alphabetically. Dependencies outside `pipes` are
    /// skipped. Re-entering a pipe on the current path is a cycle.
    pub fn resolve<T: PipeDependencies>(pipes: &IndexMap<String, T>) -> PipeflowResult<Vec<String>> {
        let referenced: HashSet<String> = pipes
            .values()
            .flat_map(|pipe| pipe.pipe_dependencies())
            .collect();
        let all_codes: BTreeSet<&str> = pipes.keys().map(String::as_str).collect();

        let mut state = Traversal {
            pipes,
            visited: HashSet::new(),
            path: Vec::new(),
            order: Vec::with_capacity(pipes.len()),
        };

        for code in all_codes.iter().filter(|code| !referenced.contains(**code)) {
            state.visit(code)?;
        }
        for code in &all_codes {
            state.visit(code)?;
        }

        Ok(state.order)
    }
}

struct Traversal<'a, T> {
    pipes: &'a IndexMap<String, T>,
    visited: HashSet<String>,
    path: Vec<String>,
    order: Vec<String>,
}

impl<T: PipeDependencies> Traversal<'_, T> {
    fn visit(&mut self, code: &str) -> PipeflowResult<()> {
        if self.visited.contains(code) {
            return Ok(());
        }
        if let Some(start) = self.path.iter().position(|c| c == code) {
            let mut cycle = self.path[start..].to_vec();
            cycle.push(code.to_string());
            return Err(PipeflowError::CircularDependency {
                pipe_code: code.to_string(),
                cycle,
            });
        }
        let Some(pipe) = self.pipes.get(code) else {
            return Ok(());
        };

        self.path.push(code.to_string());
        self.order.push(code.to_string());

        let children = match pipe.ordered_pipe_dependencies() {
            Some(ordered) => ordered,
            None => pipe.pipe_dependencies().into_iter().collect(),
        };
        let pipes = self.pipes;
        for child in children.iter().filter(|c| pipes.contains_key(c.as_str())) {
            self.visit(child)?;
        }

        self.path.pop();
        self.visited.insert(code.to_string());
        Ok(())
    }
}

/// Controller -> dependency graph of a bundle
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    code_to_index: HashMap<String, NodeIndex>,
    pipe_types: HashMap<String, PipeType>,
    order: Vec<String>,
}

impl DependencyGraph {
    /// Build the graph of a bundle, failing on cycles
    pub fn from_blueprint(bundle: &BundleBlueprint) -> PipeflowResult<Self> {
        let order = DependencyResolver::resolve(&bundle.pipes)?;

        let mut graph = DiGraph::new();
        let mut code_to_index = HashMap::new();
        for code in &order {
            let node = graph.add_node(code.clone());
            code_to_index.insert(code.clone(), node);
        }

        for code in &order {
            let blueprint = &bundle.pipes[code.as_str()];
            let children = blueprint
                .ordered_pipe_dependencies()
                .unwrap_or_else(|| blueprint.pipe_dependencies().into_iter().collect());
            for child in children {
                if let Some(&child_node) = code_to_index.get(&child) {
                    graph.add_edge(code_to_index[code], child_node, ());
                }
            }
        }

        let pipe_types = bundle
            .pipes
            .iter()
            .map(|(code, blueprint)| (code.clone(), blueprint.pipe_type))
            .collect();

        Ok(Self {
            graph,
            code_to_index,
            pipe_types,
            order,
        })
    }

    /// Pipe codes in resolver order
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Pipes run by `code`, in declaration order of the edges
    pub fn dependencies(&self, code: &str) -> Option<Vec<String>> {
        let node = self.code_to_index.get(code)?;
        let mut deps: Vec<String> = self
            .graph
            .neighbors_directed(*node, Direction::Outgoing)
            .map(|n| self.graph[n].clone())
            .collect();
        // petgraph yields the most recent edge first
        deps.reverse();
        Some(deps)
    }

    /// Controllers that run `code`
    pub fn dependents(&self, code: &str) -> Option<Vec<String>> {
        let node = self.code_to_index.get(code)?;
        let mut dependents: Vec<String> = self
            .graph
            .neighbors_directed(*node, Direction::Incoming)
            .map(|n| self.graph[n].clone())
            .collect();
        dependents.sort();
        Some(dependents)
    }

    /// Whether `controller` runs `pipe`, directly or through other controllers
    pub fn depends_on(&self, controller: &str, pipe: &str) -> bool {
        let (Some(from), Some(to)) = (self.code_to_index.get(controller), self.code_to_index.get(pipe)) else {
            return false;
        };
        petgraph::algo::has_path_connecting(&self.graph, *from, *to, None)
    }

    fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order.iter().flat_map(move |code| {
            self.dependencies(code)
                .unwrap_or_default()
                .into_iter()
                .map(move |dep| (code.as_str(), self.graph[self.code_to_index[&dep]].as_str()))
        })
    }

    /// Mermaid flowchart
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");
        for code in &self.order {
            out.push_str(&format!("    {}[\"{} ({})\"]\n", code, code, self.pipe_types[code]));
        }
        for (from, to) in self.edges() {
            out.push_str(&format!("    {} --> {}\n", from, to));
        }
        out
    }

    /// Graphviz DOT digraph
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph pipes {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for code in &self.order {
            out.push_str(&format!(
                "    \"{}\" [label=\"{}\\n{}\"];\n",
                code, code, self.pipe_types[code]
            ));
        }
        for (from, to) in self.edges() {
            out.push_str(&format!("    \"{}\" -> \"{}\";\n", from, to));
        }

        out.push_str("}\n");
        out
    }

    /// Numbered listing in resolver order
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (i, code) in self.order.iter().enumerate() {
            out.push_str(&format!("{}. {} ({})", i + 1, code, self.pipe_types[code]));
            let deps = self.dependencies(code).unwrap_or_default();
            if !deps.is_empty() {
                out.push_str(&format!(" [runs: {}]", deps.join(", ")));
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Node {
        deps: Vec<&'static str>,
        ordered: bool,
    }

    impl PipeDependencies for Node {
        fn pipe_dependencies(&self) -> BTreeSet<String> {
            self.deps.iter().map(|d| d.to_string()).collect()
        }

        fn ordered_pipe_dependencies(&self) -> Option<Vec<String>> {
            self.ordered
                .then(|| self.deps.iter().map(|d| d.to_string()).collect())
        }
    }

    fn leaf() -> Node {
        Node { deps: vec![], ordered: false }
    }

    fn sequence(steps: Vec<&'static str>) -> Node {
        Node { deps: steps, ordered: true }
    }

    fn resolve(nodes: Vec<(&str, Node)>) -> PipeflowResult<Vec<String>> {
        let pipes: IndexMap<String, Node> = nodes
            .into_iter()
            .map(|(code, node)| (code.to_string(), node))
            .collect();
        DependencyResolver::resolve(&pipes)
    }

    #[test]
    fn test_sequence_before_its_steps() {
        let order = resolve(vec![
            ("summarize", leaf()),
            ("fetch", leaf()),
            ("pipeline", sequence(vec!["fetch", "summarize"])),
        ])
        .unwrap();

        assert_eq!(order, vec!["pipeline", "fetch", "summarize"]);
    }

    #[test]
    fn test_unordered_dependencies_are_alphabetical() {
        let order = resolve(vec![
            ("fan", Node { deps: vec!["zeta", "alpha"], ordered: false }),
            ("zeta", leaf()),
            ("alpha", leaf()),
            ("lonely", leaf()),
        ])
        .unwrap();

        assert_eq!(order, vec!["fan", "alpha", "zeta", "lonely"]);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let build = || {
            vec![
                ("c", sequence(vec!["b", "a"])),
                ("a", leaf()),
                ("d", Node { deps: vec!["a", "external"], ordered: false }),
                ("b", leaf()),
            ]
        };
        let first = resolve(build()).unwrap();
        for _ in 0..5 {
            assert_eq!(resolve(build()).unwrap(), first);
        }
        assert_eq!(first, vec!["c", "b", "a", "d"]);
    }

    #[test]
    fn test_cycle_names_a_pipe() {
        let result = resolve(vec![
            ("a", sequence(vec!["b"])),
            ("b", sequence(vec!["a"])),
        ]);

        match result {
            Err(PipeflowError::CircularDependency { pipe_code, cycle }) => {
                assert!(pipe_code == "a" || pipe_code == "b");
                assert_eq!(cycle.first(), cycle.last());
            }
            other => panic!("expected a circular dependency, got {:?}", other),
        }
    }

    #[test]
    fn test_graph_renderings() {
        let bundle = BundleBlueprint::from_toml(
            r#"
domain = "news"

[pipe.fetch]
type = "PipeFunc"
inputs = { url = "Text" }
output = "Text"
function_name = "fetch"

[pipe.summarize]
type = "PipeLLM"
inputs = { article = "Text" }
output = "Text"
prompt = "Summarize @article"

[pipe.pipeline]
type = "PipeSequence"
inputs = { url = "Text" }
output = "Text"
steps = [{ pipe = "fetch", result = "article" }, { pipe = "summarize" }]
"#,
        )
        .unwrap();

        let graph = DependencyGraph::from_blueprint(&bundle).unwrap();
        assert_eq!(graph.order(), ["pipeline", "fetch", "summarize"]);
        assert_eq!(
            graph.dependencies("pipeline").unwrap(),
            vec!["fetch", "summarize"]
        );
        assert_eq!(graph.dependents("fetch").unwrap(), vec!["pipeline"]);
        assert!(graph.depends_on("pipeline", "summarize"));
        assert!(!graph.depends_on("summarize", "pipeline"));

        let text = graph.to_text();
        assert!(text.starts_with("1. pipeline (PipeSequence) [runs: fetch, summarize]"));

        let mermaid = graph.to_mermaid();
        assert!(mermaid.contains("graph TD"));
        assert!(mermaid.contains("pipeline --> fetch"));

        let dot = graph.to_dot();
        assert!(dot.contains("\"pipeline\" -> \"summarize\";"));
    }
}
