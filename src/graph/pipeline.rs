//! Name-indexed node graph.
//!
//! [`PipelineGraph`] stores nodes behind `Arc` so a running task can hold on
//! to the node it is currently using while the graph it came from is
//! replaced. Graph edits never happen in place on a shared graph: loaders
//! build a new graph and swap it in (see
//! [`PipelineResource`](crate::graph::PipelineResource)).

use crate::config::NodeDefaults;
use crate::error::{FlowError, Result, ResultExt};
use crate::graph::node::Node;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// A problem found by [`PipelineGraph::validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphIssue {
    /// `node` lists `target` in next/interrupt/on_error but no such node exists
    UnknownReference { node: String, target: String },
    /// `name` appears in both `next` and `interrupt` of `node`
    NextInterruptOverlap { node: String, name: String },
    /// `node` jumps back to `label` but no node declares that checkpoint
    UndeclaredCheckpoint { node: String, label: String },
}

impl GraphIssue {
    /// Unknown references make a run fail when reached; the others only
    /// make it behave differently than the author probably intended.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GraphIssue::UnknownReference { .. })
    }
}

impl fmt::Display for GraphIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphIssue::UnknownReference { node, target } => {
                write!(f, "'{}' references unknown node '{}'", node, target)
            }
            GraphIssue::NextInterruptOverlap { node, name } => write!(
                f,
                "'{}' lists '{}' in both next and interrupt (first occurrence wins)",
                node, name
            ),
            GraphIssue::UndeclaredCheckpoint { node, label } => write!(
                f,
                "'{}' jumps back to checkpoint '{}' which no node declares",
                node, label
            ),
        }
    }
}

/// Set of nodes keyed by name
#[derive(Debug, Clone, Default)]
pub struct PipelineGraph {
    nodes: HashMap<String, Arc<Node>>,
}

impl PipelineGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a JSON object keyed by node name.
    ///
    /// Keys starting with `$` are metadata (e.g. `$schema`) and skipped.
    pub fn from_json(value: serde_json::Value, defaults: &NodeDefaults) -> Result<Self> {
        let serde_json::Value::Object(map) = value else {
            return Err(FlowError::GraphParse(
                "pipeline document must be a JSON object".to_string(),
            ));
        };

        let mut graph = Self::new();
        for (name, def) in map {
            if name.starts_with('$') {
                continue;
            }
            graph.insert(Node::from_json(name, def, defaults)?);
        }
        Ok(graph)
    }

    pub fn from_json_str(content: &str, defaults: &NodeDefaults) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        Self::from_json(value, defaults)
    }

    /// Load a single pipeline file
    pub fn load_file(path: impl AsRef<Path>, defaults: &NodeDefaults) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline {:?}", path))?;
        Self::from_json_str(&content, defaults)
            .with_context(|| format!("Failed to parse pipeline {:?}", path))
    }

    /// Load every `*.json` file of a directory, in file name order.
    /// Later files replace earlier nodes of the same name.
    pub fn load_dir(dir: impl AsRef<Path>, defaults: &NodeDefaults) -> Result<Self> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read pipeline directory {:?}", dir))?
        {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut graph = Self::new();
        for path in paths {
            graph.merge(Self::load_file(&path, defaults)?);
        }
        tracing::debug!("Loaded {} nodes from {:?}", graph.len(), dir);
        Ok(graph)
    }

    pub fn insert(&mut self, node: Node) {
        self.nodes.insert(node.name.clone(), Arc::new(node));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Node>> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.nodes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Replace nodes by name with those of `other`
    pub fn merge(&mut self, other: PipelineGraph) {
        self.nodes.extend(other.nodes);
    }

    /// Copy of this graph with `overrides` merged on top
    pub fn merged(&self, overrides: &PipelineGraph) -> PipelineGraph {
        let mut copy = self.clone();
        copy.nodes
            .extend(overrides.nodes.iter().map(|(k, v)| (k.clone(), v.clone())));
        copy
    }

    /// Check references between nodes
    pub fn validate(&self) -> Vec<GraphIssue> {
        let declared: BTreeSet<&str> = self
            .nodes
            .values()
            .flat_map(|n| n.checkpoint.iter().map(String::as_str))
            .collect();

        let mut issues = Vec::new();
        for name in self.names() {
            let node = &self.nodes[name];

            for target in node.referenced_names() {
                if !self.contains(target) {
                    issues.push(GraphIssue::UnknownReference {
                        node: name.to_string(),
                        target: target.to_string(),
                    });
                }
            }

            for dup in node.next.iter().filter(|n| node.interrupt.contains(n)) {
                issues.push(GraphIssue::NextInterruptOverlap {
                    node: name.to_string(),
                    name: dup.clone(),
                });
            }

            for label in &node.jumpback {
                if !declared.contains(label.as_str()) {
                    issues.push(GraphIssue::UndeclaredCheckpoint {
                        node: name.to_string(),
                        label: label.clone(),
                    });
                }
            }
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults() -> NodeDefaults {
        NodeDefaults::immediate()
    }

    #[test]
    fn test_from_json() {
        let graph = PipelineGraph::from_json(
            json!({
                "$schema": "ignored",
                "A": { "next": ["B"] },
                "B": {}
            }),
            &defaults(),
        )
        .unwrap();
        assert_eq!(graph.names(), vec!["A", "B"]);
        assert_eq!(graph.get("A").unwrap().next, vec!["B"]);
    }

    #[test]
    fn test_non_object_rejected() {
        let err = PipelineGraph::from_json(json!([1, 2]), &defaults()).unwrap_err();
        assert!(matches!(err, FlowError::GraphParse(_)));
    }

    #[test]
    fn test_merged_leaves_base_untouched() {
        let base = PipelineGraph::from_json(
            json!({ "A": { "next": ["B"] }, "B": {} }),
            &defaults(),
        )
        .unwrap();
        let overrides =
            PipelineGraph::from_json(json!({ "A": { "next": ["C"] }, "C": {} }), &defaults())
                .unwrap();

        let merged = base.merged(&overrides);
        assert_eq!(merged.get("A").unwrap().next, vec!["C"]);
        assert!(merged.contains("B"));
        assert!(merged.contains("C"));
        assert_eq!(base.get("A").unwrap().next, vec!["B"]);
        assert!(!base.contains("C"));
    }

    #[test]
    fn test_validate() {
        let graph = PipelineGraph::from_json(
            json!({
                "A": { "next": ["B", "Ghost"], "interrupt": ["B"], "checkpoint": "top" },
                "B": { "jumpback": ["top", "nowhere"] }
            }),
            &defaults(),
        )
        .unwrap();

        let issues = graph.validate();
        assert_eq!(issues.len(), 3);
        assert!(issues.contains(&GraphIssue::UnknownReference {
            node: "A".into(),
            target: "Ghost".into()
        }));
        assert!(issues.contains(&GraphIssue::NextInterruptOverlap {
            node: "A".into(),
            name: "B".into()
        }));
        assert!(issues.contains(&GraphIssue::UndeclaredCheckpoint {
            node: "B".into(),
            label: "nowhere".into()
        }));
        assert_eq!(issues.iter().filter(|i| i.is_fatal()).count(), 1);
    }

    #[test]
    fn test_load_dir_later_files_win() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("01_base.json"), r#"{ "A": { "next": "B" }, "B": {} }"#)
            .unwrap();
        std::fs::write(dir.path().join("02_patch.json"), r#"{ "A": { "next": "C" }, "C": {} }"#)
            .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a pipeline").unwrap();

        let graph = PipelineGraph::load_dir(dir.path(), &defaults()).unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.get("A").unwrap().next, vec!["C"]);
    }

    #[test]
    fn test_load_file_error_has_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = PipelineGraph::load_file(&path, &defaults()).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }
}
