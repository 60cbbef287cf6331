//! Graph provider and custom plug-in registry.
//!
//! A [`Resource`] hands out snapshots of its graph. Every run pins the
//! snapshot current when it starts. The stock implementation,
//! [`PipelineResource`], keeps the loaded graph behind an `Arc` that is
//! swapped as a whole on every load, so pinned snapshots never change.
//!
//! It also owns the name-keyed registries of [`CustomRecognition`] and
//! [`CustomAction`] objects. Vision back ends plug in the same way: a
//! recognizer registered as `"TemplateMatch"` serves every node whose
//! recognition kind is `TemplateMatch`.

use crate::config::NodeDefaults;
use crate::controller::Controller;
use crate::error::{FlowError, Result};
use crate::graph::node::Node;
use crate::graph::pipeline::PipelineGraph;
use crate::types::{Image, Recognition, Rect};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// A user-supplied recognition algorithm
pub trait CustomRecognition: Send + Sync {
    /// Look for a match in `image`. `None` means no hit.
    fn analyze(&self, image: &Image, param: &Value) -> Option<Recognition>;
}

/// A user-supplied action
pub trait CustomAction: Send + Sync {
    /// Perform the action. `hit_box` is the resolved target, `detail` the
    /// detail of the recognition that triggered it.
    fn run(
        &self,
        controller: &dyn Controller,
        param: &Value,
        hit_box: Option<Rect>,
        detail: &Value,
    ) -> bool;
}

/// Source of node definitions
pub trait Resource: Send + Sync {
    /// Whether a graph has been loaded successfully
    fn valid(&self) -> bool;

    /// The current graph version. A run holds on to the snapshot it
    /// started with; later loads are only seen by later runs.
    fn snapshot(&self) -> Arc<PipelineGraph>;

    /// Resolve a node by name in the current graph
    fn get_node(&self, name: &str) -> Option<Arc<Node>> {
        self.snapshot().get(name).cloned()
    }

    /// Abort loading in progress
    fn post_stop(&self) {}

    fn custom_recognition(&self, _name: &str) -> Option<Arc<dyn CustomRecognition>> {
        None
    }

    fn custom_action(&self, _name: &str) -> Option<Arc<dyn CustomAction>> {
        None
    }
}

/// Stock [`Resource`] backed by pipeline JSON documents
pub struct PipelineResource {
    defaults: NodeDefaults,
    graph: RwLock<Arc<PipelineGraph>>,
    loaded: AtomicBool,
    stopping: AtomicBool,
    recognitions: RwLock<HashMap<String, Arc<dyn CustomRecognition>>>,
    actions: RwLock<HashMap<String, Arc<dyn CustomAction>>>,
}

impl PipelineResource {
    pub fn new(defaults: NodeDefaults) -> Self {
        Self {
            defaults,
            graph: RwLock::new(Arc::new(PipelineGraph::new())),
            loaded: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            recognitions: RwLock::new(HashMap::new()),
            actions: RwLock::new(HashMap::new()),
        }
    }

    pub fn defaults(&self) -> &NodeDefaults {
        &self.defaults
    }

    /// Current graph snapshot
    pub fn graph(&self) -> Arc<PipelineGraph> {
        self.graph
            .read()
            .map(|g| g.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    /// Replace the whole graph
    pub fn set_graph(&self, graph: PipelineGraph) {
        let graph = Arc::new(graph);
        match self.graph.write() {
            Ok(mut g) => *g = graph,
            Err(e) => *e.into_inner() = graph,
        }
        self.loaded.store(true, Ordering::Release);
    }

    /// Merge a parsed pipeline document on top of the current graph
    pub fn load_json(&self, value: Value) -> Result<()> {
        let patch = PipelineGraph::from_json(value, &self.defaults)?;
        let merged = self.graph().merged(&patch);
        tracing::info!("Resource loaded {} nodes from JSON", patch.len());
        self.set_graph(merged);
        Ok(())
    }

    /// Load pipeline files or directories, in order.
    ///
    /// Nothing is published unless every path loads. A stop request between
    /// two paths abandons the load.
    pub fn load_paths<I, P>(&self, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.stopping.store(false, Ordering::Release);

        let mut merged = (*self.graph()).clone();
        for path in paths {
            if self.stopping.load(Ordering::Acquire) {
                tracing::warn!("Resource loading stopped");
                return Err(FlowError::Stopping);
            }

            let path = path.as_ref();
            let patch = if path.is_dir() {
                PipelineGraph::load_dir(path, &self.defaults)?
            } else {
                PipelineGraph::load_file(path, &self.defaults)?
            };
            tracing::info!("Resource loaded {} nodes from {:?}", patch.len(), path);
            merged.merge(patch);
        }

        self.set_graph(merged);
        Ok(())
    }

    pub fn register_custom_recognition(
        &self,
        name: impl Into<String>,
        recognition: Arc<dyn CustomRecognition>,
    ) {
        let name = name.into();
        tracing::debug!("Registering custom recognition '{}'", name);
        if let Ok(mut map) = self.recognitions.write() {
            map.insert(name, recognition);
        }
    }

    pub fn unregister_custom_recognition(&self, name: &str) -> bool {
        self.recognitions
            .write()
            .map(|mut map| map.remove(name).is_some())
            .unwrap_or(false)
    }

    pub fn clear_custom_recognitions(&self) {
        if let Ok(mut map) = self.recognitions.write() {
            map.clear();
        }
    }

    pub fn register_custom_action(&self, name: impl Into<String>, action: Arc<dyn CustomAction>) {
        let name = name.into();
        tracing::debug!("Registering custom action '{}'", name);
        if let Ok(mut map) = self.actions.write() {
            map.insert(name, action);
        }
    }

    pub fn unregister_custom_action(&self, name: &str) -> bool {
        self.actions
            .write()
            .map(|mut map| map.remove(name).is_some())
            .unwrap_or(false)
    }

    pub fn clear_custom_actions(&self) {
        if let Ok(mut map) = self.actions.write() {
            map.clear();
        }
    }
}

impl Default for PipelineResource {
    fn default() -> Self {
        Self::new(NodeDefaults::default())
    }
}

impl Resource for PipelineResource {
    fn valid(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    fn snapshot(&self) -> Arc<PipelineGraph> {
        self.graph()
    }

    fn post_stop(&self) {
        self.stopping.store(true, Ordering::Release);
    }

    fn custom_recognition(&self, name: &str) -> Option<Arc<dyn CustomRecognition>> {
        self.recognitions
            .read()
            .ok()
            .and_then(|map| map.get(name).cloned())
    }

    fn custom_action(&self, name: &str) -> Option<Arc<dyn CustomAction>> {
        self.actions
            .read()
            .ok()
            .and_then(|map| map.get(name).cloned())
    }
}

impl std::fmt::Debug for PipelineResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineResource")
            .field("nodes", &self.graph().len())
            .field("loaded", &self.valid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct AlwaysAt(Rect);

    impl CustomRecognition for AlwaysAt {
        fn analyze(&self, _image: &Image, _param: &Value) -> Option<Recognition> {
            Some(Recognition::new(self.0))
        }
    }

    #[test]
    fn test_invalid_until_loaded() {
        let resource = PipelineResource::new(NodeDefaults::immediate());
        assert!(!resource.valid());
        resource.load_json(json!({ "A": {} })).unwrap();
        assert!(resource.valid());
        assert!(resource.get_node("A").is_some());
        assert!(resource.get_node("B").is_none());
    }

    #[test]
    fn test_snapshot_survives_reload() {
        let resource = PipelineResource::new(NodeDefaults::immediate());
        resource.load_json(json!({ "A": { "next": "B" } })).unwrap();
        let before = resource.get_node("A").unwrap();
        let pinned = resource.snapshot();

        resource.load_json(json!({ "A": { "next": "C" }, "C": {} })).unwrap();
        assert_eq!(before.next, vec!["B"]);
        assert_eq!(pinned.get("A").unwrap().next, vec!["B"]);
        assert!(!pinned.contains("C"));
        assert_eq!(resource.get_node("A").unwrap().next, vec!["C"]);
    }

    #[test]
    fn test_failed_load_keeps_previous_graph() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        std::fs::write(&good, r#"{ "A": {} }"#).unwrap();

        let resource = PipelineResource::new(NodeDefaults::immediate());
        resource.load_paths([&good]).unwrap();

        let missing = dir.path().join("missing.json");
        assert!(resource.load_paths([&good, &missing]).is_err());
        assert_eq!(resource.graph().len(), 1);
    }

    #[test]
    fn test_custom_registry() {
        let resource = PipelineResource::default();
        resource.register_custom_recognition("finder", Arc::new(AlwaysAt(Rect::new(1, 1, 2, 2))));
        assert!(resource.custom_recognition("finder").is_some());
        assert!(resource.unregister_custom_recognition("finder"));
        assert!(!resource.unregister_custom_recognition("finder"));
        assert!(resource.custom_recognition("finder").is_none());
        assert!(resource.custom_action("anything").is_none());
    }
}
